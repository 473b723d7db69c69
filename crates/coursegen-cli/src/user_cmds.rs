//! Handlers for `coursegen user` and `coursegen token`.

use anyhow::{Context, Result, bail};
use sqlx::PgPool;

use coursegen_core::access::{TokenConfig, generate_token};
use coursegen_db::models::{User, UserField};
use coursegen_db::queries::users as user_queries;

use crate::{TokenCommands, UserCommands};

pub async fn run_user_command(command: UserCommands, pool: &PgPool) -> Result<()> {
    match command {
        UserCommands::Add { uid, email, name } => {
            let user =
                user_queries::insert_user(pool, &uid, email.as_deref(), name.as_deref()).await?;
            println!("Created user {} (uid {})", user.id, user.uid);
            Ok(())
        }
        UserCommands::Show { value, by } => {
            let user = user_queries::find_user_by_field(pool, by, &value)
                .await?
                .with_context(|| format!("no user with {by} = {value:?}"))?;
            print_user(&user);
            Ok(())
        }
    }
}

pub async fn run_token_command(
    command: TokenCommands,
    pool: &PgPool,
    token_config: &TokenConfig,
) -> Result<()> {
    match command {
        TokenCommands::Issue { uid } => {
            let Some(user) = user_queries::find_user_by_field(pool, UserField::Uid, &uid).await?
            else {
                bail!("no user with uid {uid:?}; register it with `coursegen user add {uid}`");
            };
            // Printed bare so it can be captured with $(...).
            println!("{}", generate_token(token_config, &user.uid));
            Ok(())
        }
    }
}

fn print_user(user: &User) {
    println!("User:         {}", user.id);
    println!("  uid:        {}", user.uid);
    println!("  email:      {}", user.email.as_deref().unwrap_or("-"));
    println!("  name:       {}", user.display_name.as_deref().unwrap_or("-"));
    println!("  created:    {}", user.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
}
