mod config;
mod course_cmds;
mod generate_cmd;
mod plan_cmds;
mod serve_cmd;
mod user_cmds;

use clap::{Parser, Subcommand};

use coursegen_core::chain::PipelineKind;
use coursegen_db::models::UserField;
use coursegen_db::pool;

use config::CoursegenConfig;

#[derive(Parser)]
#[command(name = "coursegen", about = "Staged LLM course-plan generator")]
struct Cli {
    /// Database URL (overrides COURSEGEN_DATABASE_URL env var)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a coursegen config file (no database required)
    Init {
        /// PostgreSQL connection URL
        #[arg(long, default_value = "postgresql://localhost:5432/coursegen")]
        db_url: String,
        /// Pipeline to run: single or staged
        #[arg(long, default_value_t = PipelineKind::Staged)]
        pipeline: PipelineKind,
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
    /// Create and migrate the coursegen database
    DbInit,
    /// User management
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Course management
    Course {
        #[command(subcommand)]
        command: CourseCommands,
    },
    /// Course plan management
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Caller token management
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },
    /// Run the generation pipeline for a plan
    Generate {
        /// Course plan ID
        plan_id: String,
        /// Auth uid to act as (must be the course creator)
        #[arg(long = "as", value_name = "UID")]
        as_uid: String,
        /// Override the configured pipeline
        #[arg(long)]
        pipeline: Option<PipelineKind>,
    },
    /// Serve the HTTP API
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Port to listen on
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Subcommand)]
pub enum UserCommands {
    /// Register a user
    Add {
        /// Auth uid
        uid: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        name: Option<String>,
    },
    /// Look a user up by uid or email
    Show {
        /// Value to search for
        value: String,
        /// Field to match on: uid or email
        #[arg(long, default_value_t = UserField::Uid)]
        by: UserField,
    },
}

#[derive(Subcommand)]
pub enum CourseCommands {
    /// Create a course
    Add {
        /// Course title
        title: String,
        /// Creator's auth uid
        #[arg(long)]
        creator: String,
    },
    /// List courses created by a user
    List {
        /// Creator's auth uid
        #[arg(long)]
        creator: String,
    },
}

#[derive(Subcommand)]
pub enum PlanCommands {
    /// Create a course plan
    Add {
        /// Course ID the plan belongs to
        course_id: String,
        /// Free-text course direction
        #[arg(long)]
        direction: Option<String>,
    },
    /// Replace a plan's direction
    SetDirection {
        plan_id: String,
        direction: String,
    },
    /// Show a plan and its generated curriculum
    Show {
        /// Plan ID
        plan_id: String,
        /// Also print the stage transcript
        #[arg(long)]
        transcript: bool,
    },
    /// List plans for a course
    List {
        course_id: String,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Issue a caller token for a registered user
    Issue {
        /// Auth uid
        uid: String,
    },
}

/// Execute the `coursegen init` command: write config file.
fn cmd_init(db_url: &str, pipeline: PipelineKind, force: bool) -> anyhow::Result<()> {
    let path = config::config_path();

    if path.exists() && !force {
        anyhow::bail!(
            "config file already exists at {}\nUse --force to overwrite.",
            path.display()
        );
    }

    let token_secret = config::generate_token_secret();

    let cfg = config::ConfigFile {
        database: config::DatabaseSection {
            url: db_url.to_string(),
            max_connections: coursegen_db::config::DbConfig::DEFAULT_MAX_CONNECTIONS,
        },
        auth: config::AuthSection {
            token_secret: token_secret.clone(),
        },
        llm: Default::default(),
        pipeline: config::PipelineSection {
            kind: pipeline,
            ..Default::default()
        },
    };

    let path = config::save_config(&cfg)?;

    println!("Config written to {}", path.display());
    println!("  database.url = {db_url}");
    println!("  auth.token_secret = {}...{}", &token_secret[..8], &token_secret[56..]);
    println!("  pipeline.kind = {pipeline}");
    println!();
    println!("Set OPENAI_API_KEY before running `coursegen generate` or `coursegen serve`.");
    println!("Next: run `coursegen db-init` to create and migrate the database.");

    Ok(())
}

/// Execute the `coursegen db-init` command: create database and run migrations.
async fn cmd_db_init(cli_db_url: Option<&str>) -> anyhow::Result<()> {
    let resolved = CoursegenConfig::resolve(cli_db_url)?;

    println!("Initializing coursegen database...");

    if pool::ensure_database_exists(&resolved.db_config).await? {
        println!("Created database {}", resolved.db_config.database_url);
    }
    let db_pool = pool::create_pool(&resolved.db_config).await?;
    pool::run_migrations(&db_pool).await?;

    let counts = pool::table_counts(&db_pool).await?;
    println!("Database ready. Tables:");
    for (table, count) in counts {
        println!("  {table}: {count} rows");
    }

    db_pool.close().await;

    println!("coursegen db-init complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            db_url,
            pipeline,
            force,
        } => {
            cmd_init(&db_url, pipeline, force)?;
        }
        Commands::DbInit => {
            cmd_db_init(cli.database_url.as_deref()).await?;
        }
        command => {
            let resolved = CoursegenConfig::resolve(cli.database_url.as_deref())?;
            let db_pool = pool::create_pool(&resolved.db_config).await?;

            let result = match command {
                Commands::User { command } => user_cmds::run_user_command(command, &db_pool).await,
                Commands::Course { command } => {
                    course_cmds::run_course_command(command, &db_pool).await
                }
                Commands::Plan { command } => plan_cmds::run_plan_command(command, &db_pool).await,
                Commands::Token { command } => {
                    user_cmds::run_token_command(command, &db_pool, &resolved.token_config).await
                }
                Commands::Generate {
                    plan_id,
                    as_uid,
                    pipeline,
                } => {
                    generate_cmd::run_generate(&resolved, db_pool.clone(), &plan_id, &as_uid, pipeline)
                        .await
                }
                Commands::Serve { bind, port } => {
                    serve_cmd::run_serve(&resolved, db_pool.clone(), &bind, port).await
                }
                Commands::Init { .. } | Commands::DbInit => unreachable!("handled above"),
            };

            db_pool.close().await;
            result?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod test_util {
    use std::sync::{Mutex, MutexGuard};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Serialize tests that read or write process environment variables.
    pub fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }
}
