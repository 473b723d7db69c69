//! Database query functions for the `users` table.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::{User, UserField, new_record_id};

/// Insert a new user. The record id is generated; `uid` must be unique.
pub async fn insert_user(
    pool: &PgPool,
    uid: &str,
    email: Option<&str>,
    display_name: Option<&str>,
) -> Result<User> {
    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (id, uid, email, display_name) \
         VALUES ($1, $2, $3, $4) \
         RETURNING *",
    )
    .bind(new_record_id())
    .bind(uid)
    .bind(email)
    .bind(display_name)
    .fetch_one(pool)
    .await
    .with_context(|| format!("failed to insert user {uid:?}"))?;

    Ok(user)
}

/// Look up a user by a secondary key rather than the record id.
pub async fn find_user_by_field(
    pool: &PgPool,
    field: UserField,
    value: &str,
) -> Result<Option<User>> {
    // The column name comes from a closed enum, never from input.
    let query = format!("SELECT * FROM users WHERE {} = $1", field.column());
    let user = sqlx::query_as::<_, User>(&query)
        .bind(value)
        .fetch_optional(pool)
        .await
        .with_context(|| format!("failed to look up user by {field}"))?;

    Ok(user)
}
