//! Database query functions for the `generation_leases` table.

use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::GenerationLease;

/// Claim the generation lease for a plan.
///
/// Succeeds when no lease exists or the existing one is older than `ttl`
/// (its holder is presumed dead). Returns `None` while another live lease is
/// held.
pub async fn try_acquire_lease(
    pool: &PgPool,
    plan_id: &str,
    token: Uuid,
    ttl: Duration,
) -> Result<Option<GenerationLease>> {
    let lease = sqlx::query_as::<_, GenerationLease>(
        "INSERT INTO generation_leases (plan_id, token) VALUES ($1, $2) \
         ON CONFLICT (plan_id) DO UPDATE \
             SET token = EXCLUDED.token, acquired_at = now() \
             WHERE generation_leases.acquired_at < now() - make_interval(secs => $3) \
         RETURNING *",
    )
    .bind(plan_id)
    .bind(token)
    .bind(ttl.as_secs_f64())
    .fetch_optional(pool)
    .await
    .with_context(|| format!("failed to acquire generation lease for plan {plan_id}"))?;

    Ok(lease)
}

/// Release a lease, but only if `token` still owns it. Returns whether a row
/// was deleted.
pub async fn release_lease(pool: &PgPool, plan_id: &str, token: Uuid) -> Result<bool> {
    let result =
        sqlx::query("DELETE FROM generation_leases WHERE plan_id = $1 AND token = $2")
            .bind(plan_id)
            .bind(token)
            .execute(pool)
            .await
            .with_context(|| format!("failed to release generation lease for plan {plan_id}"))?;

    Ok(result.rows_affected() > 0)
}

/// Fetch the current lease on a plan, if any.
pub async fn get_lease(pool: &PgPool, plan_id: &str) -> Result<Option<GenerationLease>> {
    let lease = sqlx::query_as::<_, GenerationLease>(
        "SELECT * FROM generation_leases WHERE plan_id = $1",
    )
    .bind(plan_id)
    .fetch_optional(pool)
    .await
    .context("failed to fetch generation lease")?;

    Ok(lease)
}
