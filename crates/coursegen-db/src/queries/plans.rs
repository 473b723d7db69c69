//! Database query functions for the `course_plans` table.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::{CoursePlan, new_record_id};

/// Insert a new plan for a course with the given seed direction. Returns the
/// row with server-generated defaults (revision 0, created_at).
pub async fn insert_plan(
    pool: &PgPool,
    course_id: &str,
    direction: Option<&str>,
) -> Result<CoursePlan> {
    let plan = sqlx::query_as::<_, CoursePlan>(
        "INSERT INTO course_plans (id, course_id, direction) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(new_record_id())
    .bind(course_id)
    .bind(direction)
    .fetch_one(pool)
    .await
    .context("failed to insert course plan")?;

    Ok(plan)
}

/// Fetch a plan by its ID.
pub async fn get_plan(pool: &PgPool, id: &str) -> Result<Option<CoursePlan>> {
    let plan = sqlx::query_as::<_, CoursePlan>("SELECT * FROM course_plans WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch course plan")?;

    Ok(plan)
}

/// List all plans of a course, newest first.
pub async fn list_plans_for_course(pool: &PgPool, course_id: &str) -> Result<Vec<CoursePlan>> {
    let plans = sqlx::query_as::<_, CoursePlan>(
        "SELECT * FROM course_plans WHERE course_id = $1 ORDER BY created_at DESC",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await
    .context("failed to list course plans")?;

    Ok(plans)
}

/// Replace the seed direction of a plan.
///
/// Bumps the revision, so a generation started from the old direction can
/// no longer commit over the new one.
pub async fn update_direction(pool: &PgPool, id: &str, direction: &str) -> Result<()> {
    let result = sqlx::query(
        "UPDATE course_plans SET direction = $1, revision = revision + 1 WHERE id = $2",
    )
        .bind(direction)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to update plan direction")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("course plan {id} not found");
    }

    Ok(())
}

/// Write a generated curriculum and its transcript in one statement.
///
/// The update only applies while the row is still at `expected_revision`;
/// the revision is bumped and `last_generated_at` stamped. Returns `None`
/// when the row is missing or another writer already moved the revision.
pub async fn commit_generated_plan(
    pool: &PgPool,
    id: &str,
    expected_revision: i64,
    generated_json: &str,
    transcript: Option<&str>,
) -> Result<Option<CoursePlan>> {
    let plan = sqlx::query_as::<_, CoursePlan>(
        "UPDATE course_plans \
         SET generated_json = $1, transcript = $2, last_generated_at = now(), \
             revision = revision + 1 \
         WHERE id = $3 AND revision = $4 \
         RETURNING *",
    )
    .bind(generated_json)
    .bind(transcript)
    .bind(id)
    .bind(expected_revision)
    .fetch_optional(pool)
    .await
    .context("failed to commit generated plan")?;

    Ok(plan)
}
