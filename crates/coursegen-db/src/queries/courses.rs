//! Database query functions for the `courses` table.

use anyhow::{Context, Result};
use sqlx::PgPool;

use crate::models::{Course, new_record_id};

/// Insert a new course owned by `creator_id` (an auth uid).
pub async fn insert_course(pool: &PgPool, creator_id: &str, title: &str) -> Result<Course> {
    let course = sqlx::query_as::<_, Course>(
        "INSERT INTO courses (id, creator_id, title) \
         VALUES ($1, $2, $3) \
         RETURNING *",
    )
    .bind(new_record_id())
    .bind(creator_id)
    .bind(title)
    .fetch_one(pool)
    .await
    .context("failed to insert course")?;

    Ok(course)
}

/// Fetch a course by its ID.
pub async fn get_course(pool: &PgPool, id: &str) -> Result<Option<Course>> {
    let course = sqlx::query_as::<_, Course>("SELECT * FROM courses WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("failed to fetch course")?;

    Ok(course)
}

/// List courses created by the given uid, newest first.
pub async fn list_courses_for_creator(pool: &PgPool, creator_id: &str) -> Result<Vec<Course>> {
    let courses = sqlx::query_as::<_, Course>(
        "SELECT * FROM courses WHERE creator_id = $1 ORDER BY created_at DESC",
    )
    .bind(creator_id)
    .fetch_all(pool)
    .await
    .context("failed to list courses")?;

    Ok(courses)
}
