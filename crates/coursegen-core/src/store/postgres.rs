use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use coursegen_db::models::{Course, CoursePlan, User, UserField};
use coursegen_db::queries::{courses, leases, plans, users};

use super::DocumentStore;

/// [`DocumentStore`] over the coursegen PostgreSQL schema.
#[derive(Debug, Clone)]
pub struct PgDocumentStore {
    pool: PgPool,
}

impl PgDocumentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn get_plan(&self, plan_id: &str) -> Result<Option<CoursePlan>> {
        plans::get_plan(&self.pool, plan_id).await
    }

    async fn get_course(&self, course_id: &str) -> Result<Option<Course>> {
        courses::get_course(&self.pool, course_id).await
    }

    async fn find_user_by_field(&self, field: UserField, value: &str) -> Result<Option<User>> {
        users::find_user_by_field(&self.pool, field, value).await
    }

    async fn commit_generated_plan(
        &self,
        plan_id: &str,
        expected_revision: i64,
        generated_json: &str,
        transcript: Option<&str>,
    ) -> Result<Option<CoursePlan>> {
        plans::commit_generated_plan(
            &self.pool,
            plan_id,
            expected_revision,
            generated_json,
            transcript,
        )
        .await
    }

    async fn try_acquire_lease(&self, plan_id: &str, token: Uuid, ttl: Duration) -> Result<bool> {
        Ok(leases::try_acquire_lease(&self.pool, plan_id, token, ttl)
            .await?
            .is_some())
    }

    async fn release_lease(&self, plan_id: &str, token: Uuid) -> Result<bool> {
        leases::release_lease(&self.pool, plan_id, token).await
    }
}
