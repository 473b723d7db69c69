//! Document store seam.
//!
//! The pipeline reads plans, courses and users and performs exactly one
//! write per successful run. [`postgres::PgDocumentStore`] is the production
//! backend; [`memory::MemoryStore`] backs tests and dry runs.

pub mod memory;
pub mod postgres;

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use coursegen_db::models::{Course, CoursePlan, User, UserField};

pub use memory::MemoryStore;
pub use postgres::PgDocumentStore;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_plan(&self, plan_id: &str) -> Result<Option<CoursePlan>>;

    async fn get_course(&self, course_id: &str) -> Result<Option<Course>>;

    async fn find_user_by_field(&self, field: UserField, value: &str) -> Result<Option<User>>;

    /// Write the generated plan if the record is still at `expected_revision`.
    ///
    /// Returns the updated record, or `None` when the revision moved on (or
    /// the record vanished). All columns change together or not at all.
    async fn commit_generated_plan(
        &self,
        plan_id: &str,
        expected_revision: i64,
        generated_json: &str,
        transcript: Option<&str>,
    ) -> Result<Option<CoursePlan>>;

    /// Claim the generation lease for a plan. A lease older than `ttl` is
    /// considered abandoned and may be taken over.
    async fn try_acquire_lease(&self, plan_id: &str, token: Uuid, ttl: Duration) -> Result<bool>;

    /// Release a lease held under `token`. Returns `false` if it was not held.
    async fn release_lease(&self, plan_id: &str, token: Uuid) -> Result<bool>;
}

// Compile-time assertion: DocumentStore must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn DocumentStore) {}
};
