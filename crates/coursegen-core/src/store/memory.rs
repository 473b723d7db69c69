//! In-process [`DocumentStore`].
//!
//! Holds everything in one mutex-guarded map set. Counts writes so tests
//! can assert that failed runs left the store untouched, and exposes a few
//! hooks to simulate outages and concurrent writers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use coursegen_db::models::{Course, CoursePlan, User, UserField, new_record_id};

use super::DocumentStore;

#[derive(Debug, Default)]
struct State {
    users: HashMap<String, User>,
    courses: HashMap<String, Course>,
    plans: HashMap<String, CoursePlan>,
    leases: HashMap<String, (Uuid, Instant)>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    commits: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    // -- seeding ----------------------------------------------------------

    pub fn add_user(&self, uid: &str, email: Option<&str>) -> Result<User> {
        let user = User {
            id: new_record_id(),
            uid: uid.to_string(),
            email: email.map(str::to_owned),
            display_name: None,
            created_at: Utc::now(),
        };
        self.state()?.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    pub fn add_course(&self, creator_uid: &str, title: &str) -> Result<Course> {
        let course = Course {
            id: new_record_id(),
            creator_id: creator_uid.to_string(),
            title: title.to_string(),
            created_at: Utc::now(),
        };
        self.state()?
            .courses
            .insert(course.id.clone(), course.clone());
        Ok(course)
    }

    pub fn add_plan(&self, course_id: &str, direction: Option<&str>) -> Result<CoursePlan> {
        let plan = CoursePlan {
            id: new_record_id(),
            course_id: course_id.to_string(),
            direction: direction.map(str::to_owned),
            generated_json: None,
            transcript: None,
            last_generated_at: None,
            revision: 0,
            created_at: Utc::now(),
        };
        self.state()?.plans.insert(plan.id.clone(), plan.clone());
        Ok(plan)
    }

    // -- inspection -------------------------------------------------------

    /// Current snapshot of a plan record.
    pub fn plan(&self, plan_id: &str) -> Option<CoursePlan> {
        self.state().ok()?.plans.get(plan_id).cloned()
    }

    /// Number of successful plan commits.
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn lease_holder(&self, plan_id: &str) -> Option<Uuid> {
        self.state().ok()?.leases.get(plan_id).map(|(t, _)| *t)
    }

    // -- fault injection --------------------------------------------------

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Bump a plan's revision as if another writer had committed.
    pub fn bump_revision(&self, plan_id: &str) -> Result<i64> {
        let mut state = self.state()?;
        let plan = state
            .plans
            .get_mut(plan_id)
            .ok_or_else(|| anyhow!("course plan {plan_id} not found"))?;
        plan.revision += 1;
        Ok(plan.revision)
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("memory store: simulated read failure");
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_plan(&self, plan_id: &str) -> Result<Option<CoursePlan>> {
        self.check_reads()?;
        Ok(self.state()?.plans.get(plan_id).cloned())
    }

    async fn get_course(&self, course_id: &str) -> Result<Option<Course>> {
        self.check_reads()?;
        Ok(self.state()?.courses.get(course_id).cloned())
    }

    async fn find_user_by_field(&self, field: UserField, value: &str) -> Result<Option<User>> {
        self.check_reads()?;
        let state = self.state()?;
        Ok(state
            .users
            .values()
            .find(|u| match field {
                UserField::Uid => u.uid == value,
                UserField::Email => u.email.as_deref() == Some(value),
            })
            .cloned())
    }

    async fn commit_generated_plan(
        &self,
        plan_id: &str,
        expected_revision: i64,
        generated_json: &str,
        transcript: Option<&str>,
    ) -> Result<Option<CoursePlan>> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("memory store: simulated write failure");
        }
        let mut state = self.state()?;
        let Some(plan) = state.plans.get_mut(plan_id) else {
            return Ok(None);
        };
        if plan.revision != expected_revision {
            return Ok(None);
        }
        plan.generated_json = Some(generated_json.to_string());
        plan.transcript = transcript.map(str::to_owned);
        plan.last_generated_at = Some(Utc::now());
        plan.revision += 1;
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(Some(plan.clone()))
    }

    async fn try_acquire_lease(&self, plan_id: &str, token: Uuid, ttl: Duration) -> Result<bool> {
        let mut state = self.state()?;
        if let Some((_, acquired)) = state.leases.get(plan_id)
            && acquired.elapsed() <= ttl
        {
            return Ok(false);
        }
        state
            .leases
            .insert(plan_id.to_string(), (token, Instant::now()));
        Ok(true)
    }

    async fn release_lease(&self, plan_id: &str, token: Uuid) -> Result<bool> {
        let mut state = self.state()?;
        match state.leases.get(plan_id) {
            Some((held, _)) if *held == token => {
                state.leases.remove(plan_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
