//! Generation entry point.
//!
//! Authorizes the caller, claims the plan's generation lease, then runs
//! chain -> extract -> commit under a wall-clock timeout. The lease is
//! released whatever the outcome, including cancellation.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::access::{AuthorizedPlan, CallerIdentity, GenerationRequest, authorize_request};
use crate::chain::{StageChain, StageSpec};
use crate::curriculum::{CurriculumPlan, extract};
use crate::error::GenerationError;
use crate::llm::CompletionClient;
use crate::persist::PlanPersister;
use crate::store::DocumentStore;

/// Tunables for [`CoursePlanGenerator`].
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorSettings {
    /// Upper bound on chain + extract + commit.
    pub timeout: Duration,
    /// Age after which an unreleased lease may be taken over.
    pub lease_ttl: Duration,
    pub retain_transcript: bool,
}

impl GeneratorSettings {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(540);

    /// Settings with the given timeout and a lease TTL one minute longer.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            lease_ttl: timeout + Duration::from_secs(60),
            retain_transcript: true,
        }
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self::with_timeout(Self::DEFAULT_TIMEOUT)
    }
}

/// What a successful generation produced.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub plan_id: String,
    /// Revision of the record after the commit.
    pub revision: i64,
    pub plan: CurriculumPlan,
    pub stage_count: usize,
}

/// Runs the full course-plan pipeline for one request at a time.
///
/// Cheap to clone; every field is shared.
#[derive(Clone)]
pub struct CoursePlanGenerator {
    store: Arc<dyn DocumentStore>,
    chain: StageChain,
    stages: Arc<[StageSpec]>,
    persister: PlanPersister,
    settings: GeneratorSettings,
}

impl CoursePlanGenerator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        client: Arc<dyn CompletionClient>,
        stages: Vec<StageSpec>,
        settings: GeneratorSettings,
    ) -> Self {
        Self {
            persister: PlanPersister::new(store.clone(), settings.retain_transcript),
            store,
            chain: StageChain::new(client),
            stages: stages.into(),
            settings,
        }
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// Handle one invocation: `body` is `{"coursePlanId": "..."}`.
    ///
    /// Ownership is checked twice: once to decide whether the caller may take
    /// the lease at all, and again under the lease so the run starts from the
    /// latest revision and direction. Dropping the returned future releases
    /// the lease.
    pub async fn generate(
        &self,
        caller: Option<&CallerIdentity>,
        body: &Value,
    ) -> Result<GenerationOutcome, GenerationError> {
        let request = GenerationRequest::from_body(caller, body)?;
        let first_read = authorize_request(self.store.as_ref(), &request).await?;
        let plan_id = first_read.plan.id.clone();

        let Some(lease) = LeaseGuard::acquire(&self.store, &plan_id, self.settings.lease_ttl).await?
        else {
            warn!(plan_id = %plan_id, "generation already in progress");
            return Err(GenerationError::AlreadyInProgress { plan_id });
        };

        let result = match authorize_request(self.store.as_ref(), &request).await {
            Ok(authorized) => {
                if authorized.plan.revision != first_read.plan.revision {
                    info!(
                        plan_id = %plan_id,
                        from = first_read.plan.revision,
                        to = authorized.plan.revision,
                        "plan changed before lease was taken; using latest revision"
                    );
                }
                info!(
                    plan_id = %plan_id,
                    revision = authorized.plan.revision,
                    stages = self.stages.len(),
                    "generation started"
                );
                match tokio::time::timeout(self.settings.timeout, self.run(&authorized)).await {
                    Ok(result) => result,
                    Err(_) => Err(GenerationError::Timeout(self.settings.timeout)),
                }
            }
            Err(e) => Err(e),
        };

        lease.release().await;

        match &result {
            Ok(outcome) => info!(plan_id = %plan_id, revision = outcome.revision, "generation finished"),
            Err(e) => warn!(plan_id = %plan_id, kind = e.kind(), error = %e, "generation failed"),
        }
        result
    }

    /// Convenience for callers that already hold a plan id.
    pub async fn generate_plan(
        &self,
        caller: &CallerIdentity,
        plan_id: &str,
    ) -> Result<GenerationOutcome, GenerationError> {
        let body = serde_json::json!({ "coursePlanId": plan_id });
        self.generate(Some(caller), &body).await
    }

    async fn run(&self, authorized: &AuthorizedPlan) -> Result<GenerationOutcome, GenerationError> {
        let outcome = self
            .chain
            .run(authorized.direction(), &self.stages)
            .await?;
        let plan = extract(outcome.final_output())?;
        let transcript = outcome.transcript();
        let revision = self
            .persister
            .commit(
                &authorized.plan.id,
                authorized.plan.revision,
                &plan,
                Some(&transcript),
            )
            .await?;

        Ok(GenerationOutcome {
            plan_id: authorized.plan.id.clone(),
            revision,
            plan,
            stage_count: outcome.outputs.len(),
        })
    }
}

/// A held generation lease.
///
/// [`LeaseGuard::release`] gives it back in line. If the owning future is
/// dropped first, `Drop` hands the release to the runtime instead.
struct LeaseGuard {
    store: Arc<dyn DocumentStore>,
    plan_id: String,
    token: Uuid,
    armed: bool,
}

impl LeaseGuard {
    async fn acquire(
        store: &Arc<dyn DocumentStore>,
        plan_id: &str,
        ttl: Duration,
    ) -> Result<Option<Self>, GenerationError> {
        let token = Uuid::new_v4();
        let acquired = store
            .try_acquire_lease(plan_id, token, ttl)
            .await
            .map_err(GenerationError::StoreUnavailable)?;
        Ok(acquired.then(|| Self {
            store: store.clone(),
            plan_id: plan_id.to_string(),
            token,
            armed: true,
        }))
    }

    async fn release(mut self) {
        self.armed = false;
        release_lease(self.store.as_ref(), &self.plan_id, self.token).await;
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!(plan_id = %self.plan_id, "no runtime to release generation lease; it will expire");
            return;
        };
        warn!(plan_id = %self.plan_id, "generation cancelled; releasing lease");
        let store = self.store.clone();
        let plan_id = std::mem::take(&mut self.plan_id);
        let token = self.token;
        runtime.spawn(async move { release_lease(store.as_ref(), &plan_id, token).await });
    }
}

async fn release_lease(store: &dyn DocumentStore, plan_id: &str, token: Uuid) {
    match store.release_lease(plan_id, token).await {
        Ok(true) => {}
        Ok(false) => warn!(plan_id = %plan_id, "generation lease was taken over before release"),
        Err(e) => error!(plan_id = %plan_id, error = %e, "failed to release generation lease"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings() {
        let settings = GeneratorSettings::default();
        assert_eq!(settings.timeout, Duration::from_secs(540));
        assert_eq!(settings.lease_ttl, Duration::from_secs(600));
        assert!(settings.retain_transcript);
    }
}
