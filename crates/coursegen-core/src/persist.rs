//! Writes a generated curriculum back to its plan record.

use std::sync::Arc;

use tracing::{info, warn};

use crate::curriculum::CurriculumPlan;
use crate::error::GenerationError;
use crate::store::DocumentStore;

/// Commits generated plans with a single revision-guarded write.
#[derive(Clone)]
pub struct PlanPersister {
    store: Arc<dyn DocumentStore>,
    retain_transcript: bool,
}

impl PlanPersister {
    pub fn new(store: Arc<dyn DocumentStore>, retain_transcript: bool) -> Self {
        Self {
            store,
            retain_transcript,
        }
    }

    /// Store `plan` (and the stage transcript, when retained) on the record,
    /// stamp the generation time and bump the revision.
    ///
    /// Fails with `Conflict` if the record is no longer at
    /// `expected_revision`. With retention off the stored transcript is
    /// cleared so it never describes an older plan.
    pub async fn commit(
        &self,
        plan_id: &str,
        expected_revision: i64,
        plan: &CurriculumPlan,
        transcript: Option<&str>,
    ) -> Result<i64, GenerationError> {
        let generated_json = plan.to_json_string().map_err(|e| {
            GenerationError::Persistence(anyhow::Error::new(e).context("failed to encode plan"))
        })?;
        let transcript = transcript.filter(|_| self.retain_transcript);

        let updated = self
            .store
            .commit_generated_plan(plan_id, expected_revision, &generated_json, transcript)
            .await
            .map_err(GenerationError::Persistence)?;

        match updated {
            Some(record) => {
                info!(
                    plan_id,
                    revision = record.revision,
                    levels = plan.levels.len(),
                    lessons = plan.lesson_count(),
                    "generated plan committed"
                );
                Ok(record.revision)
            }
            None => {
                warn!(plan_id, expected_revision, "plan changed during generation");
                Err(GenerationError::Conflict {
                    plan_id: plan_id.to_string(),
                    expected_revision,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curriculum::{Lesson, Level};
    use crate::store::MemoryStore;

    fn sample_plan() -> CurriculumPlan {
        CurriculumPlan {
            levels: vec![Level {
                title: "Basics".into(),
                description: "Start".into(),
                lessons: vec![Lesson {
                    title: "Cast on".into(),
                    synopsis: "First row".into(),
                    instructions: "- loop".into(),
                    graduation_requirements: vec!["a".into(), "b".into()],
                }],
            }],
        }
    }

    fn seeded() -> (Arc<MemoryStore>, String) {
        let store = Arc::new(MemoryStore::new());
        let course = store.add_course("uid-1", "Knitting").unwrap();
        let plan = store.add_plan(&course.id, Some("knit")).unwrap();
        (store, plan.id)
    }

    #[tokio::test]
    async fn commit_writes_all_fields() {
        let (store, plan_id) = seeded();
        let persister = PlanPersister::new(store.clone(), true);

        let revision = persister
            .commit(&plan_id, 0, &sample_plan(), Some("one\n\n---\n\ntwo"))
            .await
            .unwrap();
        assert_eq!(revision, 1);

        let record = store.plan(&plan_id).unwrap();
        let stored: CurriculumPlan =
            serde_json::from_str(record.generated_json.as_deref().unwrap()).unwrap();
        assert_eq!(stored, sample_plan());
        assert_eq!(record.transcript.as_deref(), Some("one\n\n---\n\ntwo"));
        assert!(record.last_generated_at.is_some());
    }

    #[tokio::test]
    async fn transcript_dropped_when_not_retained() {
        let (store, plan_id) = seeded();
        let persister = PlanPersister::new(store.clone(), false);
        persister
            .commit(&plan_id, 0, &sample_plan(), Some("stage text"))
            .await
            .unwrap();
        assert!(store.plan(&plan_id).unwrap().transcript.is_none());
    }

    #[tokio::test]
    async fn stale_revision_conflicts() {
        let (store, plan_id) = seeded();
        store.bump_revision(&plan_id).unwrap();
        let persister = PlanPersister::new(store.clone(), true);

        let err = persister
            .commit(&plan_id, 0, &sample_plan(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "conflict");
        assert!(store.plan(&plan_id).unwrap().generated_json.is_none());
    }

    #[tokio::test]
    async fn store_failure_is_persistence_error() {
        let (store, plan_id) = seeded();
        store.set_fail_writes(true);
        let persister = PlanPersister::new(store.clone(), true);

        let err = persister
            .commit(&plan_id, 0, &sample_plan(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "persistence_error");
        assert_eq!(store.commit_count(), 0);
    }
}
