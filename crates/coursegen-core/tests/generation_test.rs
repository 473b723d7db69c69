//! End-to-end generation runs against the in-memory store and a scripted
//! completion client, plus one run against PostgreSQL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

use coursegen_core::GenerationError;
use coursegen_core::access::CallerIdentity;
use coursegen_core::chain::{PipelineKind, StageSpec};
use coursegen_core::curriculum::CurriculumPlan;
use coursegen_core::llm::scripted::{ScriptedClient, ScriptedReply};
use coursegen_core::service::{CoursePlanGenerator, GeneratorSettings};
use coursegen_core::store::{DocumentStore, MemoryStore, PgDocumentStore};
use coursegen_db::models::{Course, CoursePlan, User, UserField};
use coursegen_db::queries::plans;
use coursegen_test_utils::TestDb;

const OWNER: &str = "uid-owner";

fn lesson(title: &str, requirements: usize) -> Value {
    json!({
        "title": title,
        "synopsis": format!("{title} in fifteen minutes"),
        "instructions": "- demonstrate\n- let them try\n- correct grip\nCommon mistakes: tension too tight",
        "graduationRequirements": (1..=requirements).map(|i| format!("shows step {i}")).collect::<Vec<_>>(),
    })
}

/// Two levels of three lessons each.
fn valid_plan_json() -> String {
    json!({
        "levels": [
            {
                "title": "Foundations",
                "description": "Casting on and the knit stitch",
                "lessons": [lesson("Cast on", 2), lesson("Knit stitch", 3), lesson("Bind off", 2)],
            },
            {
                "title": "Patterns",
                "description": "Combining stitches",
                "lessons": [lesson("Purl", 2), lesson("Ribbing", 4), lesson("Garter", 2)],
            }
        ]
    })
    .to_string()
}

struct Fixture {
    store: Arc<MemoryStore>,
    client: Arc<ScriptedClient>,
    plan_id: String,
}

impl Fixture {
    fn new<R: Into<ScriptedReply>>(replies: Vec<R>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let course = store.add_course(OWNER, "Knitting 101").unwrap();
        let plan = store
            .add_plan(&course.id, Some("intro to knitting"))
            .unwrap();
        Self {
            store,
            client: Arc::new(ScriptedClient::new(replies)),
            plan_id: plan.id,
        }
    }

    fn generator(&self, stages: Vec<StageSpec>, settings: GeneratorSettings) -> CoursePlanGenerator {
        CoursePlanGenerator::new(self.store.clone(), self.client.clone(), stages, settings)
    }

    fn single_stage(&self) -> CoursePlanGenerator {
        self.generator(PipelineKind::Single.stages(), GeneratorSettings::default())
    }

    fn body(&self) -> Value {
        json!({ "coursePlanId": self.plan_id })
    }
}

fn owner() -> CallerIdentity {
    CallerIdentity::new(OWNER)
}

#[tokio::test]
async fn single_stage_run_commits_plan() {
    let fx = Fixture::new(vec![valid_plan_json()]);

    let outcome = fx
        .single_stage()
        .generate(Some(&owner()), &fx.body())
        .await
        .unwrap();

    assert_eq!(outcome.plan.levels.len(), 2);
    assert_eq!(outcome.plan.lesson_count(), 6);
    assert_eq!(outcome.revision, 1);
    assert_eq!(outcome.stage_count, 1);
    assert_eq!(fx.store.commit_count(), 1);
    assert_eq!(fx.client.call_count(), 1);

    let record = fx.store.plan(&fx.plan_id).unwrap();
    let stored: CurriculumPlan =
        serde_json::from_str(record.generated_json.as_deref().unwrap()).unwrap();
    assert_eq!(stored, outcome.plan);
    assert!(record.last_generated_at.is_some());
    assert!(fx.store.lease_holder(&fx.plan_id).is_none());

    let request = &fx.client.requests()[0];
    assert!(
        request.context.messages()[1]
            .content
            .contains("Course direction: intro to knitting")
    );
}

#[tokio::test]
async fn staged_run_threads_context_and_keeps_transcript() {
    let fx = Fixture::new(vec![
        "inventory text".to_string(),
        "goals text".to_string(),
        "curriculum text".to_string(),
        format!("```json\n{}\n```", valid_plan_json()),
    ]);

    let outcome = fx
        .generator(PipelineKind::Staged.stages(), GeneratorSettings::default())
        .generate(Some(&owner()), &fx.body())
        .await
        .unwrap();
    assert_eq!(outcome.stage_count, 4);

    let requests = fx.client.requests();
    assert_eq!(requests.len(), 4);
    for pair in requests.windows(2) {
        assert!(pair[1].context.len() > pair[0].context.len());
    }
    let last = requests[3].context.messages();
    assert!(last.iter().any(|m| m.content == "curriculum text"));

    let record = fx.store.plan(&fx.plan_id).unwrap();
    let transcript = record.transcript.unwrap();
    let parts: Vec<&str> = transcript.split("\n\n---\n\n").collect();
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[0], "inventory text");
    assert_eq!(parts[2], "curriculum text");
}

#[tokio::test]
async fn non_owner_is_forbidden_before_any_llm_call() {
    let fx = Fixture::new(vec![valid_plan_json()]);
    let intruder = CallerIdentity::new("uid-intruder");

    let err = fx
        .single_stage()
        .generate(Some(&intruder), &fx.body())
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::Forbidden(_)));
    assert_eq!(fx.client.call_count(), 0);
    assert_eq!(fx.store.commit_count(), 0);
    assert!(fx.store.lease_holder(&fx.plan_id).is_none());
}

#[tokio::test]
async fn missing_caller_is_unauthenticated() {
    let fx = Fixture::new(vec![valid_plan_json()]);
    let err = fx.single_stage().generate(None, &fx.body()).await.unwrap_err();
    assert_eq!(err.kind(), "unauthenticated");
    assert_eq!(fx.client.call_count(), 0);
}

#[tokio::test]
async fn malformed_output_leaves_record_unchanged() {
    let fx = Fixture::new(vec!["not json"]);
    let before = fx.store.plan(&fx.plan_id).unwrap();

    let err = fx
        .single_stage()
        .generate(Some(&owner()), &fx.body())
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::MalformedOutput(_)));
    assert!(!err.is_retryable());
    assert_eq!(fx.store.plan(&fx.plan_id).unwrap(), before);
    assert_eq!(fx.store.commit_count(), 0);
    assert!(fx.store.lease_holder(&fx.plan_id).is_none());
}

#[tokio::test]
async fn short_requirement_list_names_the_lesson() {
    let doc = json!({
        "levels": [{
            "title": "Foundations",
            "description": "Basics",
            "lessons": [lesson("Cast on", 2), lesson("Knit stitch", 1)],
        }]
    });
    let fx = Fixture::new(vec![doc.to_string()]);

    let err = fx
        .single_stage()
        .generate(Some(&owner()), &fx.body())
        .await
        .unwrap_err();

    match err {
        GenerationError::SchemaViolation { path, .. } => {
            assert_eq!(path, "levels[0].lessons[1].graduationRequirements");
        }
        other => panic!("expected schema violation, got {other:?}"),
    }
    assert_eq!(fx.store.commit_count(), 0);
}

#[tokio::test]
async fn empty_stage_output_stops_before_commit() {
    let fx = Fixture::new(vec!["inventory text", ""]);

    let err = fx
        .generator(PipelineKind::Staged.stages(), GeneratorSettings::default())
        .generate(Some(&owner()), &fx.body())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GenerationError::LlmEmptyResponse { stage: 1, ref name } if name == "goals"
    ));
    assert_eq!(fx.client.call_count(), 2);
    assert_eq!(fx.store.commit_count(), 0);
}

#[tokio::test]
async fn upstream_failure_is_surfaced_without_retry() {
    let fx = Fixture::new(vec![
        ScriptedReply::Status {
            status: 503,
            message: "overloaded".into(),
        },
        ScriptedReply::Text(valid_plan_json()),
    ]);

    let err = fx
        .single_stage()
        .generate(Some(&owner()), &fx.body())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), "upstream_unavailable");
    assert!(err.is_retryable());
    assert_eq!(fx.client.call_count(), 1);
    assert!(fx.store.lease_holder(&fx.plan_id).is_none());
}

#[tokio::test]
async fn held_lease_rejects_without_llm_calls() {
    let fx = Fixture::new(vec![valid_plan_json()]);
    let other = Uuid::new_v4();
    assert!(
        fx.store
            .try_acquire_lease(&fx.plan_id, other, Duration::from_secs(600))
            .await
            .unwrap()
    );

    let err = fx
        .single_stage()
        .generate(Some(&owner()), &fx.body())
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::AlreadyInProgress { .. }));
    assert_eq!(fx.client.call_count(), 0);
    assert_eq!(fx.store.lease_holder(&fx.plan_id), Some(other));
}

#[tokio::test]
async fn concurrent_invocations_run_once() {
    let fx = Fixture::new(vec![ScriptedReply::Delayed(
        Duration::from_millis(100),
        valid_plan_json(),
    )]);
    let generator = fx.single_stage();
    let caller = owner();
    let body = fx.body();

    let (first, second) = futures::join!(
        generator.generate(Some(&caller), &body),
        generator.generate(Some(&caller), &body),
    );

    let results = [first, second];
    let committed = results.iter().filter(|r| r.is_ok()).count();
    let busy = results
        .iter()
        .filter(|r| matches!(r, Err(GenerationError::AlreadyInProgress { .. })))
        .count();
    assert_eq!((committed, busy), (1, 1));
    assert_eq!(fx.client.call_count(), 1);
    assert_eq!(fx.store.commit_count(), 1);
}

#[tokio::test]
async fn concurrent_commit_causes_conflict() {
    let fx = Fixture::new(vec!["first draft", &valid_plan_json()]);
    let store = fx.store.clone();
    let plan_id = fx.plan_id.clone();

    // The second stage's prompt builder simulates another writer committing
    // while this run is in flight.
    let stages = vec![
        StageSpec::template("draft", "You draft.", "Course direction: ${direction}", 0.7),
        StageSpec::custom("json", "You convert to JSON.", 0.7, move |_| {
            store.bump_revision(&plan_id).unwrap();
            "Now return JSON.".to_string()
        }),
    ];

    let err = fx
        .generator(stages, GeneratorSettings::default())
        .generate(Some(&owner()), &fx.body())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GenerationError::Conflict {
            expected_revision: 0,
            ..
        }
    ));
    let record = fx.store.plan(&fx.plan_id).unwrap();
    assert!(record.generated_json.is_none());
    assert_eq!(record.revision, 1);
}

#[tokio::test]
async fn timeout_leaves_record_unchanged_and_releases_lease() {
    let fx = Fixture::new(vec![ScriptedReply::Delayed(
        Duration::from_secs(5),
        valid_plan_json(),
    )]);
    let before = fx.store.plan(&fx.plan_id).unwrap();
    let generator = fx.generator(
        PipelineKind::Single.stages(),
        GeneratorSettings::with_timeout(Duration::from_millis(50)),
    );

    let err = generator
        .generate(Some(&owner()), &fx.body())
        .await
        .unwrap_err();

    assert!(matches!(err, GenerationError::Timeout(_)));
    assert_eq!(fx.store.plan(&fx.plan_id).unwrap(), before);
    assert!(fx.store.lease_holder(&fx.plan_id).is_none());
}

#[tokio::test]
async fn cancelled_generation_releases_lease() {
    let fx = Fixture::new(vec![
        ScriptedReply::Delayed(Duration::from_secs(5), valid_plan_json()),
        ScriptedReply::from(valid_plan_json()),
    ]);
    let generator = fx.single_stage();

    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), generator.generate(Some(&owner()), &fx.body()))
            .await;
    assert!(abandoned.is_err());

    // The release runs on its own task once the future is gone.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(fx.store.lease_holder(&fx.plan_id).is_none());

    let outcome = generator
        .generate(Some(&owner()), &fx.body())
        .await
        .unwrap();
    assert_eq!(outcome.revision, 1);
    assert_eq!(fx.client.call_count(), 2);
}

/// Store whose lease acquisition coincides with another writer's commit.
struct CommitLandsBeforeLease {
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl DocumentStore for CommitLandsBeforeLease {
    async fn get_plan(&self, plan_id: &str) -> anyhow::Result<Option<CoursePlan>> {
        self.inner.get_plan(plan_id).await
    }

    async fn get_course(&self, course_id: &str) -> anyhow::Result<Option<Course>> {
        self.inner.get_course(course_id).await
    }

    async fn find_user_by_field(
        &self,
        field: UserField,
        value: &str,
    ) -> anyhow::Result<Option<User>> {
        self.inner.find_user_by_field(field, value).await
    }

    async fn commit_generated_plan(
        &self,
        plan_id: &str,
        expected_revision: i64,
        generated_json: &str,
        transcript: Option<&str>,
    ) -> anyhow::Result<Option<CoursePlan>> {
        self.inner
            .commit_generated_plan(plan_id, expected_revision, generated_json, transcript)
            .await
    }

    async fn try_acquire_lease(
        &self,
        plan_id: &str,
        token: Uuid,
        ttl: Duration,
    ) -> anyhow::Result<bool> {
        self.inner.bump_revision(plan_id)?;
        self.inner.try_acquire_lease(plan_id, token, ttl).await
    }

    async fn release_lease(&self, plan_id: &str, token: Uuid) -> anyhow::Result<bool> {
        self.inner.release_lease(plan_id, token).await
    }
}

#[tokio::test]
async fn run_starts_from_revision_read_under_lease() {
    let fx = Fixture::new(vec![valid_plan_json()]);
    let store = Arc::new(CommitLandsBeforeLease {
        inner: fx.store.clone(),
    });
    let generator = CoursePlanGenerator::new(
        store,
        fx.client.clone(),
        PipelineKind::Single.stages(),
        GeneratorSettings::default(),
    );

    let outcome = generator
        .generate(Some(&owner()), &fx.body())
        .await
        .unwrap();

    assert_eq!(outcome.revision, 2);
    assert_eq!(fx.client.call_count(), 1);
    assert_eq!(fx.store.commit_count(), 1);
}

#[tokio::test]
async fn regeneration_bumps_revision_again() {
    let fx = Fixture::new(vec![valid_plan_json(), valid_plan_json()]);
    let generator = fx.single_stage();

    let first = generator.generate_plan(&owner(), &fx.plan_id).await.unwrap();
    let second = generator.generate_plan(&owner(), &fx.plan_id).await.unwrap();
    assert_eq!((first.revision, second.revision), (1, 2));
}

#[tokio::test]
async fn postgres_backed_generation() {
    let db = TestDb::create().await;
    let pool = db.pool.clone();
    let (_, plan) = db.seed_plan(OWNER, Some("intro to knitting")).await;

    let store = Arc::new(PgDocumentStore::new(pool.clone()));
    let client = Arc::new(ScriptedClient::new([valid_plan_json()]));
    let generator = CoursePlanGenerator::new(
        store,
        client.clone(),
        PipelineKind::Single.stages(),
        GeneratorSettings::default(),
    );

    let outcome = generator.generate_plan(&owner(), &plan.id).await.unwrap();
    assert_eq!(outcome.revision, 1);

    let record = plans::get_plan(&pool, &plan.id).await.unwrap().unwrap();
    assert_eq!(record.revision, 1);
    let stored: CurriculumPlan =
        serde_json::from_str(record.generated_json.as_deref().unwrap()).unwrap();
    assert_eq!(stored.levels.len(), 2);
    assert_eq!(record.transcript.as_deref(), Some(valid_plan_json().as_str()));

    let intruder = CallerIdentity::new("uid-intruder");
    let err = generator
        .generate_plan(&intruder, &plan.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "forbidden");
    assert_eq!(client.call_count(), 1);

    db.teardown().await;
}
