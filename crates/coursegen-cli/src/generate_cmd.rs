//! `coursegen generate <plan-id> --as <uid>`: run the pipeline locally.

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::PgPool;

use coursegen_core::access::CallerIdentity;
use coursegen_core::chain::PipelineKind;
use coursegen_core::llm::OpenAiClient;
use coursegen_core::service::CoursePlanGenerator;
use coursegen_core::store::PgDocumentStore;

use crate::config::CoursegenConfig;
use crate::plan_cmds::print_curriculum;

pub async fn run_generate(
    config: &CoursegenConfig,
    pool: PgPool,
    plan_id: &str,
    as_uid: &str,
    pipeline: Option<PipelineKind>,
) -> Result<()> {
    let pipeline = pipeline.unwrap_or(config.pipeline.kind);
    let client = OpenAiClient::from_config(&config.llm).context("cannot build LLM client")?;
    let generator = CoursePlanGenerator::new(
        Arc::new(PgDocumentStore::new(pool)),
        Arc::new(client),
        pipeline.stages(),
        config.pipeline.generator_settings(),
    );

    println!("Generating plan {plan_id} with the {pipeline} pipeline...");
    let outcome = generator
        .generate_plan(&CallerIdentity::new(as_uid), plan_id)
        .await
        .with_context(|| format!("generation failed for plan {plan_id}"))?;

    println!(
        "Committed revision {} ({} stages, {} levels, {} lessons).",
        outcome.revision,
        outcome.stage_count,
        outcome.plan.levels.len(),
        outcome.plan.lesson_count()
    );
    print_curriculum(&outcome.plan);
    Ok(())
}
