//! Handlers for `coursegen plan` subcommands.
//!
//! - `coursegen plan add <course-id> --direction <text>`
//! - `coursegen plan set-direction <plan-id> <text>`
//! - `coursegen plan show <plan-id> [--transcript]`
//! - `coursegen plan list <course-id>`

use anyhow::{Context, Result};
use sqlx::PgPool;

use coursegen_core::curriculum::CurriculumPlan;
use coursegen_db::models::{CoursePlan, TRANSCRIPT_SEPARATOR};
use coursegen_db::queries::{courses as course_queries, plans as plan_queries};

use crate::PlanCommands;

pub async fn run_plan_command(command: PlanCommands, pool: &PgPool) -> Result<()> {
    match command {
        PlanCommands::Add {
            course_id,
            direction,
        } => cmd_add(pool, &course_id, direction.as_deref()).await,
        PlanCommands::SetDirection { plan_id, direction } => {
            plan_queries::update_direction(pool, &plan_id, &direction).await?;
            println!("Direction updated for plan {plan_id}.");
            Ok(())
        }
        PlanCommands::Show {
            plan_id,
            transcript,
        } => cmd_show(pool, &plan_id, transcript).await,
        PlanCommands::List { course_id } => {
            let plans = plan_queries::list_plans_for_course(pool, &course_id).await?;
            if plans.is_empty() {
                println!("No plans for course {course_id}.");
            }
            for plan in plans {
                println!(
                    "{}  rev {:<3} {}",
                    plan.id,
                    plan.revision,
                    if plan.generated_json.is_some() { "generated" } else { "pending" }
                );
            }
            Ok(())
        }
    }
}

// -----------------------------------------------------------------------
// coursegen plan add
// -----------------------------------------------------------------------

async fn cmd_add(pool: &PgPool, course_id: &str, direction: Option<&str>) -> Result<()> {
    course_queries::get_course(pool, course_id)
        .await?
        .with_context(|| format!("course {course_id} not found"))?;

    let plan = plan_queries::insert_plan(pool, course_id, direction).await?;
    println!("Created course plan {}", plan.id);
    if plan.direction.is_none() {
        println!("  (no direction yet; set one with `coursegen plan set-direction`)");
    }
    Ok(())
}

// -----------------------------------------------------------------------
// coursegen plan show
// -----------------------------------------------------------------------

async fn cmd_show(pool: &PgPool, plan_id: &str, with_transcript: bool) -> Result<()> {
    let plan = plan_queries::get_plan(pool, plan_id)
        .await?
        .with_context(|| format!("course plan {plan_id} not found"))?;

    print_plan_header(&plan);

    match plan.generated_json.as_deref() {
        None => println!("\nNot generated yet."),
        Some(json) => {
            let curriculum: CurriculumPlan =
                serde_json::from_str(json).context("stored plan is not a valid curriculum")?;
            print_curriculum(&curriculum);
        }
    }

    if with_transcript {
        match plan.transcript.as_deref() {
            Some(transcript) => {
                for (i, part) in transcript.split(TRANSCRIPT_SEPARATOR).enumerate() {
                    println!("\n=== stage {i} ===\n{part}");
                }
            }
            None => println!("\nNo transcript stored."),
        }
    }
    Ok(())
}

fn print_plan_header(plan: &CoursePlan) {
    println!("Course plan:  {}", plan.id);
    println!("  course:     {}", plan.course_id);
    println!("  direction:  {}", plan.direction.as_deref().unwrap_or("-"));
    println!("  revision:   {}", plan.revision);
    if let Some(at) = plan.last_generated_at {
        println!("  generated:  {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
}

pub fn print_curriculum(plan: &CurriculumPlan) {
    for (i, level) in plan.levels.iter().enumerate() {
        println!("\nLevel {}: {}", i + 1, level.title);
        println!("  {}", level.description);
        for (j, lesson) in level.lessons.iter().enumerate() {
            println!("  {}.{} {} - {}", i + 1, j + 1, lesson.title, lesson.synopsis);
            for req in &lesson.graduation_requirements {
                println!("      [ ] {req}");
            }
        }
    }
}
