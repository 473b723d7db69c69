//! Handlers for `coursegen course`.

use anyhow::Result;
use sqlx::PgPool;

use coursegen_db::queries::courses as course_queries;

use crate::CourseCommands;

pub async fn run_course_command(command: CourseCommands, pool: &PgPool) -> Result<()> {
    match command {
        CourseCommands::Add { title, creator } => {
            let course = course_queries::insert_course(pool, &creator, &title).await?;
            println!("Created course {} ({:?}, creator {})", course.id, course.title, course.creator_id);
        }
        CourseCommands::List { creator } => {
            let courses = course_queries::list_courses_for_creator(pool, &creator).await?;
            if courses.is_empty() {
                println!("No courses for {creator}.");
            }
            for course in courses {
                println!(
                    "{}  {}  {}",
                    course.id,
                    course.created_at.format("%Y-%m-%d"),
                    course.title
                );
            }
        }
    }
    Ok(())
}
