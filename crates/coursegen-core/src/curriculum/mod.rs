//! The curriculum document and its extraction from model output.

mod extract;
mod schema;

pub use extract::{ExtractError, extract, validate};
pub use schema::{CurriculumPlan, Lesson, Level, MAX_REQUIREMENTS, MIN_REQUIREMENTS};
