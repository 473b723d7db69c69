//! Course-plan generation pipeline.
//!
//! A request flows through [`access`] (who is asking, do they own the
//! course), [`chain`] (ordered LLM stages sharing one transcript),
//! [`curriculum`] (strict JSON extraction and schema validation) and
//! [`persist`] (a single revision-guarded write). [`service`] wires these
//! together behind a lease and a wall-clock timeout.

pub mod access;
pub mod chain;
pub mod curriculum;
pub mod error;
pub mod llm;
pub mod persist;
pub mod service;
pub mod store;

pub use error::GenerationError;
