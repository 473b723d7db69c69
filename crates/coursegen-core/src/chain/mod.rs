//! Ordered LLM stages sharing one growing conversation.

mod presets;
mod runner;
mod stage;
pub mod template;

pub use presets::{PipelineKind, PipelineKindParseError};
pub use runner::{ChainOutcome, StageChain};
pub use stage::{PromptBuilder, StageInput, StageOutput, StageSpec};
