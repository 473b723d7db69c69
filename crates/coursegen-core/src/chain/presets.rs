//! Built-in pipelines.
//!
//! Stage prompts live in `pipelines.toml`, embedded in the binary at compile
//! time.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::StageSpec;

/// Which built-in pipeline a generation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    /// One combined prompt that asks for JSON directly.
    Single,
    /// inventory -> goals -> curriculum -> JSON conversion.
    #[default]
    Staged,
}

impl PipelineKind {
    pub const ALL: [PipelineKind; 2] = [Self::Single, Self::Staged];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Staged => "staged",
        }
    }

    /// Stage list for this pipeline.
    ///
    /// # Panics
    ///
    /// Panics if the embedded `pipelines.toml` is malformed or lacks this
    /// pipeline. Both are caught by the tests below.
    pub fn stages(self) -> Vec<StageSpec> {
        let library: PipelineLibrary =
            toml::from_str(PIPELINES_TOML).expect("embedded pipelines.toml is invalid");
        library
            .pipelines
            .into_iter()
            .find(|p| p.name == self.as_str())
            .unwrap_or_else(|| panic!("pipelines.toml has no {self} pipeline"))
            .stages
            .into_iter()
            .map(|s| StageSpec::template(s.name, s.system_prompt, s.template, s.temperature))
            .collect()
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineKind {
    type Err = PipelineKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(Self::Single),
            "staged" => Ok(Self::Staged),
            other => Err(PipelineKindParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`PipelineKind`] string.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid pipeline: {0:?} (expected single or staged)")]
pub struct PipelineKindParseError(pub String);

static PIPELINES_TOML: &str = include_str!("pipelines.toml");

#[derive(Debug, Deserialize)]
struct PipelineLibrary {
    pipelines: Vec<PipelineDef>,
}

#[derive(Debug, Deserialize)]
struct PipelineDef {
    name: String,
    stages: Vec<StageDef>,
}

#[derive(Debug, Deserialize)]
struct StageDef {
    name: String,
    system_prompt: String,
    template: String,
    temperature: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::StageInput;
    use crate::llm::ConversationContext;

    #[test]
    fn every_pipeline_loads() {
        for kind in PipelineKind::ALL {
            let stages = kind.stages();
            assert!(!stages.is_empty(), "{kind} has no stages");
            for stage in &stages {
                assert!(!stage.system_prompt.trim().is_empty());
                assert!((stage.temperature - 0.7).abs() < f32::EPSILON);
            }
        }
    }

    #[test]
    fn staged_pipeline_order() {
        let names: Vec<String> = PipelineKind::Staged
            .stages()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["inventory", "goals", "curriculum", "to_json"]);
    }

    #[test]
    fn first_stage_embeds_direction() {
        for kind in PipelineKind::ALL {
            let stages = kind.stages();
            let ctx = ConversationContext::new();
            let prompt = stages[0].prompt.build(&StageInput {
                direction: "intro to knitting",
                context: &ctx,
                prior_outputs: &[],
            });
            assert!(
                prompt.starts_with("Course direction: intro to knitting"),
                "{kind}: {prompt}"
            );
            assert!(!prompt.contains("${"), "{kind} left a placeholder: {prompt}");
        }
    }

    #[test]
    fn parse_round_trip_and_rejects_unknown() {
        for kind in PipelineKind::ALL {
            assert_eq!(kind.to_string().parse::<PipelineKind>().unwrap(), kind);
        }
        assert!("fancy".parse::<PipelineKind>().is_err());
        assert_eq!(PipelineKind::default(), PipelineKind::Staged);
    }
}
