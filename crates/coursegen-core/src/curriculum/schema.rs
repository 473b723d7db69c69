use serde::{Deserialize, Serialize};

/// Fewest graduation requirements a lesson may list.
pub const MIN_REQUIREMENTS: usize = 2;
/// Most graduation requirements a lesson may list.
pub const MAX_REQUIREMENTS: usize = 4;

/// A level-based peer-teaching curriculum.
///
/// Only construct from untrusted text through [`super::extract`], which
/// enforces the shape rules serde alone cannot express.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurriculumPlan {
    pub levels: Vec<Level>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    pub title: String,
    pub description: String,
    pub lessons: Vec<Lesson>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    pub title: String,
    pub synopsis: String,
    /// Teaching steps, mentor notes and common mistakes as one string.
    pub instructions: String,
    pub graduation_requirements: Vec<String>,
}

impl CurriculumPlan {
    pub fn lesson_count(&self) -> usize {
        self.levels.iter().map(|l| l.lessons.len()).sum()
    }

    /// Encode as the compact JSON string stored on the plan record.
    pub fn to_json_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_camel_case() {
        let plan = CurriculumPlan {
            levels: vec![Level {
                title: "Basics".into(),
                description: "First steps".into(),
                lessons: vec![Lesson {
                    title: "Cast on".into(),
                    synopsis: "Start a row".into(),
                    instructions: "- loop\n- pull".into(),
                    graduation_requirements: vec!["cast 10".into(), "explain slip knot".into()],
                }],
            }],
        };
        let json = plan.to_json_string().unwrap();
        assert!(json.contains("\"graduationRequirements\""));
        assert!(!json.contains("graduation_requirements"));
        assert_eq!(plan.lesson_count(), 1);
    }
}
