//! Failure taxonomy for a generation invocation.

use std::time::Duration;

use thiserror::Error;

use crate::curriculum::ExtractError;
use crate::llm::LlmError;

/// Every way a course-plan generation can fail.
///
/// Precondition failures (`Unauthenticated` .. `NotFound`) are raised before
/// any LLM call. None of these leave a partially written plan behind.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("document store unavailable: {0:#}")]
    StoreUnavailable(#[source] anyhow::Error),

    #[error("plan {plan_id} is already being generated")]
    AlreadyInProgress { plan_id: String },

    #[error("stage {stage} ({name}): LLM service unavailable: {source}")]
    UpstreamUnavailable {
        stage: usize,
        name: String,
        #[source]
        source: LlmError,
    },

    #[error("stage {stage} ({name}): LLM returned no content")]
    LlmEmptyResponse { stage: usize, name: String },

    #[error("malformed model output: {0}")]
    MalformedOutput(String),

    #[error("schema violation at {path}: {reason}")]
    SchemaViolation { path: String, reason: String },

    #[error("failed to persist generated plan: {0:#}")]
    Persistence(#[source] anyhow::Error),

    #[error("plan {plan_id} changed since revision {expected_revision}; generated plan discarded")]
    Conflict {
        plan_id: String,
        expected_revision: i64,
    },

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
}

impl GenerationError {
    /// Stable machine-readable name, used in API responses and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidRequest(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::AlreadyInProgress { .. } => "already_in_progress",
            Self::UpstreamUnavailable { .. } => "upstream_unavailable",
            Self::LlmEmptyResponse { .. } => "llm_empty_response",
            Self::MalformedOutput(_) => "malformed_output",
            Self::SchemaViolation { .. } => "schema_violation",
            Self::Persistence(_) => "persistence_error",
            Self::Conflict { .. } => "conflict",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Whether re-triggering the same request may succeed.
    ///
    /// Nothing in the pipeline retries on its own; this only informs the
    /// invoking layer.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::UpstreamUnavailable { source, .. } => source.is_retryable(),
            Self::LlmEmptyResponse { .. }
            | Self::StoreUnavailable(_)
            | Self::AlreadyInProgress { .. }
            | Self::Timeout(_) => true,
            _ => false,
        }
    }
}

impl From<ExtractError> for GenerationError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Malformed(message) => Self::MalformedOutput(message),
            ExtractError::SchemaViolation { path, reason } => Self::SchemaViolation { path, reason },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_distinct() {
        let errors = [
            GenerationError::Unauthenticated("x".into()),
            GenerationError::Forbidden("x".into()),
            GenerationError::InvalidRequest("x".into()),
            GenerationError::NotFound("x".into()),
            GenerationError::StoreUnavailable(anyhow::anyhow!("down")),
            GenerationError::AlreadyInProgress {
                plan_id: "p".into(),
            },
            GenerationError::LlmEmptyResponse {
                stage: 0,
                name: "s".into(),
            },
            GenerationError::MalformedOutput("x".into()),
            GenerationError::SchemaViolation {
                path: "levels".into(),
                reason: "x".into(),
            },
            GenerationError::Persistence(anyhow::anyhow!("down")),
            GenerationError::Conflict {
                plan_id: "p".into(),
                expected_revision: 3,
            },
            GenerationError::Timeout(Duration::from_secs(1)),
        ];
        let mut kinds: Vec<&str> = errors.iter().map(|e| e.kind()).collect();
        kinds.sort();
        kinds.dedup();
        assert_eq!(kinds.len(), errors.len());
    }

    #[test]
    fn contract_failures_are_terminal() {
        assert!(!GenerationError::Forbidden("x".into()).is_retryable());
        assert!(!GenerationError::MalformedOutput("x".into()).is_retryable());
        assert!(
            !GenerationError::SchemaViolation {
                path: "levels".into(),
                reason: "x".into()
            }
            .is_retryable()
        );
        assert!(
            GenerationError::LlmEmptyResponse {
                stage: 2,
                name: "goals".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn extract_errors_map_to_matching_kinds() {
        let malformed: GenerationError = ExtractError::Malformed("eof".into()).into();
        assert_eq!(malformed.kind(), "malformed_output");

        let schema: GenerationError = ExtractError::SchemaViolation {
            path: "levels[0].lessons".into(),
            reason: "must not be empty".into(),
        }
        .into();
        assert_eq!(
            schema.to_string(),
            "schema violation at levels[0].lessons: must not be empty"
        );
    }

    #[test]
    fn upstream_retryability_follows_source() {
        let err = GenerationError::UpstreamUnavailable {
            stage: 1,
            name: "goals".into(),
            source: LlmError::ApiError {
                status: 503,
                message: "overloaded".into(),
            },
        };
        assert!(err.is_retryable());

        let err = GenerationError::UpstreamUnavailable {
            stage: 1,
            name: "goals".into(),
            source: LlmError::ApiError {
                status: 401,
                message: "bad key".into(),
            },
        };
        assert!(!err.is_retryable());
    }
}
