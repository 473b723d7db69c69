//! LLM error types

use std::time::Duration;

use thiserror::Error;

/// Errors from a single completion request.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("no API key: set {0} or llm.api_key in the config file")]
    MissingApiKey(&'static str),
}

impl LlmError {
    /// Whether the same request may succeed if issued again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) | Self::Timeout(_) => true,
            Self::ApiError { status, .. } => *status >= 500 || *status == 408,
            Self::InvalidResponse(_) | Self::MissingApiKey(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(
            LlmError::RateLimited {
                retry_after: Duration::from_secs(60)
            }
            .is_retryable()
        );
        assert!(
            LlmError::ApiError {
                status: 502,
                message: "bad gateway".into()
            }
            .is_retryable()
        );
        assert!(LlmError::Timeout(Duration::from_secs(5)).is_retryable());

        assert!(
            !LlmError::ApiError {
                status: 400,
                message: "bad request".into()
            }
            .is_retryable()
        );
        assert!(!LlmError::InvalidResponse("garbage".into()).is_retryable());
        assert!(!LlmError::MissingApiKey("OPENAI_API_KEY").is_retryable());
    }
}
