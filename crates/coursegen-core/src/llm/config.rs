use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::LlmError;

/// Environment variable holding the completion service API key.
pub const API_KEY_ENV_VAR: &str = "OPENAI_API_KEY";

/// Settings for the OpenAI-compatible completion endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL without the `/v1/chat/completions` suffix.
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    /// Per-request HTTP timeout.
    pub timeout_secs: u64,
    /// Takes effect only when [`API_KEY_ENV_VAR`] is unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl LlmConfig {
    pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";
    pub const DEFAULT_MODEL: &str = "chatgpt-4o-latest";
    pub const DEFAULT_MAX_TOKENS: u32 = 5000;
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// API key from the environment, falling back to the configured value.
    pub fn resolve_api_key(&self) -> Result<String, LlmError> {
        std::env::var(API_KEY_ENV_VAR)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| self.api_key.clone().filter(|k| !k.trim().is_empty()))
            .ok_or(LlmError::MissingApiKey(API_KEY_ENV_VAR))
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: Self::DEFAULT_BASE_URL.to_string(),
            model: Self::DEFAULT_MODEL.to_string(),
            max_tokens: Self::DEFAULT_MAX_TOKENS,
            timeout_secs: Self::DEFAULT_TIMEOUT_SECS,
            api_key: None,
        }
    }
}
