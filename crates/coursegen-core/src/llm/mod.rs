//! LLM completion layer: one request per stage, no hidden retries.

mod client;
mod config;
mod error;
mod openai;
pub mod scripted;
mod types;

pub use client::CompletionClient;
pub use config::{API_KEY_ENV_VAR, LlmConfig};
pub use error::LlmError;
pub use openai::OpenAiClient;
pub use types::{ChatMessage, ConversationContext, Role};
