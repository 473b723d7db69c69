//! Scripted completion client for tests and offline dry runs.
//!
//! Replies are consumed in order, one per call. Every request context is
//! recorded so callers can assert on what each stage actually sent.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{CompletionClient, ConversationContext, LlmError};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    /// Fail as an upstream HTTP error.
    Status { status: u16, message: String },
    /// Sleep, then answer. Used to exercise timeouts.
    Delayed(Duration, String),
}

impl From<&str> for ScriptedReply {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for ScriptedReply {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

/// A request as the client received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub context: ConversationContext,
    pub temperature: f32,
}

#[derive(Debug, Default)]
pub struct ScriptedClient {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
    call_count: AtomicUsize,
}

impl ScriptedClient {
    pub fn new<I, R>(replies: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<ScriptedReply>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Snapshot of every request received so far, in call order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(
        &self,
        context: &ConversationContext,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                context: context.clone(),
                temperature,
            });
        }

        let reply = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        debug!(idx, exhausted = reply.is_none(), "scripted completion");
        match reply {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Status { status, message }) => {
                Err(LlmError::ApiError { status, message })
            }
            Some(ScriptedReply::Delayed(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
            None => Err(LlmError::InvalidResponse(
                "no more scripted replies".to_string(),
            )),
        }
    }
}
