use async_trait::async_trait;

use super::{ConversationContext, LlmError};

/// Issues one completion for a conversation.
///
/// Implementations are stateless across calls: everything the model sees is
/// in `context`. An upstream that answers with no content yields `Ok("")`;
/// deciding whether that is acceptable belongs to the caller.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        context: &ConversationContext,
        temperature: f32,
    ) -> Result<String, LlmError>;
}

// Compile-time assertion: CompletionClient must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn CompletionClient) {}
};
