use std::sync::Arc;

use tracing::{debug, info, warn};

use coursegen_db::models::TRANSCRIPT_SEPARATOR;

use crate::error::GenerationError;
use crate::llm::{ChatMessage, CompletionClient, ConversationContext};

use super::{StageInput, StageOutput, StageSpec};

/// Result of a chain that ran every stage to completion.
#[derive(Debug, Clone)]
pub struct ChainOutcome {
    /// One entry per stage, in execution order. Never empty.
    pub outputs: Vec<StageOutput>,
    /// Full conversation, including every system, user and assistant turn.
    pub context: ConversationContext,
}

impl ChainOutcome {
    /// Text of the last stage: the candidate curriculum document.
    pub fn final_output(&self) -> &str {
        self.outputs.last().map(|o| o.text.as_str()).unwrap_or_default()
    }

    /// Stage outputs joined with the transcript separator.
    pub fn transcript(&self) -> String {
        self.outputs
            .iter()
            .map(|o| o.text.as_str())
            .collect::<Vec<_>>()
            .join(TRANSCRIPT_SEPARATOR)
    }
}

/// Runs stages strictly in order against one completion client.
#[derive(Clone)]
pub struct StageChain {
    client: Arc<dyn CompletionClient>,
}

impl StageChain {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Run `stages` starting from an empty conversation.
    ///
    /// Each stage appends its system and user messages, then the model's
    /// answer, so later stages always see everything before them. A stage
    /// whose answer is blank stops the chain.
    pub async fn run(
        &self,
        direction: &str,
        stages: &[StageSpec],
    ) -> Result<ChainOutcome, GenerationError> {
        if stages.is_empty() {
            return Err(GenerationError::InvalidRequest(
                "stage chain has no stages".to_string(),
            ));
        }

        let mut context = ConversationContext::new();
        let mut outputs: Vec<StageOutput> = Vec::with_capacity(stages.len());

        for (index, stage) in stages.iter().enumerate() {
            let user_prompt = stage.prompt.build(&StageInput {
                direction,
                context: &context,
                prior_outputs: &outputs,
            });
            context = context
                .with(ChatMessage::system(stage.system_prompt.as_str()))
                .with(ChatMessage::user(user_prompt));

            info!(
                stage = index,
                name = %stage.name,
                messages = context.len(),
                temperature = stage.temperature,
                "running stage"
            );

            let text = self
                .client
                .complete(&context, stage.temperature)
                .await
                .map_err(|source| {
                    warn!(stage = index, name = %stage.name, error = %source, "stage request failed");
                    GenerationError::UpstreamUnavailable {
                        stage: index,
                        name: stage.name.clone(),
                        source,
                    }
                })?;

            if text.trim().is_empty() {
                warn!(stage = index, name = %stage.name, "stage returned no content");
                return Err(GenerationError::LlmEmptyResponse {
                    stage: index,
                    name: stage.name.clone(),
                });
            }

            debug!(stage = index, chars = text.len(), "stage complete");
            context = context.with(ChatMessage::assistant(text.as_str()));
            outputs.push(StageOutput {
                name: stage.name.clone(),
                text,
            });
        }

        Ok(ChainOutcome { outputs, context })
    }
}
