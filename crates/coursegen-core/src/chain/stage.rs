use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::llm::ConversationContext;

use super::template;

/// Everything a stage may draw on when building its user prompt.
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    pub direction: &'a str,
    /// The conversation as it stands before this stage's messages.
    pub context: &'a ConversationContext,
    pub prior_outputs: &'a [StageOutput],
}

impl<'a> StageInput<'a> {
    /// Template variables: `direction` plus one entry per completed stage,
    /// keyed by stage name.
    pub fn vars(&self) -> HashMap<&'a str, &'a str> {
        let mut vars = HashMap::with_capacity(self.prior_outputs.len() + 1);
        vars.insert("direction", self.direction);
        for output in self.prior_outputs {
            vars.insert(output.name.as_str(), output.text.as_str());
        }
        vars
    }
}

type PromptFn = dyn Fn(&StageInput<'_>) -> String + Send + Sync;

/// How a stage turns its input into the user message.
#[derive(Clone)]
pub enum PromptBuilder {
    /// `${name}` template resolved against [`StageInput::vars`].
    Template(String),
    Custom(Arc<PromptFn>),
}

impl PromptBuilder {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&StageInput<'_>) -> String + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    pub fn build(&self, input: &StageInput<'_>) -> String {
        match self {
            Self::Template(text) => template::resolve(text, &input.vars()),
            Self::Custom(f) => f(input),
        }
    }
}

impl fmt::Debug for PromptBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Template(text) => f.debug_tuple("Template").field(text).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One stage of a chain.
#[derive(Debug, Clone)]
pub struct StageSpec {
    pub name: String,
    pub system_prompt: String,
    pub prompt: PromptBuilder,
    pub temperature: f32,
}

impl StageSpec {
    pub fn template(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        template: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            prompt: PromptBuilder::Template(template.into()),
            temperature,
        }
    }

    pub fn custom<F>(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        temperature: f32,
        build: F,
    ) -> Self
    where
        F: Fn(&StageInput<'_>) -> String + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            prompt: PromptBuilder::custom(build),
            temperature,
        }
    }
}

/// Raw text produced by a completed stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutput {
    pub name: String,
    pub text: String,
}
