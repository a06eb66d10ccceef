//! Prompt composition.
//!
//! Every turn sends two messages: a fixed system prompt with the code
//! generation rules, and a user message carrying the composed payload
//! (retrieved context, recent queries, the question).

use codeloop_config::AppConfig;
use codeloop_core::error::Error;
use codeloop_core::message::Message;
use codeloop_core::provider::ProviderRequest;

/// Rules the model is asked to follow.
pub const SYSTEM_PROMPT: &str = "You are an AI assistant that generates Python code. \
Please return only the code block between triple backticks. \
You must not use external libraries such as numpy, pandas, etc. \
Always make sure the programs work correctly and finish within 30 seconds at most. \
Any description or additional information must be returned as metadata, outside the code block.";

/// Build the user payload for one turn.
///
/// ```text
/// Context: <chunks joined by "\n">
/// Short-Term Memory: <memory>
/// Question: <query>
/// ```
pub fn compose(context: &[String], query: &str, memory: &str) -> Result<String, Error> {
    if query.trim().is_empty() {
        return Err(Error::InvalidInput("query must not be empty".into()));
    }

    Ok(format!(
        "Context: {}\nShort-Term Memory: {}\nQuestion: {}",
        context.join("\n"),
        memory,
        query
    ))
}

/// Model settings applied to every request of a session.
#[derive(Debug, Clone)]
pub struct RequestSettings {
    pub system_prompt: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl RequestSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            system_prompt: SYSTEM_PROMPT.into(),
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let model = config
            .providers
            .get(&config.default_provider)
            .and_then(|p| p.default_model.clone())
            .unwrap_or_else(|| config.default_model.clone());

        Self {
            system_prompt: SYSTEM_PROMPT.into(),
            model,
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
        }
    }

    /// Wrap a composed payload into a provider request.
    pub fn build_request(&self, payload: &str) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(&self.system_prompt),
                Message::user(format!("Query: {payload}")),
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stop: vec![],
        }
    }
}
