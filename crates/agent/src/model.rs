use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use trestle_core::chat::{ChatMessage, ChatRole};
use trestle_core::config::{LlmConfig, LlmProvider};

use crate::anthropic::AnthropicModel;
use crate::openai::OpenAiModel;

/// One prompt exchange with a chat backend.
#[derive(Clone, Debug)]
pub struct ModelRequest {
    pub message: String,
    pub system_prompt: String,
    pub history: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl ModelRequest {
    pub fn new(message: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatReply {
    pub model_id: String,
    pub content: String,
}

/// One fragment of a streamed reply: an attribution chunk first, content
/// chunks, then a terminal `done` chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamChunk {
    pub token: String,
    pub done: bool,
    pub model_id: Option<String>,
}

impl StreamChunk {
    pub fn attribution(model_id: impl Into<String>) -> Self {
        Self { token: String::new(), done: false, model_id: Some(model_id.into()) }
    }

    pub fn content(token: impl Into<String>) -> Self {
        Self { token: token.into(), done: false, model_id: None }
    }

    pub fn done() -> Self {
        Self { token: String::new(), done: true, model_id: None }
    }
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model authentication failed: {0}")]
    Authentication(String),
    #[error("model rate limited: {0}")]
    RateLimited(String),
    #[error("model api error {status}: {detail}")]
    Api { status: u16, detail: String },
    #[error("model transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model returned an unusable response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    pub(crate) fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited(_) => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Chat backend seam. Streaming has a buffered default so implementations
/// (and scripted test models) only have to provide `chat`.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_id(&self) -> &str;

    async fn chat(&self, request: ModelRequest) -> Result<ChatReply, ModelError>;

    /// Buffered fallback: one content chunk and the done sentinel. Backends
    /// with real token streaming override this. Attribution chunks are the
    /// broker's job, not the backend's.
    async fn chat_stream(&self, request: ModelRequest) -> Result<Vec<StreamChunk>, ModelError> {
        let reply = self.chat(request).await?;
        Ok(vec![StreamChunk::content(reply.content), StreamChunk::done()])
    }
}

/// Builds the configured backend, or `None` when no API key is set. Without
/// a backend the broker still serves its deterministic paths.
pub fn build_model(config: &LlmConfig) -> Result<Option<Arc<dyn ChatModel>>, ModelError> {
    let Some(api_key) = config.api_key.clone() else {
        return Ok(None);
    };
    let model: Arc<dyn ChatModel> = match config.provider {
        LlmProvider::Anthropic => Arc::new(AnthropicModel::new(config, api_key)?),
        LlmProvider::OpenAi => Arc::new(OpenAiModel::new(config, api_key)?),
    };
    Ok(Some(model))
}

/// Folds system turns out of a history, returning the merged system prompt
/// and the remaining `(role, content)` turns in order. Both wire formats
/// want the system text separated from the conversation.
pub(crate) fn split_system_turns(
    system_prompt: &str,
    history: &[ChatMessage],
) -> (String, Vec<(&'static str, String)>) {
    let mut system = system_prompt.trim().to_string();
    let mut turns = Vec::with_capacity(history.len());
    for message in history {
        match message.role {
            ChatRole::System => {
                if system.is_empty() {
                    system = message.content.clone();
                } else {
                    system = format!("{system}\n\n{}", message.content);
                }
            }
            ChatRole::User => turns.push(("user", message.content.clone())),
            ChatRole::Assistant => turns.push(("assistant", message.content.clone())),
        }
    }
    (system, turns)
}
