use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use trestle_core::config::LlmConfig;

use crate::model::{split_system_turns, ChatModel, ChatReply, ModelError, ModelRequest};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic messages API backend. The system prompt rides as a top-level
/// field, not a conversation turn.
pub struct AnthropicModel {
    http: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    max_retries: u32,
}

impl AnthropicModel {
    pub fn new(config: &LlmConfig, api_key: SecretString) -> Result<Self, ModelError> {
        let http = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            http,
            base_url,
            api_key,
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn send(&self, body: &MessagesRequest) -> Result<ChatReply, ModelError> {
        let url = format!("{}/v1/messages", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => ModelError::Authentication(detail),
                429 => ModelError::RateLimited(detail),
                code => ModelError::Api { status: code, detail },
            });
        }

        let decoded: MessagesResponse =
            response.json().await.map_err(|err| ModelError::InvalidResponse(err.to_string()))?;
        let content = decoded
            .content
            .iter()
            .filter_map(|block| if block.kind == "text" { block.text.clone() } else { None })
            .collect::<Vec<_>>()
            .join("");

        Ok(ChatReply { model_id: decoded.model, content })
    }
}

#[async_trait]
impl ChatModel for AnthropicModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: ModelRequest) -> Result<ChatReply, ModelError> {
        let (system, turns) = split_system_turns(&request.system_prompt, &request.history);
        let mut messages: Vec<WireMessage> = turns
            .into_iter()
            .map(|(role, content)| WireMessage { role: role.to_string(), content })
            .collect();
        messages.push(WireMessage { role: "user".to_string(), content: request.message });

        let body = MessagesRequest {
            model: self.model.clone(),
            messages,
            system: if system.is_empty() { None } else { Some(system) },
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature,
            stream: false,
        };

        let mut attempt = 0;
        loop {
            match self.send(&body).await {
                Ok(reply) => return Ok(reply),
                Err(err) if attempt < self.max_retries && err.is_retryable() => {
                    attempt += 1;
                    tracing::debug!(
                        event_name = "model_retry",
                        backend = "anthropic",
                        attempt,
                        error = %err
                    );
                    tokio::time::sleep(Duration::from_millis(250 * u64::from(attempt))).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    model: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}
