use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use trestle_core::config::LlmConfig;

use crate::model::{split_system_turns, ChatModel, ChatReply, ModelError, ModelRequest};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible chat completions backend. The system prompt leads the
/// message list; any compatible gateway can stand in via `base_url`.
pub struct OpenAiModel {
    http: Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    max_retries: u32,
}

impl OpenAiModel {
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

    async fn send(&self, body: &CompletionsRequest) -> Result<ChatReply, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
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

        let decoded: CompletionsResponse =
            response.json().await.map_err(|err| ModelError::InvalidResponse(err.to_string()))?;
        let choice = decoded
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("completion had no choices".to_string()))?;

        Ok(ChatReply {
            model_id: decoded.model,
            content: choice.message.content.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn chat(&self, request: ModelRequest) -> Result<ChatReply, ModelError> {
        let (system, turns) = split_system_turns(&request.system_prompt, &request.history);
        let mut messages = Vec::with_capacity(turns.len() + 2);
        if !system.is_empty() {
            messages.push(WireMessage { role: "system".to_string(), content: Some(system) });
        }
        messages.extend(
            turns
                .into_iter()
                .map(|(role, content)| WireMessage { role: role.to_string(), content: Some(content) }),
        );
        messages.push(WireMessage { role: "user".to_string(), content: Some(request.message) });

        let body = CompletionsRequest {
            model: self.model.clone(),
            messages,
            max_tokens: request.max_tokens,
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
                        backend = "openai",
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
struct CompletionsRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionsResponse {
    model: String,
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: WireMessage,
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use trestle_core::config::{LlmConfig, LlmProvider};

    use super::{CompletionsResponse, OpenAiModel};

    #[test]
    fn gateway_base_urls_are_supported() {
        let config = LlmConfig {
            provider: LlmProvider::OpenAi,
            api_key: None,
            base_url: Some("http://llm-gateway.internal/v1/".to_string()),
            model: "gpt-4o".to_string(),
            timeout_secs: 30,
            max_retries: 2,
        };
        let model = OpenAiModel::new(&config, SecretString::from("k".to_string())).unwrap();
        assert_eq!(model.base_url, "http://llm-gateway.internal/v1");
    }

    #[test]
    fn completion_responses_decode_to_content() {
        let decoded: CompletionsResponse = serde_json::from_str(
            r#"{
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "model": "gpt-4o",
                "choices": [
                    { "index": 0, "message": { "role": "assistant", "content": "hello" }, "finish_reason": "stop" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(decoded.model, "gpt-4o");
        assert_eq!(decoded.choices[0].message.content.as_deref(), Some("hello"));
    }
}
