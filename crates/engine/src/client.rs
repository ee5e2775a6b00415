use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use uuid::Uuid;

use trestle_core::action::HttpMethod;
use trestle_core::config::EngineConfig;

use crate::contract::OperateRequest;
use crate::error::EngineError;

/// Boundary to the integration engine API. The broker only ever talks to
/// the engine through this trait, so tests can substitute a scripted engine.
#[async_trait]
pub trait EngineOperator: Send + Sync {
    /// Generic operate call. Returns the raw response envelope; callers
    /// unwrap `data` themselves because envelope nesting varies by backend.
    async fn operate(&self, request: OperateRequest) -> Result<Value, EngineError>;

    /// Direct transport fallback for catalog entries that still carry a
    /// concrete endpoint instead of an op/target pair.
    async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, EngineError>;

    /// Capability discovery for the planner prompt.
    async fn capabilities(&self, namespace: &str) -> Result<Value, EngineError>;
}

pub struct HttpEngineClient {
    http: Client,
    base_url: String,
    api_token: Option<SecretString>,
}

impl HttpEngineClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout_secs: u64,
        api_token: Option<SecretString>,
    ) -> Result<Self, EngineError> {
        let http = Client::builder().timeout(Duration::from_secs(timeout_secs)).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url, api_token })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        Self::new(config.base_url.clone(), config.timeout_secs, config.api_token.clone())
    }

    /// Reachability probe. The engine's own health route may call back into
    /// this service, so probe a plain read endpoint instead.
    pub async fn health_check(&self) -> Result<(), EngineError> {
        self.get_json("/production/status").await.map(|_| ())
    }

    async fn get_json(&self, path: &str) -> Result<Value, EngineError> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(event_name = "engine_request", method = "GET", url = %url);
        let request = self.authorized(self.http.get(&url)).header(ACCEPT, "application/json");
        let response = request.send().await.map_err(|err| classify(err, &url))?;
        decode(response, &url).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, EngineError> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(event_name = "engine_request", method = "POST", url = %url);
        let request = self.authorized(self.http.post(&url)).header(ACCEPT, "application/json");
        let response = request.json(body).send().await.map_err(|err| classify(err, &url))?;
        decode(response, &url).await
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }
}

fn classify(err: reqwest::Error, url: &str) -> EngineError {
    if err.is_timeout() {
        EngineError::Timeout { url: url.to_string() }
    } else {
        EngineError::Transport(err)
    }
}

async fn decode(response: Response, url: &str) -> Result<Value, EngineError> {
    let status = response.status();
    if !status.is_success() {
        return Err(EngineError::Api {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("unknown").to_string(),
        });
    }
    let text = response.text().await.map_err(|err| classify(err, url))?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

#[async_trait]
impl EngineOperator for HttpEngineClient {
    async fn operate(&self, mut request: OperateRequest) -> Result<Value, EngineError> {
        if request.request_id.is_none() {
            request.request_id = Some(Uuid::new_v4().to_string());
        }
        let body = serde_json::to_value(&request)?;
        self.post_json("/operate", &body).await
    }

    async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, EngineError> {
        match method {
            HttpMethod::Get => self.get_json(path).await,
            HttpMethod::Post => {
                let body = body.cloned().unwrap_or_else(|| Value::Object(Default::default()));
                self.post_json(path, &body).await
            }
        }
    }

    async fn capabilities(&self, namespace: &str) -> Result<Value, EngineError> {
        self.get_json(&format!("/capabilities?namespace={namespace}")).await
    }
}

#[cfg(test)]
mod tests {
    use trestle_core::config::EngineConfig;

    use super::HttpEngineClient;

    #[test]
    fn base_url_is_normalized_without_a_trailing_slash() {
        let client = HttpEngineClient::new("http://engine.local/api/", 30, None).unwrap();
        assert_eq!(client.base_url, "http://engine.local/api");
    }

    #[test]
    fn builds_from_engine_config() {
        let config = EngineConfig {
            base_url: "http://127.0.0.1:9980/api".to_string(),
            namespace: "MAIN".to_string(),
            api_token: None,
            timeout_secs: 10,
        };
        let client = HttpEngineClient::from_config(&config).unwrap();
        assert_eq!(client.base_url, "http://127.0.0.1:9980/api");
    }
}
