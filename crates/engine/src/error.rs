use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine api error: {status} {status_text}")]
    Api { status: u16, status_text: String },
    #[error("engine api timeout: {url}")]
    Timeout { url: String },
    #[error("engine transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("engine returned invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("engine client configuration error: {0}")]
    Configuration(String),
}
