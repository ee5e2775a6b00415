use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use toml::Value;

use trestle_core::config::{AppConfig, LoadOptions};

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "engine.base_url",
        &config.engine.base_url,
        source("engine.base_url", &["TRESTLE_ENGINE_BASE_URL"]),
    ));
    lines.push(render_line(
        "engine.namespace",
        &config.engine.namespace,
        source("engine.namespace", &["TRESTLE_ENGINE_NAMESPACE"]),
    ));
    let api_token = match &config.engine.api_token {
        Some(token) => redact_token(token.expose_secret()),
        None => "<unset>".to_string(),
    };
    lines.push(render_line(
        "engine.api_token",
        &api_token,
        source("engine.api_token", &["TRESTLE_ENGINE_API_TOKEN"]),
    ));
    lines.push(render_line(
        "engine.timeout_secs",
        &config.engine.timeout_secs.to_string(),
        source("engine.timeout_secs", &["TRESTLE_ENGINE_TIMEOUT_SECS"]),
    ));

    lines.push(render_line(
        "llm.provider",
        &format!("{:?}", config.llm.provider),
        source("llm.provider", &["TRESTLE_LLM_PROVIDER"]),
    ));
    lines.push(render_line(
        "llm.model",
        &config.llm.model,
        source("llm.model", &["TRESTLE_LLM_MODEL"]),
    ));
    lines.push(render_line(
        "llm.base_url",
        config.llm.base_url.as_deref().unwrap_or("<unset>"),
        source("llm.base_url", &["TRESTLE_LLM_BASE_URL"]),
    ));
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    lines.push(render_line(
        "llm.api_key",
        llm_api_key,
        source("llm.api_key", &["TRESTLE_LLM_API_KEY"]),
    ));

    lines.push(render_line(
        "broker.generic_operate_enabled",
        &config.broker.generic_operate_enabled.to_string(),
        source("broker.generic_operate_enabled", &["TRESTLE_BROKER_GENERIC_OPERATE_ENABLED"]),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["TRESTLE_LOGGING_LEVEL", "TRESTLE_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", &["TRESTLE_LOGGING_FORMAT", "TRESTLE_LOG_FORMAT"]),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("trestle.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/trestle.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

// Logging keys accept a short env alias, so the source check walks every
// key in override order.
fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    for env_key in env_keys {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
