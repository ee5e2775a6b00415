use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub llm: LlmConfig,
    pub broker: BrokerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub base_url: String,
    pub namespace: String,
    pub api_token: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct BrokerConfig {
    /// Routes deterministic direct reads through the generic operate call
    /// instead of per-resource endpoints. Off by default.
    pub generic_operate_enabled: bool,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Anthropic,
    OpenAi,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub engine_base_url: Option<String>,
    pub engine_namespace: Option<String>,
    pub engine_api_token: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub generic_operate_enabled: Option<bool>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig {
                base_url: "http://127.0.0.1:9980/api".to_string(),
                namespace: "MAIN".to_string(),
                api_token: None,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Anthropic,
                api_key: None,
                base_url: None,
                model: "claude-opus-4-1-20250805".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            broker: BrokerConfig { generic_operate_enabled: false },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected anthropic|openai)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("trestle.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(engine) = patch.engine {
            if let Some(base_url) = engine.base_url {
                self.engine.base_url = base_url;
            }
            if let Some(namespace) = engine.namespace {
                self.engine.namespace = namespace;
            }
            if let Some(api_token_value) = engine.api_token {
                self.engine.api_token = Some(secret_value(api_token_value));
            }
            if let Some(timeout_secs) = engine.timeout_secs {
                self.engine.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(broker) = patch.broker {
            if let Some(enabled) = broker.generic_operate_enabled {
                self.broker.generic_operate_enabled = enabled;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TRESTLE_ENGINE_BASE_URL") {
            self.engine.base_url = value;
        }
        if let Some(value) = read_env("TRESTLE_ENGINE_NAMESPACE") {
            self.engine.namespace = value;
        }
        if let Some(value) = read_env("TRESTLE_ENGINE_API_TOKEN") {
            self.engine.api_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("TRESTLE_ENGINE_TIMEOUT_SECS") {
            self.engine.timeout_secs = parse_u64("TRESTLE_ENGINE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TRESTLE_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("TRESTLE_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("TRESTLE_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("TRESTLE_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("TRESTLE_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("TRESTLE_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TRESTLE_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("TRESTLE_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("TRESTLE_BROKER_GENERIC_OPERATE_ENABLED") {
            self.broker.generic_operate_enabled =
                parse_bool("TRESTLE_BROKER_GENERIC_OPERATE_ENABLED", &value)?;
        }

        let log_level = read_env("TRESTLE_LOGGING_LEVEL").or_else(|| read_env("TRESTLE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TRESTLE_LOGGING_FORMAT").or_else(|| read_env("TRESTLE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(engine_base_url) = overrides.engine_base_url {
            self.engine.base_url = engine_base_url;
        }
        if let Some(engine_namespace) = overrides.engine_namespace {
            self.engine.namespace = engine_namespace;
        }
        if let Some(engine_api_token) = overrides.engine_api_token {
            self.engine.api_token = Some(secret_value(engine_api_token));
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(enabled) = overrides.generic_operate_enabled {
            self.broker.generic_operate_enabled = enabled;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_engine(&self.engine)?;
        validate_llm(&self.llm)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("trestle.toml"), PathBuf::from("config/trestle.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    let base_url = engine.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "engine.base_url must start with http:// or https://".to_string(),
        ));
    }

    if engine.namespace.trim().is_empty() {
        return Err(ConfigError::Validation("engine.namespace must not be empty".to_string()));
    }

    if engine.timeout_secs == 0 || engine.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "engine.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

// An absent llm.api_key is not a validation failure: the broker degrades to
// its deterministic paths when no chat model can be constructed.
fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    engine: Option<EnginePatch>,
    llm: Option<LlmPatch>,
    broker: Option<BrokerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    base_url: Option<String>,
    namespace: Option<String>,
    api_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct BrokerPatch {
    generic_operate_enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
