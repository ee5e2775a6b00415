pub mod ask;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod doctor;

use std::sync::Arc;

use serde::Serialize;

use trestle_agent::{build_model, ActionBroker};
use trestle_core::audit::TracingAuditSink;
use trestle_core::config::{AppConfig, LoadOptions};
use trestle_engine::HttpEngineClient;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Everything the broker-driving commands share: the broker itself, a
/// runtime to block on it, and the configured default namespace.
pub(crate) struct BrokerHandle {
    pub broker: ActionBroker,
    pub runtime: tokio::runtime::Runtime,
    pub default_namespace: String,
}

pub(crate) fn build_broker(command: &str) -> Result<BrokerHandle, CommandResult> {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return Err(CommandResult::failure(command, "config_validation", error.to_string(), 2))
        }
    };
    init_logging(&config);

    let engine = match HttpEngineClient::from_config(&config.engine) {
        Ok(client) => Arc::new(client),
        Err(error) => {
            return Err(CommandResult::failure(command, "engine_client", error.to_string(), 3))
        }
    };
    let model = match build_model(&config.llm) {
        Ok(model) => model,
        Err(error) => {
            return Err(CommandResult::failure(command, "model_client", error.to_string(), 4))
        }
    };
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return Err(CommandResult::failure(
                command,
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                5,
            ))
        }
    };

    let broker = ActionBroker::new(engine, model, &config).with_audit(Arc::new(TracingAuditSink));
    Ok(BrokerHandle { broker, runtime, default_namespace: config.engine.namespace })
}

// Logs go to stderr so machine-readable stdout stays clean; repeated runs
// inside one process keep the first subscriber.
fn init_logging(config: &AppConfig) {
    use trestle_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    let _ = match config.logging.format {
        Compact => builder.compact().try_init(),
        Pretty => builder.pretty().try_init(),
        Json => builder.json().try_init(),
    };
}
