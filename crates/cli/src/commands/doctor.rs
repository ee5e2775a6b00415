use serde::Serialize;

use trestle_agent::build_model;
use trestle_core::config::{AppConfig, LoadOptions};
use trestle_engine::HttpEngineClient;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        return serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        });
    }

    render_human(&report)
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });
            checks.push(check_engine_connectivity(&config));
            checks.push(check_model_configuration(&config));
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            checks.push(DoctorCheck {
                name: "engine_connectivity",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
            checks.push(DoctorCheck {
                name: "model_configuration",
                status: CheckStatus::Skipped,
                details: "skipped because configuration did not load".to_string(),
            });
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_engine_connectivity(config: &AppConfig) -> DoctorCheck {
    let client = match HttpEngineClient::from_config(&config.engine) {
        Ok(client) => client,
        Err(error) => {
            return DoctorCheck {
                name: "engine_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to construct engine client: {error}"),
            };
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return DoctorCheck {
                name: "engine_connectivity",
                status: CheckStatus::Fail,
                details: format!("failed to initialize async runtime: {error}"),
            };
        }
    };

    match runtime.block_on(client.health_check()) {
        Ok(()) => DoctorCheck {
            name: "engine_connectivity",
            status: CheckStatus::Pass,
            details: format!("engine answered a status read at `{}`", config.engine.base_url),
        },
        Err(error) => DoctorCheck {
            name: "engine_connectivity",
            status: CheckStatus::Fail,
            details: format!("engine status read failed: {error}"),
        },
    }
}

// Constructs the client without spending a model call; a missing key is a
// supported degraded mode, not a failure.
fn check_model_configuration(config: &AppConfig) -> DoctorCheck {
    if config.llm.api_key.is_none() {
        return DoctorCheck {
            name: "model_configuration",
            status: CheckStatus::Pass,
            details: "no llm.api_key configured; broker serves deterministic paths only"
                .to_string(),
        };
    }

    match build_model(&config.llm) {
        Ok(Some(model)) => DoctorCheck {
            name: "model_configuration",
            status: CheckStatus::Pass,
            details: format!("chat model client ready ({})", model.model_id()),
        },
        Ok(None) => DoctorCheck {
            name: "model_configuration",
            status: CheckStatus::Pass,
            details: "no llm.api_key configured; broker serves deterministic paths only"
                .to_string(),
        },
        Err(error) => DoctorCheck {
            name: "model_configuration",
            status: CheckStatus::Fail,
            details: format!("failed to construct model client: {error}"),
        },
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
