use std::env;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use trestle_agent::NO_MODEL_REPLY;
use trestle_cli::commands::{ask, config, doctor};

#[test]
fn ask_reports_config_failure_with_invalid_env() {
    with_env(&[("TRESTLE_ENGINE_BASE_URL", "ftp://wrong-scheme")], || {
        let result = ask::run("what is the production status?", false, None);
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn ask_gates_deployment_requests_without_an_engine_call() {
    // Served by the deterministic approval path: no engine is listening and
    // no model key is set, yet the request settles into queued proposals.
    with_env(&[], || {
        let result = ask::run("approve the deployment of the new build", true, None);
        assert_eq!(result.exit_code, 0, "expected offline approval flow to succeed");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["source"], "direct-action-broker");
        assert_eq!(payload["execution"]["mode"], "approval-required");
        assert_eq!(payload["execution"]["executedCount"], 0);
        assert_eq!(payload["actions"][0]["requiresApproval"], true);
        assert_eq!(payload["actions"][0]["status"], "pending-approval");

        let reply = payload["reply"].as_str().unwrap_or_default();
        assert!(reply.contains("Human approval is required"));
    });
}

#[test]
fn ask_answers_plain_chat_without_a_model() {
    with_env(&[], || {
        let result = ask::run("hello there", false, None);
        assert_eq!(result.exit_code, 0, "expected plain chat fallback to succeed");
        assert_eq!(result.output, NO_MODEL_REPLY);
    });
}

#[test]
fn config_reports_sources_and_redacts_tokens() {
    with_env(
        &[
            ("TRESTLE_ENGINE_NAMESPACE", "QA"),
            ("TRESTLE_ENGINE_API_TOKEN", "tok-secret-value"),
            ("TRESTLE_LOG_LEVEL", "warn"),
        ],
        || {
            let output = config::run();

            assert!(output
                .contains("- engine.namespace = QA (source: env (TRESTLE_ENGINE_NAMESPACE))"));
            assert!(output.contains(
                "- engine.api_token = tok-*** (source: env (TRESTLE_ENGINE_API_TOKEN))"
            ));
            assert!(!output.contains("tok-secret-value"), "secret must not be printed");
            assert!(
                output.contains("- logging.level = warn (source: env (TRESTLE_LOG_LEVEL))"),
                "alias env key should be attributed"
            );
            assert!(output
                .contains("- engine.base_url = http://127.0.0.1:9980/api (source: default)"));
            assert!(output.contains("- llm.api_key = <unset> (source: default)"));
        },
    );
}

#[test]
fn doctor_flags_an_unreachable_engine() {
    // Port 1 is expected to refuse connections.
    with_env(&[("TRESTLE_ENGINE_BASE_URL", "http://127.0.0.1:1/api")], || {
        let payload = parse_payload(&doctor::run(true));

        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["name"], "config_validation");
        assert_eq!(payload["checks"][0]["status"], "pass");
        assert_eq!(payload["checks"][1]["name"], "engine_connectivity");
        assert_eq!(payload["checks"][1]["status"], "fail");
        assert_eq!(payload["checks"][2]["name"], "model_configuration");
        assert_eq!(payload["checks"][2]["status"], "pass");
    });
}

#[test]
fn doctor_skips_dependent_checks_when_config_fails() {
    with_env(&[("TRESTLE_ENGINE_BASE_URL", "ftp://wrong-scheme")], || {
        let payload = parse_payload(&doctor::run(true));

        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["status"], "fail");
        assert_eq!(payload["checks"][1]["status"], "skipped");
        assert_eq!(payload["checks"][2]["status"], "skipped");
    });
}

#[test]
fn doctor_renders_human_markers_per_check() {
    with_env(&[("TRESTLE_ENGINE_BASE_URL", "ftp://wrong-scheme")], || {
        let output = doctor::run(false);
        assert!(output.starts_with("doctor: one or more readiness checks failed"));
        assert!(output.contains("- [fail] config_validation:"));
        assert!(output.contains("- [skip] engine_connectivity:"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "TRESTLE_ENGINE_BASE_URL",
        "TRESTLE_ENGINE_NAMESPACE",
        "TRESTLE_ENGINE_API_TOKEN",
        "TRESTLE_ENGINE_TIMEOUT_SECS",
        "TRESTLE_LLM_PROVIDER",
        "TRESTLE_LLM_API_KEY",
        "TRESTLE_LLM_BASE_URL",
        "TRESTLE_LLM_MODEL",
        "TRESTLE_LLM_TIMEOUT_SECS",
        "TRESTLE_LLM_MAX_RETRIES",
        "TRESTLE_BROKER_GENERIC_OPERATE_ENABLED",
        "TRESTLE_LOGGING_LEVEL",
        "TRESTLE_LOGGING_FORMAT",
        "TRESTLE_LOG_LEVEL",
        "TRESTLE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
