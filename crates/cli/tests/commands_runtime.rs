use std::env;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use tarla_cli::commands::ask::{self, AskArgs};
use tarla_cli::commands::{config, rules};
use tarla_core::config::LoadOptions;

const ENV_KEYS: [&str; 17] = [
    "TARLA_LLM_PROVIDER",
    "TARLA_LLM_API_KEY",
    "TARLA_LLM_BASE_URL",
    "TARLA_LLM_MODEL",
    "TARLA_LLM_TIMEOUT_SECS",
    "TARLA_LLM_MAX_RETRIES",
    "TARLA_CONTEXT_WEATHER_TIMEOUT_MS",
    "TARLA_CONTEXT_PROFILE_TIMEOUT_MS",
    "TARLA_CONTEXT_FORECAST_HORIZON_HOURS",
    "TARLA_ROUTING_CLARIFICATION_THRESHOLD",
    "TARLA_VALIDATION_ACCEPTANCE_THRESHOLD",
    "TARLA_VALIDATION_DEFAULT_GENERATION_CONFIDENCE",
    "TARLA_RULES_PATH",
    "TARLA_LOGGING_LEVEL",
    "TARLA_LOGGING_FORMAT",
    "TARLA_LOG_LEVEL",
    "TARLA_LOG_FORMAT",
];

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures").join("farm.toml")
}

fn ask_args(query: &str) -> AskArgs {
    AskArgs {
        farm: fixture_path(),
        query: query.to_string(),
        conversation_id: Some("conv-cli".to_string()),
        prior_intent: None,
        options: LoadOptions::default(),
    }
}

#[test]
fn ask_falls_back_to_rule_templates_when_generation_is_disabled() {
    with_env(&[("TARLA_LLM_PROVIDER", "disabled")], || {
        let result = ask::run(ask_args("Should I irrigate my cotton?"));
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "ask");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["data"]["terminal_state"], "accept_and_finish");
        assert_eq!(payload["data"]["intent"], "irrigation");
        assert_eq!(payload["data"]["conversation_id"], "conv-cli");
        assert_eq!(payload["data"]["rule_citations"][0], "IRR-001");
        assert_eq!(payload["data"]["structured_payload"]["primary"]["kind"], "irrigation");
    });
}

#[test]
fn ask_declines_off_topic_questions() {
    with_env(&[("TARLA_LLM_PROVIDER", "disabled")], || {
        let result = ask::run(ask_args("Tell me a joke about football"));
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["terminal_state"], "off_topic_reply");
        assert!(payload["data"]["structured_payload"].is_null());
    });
}

#[test]
fn ask_reports_missing_fixture() {
    with_env(&[("TARLA_LLM_PROVIDER", "disabled")], || {
        let mut args = ask_args("Should I irrigate?");
        args.farm = PathBuf::from("no/such/farm.toml");
        let result = ask::run(args);
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "fixture");
    });
}

#[test]
fn ask_rejects_unknown_prior_intent() {
    with_env(&[("TARLA_LLM_PROVIDER", "disabled")], || {
        let mut args = ask_args("what about tomorrow?");
        args.prior_intent = Some("astrology".to_string());
        let result = ask::run(args);
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_argument");
    });
}

#[test]
fn ask_returns_config_failure_for_out_of_range_threshold() {
    with_env(&[("TARLA_VALIDATION_ACCEPTANCE_THRESHOLD", "1.5")], || {
        let result = ask::run(ask_args("Should I irrigate?"));
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn ask_reports_unloadable_rule_table_with_a_safe_message() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(file, "this is not a rule table").expect("write rules");
    let path = file.path().to_string_lossy().to_string();

    with_env(&[("TARLA_LLM_PROVIDER", "disabled"), ("TARLA_RULES_PATH", path.as_str())], || {
        let result = ask::run(ask_args("Should I irrigate?"));
        assert_eq!(result.exit_code, 3);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "internal");
        let message = payload["message"].as_str().expect("message");
        assert!(message.starts_with("An unexpected internal error occurred."));
        assert!(message.ends_with("correlation id conv-cli)"));
    });
}

#[test]
fn rules_lists_one_category_from_the_builtin_table() {
    with_env(&[], || {
        let result = rules::run(Some("irrigation"), LoadOptions::default());
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        let listed = payload["data"]["rules"].as_array().expect("rule list");
        assert!(!listed.is_empty());
        assert!(listed.iter().all(|rule| rule["category"] == "irrigation"));
        assert!(listed.iter().any(|rule| rule["id"] == "IRR-001"));
        assert!(payload["message"].as_str().is_some_and(|message| message.ends_with("from builtin")));
    });
}

#[test]
fn rules_rejects_unknown_category() {
    with_env(&[], || {
        let result = rules::run(Some("astrology"), LoadOptions::default());
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "invalid_argument");
    });
}

#[test]
fn rules_loads_the_configured_rule_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    write!(
        file,
        r#"
version = "test-1"

[[rules]]
id = "TST-001"
category = "weather"
priority = "low"
base_confidence = 0.5
template = "Check the sky before spraying."
directive = {{ action = "look_up", affirm = ["sky"] }}
conditions = [
  {{ field = "weather.temperature_c", op = "gte", value = 0 }},
]
"#
    )
    .expect("write rules");
    let path = file.path().to_string_lossy().to_string();

    with_env(&[("TARLA_RULES_PATH", path.as_str())], || {
        let result = rules::run(None, LoadOptions::default());
        assert_eq!(result.exit_code, 0, "unexpected output: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["version"], "test-1");
        assert_eq!(payload["data"]["rules"].as_array().map(Vec::len), Some(1));
        assert_eq!(payload["data"]["rules"][0]["action"], "look_up");
    });
}

#[test]
fn config_reports_sources_and_redacts_api_key() {
    with_env(
        &[
            ("TARLA_LLM_PROVIDER", "openai"),
            ("TARLA_LLM_API_KEY", "sk-live-secret"),
            ("TARLA_LLM_BASE_URL", "https://api.openai.com"),
            ("TARLA_LLM_MODEL", "gpt-4o-mini"),
        ],
        || {
            let output = config::run(LoadOptions::default());
            assert!(output.starts_with("effective config"));
            assert!(output.contains("- llm.model = gpt-4o-mini (source: env (TARLA_LLM_MODEL))"));
            assert!(output.contains("- llm.api_key = sk-*** (source: env (TARLA_LLM_API_KEY))"));
            assert!(output.contains("- routing.clarification_threshold = 0.6 (source: default)"));
            assert!(!output.contains("live-secret"));
        },
    );
}

#[test]
fn config_reports_validation_failure() {
    with_env(&[("TARLA_LLM_PROVIDER", "openai")], || {
        let output = config::run(LoadOptions::default());
        assert!(output.starts_with("config validation failed"), "unexpected output: {output}");
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let previous_values: Vec<(&str, Option<String>)> =
        ENV_KEYS.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &ENV_KEYS {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        match value {
            Some(value) => env::set_var(key, value),
            None => env::remove_var(key),
        }
    }
}
