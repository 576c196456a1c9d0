use std::env;
use std::fs;
use std::path::Path;

use secrecy::ExposeSecret;
use tarla_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

pub fn run(options: LoadOptions) -> String {
    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    for field in fields(&config) {
        let source =
            field_source(field.key, field.env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(field.key, &field.value, source));
    }
    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let api_key = config
        .llm
        .api_key
        .as_ref()
        .map(|key| redact_token(key.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let rules_path = config
        .rules
        .path
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<builtin>".to_string());

    vec![
        Field { key: "llm.provider", env_keys: &["TARLA_LLM_PROVIDER"], value: config.llm.provider.as_str().to_string() },
        Field { key: "llm.api_key", env_keys: &["TARLA_LLM_API_KEY"], value: api_key },
        Field {
            key: "llm.base_url",
            env_keys: &["TARLA_LLM_BASE_URL"],
            value: config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        },
        Field { key: "llm.model", env_keys: &["TARLA_LLM_MODEL"], value: config.llm.model.clone() },
        Field {
            key: "llm.timeout_secs",
            env_keys: &["TARLA_LLM_TIMEOUT_SECS"],
            value: config.llm.timeout_secs.to_string(),
        },
        Field {
            key: "llm.max_retries",
            env_keys: &["TARLA_LLM_MAX_RETRIES"],
            value: config.llm.max_retries.to_string(),
        },
        Field {
            key: "context.weather_timeout_ms",
            env_keys: &["TARLA_CONTEXT_WEATHER_TIMEOUT_MS"],
            value: config.context.weather_timeout_ms.to_string(),
        },
        Field {
            key: "context.profile_timeout_ms",
            env_keys: &["TARLA_CONTEXT_PROFILE_TIMEOUT_MS"],
            value: config.context.profile_timeout_ms.to_string(),
        },
        Field {
            key: "context.forecast_horizon_hours",
            env_keys: &["TARLA_CONTEXT_FORECAST_HORIZON_HOURS"],
            value: config.context.forecast_horizon_hours.to_string(),
        },
        Field {
            key: "routing.clarification_threshold",
            env_keys: &["TARLA_ROUTING_CLARIFICATION_THRESHOLD"],
            value: config.routing.clarification_threshold.to_string(),
        },
        Field {
            key: "validation.acceptance_threshold",
            env_keys: &["TARLA_VALIDATION_ACCEPTANCE_THRESHOLD"],
            value: config.validation.acceptance_threshold.to_string(),
        },
        Field {
            key: "validation.default_generation_confidence",
            env_keys: &["TARLA_VALIDATION_DEFAULT_GENERATION_CONFIDENCE"],
            value: config.validation.default_generation_confidence.to_string(),
        },
        Field { key: "rules.path", env_keys: &["TARLA_RULES_PATH"], value: rules_path },
        Field {
            key: "logging.level",
            env_keys: &["TARLA_LOGGING_LEVEL", "TARLA_LOG_LEVEL"],
            value: config.logging.level.clone(),
        },
        Field {
            key: "logging.format",
            env_keys: &["TARLA_LOGGING_FORMAT", "TARLA_LOG_FORMAT"],
            value: format!("{:?}", config.logging.format).to_lowercase(),
        },
    ]
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
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
