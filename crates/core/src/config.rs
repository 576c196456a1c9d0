use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flows::MAX_RETRIES;
use crate::validation::{ScoringPolicy, DEFAULT_ACCEPTANCE_THRESHOLD};

pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["tarla.toml", "config/tarla.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub context: ContextConfig,
    pub routing: RoutingConfig,
    pub validation: ValidationConfig,
    pub rules: RulesConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    /// Validation-driven specialist retries per turn.
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ContextConfig {
    pub weather_timeout_ms: u64,
    pub profile_timeout_ms: u64,
    pub forecast_horizon_hours: u32,
}

#[derive(Clone, Debug)]
pub struct RoutingConfig {
    pub clarification_threshold: f64,
}

#[derive(Clone, Debug)]
pub struct ValidationConfig {
    pub acceptance_threshold: f64,
    pub default_generation_confidence: f64,
}

#[derive(Clone, Debug, Default)]
pub struct RulesConfig {
    /// Rule table to load instead of the builtin one.
    pub path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
    Disabled,
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
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub rules_path: Option<PathBuf>,
    pub acceptance_threshold: Option<f64>,
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
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: MAX_RETRIES,
            },
            context: ContextConfig {
                weather_timeout_ms: 800,
                profile_timeout_ms: 500,
                forecast_horizon_hours: 24,
            },
            routing: RoutingConfig { clarification_threshold: 0.6 },
            validation: ValidationConfig {
                acceptance_threshold: DEFAULT_ACCEPTANCE_THRESHOLD,
                default_generation_confidence: ScoringPolicy::default().default_generation_confidence,
            },
            rules: RulesConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
            Self::Disabled => "disabled",
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            "disabled" | "none" => Ok(Self::Disabled),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama|disabled)"
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
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn scoring_policy(&self) -> ScoringPolicy {
        ScoringPolicy {
            default_generation_confidence: self.validation.default_generation_confidence,
            ..ScoringPolicy::default()
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(llm_api_key_value.into());
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

        if let Some(context) = patch.context {
            if let Some(weather_timeout_ms) = context.weather_timeout_ms {
                self.context.weather_timeout_ms = weather_timeout_ms;
            }
            if let Some(profile_timeout_ms) = context.profile_timeout_ms {
                self.context.profile_timeout_ms = profile_timeout_ms;
            }
            if let Some(forecast_horizon_hours) = context.forecast_horizon_hours {
                self.context.forecast_horizon_hours = forecast_horizon_hours;
            }
        }

        if let Some(routing) = patch.routing {
            if let Some(threshold) = routing.clarification_threshold {
                self.routing.clarification_threshold = threshold;
            }
        }

        if let Some(validation) = patch.validation {
            if let Some(threshold) = validation.acceptance_threshold {
                self.validation.acceptance_threshold = threshold;
            }
            if let Some(confidence) = validation.default_generation_confidence {
                self.validation.default_generation_confidence = confidence;
            }
        }

        if let Some(rules) = patch.rules {
            if let Some(path) = rules.path {
                self.rules.path = Some(path);
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
        if let Some(value) = read_env("TARLA_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("TARLA_LLM_API_KEY") {
            self.llm.api_key = Some(value.into());
        }
        if let Some(value) = read_env("TARLA_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("TARLA_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("TARLA_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("TARLA_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("TARLA_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_env("TARLA_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("TARLA_CONTEXT_WEATHER_TIMEOUT_MS") {
            self.context.weather_timeout_ms = parse_env("TARLA_CONTEXT_WEATHER_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("TARLA_CONTEXT_PROFILE_TIMEOUT_MS") {
            self.context.profile_timeout_ms = parse_env("TARLA_CONTEXT_PROFILE_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = read_env("TARLA_CONTEXT_FORECAST_HORIZON_HOURS") {
            self.context.forecast_horizon_hours =
                parse_env("TARLA_CONTEXT_FORECAST_HORIZON_HOURS", &value)?;
        }

        if let Some(value) = read_env("TARLA_ROUTING_CLARIFICATION_THRESHOLD") {
            self.routing.clarification_threshold =
                parse_env("TARLA_ROUTING_CLARIFICATION_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("TARLA_VALIDATION_ACCEPTANCE_THRESHOLD") {
            self.validation.acceptance_threshold =
                parse_env("TARLA_VALIDATION_ACCEPTANCE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("TARLA_VALIDATION_DEFAULT_GENERATION_CONFIDENCE") {
            self.validation.default_generation_confidence =
                parse_env("TARLA_VALIDATION_DEFAULT_GENERATION_CONFIDENCE", &value)?;
        }

        if let Some(value) = read_env("TARLA_RULES_PATH") {
            self.rules.path = Some(PathBuf::from(value));
        }

        let log_level = read_env("TARLA_LOGGING_LEVEL").or_else(|| read_env("TARLA_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format = read_env("TARLA_LOGGING_FORMAT").or_else(|| read_env("TARLA_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(rules_path) = overrides.rules_path {
            self.rules.path = Some(rules_path);
        }
        if let Some(threshold) = overrides.acceptance_threshold {
            self.validation.acceptance_threshold = threshold;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_context(&self.context)?;
        validate_unit_interval("routing.clarification_threshold", self.routing.clarification_threshold)?;
        validate_unit_interval("validation.acceptance_threshold", self.validation.acceptance_threshold)?;
        validate_unit_interval(
            "validation.default_generation_confidence",
            self.validation.default_generation_confidence,
        )?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_FILES.into_iter().map(PathBuf::from).find(|path| path.exists())
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

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if llm.max_retries > 5 {
        return Err(ConfigError::Validation("llm.max_retries must be in range 0..=5".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for the ollama provider".to_string(),
                ));
            }
        }
        LlmProvider::Disabled => {}
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

fn validate_context(context: &ContextConfig) -> Result<(), ConfigError> {
    for (key, value) in [
        ("context.weather_timeout_ms", context.weather_timeout_ms),
        ("context.profile_timeout_ms", context.profile_timeout_ms),
    ] {
        if value == 0 || value > 60_000 {
            return Err(ConfigError::Validation(format!("{key} must be in range 1..=60000")));
        }
    }
    if context.forecast_horizon_hours == 0 || context.forecast_horizon_hours > 240 {
        return Err(ConfigError::Validation(
            "context.forecast_horizon_hours must be in range 1..=240".to_string(),
        ));
    }
    Ok(())
}

fn validate_unit_interval(key: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!("{key} must be within 0.0..=1.0, got {value}")))
    }
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

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    context: Option<ContextPatch>,
    routing: Option<RoutingPatch>,
    validation: Option<ValidationPatch>,
    rules: Option<RulesPatch>,
    logging: Option<LoggingPatch>,
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
struct ContextPatch {
    weather_timeout_ms: Option<u64>,
    profile_timeout_ms: Option<u64>,
    forecast_horizon_hours: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RoutingPatch {
    clarification_threshold: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ValidationPatch {
    acceptance_threshold: Option<f64>,
    default_generation_confidence: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RulesPatch {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
