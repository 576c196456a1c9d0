use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tarla_agent::context::{StaticFarmProfileProvider, StaticWeatherProvider};
use tarla_agent::runtime::{AgentRuntime, TurnRequest};
use tarla_core::config::{AppConfig, LoadOptions};
use tarla_core::domain::context::{CropState, FarmProfile, FarmRecord, SoilState, WeatherWindow};
use tarla_core::domain::intent::Intent;
use tarla_core::errors::{ApplicationError, InterfaceError};

use crate::commands::CommandResult;

#[derive(Clone, Debug)]
pub struct AskArgs {
    pub farm: PathBuf,
    pub query: String,
    pub conversation_id: Option<String>,
    pub prior_intent: Option<String>,
    pub options: LoadOptions,
}

/// Farm fixture read by `tarla ask --farm`. Stands in for the weather and
/// farm-profile services.
#[derive(Clone, Debug, Deserialize)]
pub struct FarmFixture {
    pub profile: FarmProfile,
    #[serde(default)]
    pub soil: SoilState,
    #[serde(default)]
    pub crop: CropState,
    #[serde(default)]
    pub weather: WeatherWindow,
}

impl FarmFixture {
    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = fs::read_to_string(path)
            .map_err(|error| format!("could not read farm fixture `{}`: {error}", path.display()))?;
        toml::from_str(&raw)
            .map_err(|error| format!("could not parse farm fixture `{}`: {error}", path.display()))
    }

    fn record(&self) -> FarmRecord {
        FarmRecord { profile: self.profile.clone(), soil: self.soil.clone(), crop: self.crop.clone() }
    }
}

pub fn run(args: AskArgs) -> CommandResult {
    let config = match AppConfig::load(args.options.clone()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let fixture = match FarmFixture::load(&args.farm) {
        Ok(fixture) => fixture,
        Err(message) => return CommandResult::failure("ask", "fixture", message, 2),
    };

    let prior_intent = match args.prior_intent.as_deref().map(str::parse::<Intent>).transpose() {
        Ok(intent) => intent,
        Err(error) => return CommandResult::failure("ask", "invalid_argument", error.to_string(), 2),
    };

    let conversation_id = args.conversation_id.unwrap_or_else(|| "cli".to_string());
    let agent = match AgentRuntime::from_config(
        &config,
        Arc::new(StaticWeatherProvider::new(fixture.weather.clone())),
        Arc::new(StaticFarmProfileProvider::new([fixture.record()])),
    ) {
        Ok(agent) => agent,
        Err(error) => return interface_failure(error, &conversation_id, 3),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let mut request = TurnRequest::new(
        conversation_id.clone(),
        fixture.profile.farm_id.clone(),
        fixture.profile.region.clone(),
        args.query,
    );
    if let Some(intent) = prior_intent {
        request = request.with_prior_intent(intent);
    }

    let outcome = runtime.block_on(agent.handle_turn_until(request, interrupted()));
    let response = match outcome {
        Ok(response) => response,
        Err(ApplicationError::Cancelled) => {
            return CommandResult::failure("ask", "cancelled", "turn interrupted", 130);
        }
        Err(error) => return interface_failure(error, &conversation_id, 4),
    };

    let message = format!(
        "{} ({}, confidence {:.2})",
        response.terminal_state.as_str(),
        response.intent,
        response.confidence
    );
    match serde_json::to_value(&response) {
        Ok(data) => CommandResult::success_with("ask", message, Some(data)),
        Err(error) => CommandResult::failure("ask", "serialization", error.to_string(), 5),
    }
}

fn interface_failure(error: ApplicationError, correlation_id: &str, exit_code: u8) -> CommandResult {
    let interface = error.into_interface(correlation_id);
    let error_class = match &interface {
        InterfaceError::BadRequest { .. } => "bad_request",
        InterfaceError::ServiceUnavailable { .. } => "service_unavailable",
        InterfaceError::Internal { .. } => "internal",
    };
    let message = format!(
        "{} ({interface}; correlation id {})",
        interface.user_message(),
        interface.correlation_id()
    );
    CommandResult::failure("ask", error_class, message, exit_code)
}

async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tarla_core::domain::context::GrowthStage;

    use super::FarmFixture;

    #[test]
    fn fixture_sections_default_when_omitted() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"
[profile]
farm_id = "farm-0007"
region = "shirvan"
crop = "wheat"
soil_type = "loam"
hectares = 12.5
farmer_age = 27
"#
        )
        .expect("write fixture");

        let fixture = FarmFixture::load(file.path()).expect("fixture parses");
        assert_eq!(fixture.profile.crop, "wheat");
        assert_eq!(fixture.crop.growth_stage, GrowthStage::default());
        assert_eq!(fixture.weather.horizon_hours, 24);
        assert_eq!(fixture.soil.ph, 7.0);
    }

    #[test]
    fn unreadable_fixture_reports_path() {
        let error = FarmFixture::load(std::path::Path::new("does/not/exist.toml"))
            .expect_err("missing fixture");
        assert!(error.contains("does/not/exist.toml"));
    }
}
