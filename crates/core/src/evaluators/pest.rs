use serde::{Deserialize, Serialize};

use super::{round_to, DomainOutput, EvaluatorError, SpecialistEvaluator};
use crate::domain::context::{ContextSnapshot, WeatherWindow};
use crate::domain::intent::Category;
use crate::domain::recommendation::Priority;

pub const HIGH_RISK: f64 = 0.7;
pub const MODERATE_RISK: f64 = 0.4;

/// Pests the router and this evaluator recognise by name.
pub const KNOWN_PESTS: [&str; 7] = [
    "cotton bollworm",
    "colorado potato beetle",
    "codling moth",
    "spider mite",
    "whitefly",
    "locust",
    "aphid",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMethod {
    Chemical,
    Integrated,
    Biological,
    Cultural,
    Monitoring,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_RISK {
            Self::High
        } else if score >= MODERATE_RISK {
            Self::Moderate
        } else {
            Self::Low
        }
    }
}

pub fn named_pest_profile(pest: &str) -> Option<(Priority, ControlMethod)> {
    let profile = match pest.trim().to_ascii_lowercase().as_str() {
        "cotton bollworm" | "locust" => (Priority::Critical, ControlMethod::Chemical),
        "spider mite" | "colorado potato beetle" => (Priority::High, ControlMethod::Chemical),
        "whitefly" => (Priority::High, ControlMethod::Integrated),
        "aphid" => (Priority::Medium, ControlMethod::Biological),
        "codling moth" => (Priority::Medium, ControlMethod::Integrated),
        _ => return None,
    };
    Some(profile)
}

/// Weighted environmental risk in [0, 1].
pub fn environmental_risk(weather: &WeatherWindow) -> f64 {
    let temperature = ((weather.temperature_c - 15.0) / 15.0).clamp(0.0, 1.0);
    let humidity = ((weather.humidity_pct - 50.0) / 40.0).clamp(0.0, 1.0);
    let rain = (weather.rainfall_7d_mm / 50.0).clamp(0.0, 1.0);
    let score = 0.4 * temperature + 0.4 * humidity + 0.2 * rain;
    if score.is_finite() {
        round_to(score, 3)
    } else {
        0.0
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PestAssessment {
    pub pest: Option<String>,
    pub severity: Priority,
    pub method: ControlMethod,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
}

impl PestAssessment {
    pub fn summary(&self) -> String {
        match &self.pest {
            Some(pest) => format!(
                "{pest}: {} severity, {} control recommended.",
                self.severity,
                method_label(self.method)
            ),
            None => format!(
                "No pest reported; environmental risk {} ({:?}), {} recommended.",
                self.risk_score,
                self.risk_level,
                method_label(self.method)
            ),
        }
    }
}

fn method_label(method: ControlMethod) -> &'static str {
    match method {
        ControlMethod::Chemical => "chemical",
        ControlMethod::Integrated => "integrated",
        ControlMethod::Biological => "biological",
        ControlMethod::Cultural => "preventive cultural",
        ControlMethod::Monitoring => "routine monitoring",
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PestEvaluator;

impl SpecialistEvaluator for PestEvaluator {
    fn category(&self) -> Category {
        Category::PestControl
    }

    fn evaluate(&self, snapshot: &ContextSnapshot) -> Result<DomainOutput, EvaluatorError> {
        assess_pest(snapshot).map(DomainOutput::PestControl)
    }
}

pub fn assess_pest(snapshot: &ContextSnapshot) -> Result<PestAssessment, EvaluatorError> {
    let risk_score = environmental_risk(&snapshot.weather);
    let risk_level = RiskLevel::from_score(risk_score);

    if let Some(pest) = snapshot.crop.observed_pest.as_deref() {
        let (severity, method) =
            named_pest_profile(pest).ok_or_else(|| EvaluatorError::unknown("pest", pest))?;
        return Ok(PestAssessment {
            pest: Some(pest.trim().to_ascii_lowercase()),
            severity,
            method,
            risk_score,
            risk_level,
        });
    }

    let (severity, method) = match risk_level {
        RiskLevel::High => (Priority::High, ControlMethod::Cultural),
        RiskLevel::Moderate => (Priority::Medium, ControlMethod::Monitoring),
        RiskLevel::Low => (Priority::Low, ControlMethod::Monitoring),
    };
    Ok(PestAssessment { pest: None, severity, method, risk_score, risk_level })
}
