//! Deterministic specialist evaluators.
//!
//! Each evaluator maps a [`ContextSnapshot`] to a [`DomainOutput`] using fixed
//! agronomic tables. Evaluators never perform I/O and return the same output for
//! the same snapshot.

pub mod fertilization;
pub mod harvest;
pub mod irrigation;
pub mod pest;
pub mod subsidy;
pub mod weather;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::context::ContextSnapshot;
use crate::domain::intent::Category;
use crate::domain::recommendation::Priority;

pub use fertilization::{FertilizationEvaluator, FertilizationPlan};
pub use harvest::{HarvestEvaluator, HarvestForecast};
pub use irrigation::{IrrigationAction, IrrigationEvaluator, IrrigationPlan, IrrigationTiming};
pub use pest::{ControlMethod, PestAssessment, PestEvaluator, RiskLevel};
pub use subsidy::{SubsidyAdjustment, SubsidyEstimate, SubsidyEvaluator};
pub use weather::{WeatherBrief, WeatherEvaluator};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EvaluatorError {
    #[error("no {kind} entry for `{key}`")]
    UnknownCategoryKey { kind: &'static str, key: String },
    #[error("`{field}` cannot be evaluated: {reason}")]
    InvalidInput { field: &'static str, reason: String },
}

impl EvaluatorError {
    pub(crate) fn unknown(kind: &'static str, key: &str) -> Self {
        Self::UnknownCategoryKey { kind, key: key.to_string() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainOutput {
    Irrigation(IrrigationPlan),
    Fertilization(FertilizationPlan),
    PestControl(PestAssessment),
    Subsidy(SubsidyEstimate),
    Harvest(HarvestForecast),
    Weather(WeatherBrief),
}

impl DomainOutput {
    pub fn category(&self) -> Category {
        match self {
            Self::Irrigation(_) => Category::Irrigation,
            Self::Fertilization(_) => Category::Fertilization,
            Self::PestControl(_) => Category::PestControl,
            Self::Subsidy(_) => Category::Subsidy,
            Self::Harvest(_) => Category::Harvest,
            Self::Weather(_) => Category::Weather,
        }
    }

    /// Urgency implied by the output alone, before any rule is consulted.
    pub fn priority(&self) -> Priority {
        match self {
            Self::Irrigation(plan) => match plan.action {
                IrrigationAction::Irrigate if plan.deficit_pct >= 10.0 => Priority::High,
                IrrigationAction::Irrigate => Priority::Medium,
                IrrigationAction::Defer | IrrigationAction::NotNeeded => Priority::Low,
            },
            Self::Fertilization(plan) if plan.total_kg_per_ha() > 0.0 => Priority::Medium,
            Self::Fertilization(_) => Priority::Low,
            Self::PestControl(assessment) => assessment.severity,
            Self::Subsidy(_) => Priority::Low,
            Self::Harvest(forecast) if forecast.remaining_gdd <= 0.0 => Priority::High,
            Self::Harvest(_) => Priority::Low,
            Self::Weather(brief) if brief.rain_expected_24h || brief.temperature_c >= 35.0 => {
                Priority::Medium
            }
            Self::Weather(_) => Priority::Low,
        }
    }

    /// One-line plain-language statement of the deterministic finding, used in
    /// prompts and in the rule-only fallback body.
    pub fn summary(&self) -> String {
        match self {
            Self::Irrigation(plan) => plan.summary(),
            Self::Fertilization(plan) => plan.summary(),
            Self::PestControl(assessment) => assessment.summary(),
            Self::Subsidy(estimate) => estimate.summary(),
            Self::Harvest(forecast) => forecast.summary(),
            Self::Weather(brief) => brief.summary(),
        }
    }
}

pub trait SpecialistEvaluator: Send + Sync {
    fn category(&self) -> Category;

    fn evaluate(&self, snapshot: &ContextSnapshot) -> Result<DomainOutput, EvaluatorError>;
}

static IRRIGATION: IrrigationEvaluator = IrrigationEvaluator;
static FERTILIZATION: FertilizationEvaluator = FertilizationEvaluator;
static PEST: PestEvaluator = PestEvaluator;
static SUBSIDY: SubsidyEvaluator = SubsidyEvaluator;
static HARVEST: HarvestEvaluator = HarvestEvaluator;
static WEATHER: WeatherEvaluator = WeatherEvaluator;

/// Closed dispatch table. General advice has no specialist.
pub fn evaluator_for(category: Category) -> Option<&'static dyn SpecialistEvaluator> {
    match category {
        Category::Irrigation => Some(&IRRIGATION),
        Category::Fertilization => Some(&FERTILIZATION),
        Category::PestControl => Some(&PEST),
        Category::Subsidy => Some(&SUBSIDY),
        Category::Harvest => Some(&HARVEST),
        Category::Weather => Some(&WEATHER),
        Category::General => None,
    }
}

pub(crate) fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::{evaluator_for, EvaluatorError};
    use crate::domain::context::fixtures::snapshot;
    use crate::domain::intent::Category;

    #[test]
    fn dispatch_table_covers_every_specialist_category() {
        for category in Category::ALL {
            match evaluator_for(category) {
                Some(evaluator) => assert_eq!(evaluator.category(), category),
                None => assert_eq!(category, Category::General),
            }
        }
    }

    #[test]
    fn evaluators_are_idempotent() {
        let snapshot = snapshot("cotton", "sandy")
            .with_reported_pest(Some("whitefly".to_string()));
        for category in Category::ALL {
            let Some(evaluator) = evaluator_for(category) else {
                continue;
            };
            let first = evaluator.evaluate(&snapshot);
            let second = evaluator.evaluate(&snapshot);
            assert_eq!(first, second, "{category} evaluator is not idempotent");
            assert!(first.is_ok());
        }
    }

    #[test]
    fn unknown_crop_surfaces_as_unknown_category_key() {
        let snapshot = snapshot("quinoa", "sandy");
        let error = evaluator_for(Category::Fertilization)
            .expect("fertilization evaluator")
            .evaluate(&snapshot)
            .expect_err("quinoa has no nutrient table");
        assert_eq!(
            error,
            EvaluatorError::UnknownCategoryKey { kind: "crop", key: "quinoa".to_string() }
        );
    }
}
