use serde::{Deserialize, Serialize};

use super::{round_to, DomainOutput, EvaluatorError, SpecialistEvaluator};
use crate::domain::context::ContextSnapshot;
use crate::domain::intent::Category;

/// Above this air temperature, watering moves to the cool hours.
pub const HEAT_THRESHOLD_C: f64 = 30.0;
/// Liters per hectare for each percentage point of moisture deficit.
pub const LITERS_PER_HA_PER_POINT: f64 = 10_000.0;

/// Minimum volumetric moisture (%) before the crop needs water, by soil type.
pub fn moisture_threshold(soil_type: &str) -> Option<f64> {
    let threshold = match soil_type.trim().to_ascii_lowercase().as_str() {
        "sandy" => 30.0,
        "sandy_loam" => 32.0,
        "calcareous" => 33.0,
        "saline" => 34.0,
        "loam" => 35.0,
        "silt" => 36.0,
        "clay_loam" => 38.0,
        "clay" => 40.0,
        _ => return None,
    };
    Some(threshold)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrrigationAction {
    Irrigate,
    Defer,
    NotNeeded,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IrrigationTiming {
    Anytime,
    EarlyMorningOrEvening,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IrrigationPlan {
    pub action: IrrigationAction,
    pub timing: IrrigationTiming,
    pub soil_type: String,
    pub threshold_pct: f64,
    pub moisture_pct: f64,
    pub deficit_pct: f64,
    pub volume_l_per_ha: f64,
    pub rain_expected_24h: bool,
}

impl IrrigationPlan {
    pub fn summary(&self) -> String {
        match self.action {
            IrrigationAction::Irrigate => format!(
                "Irrigate {} L/ha ({:.1} points below the {}% threshold for {} soil){}.",
                self.volume_l_per_ha,
                self.deficit_pct,
                self.threshold_pct,
                self.soil_type,
                match self.timing {
                    IrrigationTiming::EarlyMorningOrEvening => ", early morning or evening",
                    IrrigationTiming::Anytime => "",
                }
            ),
            IrrigationAction::Defer => {
                "Defer irrigation: rain is expected within 24 hours.".to_string()
            }
            IrrigationAction::NotNeeded => format!(
                "No irrigation needed: moisture {}% meets the {}% threshold.",
                self.moisture_pct, self.threshold_pct
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct IrrigationEvaluator;

impl SpecialistEvaluator for IrrigationEvaluator {
    fn category(&self) -> Category {
        Category::Irrigation
    }

    fn evaluate(&self, snapshot: &ContextSnapshot) -> Result<DomainOutput, EvaluatorError> {
        plan_irrigation(snapshot).map(DomainOutput::Irrigation)
    }
}

pub fn plan_irrigation(snapshot: &ContextSnapshot) -> Result<IrrigationPlan, EvaluatorError> {
    let soil_type = snapshot.farm.soil_type.trim().to_ascii_lowercase();
    let threshold_pct = moisture_threshold(&soil_type)
        .ok_or_else(|| EvaluatorError::unknown("soil type", &snapshot.farm.soil_type))?;

    let moisture_pct = snapshot.soil.moisture_pct;
    let deficit_pct = round_to((threshold_pct - moisture_pct).max(0.0), 2);
    let rain_expected_24h = snapshot.weather.rain_expected_24h;

    let action = if rain_expected_24h {
        IrrigationAction::Defer
    } else if moisture_pct < threshold_pct {
        IrrigationAction::Irrigate
    } else {
        IrrigationAction::NotNeeded
    };

    let volume_l_per_ha = match action {
        IrrigationAction::Irrigate => (deficit_pct * LITERS_PER_HA_PER_POINT).round(),
        IrrigationAction::Defer | IrrigationAction::NotNeeded => 0.0,
    };

    let timing = if snapshot.weather.temperature_c > HEAT_THRESHOLD_C {
        IrrigationTiming::EarlyMorningOrEvening
    } else {
        IrrigationTiming::Anytime
    };

    Ok(IrrigationPlan {
        action,
        timing,
        soil_type,
        threshold_pct,
        moisture_pct,
        deficit_pct,
        volume_l_per_ha,
        rain_expected_24h,
    })
}

#[cfg(test)]
mod tests {
    use super::{plan_irrigation, IrrigationAction, IrrigationTiming};
    use crate::domain::context::fixtures::snapshot;
    use crate::evaluators::EvaluatorError;

    #[test]
    fn dry_sandy_soil_without_rain_needs_water() {
        let plan = plan_irrigation(&snapshot("cotton", "sandy")).expect("sandy is known");
        assert_eq!(plan.action, IrrigationAction::Irrigate);
        assert_eq!(plan.threshold_pct, 30.0);
        assert_eq!(plan.deficit_pct, 5.0);
        assert_eq!(plan.volume_l_per_ha, 50_000.0);
        assert_eq!(plan.timing, IrrigationTiming::Anytime);
    }

    #[test]
    fn expected_rain_defers_regardless_of_moisture() {
        let mut wet_forecast = snapshot("cotton", "sandy");
        wet_forecast.weather.rain_expected_24h = true;
        wet_forecast.soil.moisture_pct = 5.0;
        let plan = plan_irrigation(&wet_forecast).expect("sandy is known");
        assert_eq!(plan.action, IrrigationAction::Defer);
        assert_eq!(plan.volume_l_per_ha, 0.0);
    }

    #[test]
    fn heat_moves_watering_to_cool_hours() {
        let mut hot = snapshot("cotton", "sandy");
        hot.weather.temperature_c = 36.0;
        let plan = plan_irrigation(&hot).expect("sandy is known");
        assert_eq!(plan.timing, IrrigationTiming::EarlyMorningOrEvening);

        hot.weather.temperature_c = 30.0;
        let plan = plan_irrigation(&hot).expect("sandy is known");
        assert_eq!(plan.timing, IrrigationTiming::Anytime);
    }

    #[test]
    fn moisture_at_threshold_needs_no_water() {
        let mut moist = snapshot("wheat", "clay");
        moist.soil.moisture_pct = 40.0;
        let plan = plan_irrigation(&moist).expect("clay is known");
        assert_eq!(plan.action, IrrigationAction::NotNeeded);
    }

    #[test]
    fn unknown_soil_is_reported() {
        let error = plan_irrigation(&snapshot("cotton", "peat")).expect_err("peat is not tabled");
        assert!(matches!(error, EvaluatorError::UnknownCategoryKey { kind: "soil type", .. }));
    }
}
