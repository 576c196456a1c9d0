use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{DomainOutput, EvaluatorError, SpecialistEvaluator};
use crate::domain::context::ContextSnapshot;
use crate::domain::intent::Category;

pub const YOUTH_AGE_LIMIT: u32 = 30;
pub const LARGE_FARM_HECTARES: f64 = 50.0;
pub const SUPPORTED_SOILS: [&str; 3] = ["calcareous", "saline", "sandy"];

/// Per-hectare base payment in AZN.
pub fn base_rate_azn(crop: &str) -> Option<Decimal> {
    let rate = match crop.trim().to_ascii_lowercase().as_str() {
        "cotton" => 240,
        "wheat" => 200,
        "maize" => 180,
        "potato" => 220,
        "tomato" => 150,
        "barley" => 160,
        "sunflower" => 170,
        _ => return None,
    };
    Some(Decimal::from(rate))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsidyAdjustment {
    pub reason: String,
    pub multiplier: Decimal,
    pub amount_after: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubsidyEstimate {
    pub crop: String,
    pub hectares: f64,
    pub base_rate_azn: Decimal,
    pub base_amount_azn: Decimal,
    pub adjustments: Vec<SubsidyAdjustment>,
    pub amount_azn: Decimal,
}

impl SubsidyEstimate {
    pub fn summary(&self) -> String {
        let reasons = self
            .adjustments
            .iter()
            .map(|adjustment| format!("{} ×{}", adjustment.reason, adjustment.multiplier))
            .collect::<Vec<_>>();
        let mut summary = format!(
            "Estimated subsidy for {} ha of {}: {} AZN (base {} AZN/ha",
            self.hectares, self.crop, self.amount_azn, self.base_rate_azn
        );
        if !reasons.is_empty() {
            summary.push_str(&format!("; {}", reasons.join(", ")));
        }
        summary.push_str(").");
        summary
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SubsidyEvaluator;

impl SpecialistEvaluator for SubsidyEvaluator {
    fn category(&self) -> Category {
        Category::Subsidy
    }

    fn evaluate(&self, snapshot: &ContextSnapshot) -> Result<DomainOutput, EvaluatorError> {
        estimate_subsidy(snapshot).map(DomainOutput::Subsidy)
    }
}

/// Multipliers apply in a fixed order: youth, supported soil, large farm.
pub fn estimate_subsidy(snapshot: &ContextSnapshot) -> Result<SubsidyEstimate, EvaluatorError> {
    let farm = &snapshot.farm;
    let crop = farm.crop.trim().to_ascii_lowercase();
    let base_rate = base_rate_azn(&crop).ok_or_else(|| EvaluatorError::unknown("crop", &farm.crop))?;

    if !farm.hectares.is_finite() || farm.hectares < 0.0 {
        return Err(EvaluatorError::InvalidInput {
            field: "farm.hectares",
            reason: format!("{} is not a valid area", farm.hectares),
        });
    }
    let hectares = Decimal::try_from(farm.hectares).map_err(|error| EvaluatorError::InvalidInput {
        field: "farm.hectares",
        reason: error.to_string(),
    })?;

    let base_amount = base_rate.checked_mul(hectares).ok_or_else(|| area_out_of_range(farm.hectares))?;
    let soil_type = farm.soil_type.trim().to_ascii_lowercase();

    let candidates = [
        (farm.farmer_age < YOUTH_AGE_LIMIT, "youth farmer", Decimal::new(125, 2)),
        (SUPPORTED_SOILS.contains(&soil_type.as_str()), "supported soil", Decimal::new(115, 2)),
        (farm.hectares > LARGE_FARM_HECTARES, "large farm", Decimal::new(90, 2)),
    ];

    let mut amount = base_amount;
    let mut adjustments = Vec::new();
    for (applies, reason, multiplier) in candidates {
        if applies {
            amount = amount.checked_mul(multiplier).ok_or_else(|| area_out_of_range(farm.hectares))?;
            adjustments.push(SubsidyAdjustment {
                reason: reason.to_string(),
                multiplier,
                amount_after: amount.round_dp(2),
            });
        }
    }

    Ok(SubsidyEstimate {
        crop,
        hectares: farm.hectares,
        base_rate_azn: base_rate,
        base_amount_azn: base_amount.round_dp(2),
        adjustments,
        amount_azn: amount.round_dp(2),
    })
}

fn area_out_of_range(hectares: f64) -> EvaluatorError {
    EvaluatorError::InvalidInput {
        field: "farm.hectares",
        reason: format!("{hectares} ha is too large to price"),
    }
}
