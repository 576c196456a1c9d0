use serde::{Deserialize, Serialize};

use super::{round_to, DomainOutput, EvaluatorError, SpecialistEvaluator};
use crate::domain::context::{ContextSnapshot, GrowthStage};
use crate::domain::intent::Category;

/// Seasonal N/P/K requirement in kg/ha.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NutrientRequirement {
    pub nitrogen: f64,
    pub phosphorus: f64,
    pub potassium: f64,
}

pub fn base_requirement(crop: &str) -> Option<NutrientRequirement> {
    let (nitrogen, phosphorus, potassium) = match crop.trim().to_ascii_lowercase().as_str() {
        "cotton" => (120.0, 60.0, 60.0),
        "wheat" => (150.0, 80.0, 40.0),
        "maize" => (180.0, 80.0, 60.0),
        "potato" => (160.0, 100.0, 180.0),
        "tomato" => (140.0, 90.0, 160.0),
        "barley" => (100.0, 50.0, 40.0),
        "sunflower" => (80.0, 60.0, 60.0),
        _ => return None,
    };
    Some(NutrientRequirement { nitrogen, phosphorus, potassium })
}

/// Uptake is strongest early and tapers to nothing at maturity.
pub fn stage_multiplier(stage: GrowthStage) -> f64 {
    match stage {
        GrowthStage::Seedling => 1.25,
        GrowthStage::Vegetative => 1.0,
        GrowthStage::Budding => 0.8,
        GrowthStage::Flowering => 0.5,
        GrowthStage::Fruiting => 0.3,
        GrowthStage::Maturity => 0.0,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FertilizationPlan {
    pub crop: String,
    pub growth_stage: GrowthStage,
    pub stage_multiplier: f64,
    pub nitrogen_kg_per_ha: f64,
    pub phosphorus_kg_per_ha: f64,
    pub potassium_kg_per_ha: f64,
}

impl FertilizationPlan {
    pub fn total_kg_per_ha(&self) -> f64 {
        self.nitrogen_kg_per_ha + self.phosphorus_kg_per_ha + self.potassium_kg_per_ha
    }

    pub fn summary(&self) -> String {
        if self.total_kg_per_ha() <= 0.0 {
            return format!(
                "No fertilizer needed for {} at the {} stage.",
                self.crop,
                self.growth_stage.as_str()
            );
        }
        format!(
            "Apply N {} kg/ha, P {} kg/ha, K {} kg/ha to {} at the {} stage.",
            self.nitrogen_kg_per_ha,
            self.phosphorus_kg_per_ha,
            self.potassium_kg_per_ha,
            self.crop,
            self.growth_stage.as_str()
        )
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FertilizationEvaluator;

impl SpecialistEvaluator for FertilizationEvaluator {
    fn category(&self) -> Category {
        Category::Fertilization
    }

    fn evaluate(&self, snapshot: &ContextSnapshot) -> Result<DomainOutput, EvaluatorError> {
        plan_fertilization(snapshot).map(DomainOutput::Fertilization)
    }
}

/// Soil already holding X% of a nutrient requirement cuts that nutrient's dose by X%.
fn remaining_dose(base_kg: f64, soil_pct: f64, multiplier: f64) -> f64 {
    let supplied = soil_pct.clamp(0.0, 100.0) / 100.0;
    round_to(base_kg * (1.0 - supplied) * multiplier, 1)
}

pub fn plan_fertilization(snapshot: &ContextSnapshot) -> Result<FertilizationPlan, EvaluatorError> {
    let crop = snapshot.farm.crop.trim().to_ascii_lowercase();
    let base = base_requirement(&crop)
        .ok_or_else(|| EvaluatorError::unknown("crop", &snapshot.farm.crop))?;
    let growth_stage = snapshot.crop.growth_stage;
    let multiplier = stage_multiplier(growth_stage);
    let soil = &snapshot.soil;

    Ok(FertilizationPlan {
        crop,
        growth_stage,
        stage_multiplier: multiplier,
        nitrogen_kg_per_ha: remaining_dose(base.nitrogen, soil.nitrogen_pct, multiplier),
        phosphorus_kg_per_ha: remaining_dose(base.phosphorus, soil.phosphorus_pct, multiplier),
        potassium_kg_per_ha: remaining_dose(base.potassium, soil.potassium_pct, multiplier),
    })
}

#[cfg(test)]
mod tests {
    use super::plan_fertilization;
    use crate::domain::context::fixtures::snapshot;
    use crate::domain::context::GrowthStage;

    #[test]
    fn soil_supply_reduces_each_nutrient_proportionally() {
        // cotton 120/60/60, soil at 40/50/20 % of requirement, vegetative stage
        let plan = plan_fertilization(&snapshot("cotton", "sandy")).expect("cotton is known");
        assert_eq!(plan.nitrogen_kg_per_ha, 72.0);
        assert_eq!(plan.phosphorus_kg_per_ha, 30.0);
        assert_eq!(plan.potassium_kg_per_ha, 48.0);
    }

    #[test]
    fn growth_stage_scales_the_dose() {
        let mut seedling = snapshot("wheat", "loam");
        seedling.crop.growth_stage = GrowthStage::Seedling;
        let mut flowering = seedling.clone();
        flowering.crop.growth_stage = GrowthStage::Flowering;

        let early = plan_fertilization(&seedling).expect("wheat is known");
        let late = plan_fertilization(&flowering).expect("wheat is known");
        assert_eq!(early.nitrogen_kg_per_ha, 112.5);
        assert_eq!(late.nitrogen_kg_per_ha, 45.0);
        assert!(early.nitrogen_kg_per_ha > late.nitrogen_kg_per_ha);
    }

    #[test]
    fn mature_crop_gets_nothing() {
        let mut mature = snapshot("maize", "loam");
        mature.crop.growth_stage = GrowthStage::Maturity;
        let plan = plan_fertilization(&mature).expect("maize is known");
        assert_eq!(plan.total_kg_per_ha(), 0.0);
        assert!(plan.summary().starts_with("No fertilizer needed"));
    }

    #[test]
    fn oversupplied_soil_never_goes_negative() {
        let mut rich = snapshot("potato", "loam");
        rich.soil.nitrogen_pct = 140.0;
        let plan = plan_fertilization(&rich).expect("potato is known");
        assert_eq!(plan.nitrogen_kg_per_ha, 0.0);
    }
}
