use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{round_to, DomainOutput, EvaluatorError, SpecialistEvaluator};
use crate::domain::context::ContextSnapshot;
use crate::domain::intent::Category;

/// Growing degree days accumulated per day in season.
pub const DAILY_GDD: f64 = 15.0;

pub fn gdd_requirement(crop: &str) -> Option<f64> {
    let requirement = match crop.trim().to_ascii_lowercase().as_str() {
        "cotton" => 2600.0,
        "wheat" => 2000.0,
        "maize" => 2700.0,
        "potato" => 1800.0,
        "tomato" => 1400.0,
        "barley" => 1700.0,
        "sunflower" => 2200.0,
        _ => return None,
    };
    Some(requirement)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HarvestForecast {
    pub crop: String,
    pub requirement_gdd: f64,
    pub accumulated_gdd: f64,
    pub remaining_gdd: f64,
    /// Share of the requirement already accumulated, in [0, 1].
    pub maturity: f64,
    pub days_remaining: f64,
    pub days_remaining_whole: u32,
    pub predicted_date: Option<NaiveDate>,
}

impl HarvestForecast {
    pub fn summary(&self) -> String {
        if self.remaining_gdd <= 0.0 {
            return format!("{} has reached its growing degree day requirement; harvest is ready.", self.crop);
        }
        let date = self
            .predicted_date
            .map(|date| format!(", around {date}"))
            .unwrap_or_default();
        format!(
            "{} is {:.0}% mature; about {} days to harvest{}.",
            self.crop,
            self.maturity * 100.0,
            self.days_remaining_whole,
            date
        )
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HarvestEvaluator;

impl SpecialistEvaluator for HarvestEvaluator {
    fn category(&self) -> Category {
        Category::Harvest
    }

    fn evaluate(&self, snapshot: &ContextSnapshot) -> Result<DomainOutput, EvaluatorError> {
        forecast_harvest(snapshot).map(DomainOutput::Harvest)
    }
}

pub fn forecast_harvest(snapshot: &ContextSnapshot) -> Result<HarvestForecast, EvaluatorError> {
    let crop = snapshot.farm.crop.trim().to_ascii_lowercase();
    let requirement_gdd =
        gdd_requirement(&crop).ok_or_else(|| EvaluatorError::unknown("crop", &snapshot.farm.crop))?;

    let accumulated_gdd = snapshot.crop.accumulated_gdd.max(0.0);
    let remaining_gdd = (requirement_gdd - accumulated_gdd).max(0.0);
    let maturity = round_to((accumulated_gdd / requirement_gdd).clamp(0.0, 1.0), 4);
    let days_remaining = remaining_gdd / DAILY_GDD;
    let days_remaining_whole = days_remaining.ceil() as u32;

    let predicted_date = snapshot
        .captured_at
        .date_naive()
        .checked_add_days(Days::new(u64::from(days_remaining_whole)));

    Ok(HarvestForecast {
        crop,
        requirement_gdd,
        accumulated_gdd,
        remaining_gdd,
        maturity,
        days_remaining,
        days_remaining_whole,
        predicted_date,
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::forecast_harvest;
    use crate::domain::context::fixtures::snapshot;

    #[test]
    fn half_accumulated_cotton_is_half_mature() {
        let forecast = forecast_harvest(&snapshot("cotton", "sandy")).expect("cotton is known");
        assert_eq!(forecast.requirement_gdd, 2600.0);
        assert_eq!(forecast.maturity, 0.5);
        assert!((forecast.days_remaining - 1300.0 / 15.0).abs() < 1e-9);
        assert_eq!(forecast.days_remaining_whole, 87);
        assert_eq!(forecast.predicted_date, NaiveDate::from_ymd_opt(2026, 8, 27));
    }

    #[test]
    fn surplus_degree_days_clamp_to_ready() {
        let mut ripe = snapshot("potato", "loam");
        ripe.crop.accumulated_gdd = 2500.0;
        let forecast = forecast_harvest(&ripe).expect("potato is known");
        assert_eq!(forecast.maturity, 1.0);
        assert_eq!(forecast.remaining_gdd, 0.0);
        assert_eq!(forecast.days_remaining_whole, 0);
        assert!(forecast.summary().contains("harvest is ready"));
    }
}
