use serde::{Deserialize, Serialize};

use super::{DomainOutput, EvaluatorError, SpecialistEvaluator};
use crate::domain::context::{ContextSnapshot, ContextSource};
use crate::domain::intent::Category;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeatherBrief {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub rainfall_7d_mm: f64,
    pub rain_expected_24h: bool,
    pub horizon_hours: u32,
    /// True when the forecast came from cache or defaults.
    pub stale: bool,
}

impl WeatherBrief {
    pub fn summary(&self) -> String {
        let outlook = if self.rain_expected_24h { "rain expected" } else { "no rain expected" };
        let mut summary = format!(
            "{} °C, {}% humidity, {} mm rain in the last 7 days; {} in the next {} hours.",
            self.temperature_c, self.humidity_pct, self.rainfall_7d_mm, outlook, self.horizon_hours
        );
        if self.stale {
            summary.push_str(" Forecast may be out of date.");
        }
        summary
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct WeatherEvaluator;

impl SpecialistEvaluator for WeatherEvaluator {
    fn category(&self) -> Category {
        Category::Weather
    }

    fn evaluate(&self, snapshot: &ContextSnapshot) -> Result<DomainOutput, EvaluatorError> {
        let weather = &snapshot.weather;
        Ok(DomainOutput::Weather(WeatherBrief {
            temperature_c: weather.temperature_c,
            humidity_pct: weather.humidity_pct,
            rainfall_7d_mm: weather.rainfall_7d_mm,
            rain_expected_24h: weather.rain_expected_24h,
            horizon_hours: weather.horizon_hours,
            stale: snapshot.is_stale(ContextSource::Weather),
        }))
    }
}
