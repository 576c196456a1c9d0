use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::evaluators::irrigation::moisture_threshold;

/// Placeholder used for crop and soil keys when no farm profile could be loaded.
/// Evaluators reject it as an unknown key, which degrades the turn to generic advice.
pub const UNSPECIFIED: &str = "unspecified";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextSource {
    Weather,
    FarmProfile,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Novice,
    #[default]
    Intermediate,
    Expert,
}

impl ExperienceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Novice => "novice",
            Self::Intermediate => "intermediate",
            Self::Expert => "expert",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthStage {
    Seedling,
    #[default]
    Vegetative,
    Budding,
    Flowering,
    Fruiting,
    Maturity,
}

impl GrowthStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seedling => "seedling",
            Self::Vegetative => "vegetative",
            Self::Budding => "budding",
            Self::Flowering => "flowering",
            Self::Fruiting => "fruiting",
            Self::Maturity => "maturity",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FarmProfile {
    pub farm_id: String,
    pub region: String,
    pub crop: String,
    pub soil_type: String,
    pub hectares: f64,
    pub farmer_age: u32,
    #[serde(default)]
    pub experience: ExperienceLevel,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SoilState {
    pub moisture_pct: f64,
    /// Nutrient levels as a percentage of the crop requirement.
    pub nitrogen_pct: f64,
    pub phosphorus_pct: f64,
    pub potassium_pct: f64,
    pub ph: f64,
}

impl Default for SoilState {
    fn default() -> Self {
        Self {
            moisture_pct: 35.0,
            nitrogen_pct: 0.0,
            phosphorus_pct: 0.0,
            potassium_pct: 0.0,
            ph: 7.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CropState {
    #[serde(default)]
    pub growth_stage: GrowthStage,
    #[serde(default)]
    pub accumulated_gdd: f64,
    #[serde(default)]
    pub observed_pest: Option<String>,
}

/// Everything the farm-profile provider returns for one farm.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FarmRecord {
    pub profile: FarmProfile,
    #[serde(default)]
    pub soil: SoilState,
    #[serde(default)]
    pub crop: CropState,
}

impl FarmRecord {
    /// Documented default when neither the provider nor the cache can answer.
    pub fn unspecified(farm_id: &str, region: &str) -> Self {
        Self {
            profile: FarmProfile {
                farm_id: farm_id.to_string(),
                region: region.to_string(),
                crop: UNSPECIFIED.to_string(),
                soil_type: UNSPECIFIED.to_string(),
                hectares: 0.0,
                farmer_age: 0,
                experience: ExperienceLevel::default(),
            },
            soil: SoilState::default(),
            crop: CropState::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeatherWindow {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub rainfall_7d_mm: f64,
    pub rain_expected_24h: bool,
    pub horizon_hours: u32,
}

impl Default for WeatherWindow {
    /// Neutral mid-season conditions with no rain in sight.
    fn default() -> Self {
        Self {
            temperature_c: 20.0,
            humidity_pct: 50.0,
            rainfall_7d_mm: 0.0,
            rain_expected_24h: false,
            horizon_hours: 24,
        }
    }
}

/// Typed value read out of a snapshot by dotted field path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Flag(bool),
}

/// Every field path a rule condition may reference.
pub const KNOWN_FIELDS: [&str; 19] = [
    "farm.region",
    "farm.crop",
    "farm.soil_type",
    "farm.hectares",
    "farm.farmer_age",
    "farm.experience",
    "weather.temperature_c",
    "weather.humidity_pct",
    "weather.rainfall_7d_mm",
    "weather.rain_expected_24h",
    "soil.moisture_pct",
    "soil.below_moisture_threshold",
    "soil.nitrogen_pct",
    "soil.phosphorus_pct",
    "soil.potassium_pct",
    "soil.ph",
    "crop.growth_stage",
    "crop.accumulated_gdd",
    "crop.observed_pest",
];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub captured_at: DateTime<Utc>,
    pub farm: FarmProfile,
    pub weather: WeatherWindow,
    pub soil: SoilState,
    pub crop: CropState,
    pub stale: BTreeSet<ContextSource>,
}

impl ContextSnapshot {
    pub fn new(record: FarmRecord, weather: WeatherWindow, captured_at: DateTime<Utc>) -> Self {
        Self {
            captured_at,
            farm: record.profile,
            weather,
            soil: record.soil,
            crop: record.crop,
            stale: BTreeSet::new(),
        }
    }

    pub fn with_stale(mut self, source: ContextSource) -> Self {
        self.stale.insert(source);
        self
    }

    /// A pest named by the farmer in this turn takes precedence over the one on record.
    pub fn with_reported_pest(mut self, pest: Option<String>) -> Self {
        if let Some(pest) = pest {
            self.crop.observed_pest = Some(pest);
        }
        self
    }

    pub fn experience(&self) -> ExperienceLevel {
        self.farm.experience
    }

    pub fn is_stale(&self, source: ContextSource) -> bool {
        self.stale.contains(&source)
    }

    pub fn field_source(field: &str) -> ContextSource {
        if field.starts_with("weather.") {
            ContextSource::Weather
        } else {
            ContextSource::FarmProfile
        }
    }

    pub fn field(&self, path: &str) -> Option<FieldValue> {
        use FieldValue::{Flag, Number, Text};

        let value = match path {
            "farm.region" => Text(self.farm.region.clone()),
            "farm.crop" => Text(self.farm.crop.clone()),
            "farm.soil_type" => Text(self.farm.soil_type.clone()),
            "farm.hectares" => Number(self.farm.hectares),
            "farm.farmer_age" => Number(f64::from(self.farm.farmer_age)),
            "farm.experience" => Text(self.farm.experience.as_str().to_string()),
            "weather.temperature_c" => Number(self.weather.temperature_c),
            "weather.humidity_pct" => Number(self.weather.humidity_pct),
            "weather.rainfall_7d_mm" => Number(self.weather.rainfall_7d_mm),
            "weather.rain_expected_24h" => Flag(self.weather.rain_expected_24h),
            "soil.moisture_pct" => Number(self.soil.moisture_pct),
            "soil.below_moisture_threshold" => {
                Flag(self.soil.moisture_pct < moisture_threshold(&self.farm.soil_type)?)
            }
            "soil.nitrogen_pct" => Number(self.soil.nitrogen_pct),
            "soil.phosphorus_pct" => Number(self.soil.phosphorus_pct),
            "soil.potassium_pct" => Number(self.soil.potassium_pct),
            "soil.ph" => Number(self.soil.ph),
            "crop.growth_stage" => Text(self.crop.growth_stage.as_str().to_string()),
            "crop.accumulated_gdd" => Number(self.crop.accumulated_gdd),
            "crop.observed_pest" => Text(self.crop.observed_pest.clone()?),
            _ => return None,
        };
        Some(value)
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::snapshot;
    use super::{ContextSnapshot, ContextSource, FieldValue, KNOWN_FIELDS};

    #[test]
    fn every_known_field_resolves_except_absent_pest() {
        let snapshot = snapshot("cotton", "sandy");
        for field in KNOWN_FIELDS {
            if field == "crop.observed_pest" {
                assert_eq!(snapshot.field(field), None);
            } else {
                assert!(snapshot.field(field).is_some(), "field {field} should resolve");
            }
        }
        assert_eq!(snapshot.field("soil.salinity"), None);
    }

    #[test]
    fn moisture_threshold_flag_tracks_the_soil_table() {
        let mut sandy = snapshot("cotton", "sandy");
        sandy.soil.moisture_pct = 29.95;
        assert_eq!(sandy.field("soil.below_moisture_threshold"), Some(FieldValue::Flag(true)));
        sandy.soil.moisture_pct = 30.0;
        assert_eq!(sandy.field("soil.below_moisture_threshold"), Some(FieldValue::Flag(false)));

        let unknown = snapshot("cotton", "peat");
        assert_eq!(unknown.field("soil.below_moisture_threshold"), None);
    }

    #[test]
    fn reported_pest_overrides_record_and_is_readable() {
        let snapshot =
            snapshot("cotton", "sandy").with_reported_pest(Some("cotton bollworm".to_string()));
        assert_eq!(
            snapshot.field("crop.observed_pest"),
            Some(FieldValue::Text("cotton bollworm".to_string()))
        );
    }

    #[test]
    fn field_sources_follow_prefix() {
        assert_eq!(ContextSnapshot::field_source("weather.humidity_pct"), ContextSource::Weather);
        assert_eq!(ContextSnapshot::field_source("soil.moisture_pct"), ContextSource::FarmProfile);
        let stale = snapshot("wheat", "loam").with_stale(ContextSource::Weather);
        assert!(stale.is_stale(ContextSource::Weather));
        assert!(!stale.is_stale(ContextSource::FarmProfile));
    }
}
