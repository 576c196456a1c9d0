use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of intents the router can emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Irrigation,
    Fertilization,
    PestControl,
    HarvestTiming,
    SubsidyInfo,
    WeatherInquiry,
    GeneralAdvice,
    OffTopic,
    ClarificationNeeded,
}

impl Intent {
    /// Domain intents in declaration order. `OffTopic` and `ClarificationNeeded`
    /// are routing outcomes rather than advisory topics.
    pub const DOMAIN: [Intent; 7] = [
        Intent::Irrigation,
        Intent::Fertilization,
        Intent::PestControl,
        Intent::HarvestTiming,
        Intent::SubsidyInfo,
        Intent::WeatherInquiry,
        Intent::GeneralAdvice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Irrigation => "irrigation",
            Self::Fertilization => "fertilization",
            Self::PestControl => "pest_control",
            Self::HarvestTiming => "harvest_timing",
            Self::SubsidyInfo => "subsidy_info",
            Self::WeatherInquiry => "weather_inquiry",
            Self::GeneralAdvice => "general_advice",
            Self::OffTopic => "off_topic",
            Self::ClarificationNeeded => "clarification_needed",
        }
    }

    /// Rank in the secondary-intent priority table; lower ranks first.
    /// Irrigation and harvest timing share a rank.
    pub fn priority_rank(&self) -> u8 {
        match self {
            Self::PestControl => 0,
            Self::Irrigation | Self::HarvestTiming => 1,
            Self::Fertilization => 2,
            Self::WeatherInquiry => 3,
            Self::SubsidyInfo => 4,
            Self::GeneralAdvice => 5,
            Self::OffTopic | Self::ClarificationNeeded => u8::MAX,
        }
    }

    pub fn category(&self) -> Option<Category> {
        match self {
            Self::Irrigation => Some(Category::Irrigation),
            Self::Fertilization => Some(Category::Fertilization),
            Self::PestControl => Some(Category::PestControl),
            Self::HarvestTiming => Some(Category::Harvest),
            Self::SubsidyInfo => Some(Category::Subsidy),
            Self::WeatherInquiry => Some(Category::Weather),
            Self::GeneralAdvice => Some(Category::General),
            Self::OffTopic | Self::ClarificationNeeded => None,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown intent `{0}`")]
pub struct UnknownIntent(pub String);

impl FromStr for Intent {
    type Err = UnknownIntent;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "irrigation" => Ok(Self::Irrigation),
            "fertilization" => Ok(Self::Fertilization),
            "pest_control" => Ok(Self::PestControl),
            "harvest_timing" => Ok(Self::HarvestTiming),
            "subsidy_info" => Ok(Self::SubsidyInfo),
            "weather_inquiry" => Ok(Self::WeatherInquiry),
            "general_advice" => Ok(Self::GeneralAdvice),
            "off_topic" => Ok(Self::OffTopic),
            "clarification_needed" => Ok(Self::ClarificationNeeded),
            other => Err(UnknownIntent(other.to_string())),
        }
    }
}

/// Advisory category shared by rules, evaluators and the output contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Irrigation,
    Fertilization,
    PestControl,
    Subsidy,
    Harvest,
    Weather,
    General,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Irrigation,
        Category::Fertilization,
        Category::PestControl,
        Category::Subsidy,
        Category::Harvest,
        Category::Weather,
        Category::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Irrigation => "irrigation",
            Self::Fertilization => "fertilization",
            Self::PestControl => "pest_control",
            Self::Subsidy => "subsidy",
            Self::Harvest => "harvest",
            Self::Weather => "weather",
            Self::General => "general",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = UnknownIntent;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == value.trim().to_ascii_lowercase())
            .ok_or_else(|| UnknownIntent(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{Category, Intent};

    #[test]
    fn priority_table_orders_pest_control_first() {
        let mut intents = Intent::DOMAIN.to_vec();
        intents.sort_by_key(Intent::priority_rank);
        assert_eq!(intents.first(), Some(&Intent::PestControl));
        assert_eq!(intents.last(), Some(&Intent::GeneralAdvice));
        assert_eq!(Intent::Irrigation.priority_rank(), Intent::HarvestTiming.priority_rank());
    }

    #[test]
    fn unknown_intent_strings_are_rejected_at_the_boundary() {
        assert_eq!("pest_control".parse::<Intent>(), Ok(Intent::PestControl));
        assert!("crop_insurance".parse::<Intent>().is_err());
        assert_eq!("harvest".parse::<Category>(), Ok(Category::Harvest));
    }

    #[test]
    fn routing_outcomes_have_no_category() {
        assert_eq!(Intent::OffTopic.category(), None);
        assert_eq!(Intent::ClarificationNeeded.category(), None);
        assert_eq!(Intent::SubsidyInfo.category(), Some(Category::Subsidy));
    }
}
