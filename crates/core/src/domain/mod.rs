pub mod context;
pub mod intent;
pub mod query;
pub mod recommendation;

pub use context::{
    ContextSnapshot, ContextSource, CropState, ExperienceLevel, FarmProfile, FarmRecord,
    FieldValue, GrowthStage, SoilState, WeatherWindow,
};
pub use intent::{Category, Intent, UnknownIntent};
pub use query::{Language, Query};
pub use recommendation::{
    AdvisoryResponse, ClarificationRequest, ClarificationSlot, Priority, Recommendation,
};
