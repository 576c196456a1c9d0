use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::intent::{Category, Intent};
use crate::evaluators::DomainOutput;
use crate::flows::states::TurnPhase;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate answer produced during a turn. Candidates accumulate on the turn
/// state across retries; only the last accepted one leaves the turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: Category,
    pub priority: Priority,
    pub body: String,
    pub citations: Vec<String>,
    pub payload: Option<DomainOutput>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarificationSlot {
    Topic,
    Crop,
    Field,
    Timeframe,
}

impl ClarificationSlot {
    pub fn question(&self) -> &'static str {
        match self {
            Self::Topic => "what you need help with (watering, fertilizer, pests, harvest, subsidies or weather)",
            Self::Crop => "which crop this is about",
            Self::Field => "which field or plot you mean",
            Self::Timeframe => "when you plan to act",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClarificationRequest {
    pub candidates: Vec<Intent>,
    pub slots: Vec<ClarificationSlot>,
}

impl ClarificationRequest {
    pub fn prompt(&self) -> String {
        let questions = self.slots.iter().map(ClarificationSlot::question).collect::<Vec<_>>();
        let mut prompt = format!("Could you tell me {}?", questions.join(", and "));
        if self.candidates.len() > 1 {
            let topics = self.candidates.iter().map(Intent::as_str).collect::<Vec<_>>();
            prompt.push_str(&format!(" I can help with: {}.", topics.join(", ")));
        }
        prompt
    }
}

/// Output contract handed to the transport layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryResponse {
    pub turn_id: Uuid,
    pub conversation_id: String,
    pub intent: Intent,
    pub secondary_intents: Vec<Intent>,
    pub category: Category,
    pub priority: Priority,
    pub confidence: f64,
    pub body_text: String,
    pub rule_citations: Vec<String>,
    pub structured_payload: serde_json::Value,
    pub terminal_state: TurnPhase,
    pub retry_count: u32,
    pub flagged_for_review: bool,
    pub disclaimer: Option<String>,
    pub clarification: Option<ClarificationRequest>,
}
