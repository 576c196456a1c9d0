use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Start,
    RouteIntent,
    OffTopicReply,
    ClarificationReply,
    AssembleContext,
    EvaluateSpecialist,
    Validate,
    RetrySpecialist,
    AcceptAndFinish,
    EscalateStaticFallback,
}

impl TurnPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::OffTopicReply
                | Self::ClarificationReply
                | Self::AcceptAndFinish
                | Self::EscalateStaticFallback
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::RouteIntent => "route_intent",
            Self::OffTopicReply => "off_topic_reply",
            Self::ClarificationReply => "clarification_reply",
            Self::AssembleContext => "assemble_context",
            Self::EvaluateSpecialist => "evaluate_specialist",
            Self::Validate => "validate",
            Self::RetrySpecialist => "retry_specialist",
            Self::AcceptAndFinish => "accept_and_finish",
            Self::EscalateStaticFallback => "escalate_static_fallback",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnEvent {
    TurnReceived,
    IntentOffTopic,
    ClarificationRequired,
    IntentResolved,
    ContextAssembled,
    SpecialistEvaluated,
    EvaluatorFailed,
    GenerationFailed,
    ValidationPassed,
    ValidationFailed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnAction {
    ClassifyIntent,
    SendDeclineReply,
    AskClarification,
    FetchContext,
    RunSpecialist,
    RequestGeneration,
    UseRuleTemplate,
    ValidateOutput,
    IncrementRetry,
    EmitRecommendation,
    EmitGenericAdvisory,
    EmitStaticAdvisory,
    FlagForAudit,
}

/// Counters the transition table consults when a transition is conditional.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnContext {
    pub retry_count: u32,
    pub max_retries: u32,
    /// Generation failures so far in the current attempt, including the one being reported.
    pub generation_failures: u32,
}

impl Default for TurnContext {
    fn default() -> Self {
        Self { retry_count: 0, max_retries: super::MAX_RETRIES, generation_failures: 0 }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: TurnPhase,
    pub to: TurnPhase,
    pub event: TurnEvent,
    pub actions: Vec<TurnAction>,
}
