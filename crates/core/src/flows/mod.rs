pub mod engine;
pub mod states;
pub mod turn;

/// Upper bound on validation-driven specialist retries per turn.
pub const MAX_RETRIES: u32 = 2;

pub use engine::{AdvisoryFlow, FlowDefinition, FlowTransitionError, TurnFlow, GENERATION_ATTEMPTS};
pub use states::{TransitionOutcome, TurnAction, TurnContext, TurnEvent, TurnPhase};
pub use turn::TurnState;
