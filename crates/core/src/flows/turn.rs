use crate::audit::{AuditContext, AuditSink};
use crate::domain::recommendation::Recommendation;
use crate::flows::engine::{FlowDefinition, FlowTransitionError, TurnFlow};
use crate::flows::states::{TransitionOutcome, TurnAction, TurnContext, TurnEvent, TurnPhase};

/// Mutable state of one conversation turn.
///
/// The phase and retry counter only change through [`TurnState::advance`], which
/// routes every event through the flow table. The retry counter never decreases and
/// never exceeds `max_retries`.
#[derive(Clone, Debug, PartialEq)]
pub struct TurnState {
    phase: TurnPhase,
    retry_count: u32,
    max_retries: u32,
    generation_failures: u32,
    candidates: Vec<Recommendation>,
}

impl TurnState {
    pub fn new(max_retries: u32) -> Self {
        Self {
            phase: TurnPhase::Start,
            retry_count: 0,
            max_retries,
            generation_failures: 0,
            candidates: Vec::new(),
        }
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn candidates(&self) -> &[Recommendation] {
        &self.candidates
    }

    pub fn latest_candidate(&self) -> Option<&Recommendation> {
        self.candidates.last()
    }

    pub fn push_candidate(&mut self, candidate: Recommendation) {
        self.candidates.push(candidate);
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    fn context_for(&self, event: TurnEvent) -> TurnContext {
        let generation_failures = match event {
            TurnEvent::GenerationFailed => self.generation_failures + 1,
            _ => self.generation_failures,
        };
        TurnContext { retry_count: self.retry_count, max_retries: self.max_retries, generation_failures }
    }

    /// Applies `event` through the flow table, audits it, and updates counters from
    /// the resulting actions.
    pub fn advance<F, S>(
        &mut self,
        flow: &TurnFlow<F>,
        event: TurnEvent,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        F: FlowDefinition,
        S: AuditSink + ?Sized,
    {
        let context = self.context_for(event);
        let outcome = flow.apply_with_audit(self.phase, event, &context, sink, audit)?;

        self.generation_failures = match event {
            TurnEvent::GenerationFailed => context.generation_failures,
            _ => self.generation_failures,
        };
        if outcome.actions.contains(&TurnAction::IncrementRetry) {
            self.retry_count = (self.retry_count + 1).min(self.max_retries);
            // The generation budget is per specialist attempt, so a turn makes at most
            // GENERATION_ATTEMPTS × (max_retries + 1) generation requests.
            self.generation_failures = 0;
        }
        self.phase = outcome.to;
        Ok(outcome)
    }
}
