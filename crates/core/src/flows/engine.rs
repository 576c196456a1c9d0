use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::flows::states::{TransitionOutcome, TurnAction, TurnContext, TurnEvent, TurnPhase};

/// Generation attempts allowed per specialist attempt before falling back to rule templates.
pub const GENERATION_ATTEMPTS: u32 = 2;

pub trait FlowDefinition {
    fn initial_phase(&self) -> TurnPhase;
    fn transition(
        &self,
        current: TurnPhase,
        event: TurnEvent,
        context: &TurnContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AdvisoryFlow;

impl FlowDefinition for AdvisoryFlow {
    fn initial_phase(&self) -> TurnPhase {
        TurnPhase::Start
    }

    fn transition(
        &self,
        current: TurnPhase,
        event: TurnEvent,
        context: &TurnContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_advisory(current, event, context)
    }
}

pub struct TurnFlow<F> {
    flow: F,
}

impl<F> TurnFlow<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_phase(&self) -> TurnPhase {
        self.flow.initial_phase()
    }

    pub fn apply(
        &self,
        current: TurnPhase,
        event: TurnEvent,
        context: &TurnContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: TurnPhase,
        event: TurnEvent,
        context: &TurnContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_applied",
                        AuditCategory::Flow,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", format!("{:?}", outcome.event))
                    .with_metadata("retry_count", context.retry_count.to_string()),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::from_context(
                        audit,
                        "flow.transition_rejected",
                        AuditCategory::Flow,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for TurnFlow<AdvisoryFlow> {
    fn default() -> Self {
        Self::new(AdvisoryFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {phase:?} using event {event:?}")]
    InvalidTransition { phase: TurnPhase, event: TurnEvent },
    #[error("turn already finished in {phase:?}")]
    TerminalPhase { phase: TurnPhase },
}

fn transition_advisory(
    current: TurnPhase,
    event: TurnEvent,
    context: &TurnContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use TurnAction::{
        AskClarification, ClassifyIntent, EmitGenericAdvisory, EmitRecommendation,
        EmitStaticAdvisory, FetchContext, FlagForAudit, IncrementRetry, RequestGeneration,
        RunSpecialist, SendDeclineReply, UseRuleTemplate, ValidateOutput,
    };
    use TurnEvent::{
        ClarificationRequired, ContextAssembled, EvaluatorFailed, GenerationFailed,
        IntentOffTopic, IntentResolved, SpecialistEvaluated, TurnReceived, ValidationFailed,
        ValidationPassed,
    };
    use TurnPhase::{
        AcceptAndFinish, AssembleContext, ClarificationReply, EscalateStaticFallback,
        EvaluateSpecialist, OffTopicReply, RetrySpecialist, RouteIntent, Start, Validate,
    };

    if current.is_terminal() {
        return Err(FlowTransitionError::TerminalPhase { phase: current });
    }

    let (to, actions) = match (current, event) {
        (Start, TurnReceived) => (RouteIntent, vec![ClassifyIntent]),
        (RouteIntent, IntentOffTopic) => (OffTopicReply, vec![SendDeclineReply]),
        (RouteIntent, ClarificationRequired) => (ClarificationReply, vec![AskClarification]),
        (RouteIntent, IntentResolved) => (AssembleContext, vec![FetchContext]),
        (AssembleContext, ContextAssembled) => {
            (EvaluateSpecialist, vec![RunSpecialist, RequestGeneration])
        }
        (EvaluateSpecialist | RetrySpecialist, EvaluatorFailed) => {
            (AcceptAndFinish, vec![EmitGenericAdvisory])
        }
        (EvaluateSpecialist | RetrySpecialist, SpecialistEvaluated) => {
            (Validate, vec![ValidateOutput])
        }
        (EvaluateSpecialist | RetrySpecialist, GenerationFailed) => {
            if context.generation_failures < GENERATION_ATTEMPTS {
                (current, vec![RequestGeneration])
            } else {
                (Validate, vec![UseRuleTemplate, ValidateOutput])
            }
        }
        (Validate, ValidationPassed) => (AcceptAndFinish, vec![EmitRecommendation]),
        (Validate, ValidationFailed) => {
            if context.retry_count < context.max_retries {
                (RetrySpecialist, vec![IncrementRetry, RunSpecialist, RequestGeneration])
            } else {
                (EscalateStaticFallback, vec![EmitStaticAdvisory, FlagForAudit])
            }
        }
        _ => return Err(FlowTransitionError::InvalidTransition { phase: current, event }),
    };

    Ok(TransitionOutcome { from: current, to, event, actions })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::flows::engine::{FlowTransitionError, TurnFlow};
    use crate::flows::states::{TurnAction, TurnContext, TurnEvent, TurnPhase};

    fn run(flow: &TurnFlow<super::AdvisoryFlow>, events: &[(TurnEvent, TurnContext)]) -> TurnPhase {
        events.iter().fold(flow.initial_phase(), |phase, (event, context)| {
            flow.apply(phase, *event, context).expect("valid transition").to
        })
    }

    #[test]
    fn happy_path_accepts_on_first_validation() {
        let flow = TurnFlow::default();
        let context = TurnContext::default();
        let end = run(
            &flow,
            &[
                (TurnEvent::TurnReceived, context),
                (TurnEvent::IntentResolved, context),
                (TurnEvent::ContextAssembled, context),
                (TurnEvent::SpecialistEvaluated, context),
                (TurnEvent::ValidationPassed, context),
            ],
        );
        assert_eq!(end, TurnPhase::AcceptAndFinish);
        assert!(end.is_terminal());
    }

    #[test]
    fn routing_outcomes_short_circuit() {
        let flow = TurnFlow::default();
        let context = TurnContext::default();
        let off_topic = flow
            .apply(TurnPhase::RouteIntent, TurnEvent::IntentOffTopic, &context)
            .expect("route -> off topic");
        assert_eq!(off_topic.to, TurnPhase::OffTopicReply);
        assert_eq!(off_topic.actions, vec![TurnAction::SendDeclineReply]);

        let clarify = flow
            .apply(TurnPhase::RouteIntent, TurnEvent::ClarificationRequired, &context)
            .expect("route -> clarification");
        assert_eq!(clarify.to, TurnPhase::ClarificationReply);
    }

    #[test]
    fn validation_failure_retries_until_the_bound_then_escalates() {
        let flow = TurnFlow::default();
        for retry_count in 0..2 {
            let outcome = flow
                .apply(
                    TurnPhase::Validate,
                    TurnEvent::ValidationFailed,
                    &TurnContext { retry_count, ..TurnContext::default() },
                )
                .expect("retry allowed");
            assert_eq!(outcome.to, TurnPhase::RetrySpecialist);
            assert_eq!(outcome.actions[0], TurnAction::IncrementRetry);
        }

        let exhausted = flow
            .apply(
                TurnPhase::Validate,
                TurnEvent::ValidationFailed,
                &TurnContext { retry_count: 2, ..TurnContext::default() },
            )
            .expect("escalation");
        assert_eq!(exhausted.to, TurnPhase::EscalateStaticFallback);
        assert!(exhausted.actions.contains(&TurnAction::FlagForAudit));
    }

    #[test]
    fn generation_failure_retries_once_then_uses_rule_template() {
        let flow = TurnFlow::default();
        let first = flow
            .apply(
                TurnPhase::EvaluateSpecialist,
                TurnEvent::GenerationFailed,
                &TurnContext { generation_failures: 1, ..TurnContext::default() },
            )
            .expect("first failure retries");
        assert_eq!(first.to, TurnPhase::EvaluateSpecialist);
        assert_eq!(first.actions, vec![TurnAction::RequestGeneration]);

        let second = flow
            .apply(
                TurnPhase::EvaluateSpecialist,
                TurnEvent::GenerationFailed,
                &TurnContext { generation_failures: 2, ..TurnContext::default() },
            )
            .expect("second failure falls back");
        assert_eq!(second.to, TurnPhase::Validate);
        assert_eq!(second.actions, vec![TurnAction::UseRuleTemplate, TurnAction::ValidateOutput]);
    }

    #[test]
    fn evaluator_failure_finishes_with_generic_advice() {
        let outcome = TurnFlow::default()
            .apply(TurnPhase::EvaluateSpecialist, TurnEvent::EvaluatorFailed, &TurnContext::default())
            .expect("generic advisory");
        assert_eq!(outcome.to, TurnPhase::AcceptAndFinish);
        assert_eq!(outcome.actions, vec![TurnAction::EmitGenericAdvisory]);
    }

    #[test]
    fn invalid_and_terminal_transitions_are_rejected() {
        let flow = TurnFlow::default();
        let error = flow
            .apply(TurnPhase::Start, TurnEvent::ValidationPassed, &TurnContext::default())
            .expect_err("start cannot validate");
        assert_eq!(
            error,
            FlowTransitionError::InvalidTransition {
                phase: TurnPhase::Start,
                event: TurnEvent::ValidationPassed
            }
        );

        let error = flow
            .apply(TurnPhase::AcceptAndFinish, TurnEvent::TurnReceived, &TurnContext::default())
            .expect_err("terminal phase");
        assert!(matches!(error, FlowTransitionError::TerminalPhase { .. }));
    }

    #[test]
    fn transitions_are_audited() {
        let flow = TurnFlow::default();
        let sink = InMemoryAuditSink::default();
        let audit = AuditContext::new(None, Some("conv-7".to_owned()), "req-42", "turn-flow");

        flow.apply_with_audit(
            TurnPhase::Start,
            TurnEvent::TurnReceived,
            &TurnContext::default(),
            &sink,
            &audit,
        )
        .expect("start -> route");
        let _ = flow.apply_with_audit(
            TurnPhase::Start,
            TurnEvent::ValidationPassed,
            &TurnContext::default(),
            &sink,
            &audit,
        );

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "flow.transition_applied");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("route_intent"));
        assert_eq!(events[1].event_type, "flow.transition_rejected");
        assert_eq!(events[1].conversation_id.as_deref(), Some("conv-7"));
    }
}
