use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tarla_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, NoopAuditSink};
use tarla_core::config::AppConfig;
use tarla_core::domain::context::ContextSnapshot;
use tarla_core::domain::intent::{Category, Intent};
use tarla_core::domain::query::Query;
use tarla_core::domain::recommendation::{AdvisoryResponse, Priority, Recommendation};
use tarla_core::errors::{ApplicationError, DomainError};
use tarla_core::evaluators::{evaluator_for, DomainOutput, EvaluatorError};
use tarla_core::flows::{
    AdvisoryFlow, TransitionOutcome, TurnAction, TurnEvent, TurnFlow, TurnPhase, TurnState, MAX_RETRIES,
};
use tarla_core::rules::template::render_guidance;
use tarla_core::rules::{resolve_conflicts, DeterministicRuleEngine, RuleEngine, RuleMatch, RuleSet};
use tarla_core::validation::{ConfidenceScorer, ValidationResult, Validator};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::audit::TracingAuditSink;
use crate::context::{ContextAssembler, ContextRequest, FarmProfileProvider, WeatherProvider};
use crate::llm::{client_from_config, Completion, LlmClient};
use crate::prompt::{render_prompt, PromptInput};
use crate::router::{decline_message, IntentRouter, RoutedIntent};

/// Confidence reported for the generic answer given when a farm key is unknown.
pub const GENERIC_CONFIDENCE: f64 = 0.4;
/// Confidence reported for the fixed advisory given after retries run out.
pub const STATIC_FALLBACK_CONFIDENCE: f64 = 0.3;

const STALE_DISCLAIMER: &str =
    "Some weather or farm data could not be refreshed; this advice uses the last known values.";
const STATIC_DISCLAIMER: &str =
    "This answer could not be verified automatically. An agronomist will review your question.";

#[derive(Clone, Debug, PartialEq)]
pub struct TurnRequest {
    pub conversation_id: String,
    pub farm_id: String,
    pub region: String,
    pub query: Query,
    pub prior_intent: Option<Intent>,
}

impl TurnRequest {
    pub fn new(
        conversation_id: impl Into<String>,
        farm_id: impl Into<String>,
        region: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            farm_id: farm_id.into(),
            region: region.into(),
            query: Query::new(text),
            prior_intent: None,
        }
    }

    pub fn with_prior_intent(mut self, intent: Intent) -> Self {
        self.prior_intent = Some(intent);
        self
    }
}

/// Drives one conversation turn through routing, context assembly, specialist
/// evaluation, generation and validation. Turns share nothing mutable apart from
/// the assembler's last-known-good cache.
pub struct AgentRuntime {
    router: IntentRouter,
    assembler: ContextAssembler,
    engine: DeterministicRuleEngine,
    validator: Validator,
    llm: Arc<dyn LlmClient>,
    flow: TurnFlow<AdvisoryFlow>,
    audit: Arc<dyn AuditSink>,
    max_retries: u32,
    forecast_horizon_hours: u32,
    generation_timeout: Duration,
}

impl AgentRuntime {
    pub fn new(assembler: ContextAssembler, rules: Arc<RuleSet>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            router: IntentRouter::default(),
            assembler,
            engine: DeterministicRuleEngine::new(rules),
            validator: Validator::default(),
            llm,
            flow: TurnFlow::default(),
            audit: Arc::new(NoopAuditSink),
            max_retries: MAX_RETRIES,
            forecast_horizon_hours: 24,
            generation_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        weather: Arc<dyn WeatherProvider>,
        profiles: Arc<dyn FarmProfileProvider>,
    ) -> Result<Self, ApplicationError> {
        let rules = RuleSet::load_or_builtin(config.rules.path.as_deref())?;
        let llm = client_from_config(&config.llm)
            .map_err(|error| ApplicationError::Configuration(error.to_string()))?;
        let assembler = ContextAssembler::from_config(weather, profiles, &config.context);

        Ok(Self::new(assembler, Arc::new(rules), llm)
            .with_router(IntentRouter::new(config.routing.clarification_threshold))
            .with_validator(Validator::new(
                ConfidenceScorer::with_policy(config.scoring_policy()),
                config.validation.acceptance_threshold,
            ))
            .with_max_retries(config.llm.max_retries)
            .with_forecast_horizon(config.context.forecast_horizon_hours)
            .with_generation_timeout(Duration::from_secs(config.llm.timeout_secs))
            .with_audit_sink(Arc::new(TracingAuditSink)))
    }

    pub fn with_router(mut self, router: IntentRouter) -> Self {
        self.router = router;
        self
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_forecast_horizon(mut self, hours: u32) -> Self {
        self.forecast_horizon_hours = hours;
        self
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        self.engine.rules()
    }

    /// Runs the turn unless `cancel` resolves first. In-flight fetches and
    /// generation calls are dropped on cancellation.
    pub async fn handle_turn_until<C>(
        &self,
        request: TurnRequest,
        cancel: C,
    ) -> Result<AdvisoryResponse, ApplicationError>
    where
        C: Future<Output = ()>,
    {
        let conversation_id = request.conversation_id.clone();
        tokio::select! {
            biased;
            _ = cancel => {
                warn!(
                    event_name = "turn.cancelled",
                    conversation_id = %conversation_id,
                    "turn cancelled before completion"
                );
                Err(ApplicationError::Cancelled)
            }
            response = self.handle_turn(request) => response,
        }
    }

    pub async fn handle_turn(&self, request: TurnRequest) -> Result<AdvisoryResponse, ApplicationError> {
        let turn_id = Uuid::new_v4();
        let audit = AuditContext::new(
            Some(turn_id),
            Some(request.conversation_id.clone()),
            turn_id.to_string(),
            "agent-runtime",
        );
        let mut state = TurnState::new(self.max_retries);

        self.advance(&mut state, TurnEvent::TurnReceived, &audit)?;
        let routed = self.router.route(&request.query, request.prior_intent);
        self.audit.emit(
            AuditEvent::from_context(&audit, "routing.intent_resolved", AuditCategory::Routing, AuditOutcome::Success)
                .with_metadata("intent", routed.primary.as_str())
                .with_metadata("confidence", format!("{:.2}", routed.confidence))
                .with_metadata("language", format!("{:?}", routed.language)),
        );

        let response = match routed.primary {
            Intent::OffTopic => {
                self.advance(&mut state, TurnEvent::IntentOffTopic, &audit)?;
                let mut response = base_response(turn_id, &request, &routed, &state);
                response.confidence = routed.confidence;
                response.body_text = decline_message(routed.language).to_string();
                response
            }
            Intent::ClarificationNeeded => {
                self.advance(&mut state, TurnEvent::ClarificationRequired, &audit)?;
                let mut response = base_response(turn_id, &request, &routed, &state);
                response.confidence = routed.confidence;
                response.body_text = routed
                    .clarification
                    .as_ref()
                    .map(|clarification| clarification.prompt())
                    .unwrap_or_else(|| "Could you tell me more about what you need?".to_string());
                response.clarification = routed.clarification.clone();
                response
            }
            _ => {
                self.advance(&mut state, TurnEvent::IntentResolved, &audit)?;
                self.advise(turn_id, &request, &routed, &mut state, &audit).await?
            }
        };

        info!(
            event_name = "turn.completed",
            turn_id = %turn_id,
            conversation_id = %request.conversation_id,
            intent = %response.intent,
            terminal_state = response.terminal_state.as_str(),
            confidence = response.confidence,
            retry_count = response.retry_count,
            flagged_for_review = response.flagged_for_review,
            "turn completed"
        );
        Ok(response)
    }

    async fn advise(
        &self,
        turn_id: Uuid,
        request: &TurnRequest,
        routed: &RoutedIntent,
        state: &mut TurnState,
        audit: &AuditContext,
    ) -> Result<AdvisoryResponse, ApplicationError> {
        let category = routed.primary.category().unwrap_or(Category::General);
        let snapshot = self
            .assembler
            .assemble(&ContextRequest {
                farm_id: request.farm_id.clone(),
                region: request.region.clone(),
                horizon_hours: self.forecast_horizon_hours,
                reported_pest: routed.reported_pest.clone(),
            })
            .await;
        self.audit_context(audit, &snapshot);
        self.advance(state, TurnEvent::ContextAssembled, audit)?;

        let secondary = secondary_outputs(routed, &snapshot);
        let mut rejection_reasons = Vec::new();

        loop {
            let output = match evaluate(category, &snapshot) {
                Ok(output) => output,
                Err(error) => {
                    warn!(
                        event_name = "evaluator.unknown_key",
                        turn_id = %turn_id,
                        category = %category,
                        error = %error,
                        "specialist could not evaluate the farm; answering generically"
                    );
                    self.audit.emit(
                        AuditEvent::from_context(audit, "evaluation.failed", AuditCategory::Evaluation, AuditOutcome::Failed)
                            .with_metadata("category", category.to_string())
                            .with_metadata("error", error.to_string()),
                    );
                    self.advance(state, TurnEvent::EvaluatorFailed, audit)?;
                    return Ok(generic_response(turn_id, request, routed, state, category, &error, secondary));
                }
            };

            let matches = resolve_conflicts(self.engine.evaluate(&snapshot, category)).kept;
            let prompt = render_prompt(&PromptInput {
                query: &request.query,
                category,
                snapshot: &snapshot,
                output: output.as_ref(),
                matches: &matches,
                rejection_reasons: &rejection_reasons,
            });

            let (text, generation_confidence) = loop {
                if let Some(completion) = self.generate(turn_id, &prompt).await {
                    self.advance(state, TurnEvent::SpecialistEvaluated, audit)?;
                    break (completion.text, completion.confidence);
                }
                let outcome = self.advance(state, TurnEvent::GenerationFailed, audit)?;
                let fell_back = outcome.actions.contains(&TurnAction::UseRuleTemplate);
                self.audit.emit(
                    AuditEvent::from_context(audit, "generation.failed", AuditCategory::Generation, AuditOutcome::Failed)
                        .with_metadata("client", self.llm.name())
                        .with_metadata("retry_count", state.retry_count().to_string())
                        .with_metadata("rule_template_fallback", fell_back.to_string()),
                );
                if fell_back {
                    break (rule_template_body(category, output.as_ref(), &matches, &snapshot), None);
                }
            };

            let result = self.validator.validate(&text, generation_confidence, &matches, state.retry_count());
            self.audit_validation(audit, &result);

            state.push_candidate(Recommendation {
                category,
                priority: priority_of(output.as_ref(), &matches),
                body: text,
                citations: result.breakdown.agreeing_rules.clone(),
                payload: output,
            });

            if result.accepted {
                self.advance(state, TurnEvent::ValidationPassed, audit)?;
                return Ok(accepted_response(turn_id, request, routed, state, &snapshot, &result, secondary));
            }

            let outcome = self.advance(state, TurnEvent::ValidationFailed, audit)?;
            if outcome.to == TurnPhase::EscalateStaticFallback {
                self.flag_for_review(turn_id, audit, state, &result);
                return Ok(static_response(turn_id, request, routed, state, category, secondary));
            }
            rejection_reasons = result.rejection_reasons(self.validator.acceptance_threshold());
        }
    }

    async fn generate(&self, turn_id: Uuid, prompt: &str) -> Option<Completion> {
        match tokio::time::timeout(self.generation_timeout, self.llm.complete(prompt)).await {
            Ok(Ok(completion)) if !completion.text.trim().is_empty() => Some(completion),
            Ok(Ok(_)) => {
                warn!(event_name = "generation.empty", turn_id = %turn_id, client = self.llm.name(), "generation returned no text");
                None
            }
            Ok(Err(error)) => {
                warn!(
                    event_name = "generation.failed",
                    turn_id = %turn_id,
                    client = self.llm.name(),
                    error = %error,
                    "generation failed"
                );
                None
            }
            Err(_) => {
                warn!(
                    event_name = "generation.timed_out",
                    turn_id = %turn_id,
                    client = self.llm.name(),
                    timeout_ms = self.generation_timeout.as_millis() as u64,
                    "generation timed out"
                );
                None
            }
        }
    }

    fn advance(
        &self,
        state: &mut TurnState,
        event: TurnEvent,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, ApplicationError> {
        state
            .advance(&self.flow, event, self.audit.as_ref(), audit)
            .map_err(|error| ApplicationError::Domain(DomainError::FlowTransition(error)))
    }

    fn audit_context(&self, audit: &AuditContext, snapshot: &ContextSnapshot) {
        let outcome = if snapshot.stale.is_empty() { AuditOutcome::Success } else { AuditOutcome::Degraded };
        let stale = snapshot.stale.iter().map(|source| format!("{source:?}")).collect::<Vec<_>>();
        self.audit.emit(
            AuditEvent::from_context(audit, "context.assembled", AuditCategory::Context, outcome)
                .with_metadata("farm_id", snapshot.farm.farm_id.as_str())
                .with_metadata("stale_sources", stale.join(",")),
        );
    }

    fn audit_validation(&self, audit: &AuditContext, result: &ValidationResult) {
        let outcome = if result.accepted { AuditOutcome::Success } else { AuditOutcome::Rejected };
        let violations =
            result.violations.iter().map(|violation| violation.reason.as_str()).collect::<Vec<_>>();
        self.audit.emit(
            AuditEvent::from_context(audit, "validation.completed", AuditCategory::Validation, outcome)
                .with_metadata("confidence", format!("{:.3}", result.confidence))
                .with_metadata("retry_count", result.retry_count.to_string())
                .with_metadata("violations", violations.join(","))
                .with_metadata("agreeing_rules", result.breakdown.agreeing_rules.join(","))
                .with_metadata("contradicting_rules", result.breakdown.contradicting_rules.join(",")),
        );
    }

    fn flag_for_review(&self, turn_id: Uuid, audit: &AuditContext, state: &TurnState, result: &ValidationResult) {
        let reasons = result.rejection_reasons(self.validator.acceptance_threshold());
        warn!(
            event_name = "turn.flagged_for_review",
            turn_id = %turn_id,
            retry_count = state.retry_count(),
            reasons = ?reasons,
            "validation retries exhausted; sending static advisory"
        );
        self.audit.emit(
            AuditEvent::from_context(audit, "turn.flagged_for_review", AuditCategory::Review, AuditOutcome::Degraded)
                .with_metadata("retry_count", state.retry_count().to_string())
                .with_metadata("candidates", state.candidates().len().to_string())
                .with_metadata("reasons", reasons.join("; ")),
        );
    }
}

fn evaluate(category: Category, snapshot: &ContextSnapshot) -> Result<Option<DomainOutput>, EvaluatorError> {
    evaluator_for(category).map(|evaluator| evaluator.evaluate(snapshot)).transpose()
}

/// Secondary intents get deterministic findings only; failures are dropped.
fn secondary_outputs(routed: &RoutedIntent, snapshot: &ContextSnapshot) -> Vec<DomainOutput> {
    routed
        .secondary
        .iter()
        .filter_map(Intent::category)
        .filter_map(|category| match evaluate(category, snapshot) {
            Ok(output) => output,
            Err(error) => {
                debug!(
                    event_name = "evaluator.secondary_skipped",
                    category = %category,
                    error = %error,
                    "secondary evaluation skipped"
                );
                None
            }
        })
        .collect()
}

fn priority_of(output: Option<&DomainOutput>, matches: &[RuleMatch]) -> Priority {
    let from_output = output.map(DomainOutput::priority).unwrap_or(Priority::Low);
    let from_rules = matches.first().map(RuleMatch::priority).unwrap_or(Priority::Low);
    from_output.max(from_rules)
}

fn rule_template_body(
    category: Category,
    output: Option<&DomainOutput>,
    matches: &[RuleMatch],
    snapshot: &ContextSnapshot,
) -> String {
    let mut lines = matches
        .iter()
        .map(|rule_match| render_guidance(&rule_match.rule, snapshot, output))
        .collect::<Vec<_>>();
    lines.dedup();
    if lines.is_empty() {
        lines.push(output.map(DomainOutput::summary).unwrap_or_else(|| generic_advice(category).to_string()));
    }
    lines.join(" ")
}

fn generic_advice(category: Category) -> &'static str {
    match category {
        Category::Irrigation => {
            "Check soil moisture by hand at root depth before watering, and water early in the morning or in the evening."
        }
        Category::Fertilization => {
            "Base fertilizer rates on a soil test and split nitrogen into two or three smaller applications."
        }
        Category::PestControl => {
            "Scout your fields twice a week, note which pest you see, and contact the plant protection service before spraying."
        }
        Category::Subsidy => {
            "Crop subsidies are paid per hectare through the electronic agriculture information system; register your sown area before the seasonal deadline."
        }
        Category::Harvest => {
            "Judge harvest readiness from the crop itself: grain hardness, boll opening or fruit colour, and plan around a dry weather window."
        }
        Category::Weather => "Check the regional forecast before field work and avoid spraying ahead of rain or in strong wind.",
        Category::General => {
            "Keep records of sowing dates, inputs and yields, and ask your local extension office for a field visit."
        }
    }
}

fn base_response(turn_id: Uuid, request: &TurnRequest, routed: &RoutedIntent, state: &TurnState) -> AdvisoryResponse {
    AdvisoryResponse {
        turn_id,
        conversation_id: request.conversation_id.clone(),
        intent: routed.primary,
        secondary_intents: routed.secondary.clone(),
        category: routed.primary.category().unwrap_or(Category::General),
        priority: Priority::Low,
        confidence: 0.0,
        body_text: String::new(),
        rule_citations: Vec::new(),
        structured_payload: Value::Null,
        terminal_state: state.phase(),
        retry_count: state.retry_count(),
        flagged_for_review: false,
        disclaimer: None,
        clarification: None,
    }
}

fn payload(primary: Option<&DomainOutput>, secondary: Vec<DomainOutput>) -> Value {
    json!({ "primary": primary, "secondary": secondary })
}

fn accepted_response(
    turn_id: Uuid,
    request: &TurnRequest,
    routed: &RoutedIntent,
    state: &TurnState,
    snapshot: &ContextSnapshot,
    result: &ValidationResult,
    secondary: Vec<DomainOutput>,
) -> AdvisoryResponse {
    let mut response = base_response(turn_id, request, routed, state);
    response.confidence = result.confidence;
    if let Some(candidate) = state.latest_candidate() {
        response.category = candidate.category;
        response.priority = candidate.priority;
        response.body_text = candidate.body.clone();
        response.rule_citations = candidate.citations.clone();
        response.structured_payload = payload(candidate.payload.as_ref(), secondary);
    }
    if !snapshot.stale.is_empty() {
        response.disclaimer = Some(STALE_DISCLAIMER.to_string());
    }
    response
}

fn generic_response(
    turn_id: Uuid,
    request: &TurnRequest,
    routed: &RoutedIntent,
    state: &TurnState,
    category: Category,
    error: &EvaluatorError,
    secondary: Vec<DomainOutput>,
) -> AdvisoryResponse {
    let mut response = base_response(turn_id, request, routed, state);
    response.category = category;
    response.confidence = GENERIC_CONFIDENCE;
    response.body_text = generic_advice(category).to_string();
    response.structured_payload = payload(None, secondary);
    response.disclaimer = Some(match error {
        EvaluatorError::UnknownCategoryKey { kind, key } => format!(
            "We have no agronomic data for {kind} `{key}`, so this is general guidance only. Please check your farm profile."
        ),
        EvaluatorError::InvalidInput { field, .. } => format!(
            "Your farm profile has an unusable `{field}` value, so this is general guidance only. Please check your farm profile."
        ),
    });
    response
}

fn static_response(
    turn_id: Uuid,
    request: &TurnRequest,
    routed: &RoutedIntent,
    state: &TurnState,
    category: Category,
    secondary: Vec<DomainOutput>,
) -> AdvisoryResponse {
    let mut response = base_response(turn_id, request, routed, state);
    let latest = state.latest_candidate();
    response.category = category;
    response.priority = latest.map(|candidate| candidate.priority).unwrap_or(Priority::Low);
    response.confidence = STATIC_FALLBACK_CONFIDENCE;
    response.body_text = generic_advice(category).to_string();
    response.structured_payload = payload(latest.and_then(|candidate| candidate.payload.as_ref()), secondary);
    response.flagged_for_review = true;
    response.disclaimer = Some(STATIC_DISCLAIMER.to_string());
    response
}

