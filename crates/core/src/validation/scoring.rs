//! Confidence blending for generated advisories.
//!
//! The score is built from explicit, ordered adjustments so every accepted or
//! rejected answer can be explained after the fact. Steps, in order:
//!
//! 1. start from the generation confidence `Cg` (default when absent or not finite)
//! 2. `+agreement_bonus` when at least one matching rule agrees with the text
//! 3. `+consensus_bonus` when two or more matches with the same action agree
//! 4. `×no_match_factor` when no rule matched at all
//! 5. `×contradiction_factor` when any matching rule is contradicted
//! 6. clamp to `[0, 1]`

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::rules::{RuleMatch, Stance};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    pub agreement_bonus: f64,
    pub consensus_bonus: f64,
    pub no_match_factor: f64,
    pub contradiction_factor: f64,
    pub default_generation_confidence: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            agreement_bonus: 0.4,
            consensus_bonus: 0.1,
            no_match_factor: 0.7,
            contradiction_factor: 0.5,
            default_generation_confidence: 0.5,
        }
    }
}

/// How one matching rule relates to the text being scored.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchAssessment {
    pub rule_id: String,
    pub action: String,
    pub stance: Stance,
    pub stale_inputs: bool,
}

impl MatchAssessment {
    pub fn of(rule_match: &RuleMatch, text: &str) -> Self {
        Self {
            rule_id: rule_match.id().to_string(),
            action: rule_match.action().to_string(),
            stance: rule_match.rule.directive.stance_toward(text),
            stale_inputs: rule_match.stale_inputs,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreStepKind {
    GenerationConfidence,
    RuleAgreement,
    RuleConsensus,
    NoMatchingRules,
    RuleContradiction,
    Clamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreStep {
    pub kind: ScoreStepKind,
    pub detail: String,
    pub score_after: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub steps: Vec<ScoreStep>,
    pub agreeing_rules: Vec<String>,
    pub contradicting_rules: Vec<String>,
    pub final_score: f64,
}

impl ScoreBreakdown {
    fn record(&mut self, kind: ScoreStepKind, detail: impl Into<String>, score_after: f64) {
        self.steps.push(ScoreStep { kind, detail: detail.into(), score_after });
    }
}

#[derive(Clone, Debug, Default)]
pub struct ConfidenceScorer {
    policy: ScoringPolicy,
}

impl ConfidenceScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: ScoringPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    pub fn score(
        &self,
        generation_confidence: Option<f64>,
        matches: &[RuleMatch],
        text: &str,
    ) -> ScoreBreakdown {
        let assessments =
            matches.iter().map(|rule_match| MatchAssessment::of(rule_match, text)).collect::<Vec<_>>();
        self.score_assessments(generation_confidence, &assessments)
    }

    pub fn score_assessments(
        &self,
        generation_confidence: Option<f64>,
        assessments: &[MatchAssessment],
    ) -> ScoreBreakdown {
        let policy = &self.policy;
        let mut breakdown = ScoreBreakdown::default();

        let mut score = match generation_confidence {
            Some(value) if value.is_finite() => {
                breakdown.record(ScoreStepKind::GenerationConfidence, "reported by generator", value);
                value
            }
            _ => {
                let value = policy.default_generation_confidence;
                breakdown.record(ScoreStepKind::GenerationConfidence, "default, none reported", value);
                value
            }
        };

        let agreeing = assessments.iter().filter(|a| a.stance == Stance::Agrees).collect::<Vec<_>>();
        breakdown.agreeing_rules = agreeing.iter().map(|a| a.rule_id.clone()).collect();
        breakdown.contradicting_rules = assessments
            .iter()
            .filter(|a| a.stance == Stance::Contradicts)
            .map(|a| a.rule_id.clone())
            .collect();

        if !agreeing.is_empty() {
            // Staleness is already priced into each match's confidence; the bonus is flat.
            score += policy.agreement_bonus;
            let stale_note =
                if agreeing.iter().all(|a| a.stale_inputs) { " (stale inputs)" } else { "" };
            breakdown.record(
                ScoreStepKind::RuleAgreement,
                format!("agreed with {}{stale_note}", breakdown.agreeing_rules.join(", ")),
                score,
            );
        }

        let mut per_action: BTreeMap<&str, usize> = BTreeMap::new();
        for assessment in &agreeing {
            *per_action.entry(assessment.action.as_str()).or_default() += 1;
        }
        if let Some((action, count)) = per_action.iter().find(|(_, count)| **count >= 2) {
            score += policy.consensus_bonus;
            breakdown.record(
                ScoreStepKind::RuleConsensus,
                format!("{count} rules agree on `{action}`"),
                score,
            );
        }

        if assessments.is_empty() {
            score *= policy.no_match_factor;
            breakdown.record(ScoreStepKind::NoMatchingRules, "no rule matched the context", score);
        }

        if !breakdown.contradicting_rules.is_empty() {
            score *= policy.contradiction_factor;
            breakdown.record(
                ScoreStepKind::RuleContradiction,
                format!("contradicted {}", breakdown.contradicting_rules.join(", ")),
                score,
            );
        }

        let clamped = if score.is_finite() { score.clamp(0.0, 1.0) } else { 0.0 };
        breakdown.record(ScoreStepKind::Clamp, "bounded to [0, 1]", clamped);
        breakdown.final_score = clamped;
        breakdown
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::{ConfidenceScorer, MatchAssessment, ScoreStepKind};
    use crate::domain::context::fixtures::snapshot;
    use crate::domain::context::ContextSource;
    use crate::domain::intent::Category;
    use crate::rules::{DeterministicRuleEngine, RuleEngine, RuleSet, Stance};

    fn assessment(id: &str, action: &str, stance: Stance) -> MatchAssessment {
        MatchAssessment {
            rule_id: id.to_string(),
            action: action.to_string(),
            stance,
            stale_inputs: false,
        }
    }

    #[test]
    fn agreeing_irrigation_text_earns_the_agreement_bonus() {
        let engine = DeterministicRuleEngine::new(Arc::new(RuleSet::builtin().expect("rules")));
        let matches = engine.evaluate(&snapshot("cotton", "sandy"), Category::Irrigation);
        let breakdown = ConfidenceScorer::new().score(
            Some(0.5),
            &matches,
            "Irrigate 50000 L/ha today; sandy soil dries fast.",
        );
        assert!((breakdown.final_score - 0.9).abs() < 1e-9);
        assert_eq!(breakdown.agreeing_rules, vec!["IRR-001".to_string()]);
        assert!(breakdown.steps.iter().any(|step| step.kind == ScoreStepKind::RuleAgreement));
    }

    #[test]
    fn zero_matches_scale_generation_confidence() {
        let scorer = ConfidenceScorer::new();
        let breakdown = scorer.score_assessments(Some(0.8), &[]);
        assert!((breakdown.final_score - 0.56).abs() < 1e-9);

        let defaulted = scorer.score_assessments(None, &[]);
        assert!((defaulted.final_score - 0.35).abs() < 1e-9);
        let nan = scorer.score_assessments(Some(f64::NAN), &[]);
        assert_eq!(nan.final_score, defaulted.final_score);
    }

    #[test]
    fn consensus_and_contradiction_apply_in_order() {
        let scorer = ConfidenceScorer::new();
        let breakdown = scorer.score_assessments(
            Some(0.6),
            &[
                assessment("IRR-001", "irrigate", Stance::Agrees),
                assessment("IRR-004", "irrigate", Stance::Agrees),
                assessment("IRR-002", "irrigate", Stance::Contradicts),
            ],
        );
        // (0.6 + 0.4 + 0.1) × 0.5
        assert!((breakdown.final_score - 0.55).abs() < 1e-9);
        let kinds = breakdown.steps.iter().map(|step| step.kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            vec![
                ScoreStepKind::GenerationConfidence,
                ScoreStepKind::RuleAgreement,
                ScoreStepKind::RuleConsensus,
                ScoreStepKind::RuleContradiction,
                ScoreStepKind::Clamp,
            ]
        );
    }

    #[test]
    fn stale_only_agreement_earns_the_full_bonus() {
        let engine = DeterministicRuleEngine::new(Arc::new(RuleSet::builtin().expect("rules")));
        let stale = snapshot("cotton", "sandy").with_stale(ContextSource::Weather);
        let matches = engine.evaluate(&stale, Category::Irrigation);
        assert!(matches.iter().all(|rule_match| rule_match.stale_inputs));

        let breakdown = ConfidenceScorer::new().score(Some(0.5), &matches, "Irrigate tonight.");
        assert!((breakdown.final_score - 0.9).abs() < 1e-9);

        let low = ConfidenceScorer::new().score(Some(0.35), &matches, "Irrigate tonight.");
        assert!((low.final_score - 0.75).abs() < 1e-9);
        assert!(low.steps[1].detail.ends_with("(stale inputs)"));
    }

    #[test]
    fn overconfident_generation_is_clamped() {
        let breakdown = ConfidenceScorer::new().score_assessments(
            Some(0.95),
            &[
                assessment("A", "irrigate", Stance::Agrees),
                assessment("B", "irrigate", Stance::Agrees),
            ],
        );
        assert_eq!(breakdown.final_score, 1.0);
    }

    fn arb_stance() -> impl Strategy<Value = Stance> {
        prop_oneof![Just(Stance::Agrees), Just(Stance::Contradicts), Just(Stance::Silent)]
    }

    proptest! {
        #[test]
        fn score_stays_in_unit_interval(
            generation in prop::option::of(prop_oneof![
                any::<f64>(),
                Just(f64::NAN),
                Just(f64::INFINITY),
                Just(f64::NEG_INFINITY),
            ]),
            stances in prop::collection::vec((arb_stance(), 0usize..3, any::<bool>()), 0..8),
        ) {
            let assessments = stances
                .iter()
                .enumerate()
                .map(|(index, (stance, action, stale))| MatchAssessment {
                    rule_id: format!("R-{index}"),
                    action: format!("action-{action}"),
                    stance: *stance,
                    stale_inputs: *stale,
                })
                .collect::<Vec<_>>();
            let breakdown = ConfidenceScorer::new().score_assessments(generation, &assessments);
            prop_assert!((0.0..=1.0).contains(&breakdown.final_score));
        }
    }
}
