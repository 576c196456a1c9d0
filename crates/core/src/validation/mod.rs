pub mod redline;
pub mod scoring;

use serde::{Deserialize, Serialize};

use crate::rules::RuleMatch;

pub use redline::{scan as redline_scan, RedlineReason, RedlineViolation};
pub use scoring::{ConfidenceScorer, MatchAssessment, ScoreBreakdown, ScoreStep, ScoreStepKind, ScoringPolicy};

pub const DEFAULT_ACCEPTANCE_THRESHOLD: f64 = 0.7;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub accepted: bool,
    pub confidence: f64,
    pub violations: Vec<RedlineViolation>,
    pub retry_count: u32,
    pub breakdown: ScoreBreakdown,
}

impl ValidationResult {
    /// Human-readable reasons for a rejection, fed back into the next generation attempt.
    pub fn rejection_reasons(&self, threshold: f64) -> Vec<String> {
        let mut reasons = self
            .violations
            .iter()
            .map(|violation| format!("output contained a {}", violation.reason.as_str().replace('_', " ")))
            .collect::<Vec<_>>();
        if !self.breakdown.contradicting_rules.is_empty() {
            reasons.push(format!(
                "output contradicted rule(s) {}",
                self.breakdown.contradicting_rules.join(", ")
            ));
        }
        if self.confidence < threshold {
            reasons.push(format!("confidence {:.2} is below {:.2}", self.confidence, threshold));
        }
        reasons
    }
}

#[derive(Clone, Debug)]
pub struct Validator {
    scorer: ConfidenceScorer,
    acceptance_threshold: f64,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(ConfidenceScorer::default(), DEFAULT_ACCEPTANCE_THRESHOLD)
    }
}

impl Validator {
    pub fn new(scorer: ConfidenceScorer, acceptance_threshold: f64) -> Self {
        Self { scorer, acceptance_threshold }
    }

    pub fn acceptance_threshold(&self) -> f64 {
        self.acceptance_threshold
    }

    /// Scores `text` against the turn's matches and redline-scans it. Redline hits
    /// reject the text whatever its score.
    pub fn validate(
        &self,
        text: &str,
        generation_confidence: Option<f64>,
        matches: &[RuleMatch],
        retry_count: u32,
    ) -> ValidationResult {
        let breakdown = self.scorer.score(generation_confidence, matches, text);
        let violations = redline::scan(text);
        let confidence = breakdown.final_score;

        ValidationResult {
            accepted: violations.is_empty() && confidence >= self.acceptance_threshold,
            confidence,
            violations,
            retry_count,
            breakdown,
        }
    }
}
