use std::cmp::Ordering;
use std::sync::Arc;

use tracing::warn;

use crate::domain::context::{ContextSnapshot, FieldValue};
use crate::domain::intent::Category;
use crate::domain::recommendation::Priority;
use crate::rules::{Condition, Operator, Rule, RuleSet, RuleValue};

/// Multiplier applied to a match whose conditions read a stale context source.
pub const STALE_INPUT_PENALTY: f64 = 0.8;

#[derive(Clone, Debug, PartialEq)]
pub struct RuleMatch {
    pub rule: Arc<Rule>,
    pub confidence: f64,
    pub stale_inputs: bool,
}

impl RuleMatch {
    pub fn id(&self) -> &str {
        &self.rule.id
    }

    pub fn priority(&self) -> Priority {
        self.rule.priority
    }

    pub fn action(&self) -> &str {
        &self.rule.directive.action
    }
}

pub trait RuleEngine: Send + Sync {
    /// All rules of `category` whose conditions hold, ordered by
    /// (priority desc, base confidence desc, rule id asc).
    fn evaluate(&self, snapshot: &ContextSnapshot, category: Category) -> Vec<RuleMatch>;
}

#[derive(Clone, Debug)]
pub struct DeterministicRuleEngine {
    rules: Arc<RuleSet>,
}

impl DeterministicRuleEngine {
    pub fn new(rules: Arc<RuleSet>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }
}

impl RuleEngine for DeterministicRuleEngine {
    fn evaluate(&self, snapshot: &ContextSnapshot, category: Category) -> Vec<RuleMatch> {
        let mut matches = self
            .rules
            .in_category(category)
            .filter(|rule| rule.conditions.iter().all(|condition| condition_holds(condition, snapshot)))
            .map(|rule| {
                let stale_inputs = rule
                    .conditions
                    .iter()
                    .any(|condition| snapshot.is_stale(ContextSnapshot::field_source(&condition.field)));
                let confidence = if stale_inputs {
                    rule.base_confidence * STALE_INPUT_PENALTY
                } else {
                    rule.base_confidence
                };
                RuleMatch { rule: Arc::clone(rule), confidence, stale_inputs }
            })
            .collect::<Vec<_>>();

        matches.sort_by(match_order);
        matches
    }
}

fn match_order(left: &RuleMatch, right: &RuleMatch) -> Ordering {
    right
        .rule
        .priority
        .cmp(&left.rule.priority)
        .then_with(|| right.rule.base_confidence.total_cmp(&left.rule.base_confidence))
        .then_with(|| left.rule.id.cmp(&right.rule.id))
}

pub fn condition_holds(condition: &Condition, snapshot: &ContextSnapshot) -> bool {
    let Some(actual) = snapshot.field(&condition.field) else {
        return false;
    };

    match (condition.op, &condition.value) {
        (Operator::Eq, expected) => values_equal(&actual, expected),
        (Operator::Gte, RuleValue::Number(bound)) => {
            matches!(actual, FieldValue::Number(value) if value >= *bound)
        }
        (Operator::Lte, RuleValue::Number(bound)) => {
            matches!(actual, FieldValue::Number(value) if value <= *bound)
        }
        (Operator::In, RuleValue::List(members)) => {
            members.iter().any(|member| values_equal(&actual, member))
        }
        (Operator::Range, RuleValue::List(bounds)) => match (bounds.as_slice(), &actual) {
            ([min, max], FieldValue::Number(value)) => match (min.as_number(), max.as_number()) {
                (Some(min), Some(max)) => (min..=max).contains(value),
                _ => false,
            },
            _ => false,
        },
        _ => false,
    }
}

fn values_equal(actual: &FieldValue, expected: &RuleValue) -> bool {
    match (actual, expected) {
        (FieldValue::Number(actual), RuleValue::Number(expected)) => {
            (actual - expected).abs() <= f64::EPSILON
        }
        (FieldValue::Text(actual), RuleValue::Text(expected)) => {
            actual.trim().eq_ignore_ascii_case(expected.trim())
        }
        (FieldValue::Flag(actual), RuleValue::Flag(expected)) => actual == expected,
        _ => false,
    }
}

/// Matches that survive conflict resolution, plus the ones set aside.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedMatches {
    pub kept: Vec<RuleMatch>,
    pub set_aside: Vec<RuleMatch>,
}

/// When matches in one category recommend different actions, the highest-ranked
/// match's action wins and the rest are set aside. Input must already be ordered.
pub fn resolve_conflicts(matches: Vec<RuleMatch>) -> ResolvedMatches {
    let Some(leading_action) = matches.first().map(|first| first.action().to_string()) else {
        return ResolvedMatches::default();
    };

    let (kept, set_aside): (Vec<_>, Vec<_>) =
        matches.into_iter().partition(|candidate| candidate.action() == leading_action);

    if !set_aside.is_empty() {
        warn!(
            event_name = "rules.conflict_resolved",
            leading_action = %leading_action,
            kept = ?kept.iter().map(RuleMatch::id).collect::<Vec<_>>(),
            set_aside = ?set_aside.iter().map(RuleMatch::id).collect::<Vec<_>>(),
            "matching rules disagree; keeping the highest-ranked action"
        );
    }

    ResolvedMatches { kept, set_aside }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{condition_holds, resolve_conflicts, DeterministicRuleEngine, RuleEngine};
    use crate::domain::context::fixtures::snapshot;
    use crate::domain::context::ContextSource;
    use crate::domain::intent::Category;
    use crate::rules::{Condition, Operator, RuleSet, RuleValue};

    fn engine() -> DeterministicRuleEngine {
        DeterministicRuleEngine::new(Arc::new(RuleSet::builtin().expect("builtin rules")))
    }

    fn condition(field: &str, op: Operator, value: RuleValue) -> Condition {
        Condition { field: field.to_string(), op, value }
    }

    #[test]
    fn operators_follow_documented_semantics() {
        let snapshot = snapshot("cotton", "sandy");

        assert!(condition_holds(
            &condition("farm.soil_type", Operator::Eq, RuleValue::Text("Sandy".to_string())),
            &snapshot
        ));
        assert!(condition_holds(
            &condition("soil.moisture_pct", Operator::Gte, RuleValue::Number(25.0)),
            &snapshot
        ));
        assert!(condition_holds(
            &condition("soil.moisture_pct", Operator::Lte, RuleValue::Number(25.0)),
            &snapshot
        ));
        assert!(condition_holds(
            &condition(
                "soil.moisture_pct",
                Operator::Range,
                RuleValue::List(vec![RuleValue::Number(25.0), RuleValue::Number(30.0)])
            ),
            &snapshot
        ));
        assert!(!condition_holds(
            &condition(
                "soil.moisture_pct",
                Operator::Range,
                RuleValue::List(vec![RuleValue::Number(25.1), RuleValue::Number(30.0)])
            ),
            &snapshot
        ));
        assert!(condition_holds(
            &condition(
                "farm.crop",
                Operator::In,
                RuleValue::List(vec![
                    RuleValue::Text("wheat".to_string()),
                    RuleValue::Text("cotton".to_string())
                ])
            ),
            &snapshot
        ));
        assert!(condition_holds(
            &condition("weather.rain_expected_24h", Operator::Eq, RuleValue::Flag(false)),
            &snapshot
        ));
    }

    #[test]
    fn type_mismatch_and_missing_fields_never_match() {
        let snapshot = snapshot("cotton", "sandy");
        assert!(!condition_holds(
            &condition("farm.crop", Operator::Gte, RuleValue::Number(1.0)),
            &snapshot
        ));
        assert!(!condition_holds(
            &condition("crop.observed_pest", Operator::Eq, RuleValue::Text("aphid".to_string())),
            &snapshot
        ));
    }

    #[test]
    fn dry_sandy_soil_without_rain_matches_irrigation_rule() {
        let matches = engine().evaluate(&snapshot("cotton", "sandy"), Category::Irrigation);
        assert!(!matches.is_empty());
        assert_eq!(matches[0].action(), "irrigate");
        assert!(matches.iter().all(|found| found.rule.category == Category::Irrigation));
    }

    #[test]
    fn irrigation_rules_fire_right_up_to_the_soil_threshold() {
        let engine = engine();
        let mut sandy = snapshot("cotton", "sandy");
        sandy.soil.moisture_pct = 29.95;
        let matches = engine.evaluate(&sandy, Category::Irrigation);
        assert!(matches.iter().any(|found| found.id() == "IRR-001"));

        let mut silt = snapshot("wheat", "silt");
        silt.soil.moisture_pct = 35.5;
        let matches = engine.evaluate(&silt, Category::Irrigation);
        assert!(matches.iter().any(|found| found.id() == "IRR-003"));

        silt.soil.moisture_pct = 36.0;
        assert!(engine.evaluate(&silt, Category::Irrigation).iter().all(|found| found.action() != "irrigate"));
    }

    #[test]
    fn matches_are_ordered_by_priority_confidence_then_id() {
        let mut hot = snapshot("cotton", "sandy");
        hot.weather.temperature_c = 34.0;
        let matches = engine().evaluate(&hot, Category::Irrigation);
        assert!(matches.len() >= 2);
        for pair in matches.windows(2) {
            let (left, right) = (&pair[0].rule, &pair[1].rule);
            let ordered = left.priority > right.priority
                || (left.priority == right.priority && left.base_confidence > right.base_confidence)
                || (left.priority == right.priority
                    && left.base_confidence == right.base_confidence
                    && left.id < right.id);
            assert!(ordered, "{} should precede {}", left.id, right.id);
        }
    }

    #[test]
    fn evaluation_is_deterministic_across_calls() {
        let engine = engine();
        let snapshot = snapshot("cotton", "sandy");
        for category in Category::ALL {
            let first = engine.evaluate(&snapshot, category);
            let second = engine.evaluate(&snapshot, category);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn stale_inputs_discount_match_confidence() {
        let engine = engine();
        let fresh = engine.evaluate(&snapshot("cotton", "sandy"), Category::Irrigation);
        let stale = engine.evaluate(
            &snapshot("cotton", "sandy").with_stale(ContextSource::Weather),
            Category::Irrigation,
        );
        assert_eq!(fresh.len(), stale.len());
        assert!(stale[0].stale_inputs);
        assert!((stale[0].confidence - fresh[0].confidence * 0.8).abs() < 1e-9);
    }

    #[test]
    fn conflicting_actions_keep_the_leading_rule() {
        let reported = snapshot("cotton", "sandy").with_reported_pest(Some("cotton bollworm".to_string()));
        let mut humid = reported;
        humid.weather.humidity_pct = 85.0;
        humid.weather.temperature_c = 29.0;

        let matches = engine().evaluate(&humid, Category::PestControl);
        let resolved = resolve_conflicts(matches);
        assert_eq!(resolved.kept[0].action(), "chemical_control");
        assert!(resolved.kept.iter().all(|kept| kept.action() == "chemical_control"));
        assert!(resolved.set_aside.iter().any(|aside| aside.action() == "preventive_cultural"));
    }
}
