//! Versioned, structured condition rules.
//!
//! A [`RuleSet`] is parsed and validated once, then shared read-only
//! (`Arc<RuleSet>`) by every turn. Nothing in this module mutates a rule after load.

pub mod engine;
pub mod template;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::context::KNOWN_FIELDS;
use crate::domain::intent::Category;
use crate::domain::recommendation::Priority;

pub use engine::{resolve_conflicts, DeterministicRuleEngine, ResolvedMatches, RuleEngine, RuleMatch};

const BUILTIN_RULES: &str = include_str!("../../rules/default_rules.toml");

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Gte,
    Lte,
    In,
    Range,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    Flag(bool),
    Number(f64),
    Text(String),
    List(Vec<RuleValue>),
}

impl RuleValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: Operator,
    pub value: RuleValue,
}

/// What a rule recommends, plus the phrases used to decide whether generated text
/// agrees with it (`affirm`) or contradicts it (`negate`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    pub action: String,
    pub affirm: Vec<String>,
    #[serde(default)]
    pub negate: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stance {
    Agrees,
    Contradicts,
    Silent,
}

impl Directive {
    /// Negating phrases are cut out of the text before affirmations are searched,
    /// so "do not irrigate" never counts as an affirmation of "irrigate". A text
    /// that still affirms outside its negations agrees.
    pub fn stance_toward(&self, text: &str) -> Stance {
        let mut remainder = text.to_lowercase();
        let mut negated = false;
        for phrase in &self.negate {
            let phrase = phrase.to_lowercase();
            if remainder.contains(&phrase) {
                negated = true;
                remainder = remainder.replace(&phrase, " ");
            }
        }

        let affirmed =
            self.affirm.iter().any(|phrase| remainder.contains(&phrase.to_lowercase()));
        match (affirmed, negated) {
            (true, _) => Stance::Agrees,
            (false, true) => Stance::Contradicts,
            (false, false) => Stance::Silent,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub category: Category,
    pub priority: Priority,
    pub base_confidence: f64,
    pub template: String,
    pub directive: Directive,
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Error)]
pub enum RuleSetError {
    #[error("could not read rule file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse rule table: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("rule table declares no rules")]
    Empty,
    #[error("duplicate rule id `{0}`")]
    DuplicateId(String),
    #[error("rule `{id}` has base_confidence {value} outside 0..=1")]
    InvalidConfidence { id: String, value: f64 },
    #[error("rule `{0}` has no conditions")]
    NoConditions(String),
    #[error("rule `{0}` has an empty directive")]
    EmptyDirective(String),
    #[error("rule `{id}` references unknown field `{field}`")]
    UnknownField { id: String, field: String },
    #[error("rule `{id}` condition on `{field}` is malformed: {reason}")]
    InvalidOperand { id: String, field: String, reason: String },
}

#[derive(Debug, Deserialize)]
struct RuleTable {
    version: String,
    #[serde(default)]
    rules: Vec<Rule>,
}

#[derive(Clone, Debug)]
pub struct RuleSet {
    version: String,
    rules: Vec<Arc<Rule>>,
}

impl RuleSet {
    /// The rule table compiled into the binary.
    pub fn builtin() -> Result<Self, RuleSetError> {
        Self::from_toml_str(BUILTIN_RULES)
    }

    pub fn load(path: &Path) -> Result<Self, RuleSetError> {
        let raw = fs::read_to_string(path)
            .map_err(|source| RuleSetError::ReadFile { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&raw)
    }

    /// Loads `path` when given, otherwise the builtin table.
    pub fn load_or_builtin(path: Option<&Path>) -> Result<Self, RuleSetError> {
        match path {
            Some(path) => Self::load(path),
            None => Self::builtin(),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, RuleSetError> {
        let table = toml::from_str::<RuleTable>(raw)?;
        Self::from_rules(table.version, table.rules)
    }

    pub fn from_rules(version: impl Into<String>, rules: Vec<Rule>) -> Result<Self, RuleSetError> {
        if rules.is_empty() {
            return Err(RuleSetError::Empty);
        }

        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.id.clone()) {
                return Err(RuleSetError::DuplicateId(rule.id.clone()));
            }
            validate_rule(rule)?;
        }

        Ok(Self { version: version.into(), rules: rules.into_iter().map(Arc::new).collect() })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn rules(&self) -> &[Arc<Rule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Rule>> {
        self.rules.iter().find(|rule| rule.id == id)
    }

    pub fn in_category(&self, category: Category) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.iter().filter(move |rule| rule.category == category)
    }
}

fn validate_rule(rule: &Rule) -> Result<(), RuleSetError> {
    if !rule.base_confidence.is_finite() || !(0.0..=1.0).contains(&rule.base_confidence) {
        return Err(RuleSetError::InvalidConfidence {
            id: rule.id.clone(),
            value: rule.base_confidence,
        });
    }
    if rule.conditions.is_empty() {
        return Err(RuleSetError::NoConditions(rule.id.clone()));
    }
    if rule.directive.action.trim().is_empty() || rule.directive.affirm.is_empty() {
        return Err(RuleSetError::EmptyDirective(rule.id.clone()));
    }

    for condition in &rule.conditions {
        if !KNOWN_FIELDS.contains(&condition.field.as_str()) {
            return Err(RuleSetError::UnknownField {
                id: rule.id.clone(),
                field: condition.field.clone(),
            });
        }
        validate_operand(condition).map_err(|reason| RuleSetError::InvalidOperand {
            id: rule.id.clone(),
            field: condition.field.clone(),
            reason,
        })?;
    }

    Ok(())
}

fn validate_operand(condition: &Condition) -> Result<(), String> {
    match (condition.op, &condition.value) {
        (Operator::Eq, RuleValue::List(_)) => Err("`eq` takes a scalar value".to_string()),
        (Operator::Eq, _) => Ok(()),
        (Operator::Gte | Operator::Lte, RuleValue::Number(value)) if value.is_finite() => Ok(()),
        (Operator::Gte | Operator::Lte, _) => {
            Err("`gte`/`lte` take a finite number".to_string())
        }
        (Operator::In, RuleValue::List(items))
            if !items.is_empty() && !items.iter().any(|item| matches!(item, RuleValue::List(_))) =>
        {
            Ok(())
        }
        (Operator::In, _) => Err("`in` takes a non-empty flat list".to_string()),
        (Operator::Range, RuleValue::List(bounds)) => match bounds.as_slice() {
            [min, max] => match (min.as_number(), max.as_number()) {
                (Some(min), Some(max)) if min <= max => Ok(()),
                _ => Err("`range` bounds must be numbers with min <= max".to_string()),
            },
            _ => Err("`range` takes exactly two bounds".to_string()),
        },
        (Operator::Range, _) => Err("`range` takes a [min, max] list".to_string()),
    }
}
