pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod evaluators;
pub mod flows;
pub mod rules;
pub mod validation;

pub use audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};
pub use domain::context::{ContextSnapshot, ContextSource, FarmRecord, WeatherWindow};
pub use domain::intent::{Category, Intent};
pub use domain::query::{Language, Query};
pub use domain::recommendation::{AdvisoryResponse, Priority, Recommendation};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use evaluators::{evaluator_for, DomainOutput, EvaluatorError, SpecialistEvaluator};
pub use flows::{TurnFlow, TurnPhase, TurnState, MAX_RETRIES};
pub use rules::{DeterministicRuleEngine, RuleEngine, RuleMatch, RuleSet, RuleSetError};
pub use validation::{ConfidenceScorer, ValidationResult, Validator};
