//! Agent runtime: the async side of the advisory engine.
//!
//! - `router` classifies a farmer's query into an intent
//! - `context` gathers weather and farm data concurrently under timeouts
//! - `llm` and `prompt` talk to the text-generation backend
//! - `runtime` drives each turn through the `tarla_core::flows` state machine
//!
//! The language model only phrases advice. Every number it may quote comes from
//! the deterministic evaluators and rules in `tarla-core`, and every answer is
//! scored and redline-scanned before it leaves the runtime.

pub mod audit;
pub mod context;
pub mod llm;
pub mod prompt;
pub mod router;
pub mod runtime;

pub use context::{ContextAssembler, ContextRequest, FarmProfileProvider, WeatherProvider};
pub use llm::{Completion, LlmClient};
pub use router::{IntentRouter, RoutedIntent};
pub use runtime::{AgentRuntime, TurnRequest};
