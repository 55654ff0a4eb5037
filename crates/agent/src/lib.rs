//! Turn runtime for the ice cream bot.
//!
//! - `recognizer`: optional intent recognition that pre-fills order slots
//! - `runtime`: per-conversation load, process, save cycle around the dialog manager
//!
//! Recognition only ever pre-fills. Prices and confirmations come from the
//! deterministic flows in `scoop-core`.

pub mod recognizer;
pub mod runtime;

pub use recognizer::{
    build_recognizer, IntentRecognizer, LuisRecognizer, NoopRecognizer, RecognizerError,
};
pub use runtime::{AgentRuntime, TurnFailure, TurnReply};
