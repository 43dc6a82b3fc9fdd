//! Generative-model integration
//!
//! The model is an optional advisory gate in front of a deterministic
//! backend. It can veto a command; it never produces the result.

pub mod advisory;
pub mod client;
pub mod context;
pub mod parser;

pub use advisory::AdvisoryExecutor;
pub use client::{ApiFormat, LlmClient, ModelClient};
pub use parser::AdvisoryVerdict;
