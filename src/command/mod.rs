//! Command processing
//!
//! query text -> IntentResolver -> Command -> Engine stages -> Execution

pub mod pipeline;
pub mod resolver;

pub use pipeline::Engine;
pub use resolver::{IntentResolver, DATA_MARKER};
