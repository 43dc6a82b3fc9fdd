//! Command execution backends
//!
//! Every backend exposes one operation, `execute`. Deterministic backends
//! additionally expose a `snapshot` of their data so the advisory wrapper
//! can show the model what it is deciding about.
//!
//! Variants:
//! - `memory::MemoryStore` - per-entity tables behind one lock each
//! - `postgres::PostgresStore` - typed tables, one autocommit statement per command
//! - `crate::llm::advisory::AdvisoryExecutor` - veto gate in front of either

pub mod database;
pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::core::error::ExecutionError;
use crate::core::types::Command;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// Executes a validated command
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &Command) -> Result<Execution, ExecutionError>;
}

/// A deterministic executor whose state can be summarized for a prompt
#[async_trait]
pub trait Backend: CommandExecutor {
    async fn snapshot(&self) -> Result<Value, ExecutionError>;
}

/// Result of a successful command and the path that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct Execution {
    pub value: Value,
    pub path: ExecutionPath,
}

impl Execution {
    pub fn deterministic(value: Value) -> Self {
        Self {
            value,
            path: ExecutionPath::Deterministic,
        }
    }
}

/// Which branch of the advisory protocol ran
///
/// Every branch ends in deterministic execution; a model veto is an
/// `ExecutionError::AdvisoryRejected` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    /// No model involved
    Deterministic,
    /// The model approved, then the backend executed
    AdvisoryApproved,
    /// The model could not give a verdict, the backend executed anyway
    AdvisoryFallback(FallbackReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    Unreachable,
    Timeout,
    Unparsable,
    SnapshotUnavailable,
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FallbackReason::Unreachable => "model unreachable",
            FallbackReason::Timeout => "model timed out",
            FallbackReason::Unparsable => "unparsable model reply",
            FallbackReason::SnapshotUnavailable => "data snapshot unavailable",
        })
    }
}

impl fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionPath::Deterministic => f.write_str("deterministic"),
            ExecutionPath::AdvisoryApproved => f.write_str("advisory-approved"),
            ExecutionPath::AdvisoryFallback(reason) => write!(f, "advisory-fallback ({})", reason),
        }
    }
}
