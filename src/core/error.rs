use crate::core::types::{Action, Entity};
use std::time::Duration;
use thiserror::Error;

/// Token resolution failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("token is required")]
    EmptyToken,

    #[error("invalid token")]
    InvalidToken,
}

/// Intent resolution failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty query")]
    EmptyQuery,

    #[error("unknown entity in query: {0}")]
    UnknownEntity(String),

    #[error("invalid JSON data: {0}")]
    InvalidData(String),
}

/// Business rule violations, one per registered rule
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("user name is required")]
    UserNameRequired,

    #[error("user email is required")]
    UserEmailRequired,

    #[error("no data provided for update")]
    EmptyUpdate,

    #[error("product name is required")]
    ProductNameRequired,

    #[error("product price must be positive")]
    ProductPriceNotPositive,

    #[error("order must have at least one item")]
    OrderItemsRequired,
}

/// Backend execution failures
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("{0} not found")]
    NotFound(Entity),

    #[error("{entity} {field} is required")]
    MissingField { entity: Entity, field: &'static str },

    #[error("{entity} {field} must be positive")]
    NotPositive { entity: Entity, field: &'static str },

    #[error("{entity} ID is required for {action}")]
    MissingId { entity: Entity, action: Action },

    #[error("invalid {entity} ID: {value}")]
    InvalidId { entity: Entity, value: String },

    #[error("no fields to update")]
    NoFieldsToUpdate,

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("LLM execution failed: {0}")]
    AdvisoryRejected(String),

    /// Driver detail stays in the logs
    #[error("database error")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Generative-model client failures
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model API error: {0}")]
    Status(String),

    #[error("empty model response")]
    EmptyResponse,

    #[error("malformed model reply: {0}")]
    MalformedReply(String),

    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
}

/// Configuration loading failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("invalid {key} value: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Database bootstrap failures
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("failed to load database config: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to connect after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// The single user-visible failure, tagged with the stage that failed
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),

    #[error("parsing failed: {0}")]
    Parsing(#[from] ParseError),

    #[error("access denied for action {action} on entity {entity}")]
    AccessDenied { action: Action, entity: Entity },

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
