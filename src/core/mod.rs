pub mod config;
pub mod error;
pub mod types;

pub use types::{Action, Command, Entity, Identity, Record};
