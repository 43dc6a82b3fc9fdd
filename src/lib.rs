//! DRM Core - natural-language CRUD commands gated by RBAC and business rules

pub mod auth;
pub mod command;
pub mod core;
pub mod llm;
pub mod rules;
pub mod server;
pub mod store;
