//! Request gating: access policy and business rules

pub mod access;
pub mod validation;

pub use access::{AccessPolicy, ROLE_ADMIN, ROLE_GUEST, ROLE_USER};
pub use validation::RuleValidator;
