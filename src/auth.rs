//! Token → identity resolution
//!
//! The pipeline only sees the `IdentityProvider` trait; the static token
//! table is the built-in provider used by the service and tests.

use crate::core::error::AuthError;
use crate::core::types::Identity;
use std::collections::HashMap;

/// Resolves an opaque access token to the requesting identity
pub trait IdentityProvider: Send + Sync {
    /// Tokens are trimmed before lookup. Empty and whitespace-only tokens
    /// fail with `EmptyToken`, unknown ones with `InvalidToken`.
    fn resolve_token(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Fixed token table
#[derive(Debug, Clone, Default)]
pub struct StaticTokenStore {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The three built-in principals: one per role
    pub fn with_fixtures() -> Self {
        Self::new()
            .with_token("admin-token", Identity::new("1", "Admin", "admin"))
            .with_token("user-token", Identity::new("2", "User", "user"))
            .with_token("guest-token", Identity::new("3", "Guest", "guest"))
    }

    pub fn with_token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.tokens.insert(token.into(), identity);
        self
    }
}

impl IdentityProvider for StaticTokenStore {
    fn resolve_token(&self, token: &str) -> Result<Identity, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }

        self.tokens
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_tokens_resolve() {
        let store = StaticTokenStore::with_fixtures();

        let admin = store.resolve_token("admin-token").unwrap();
        assert_eq!(admin, Identity::new("1", "Admin", "admin"));

        let user = store.resolve_token("user-token").unwrap();
        assert_eq!(user.role, "user");

        let guest = store.resolve_token("guest-token").unwrap();
        assert_eq!(guest.id, "3");
    }

    #[test]
    fn test_token_is_trimmed() {
        let store = StaticTokenStore::with_fixtures();
        let identity = store.resolve_token("  admin-token\n").unwrap();
        assert_eq!(identity.role, "admin");
    }

    #[test]
    fn test_empty_token_distinct_from_unknown() {
        let store = StaticTokenStore::with_fixtures();
        assert_eq!(store.resolve_token(""), Err(AuthError::EmptyToken));
        assert_eq!(store.resolve_token("   \t"), Err(AuthError::EmptyToken));
        assert_eq!(
            store.resolve_token("invalid-token"),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let store = StaticTokenStore::with_fixtures();
        assert_eq!(
            store.resolve_token("ADMIN-TOKEN"),
            Err(AuthError::InvalidToken)
        );
    }
}
