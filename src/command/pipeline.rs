//! Request pipeline - authenticate, resolve, authorize, validate, execute
//!
//! Stages run in a fixed order and the first failure aborts the request.
//! Only the executor performs I/O, so a request rejected before execution
//! has no side effects.

use crate::auth::{IdentityProvider, StaticTokenStore};
use crate::command::resolver::IntentResolver;
use crate::core::error::{PipelineError, Result};
use crate::rules::access::AccessPolicy;
use crate::rules::validation::RuleValidator;
use crate::store::{CommandExecutor, Execution, MemoryStore};
use std::sync::Arc;
use tracing::field::Empty;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Sequences the pipeline stages for every request
pub struct Engine {
    identity: Arc<dyn IdentityProvider>,
    resolver: IntentResolver,
    policy: AccessPolicy,
    validator: RuleValidator,
    executor: Arc<dyn CommandExecutor>,
}

impl Engine {
    /// Built-in policy, rules and resolver around the given collaborators
    pub fn new(identity: Arc<dyn IdentityProvider>, executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            identity,
            resolver: IntentResolver::new(),
            policy: AccessPolicy::builtin(),
            validator: RuleValidator::new(),
            executor,
        }
    }

    /// Fixture tokens over a seeded in-memory store
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(StaticTokenStore::with_fixtures()),
            Arc::new(MemoryStore::seeded()),
        )
    }

    pub fn with_resolver(mut self, resolver: IntentResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run one request through every stage.
    ///
    /// Errors carry the failing stage in their message. The token is never
    /// logged.
    pub async fn process_request(&self, query: &str, token: &str) -> Result<Execution> {
        let span = info_span!(
            "request",
            request_id = %Uuid::new_v4(),
            action = Empty,
            entity = Empty
        );
        self.run(query, token, &span).instrument(span.clone()).await
    }

    async fn run(&self, query: &str, token: &str, span: &tracing::Span) -> Result<Execution> {
        let identity = self.identity.resolve_token(token)?;
        debug!(user_id = %identity.id, role = %identity.role, "Authenticated");

        let command = self.resolver.resolve(query)?.with_identity(&identity);
        span.record("action", command.action.as_str());
        span.record("entity", command.entity.as_str());

        if !self.policy.check_access(&command) {
            warn!(role = %command.user_role, "Access denied");
            return Err(PipelineError::AccessDenied {
                action: command.action,
                entity: command.entity,
            });
        }

        self.validator.validate(&command)?;

        let execution = self.executor.execute(&command).await?;
        info!(path = %execution.path, "Command executed");
        Ok(execution)
    }
}
