//! Advisory decorator around a deterministic backend
//!
//! The model may veto a command but never answers it. Per request:
//!
//! - no live client: execute deterministically
//! - model unreachable, timed out, or unparsable: execute deterministically
//! - `success: false`: fail with the model's reason
//! - `success: true`: execute deterministically, model data is discarded
//!
//! Liveness is checked once at construction. A dead endpoint turns the
//! wrapper into a passthrough for its whole lifetime.

use crate::core::config::ModelConfig;
use crate::core::error::{ExecutionError, ModelError};
use crate::core::types::Command;
use crate::llm::client::ModelClient;
use crate::llm::context::AdvisoryContext;
use crate::llm::parser::parse_verdict;
use crate::store::{Backend, CommandExecutor, Execution, ExecutionPath, FallbackReason};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of asking the model about one command
#[derive(Debug, Clone, PartialEq)]
enum Consultation {
    Approved,
    Rejected(String),
    Unavailable(FallbackReason),
}

pub struct AdvisoryExecutor<B: Backend> {
    backend: Arc<B>,
    client: Option<Arc<dyn ModelClient>>,
    query_timeout: Duration,
}

impl<B: Backend> AdvisoryExecutor<B> {
    /// Wrap `backend`, keeping `client` only if it passes the liveness
    /// check within the configured deadline.
    pub async fn connect(
        backend: Arc<B>,
        client: Option<Arc<dyn ModelClient>>,
        config: &ModelConfig,
    ) -> Self {
        let client = match client {
            Some(client) => check_liveness(client, config.liveness_timeout()).await,
            None => None,
        };
        Self {
            backend,
            client,
            query_timeout: config.query_timeout(),
        }
    }

    /// Whether the liveness check succeeded at construction
    pub fn is_live(&self) -> bool {
        self.client.is_some()
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    async fn consult(&self, client: &dyn ModelClient, command: &Command) -> Consultation {
        let snapshot = match self.backend.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Snapshot for advisory prompt failed");
                return Consultation::Unavailable(FallbackReason::SnapshotUnavailable);
            }
        };
        let prompt = AdvisoryContext::new(command, snapshot).prompt();

        // Dropping the generate future on timeout cancels the HTTP request.
        let query = client.generate(&prompt);
        let reply = match tokio::time::timeout(self.query_timeout, query).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(ModelError::Timeout(_))) | Err(_) => {
                return Consultation::Unavailable(FallbackReason::Timeout);
            }
            Ok(Err(e)) => {
                debug!(error = %e, "Model query failed");
                return Consultation::Unavailable(FallbackReason::Unreachable);
            }
        };

        match parse_verdict(&reply) {
            Ok(verdict) if verdict.success => Consultation::Approved,
            Ok(verdict) => Consultation::Rejected(verdict.reason()),
            Err(e) => {
                debug!(error = %e, "Model reply did not parse");
                Consultation::Unavailable(FallbackReason::Unparsable)
            }
        }
    }
}

async fn check_liveness(
    client: Arc<dyn ModelClient>,
    deadline: Duration,
) -> Option<Arc<dyn ModelClient>> {
    match tokio::time::timeout(deadline, client.heartbeat()).await {
        Ok(Ok(())) => {
            info!("Model endpoint live, advisory gate enabled");
            Some(client)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Model endpoint unreachable, advisory gate disabled");
            None
        }
        Err(_) => {
            warn!(timeout = ?deadline, "Model liveness check timed out, advisory gate disabled");
            None
        }
    }
}

#[async_trait]
impl<B: Backend> CommandExecutor for AdvisoryExecutor<B> {
    async fn execute(&self, command: &Command) -> Result<Execution, ExecutionError> {
        let Some(client) = &self.client else {
            return self.backend.execute(command).await;
        };

        let path = match self.consult(client.as_ref(), command).await {
            Consultation::Approved => ExecutionPath::AdvisoryApproved,
            Consultation::Rejected(reason) => {
                info!(%reason, "Model vetoed command");
                return Err(ExecutionError::AdvisoryRejected(reason));
            }
            Consultation::Unavailable(reason) => {
                warn!(%reason, "Advisory fallback to deterministic execution");
                ExecutionPath::AdvisoryFallback(reason)
            }
        };

        let mut execution = self.backend.execute(command).await?;
        execution.path = path;
        Ok(execution)
    }
}

#[async_trait]
impl<B: Backend> Backend for AdvisoryExecutor<B> {
    async fn snapshot(&self) -> Result<Value, ExecutionError> {
        self.backend.snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Action, Entity};
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replies with a fixed string after an optional delay
    struct Scripted {
        live: bool,
        reply: Result<String, ()>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn replying(reply: &str) -> Self {
            Self {
                live: true,
                reply: Ok(reply.to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ModelClient for Scripted {
        async fn heartbeat(&self) -> Result<(), ModelError> {
            if self.live {
                Ok(())
            } else {
                Err(ModelError::Status("503 Service Unavailable".into()))
            }
        }

        async fn generate(&self, _prompt: &str) -> Result<String, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.reply
                .clone()
                .map_err(|_| ModelError::Status("connection reset".into()))
        }
    }

    /// Executes every command but cannot describe its data
    struct NoSnapshot;

    #[async_trait]
    impl CommandExecutor for NoSnapshot {
        async fn execute(&self, _command: &Command) -> Result<Execution, ExecutionError> {
            let value = json!({"message": "deleted successfully"});
            Ok(Execution::deterministic(value))
        }
    }

    #[async_trait]
    impl Backend for NoSnapshot {
        async fn snapshot(&self) -> Result<Value, ExecutionError> {
            Err(ExecutionError::BackendUnavailable("down".into()))
        }
    }

    fn delete_user_1() -> Command {
        Command::new(
            Action::Delete,
            Entity::User,
            json!({"id": "1"}).as_object().cloned().unwrap(),
        )
    }

    async fn wrap(client: Scripted) -> (AdvisoryExecutor<MemoryStore>, Arc<Scripted>) {
        let client = Arc::new(client);
        let executor = AdvisoryExecutor::connect(
            Arc::new(MemoryStore::seeded()),
            Some(client.clone() as Arc<dyn ModelClient>),
            &ModelConfig::default(),
        )
        .await;
        (executor, client)
    }

    #[tokio::test]
    async fn test_no_client_is_deterministic() {
        let executor = AdvisoryExecutor::connect(
            Arc::new(MemoryStore::seeded()),
            None,
            &ModelConfig::default(),
        )
        .await;
        assert!(!executor.is_live());
        let exec = executor.execute(&delete_user_1()).await.unwrap();
        assert_eq!(exec.path, ExecutionPath::Deterministic);
    }

    #[tokio::test]
    async fn test_dead_endpoint_becomes_passthrough() {
        let mut client = Scripted::replying(r#"{"success": false, "error": "no"}"#);
        client.live = false;
        let (executor, client) = wrap(client).await;

        assert!(!executor.is_live());
        let exec = executor.execute(&delete_user_1()).await.unwrap();
        assert_eq!(exec.path, ExecutionPath::Deterministic);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_approval_still_executes_deterministically() {
        let reply = r#"{"success": true, "data": {"message": "made up"}}"#;
        let (executor, _) = wrap(Scripted::replying(reply)).await;
        let exec = executor.execute(&delete_user_1()).await.unwrap();
        assert_eq!(exec.path, ExecutionPath::AdvisoryApproved);
        assert_eq!(exec.value["message"], "deleted successfully");
        assert_eq!(executor.backend().len(Entity::User).await, 1);
    }

    #[tokio::test]
    async fn test_veto_fails_without_side_effects() {
        let reply = r#"{"success": false, "error": "user has open orders"}"#;
        let (executor, _) = wrap(Scripted::replying(reply)).await;
        let err = executor.execute(&delete_user_1()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "LLM execution failed: user has open orders"
        );
        assert_eq!(executor.backend().len(Entity::User).await, 2);
    }

    #[tokio::test]
    async fn test_unparsable_reply_falls_back() {
        let (executor, _) = wrap(Scripted::replying("I think that is fine")).await;
        let exec = executor.execute(&delete_user_1()).await.unwrap();
        assert_eq!(
            exec.path,
            ExecutionPath::AdvisoryFallback(FallbackReason::Unparsable)
        );
    }

    #[tokio::test]
    async fn test_query_error_falls_back() {
        let mut client = Scripted::replying("");
        client.reply = Err(());
        let (executor, _) = wrap(client).await;
        let exec = executor.execute(&delete_user_1()).await.unwrap();
        assert_eq!(
            exec.path,
            ExecutionPath::AdvisoryFallback(FallbackReason::Unreachable)
        );
    }

    #[tokio::test]
    async fn test_slow_model_times_out_and_falls_back() {
        let mut client = Scripted::replying(r#"{"success": false, "error": "too late"}"#);
        client.delay = Duration::from_secs(60);
        let config = ModelConfig {
            query_timeout_ms: 50,
            ..ModelConfig::default()
        };
        let executor = AdvisoryExecutor::connect(
            Arc::new(MemoryStore::seeded()),
            Some(Arc::new(client) as Arc<dyn ModelClient>),
            &config,
        )
        .await;

        let exec = executor.execute(&delete_user_1()).await.unwrap();
        assert_eq!(
            exec.path,
            ExecutionPath::AdvisoryFallback(FallbackReason::Timeout)
        );
        assert_eq!(executor.backend().len(Entity::User).await, 1);
    }

    #[tokio::test]
    async fn test_snapshot_failure_falls_back_without_querying() {
        let client = Arc::new(Scripted::replying(r#"{"success": false}"#));
        let executor = AdvisoryExecutor::connect(
            Arc::new(NoSnapshot),
            Some(client.clone() as Arc<dyn ModelClient>),
            &ModelConfig::default(),
        )
        .await;
        assert!(executor.is_live());

        let exec = executor.execute(&delete_user_1()).await.unwrap();
        assert_eq!(
            exec.path,
            ExecutionPath::AdvisoryFallback(FallbackReason::SnapshotUnavailable)
        );
        assert_eq!(exec.value["message"], "deleted successfully");
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_deterministic_errors_pass_through() {
        let (executor, _) = wrap(Scripted::replying(r#"{"success": true}"#)).await;
        let command = Command::new(
            Action::Read,
            Entity::Product,
            json!({"id": "9"}).as_object().cloned().unwrap(),
        );
        let err = executor.execute(&command).await.unwrap_err();
        assert!(matches!(err, ExecutionError::NotFound(Entity::Product)));
    }
}
