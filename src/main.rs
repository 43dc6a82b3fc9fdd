//! DRM Core - Entry Point
//!
//! Loads configuration, picks a storage backend, optionally puts the
//! advisory model gate in front of it, and serves the HTTP API.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use drm_core::auth::StaticTokenStore;
use drm_core::command::Engine;
use drm_core::core::config::{AppConfig, ModelConfig};
use drm_core::llm::{AdvisoryExecutor, LlmClient, ModelClient};
use drm_core::server;
use drm_core::store::{database, Backend, CommandExecutor, MemoryStore, PostgresStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendKind {
    Memory,
    Postgres,
}

/// DRM Core - natural-language CRUD over HTTP
#[derive(Parser, Debug)]
#[command(name = "drm-core")]
#[command(about = "Serve natural-language CRUD commands gated by RBAC and business rules")]
struct Args {
    /// Optional TOML config file; environment variables override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Storage backend
    #[arg(long, value_enum, default_value = "postgres")]
    backend: BackendKind,

    /// Listen address, overrides DRM_BIND
    #[arg(long)]
    bind: Option<String>,

    /// Never consult the model, even if it is reachable
    #[arg(long)]
    no_advisory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("drm_core=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?,
        None => AppConfig::new(),
    }
    .with_env()?;
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if args.no_advisory {
        config.model.enabled = false;
    }
    config.validate().map_err(anyhow::Error::msg)?;

    info!(backend = ?args.backend, advisory = config.model.enabled, "DRM Core starting...");

    let executor = match args.backend {
        BackendKind::Memory => {
            let store = MemoryStore::seeded();
            with_advisory(Arc::new(store), &config.model).await
        }
        BackendKind::Postgres => {
            let pool = database::connect(&config.database)
                .await
                .context("failed to initialize database")?;
            database::ensure_schema(&pool)
                .await
                .context("failed to create schema")?;
            let store = PostgresStore::new(pool, config.database.statement_timeout());
            with_advisory(Arc::new(store), &config.model).await
        }
    };

    let engine = Arc::new(Engine::new(
        Arc::new(StaticTokenStore::with_fixtures()),
        executor,
    ));

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    info!(bind = %config.server.bind, "Server listening");

    axum::serve(listener, server::router(engine))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Put the advisory gate in front of `backend` when enabled
async fn with_advisory<B: Backend + 'static>(
    backend: Arc<B>,
    model: &ModelConfig,
) -> Arc<dyn CommandExecutor> {
    if !model.enabled {
        return backend;
    }

    let client: Arc<dyn ModelClient> = Arc::new(LlmClient::new(model));
    let client = Some(client);
    let advisory = AdvisoryExecutor::connect(backend, client, model).await;
    if !advisory.is_live() {
        warn!(
            url = %model.api_url,
            "Running without the model; commands execute deterministically"
        );
    }
    Arc::new(advisory)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
