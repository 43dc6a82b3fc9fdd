//! Relational store bootstrap: connect with bounded retry, create the
//! schema, health ping.

use crate::core::config::DatabaseConfig;
use crate::core::error::DatabaseError;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::{info, warn};

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS users (
        id SERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS products (
        id SERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        price DOUBLE PRECISION NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
    "CREATE TABLE IF NOT EXISTS orders (
        id SERIAL PRIMARY KEY,
        user_id INTEGER,
        items TEXT NOT NULL,
        total_amount DOUBLE PRECISION,
        status TEXT NOT NULL DEFAULT 'pending',
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )",
];

fn connect_options(config: &DatabaseConfig) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.dbname)
}

/// Open a pool and ping it, retrying a fixed number of times.
///
/// Exhausting the attempts is fatal for the caller. Only startup goes
/// through here; request statements are never retried.
pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    config.require_password()?;
    info!(
        host = %config.host,
        port = config.port,
        user = %config.user,
        password = %config.masked_password(),
        dbname = %config.dbname,
        "Connecting to database"
    );

    let attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match try_connect(config).await {
            Ok(pool) => {
                info!(attempt, "Database connection established");
                return Ok(pool);
            }
            Err(source) if attempt >= attempts => {
                return Err(DatabaseError::Exhausted { attempts, source });
            }
            Err(e) => {
                warn!(
                    attempt,
                    max_attempts = attempts,
                    error = %e,
                    "Database connection failed, retrying"
                );
                tokio::time::sleep(config.retry_delay()).await;
                attempt += 1;
            }
        }
    }
}

async fn try_connect(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let attempt = async {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect_with(connect_options(config))
            .await?;
        health(&pool).await?;
        Ok::<_, sqlx::Error>(pool)
    };
    tokio::time::timeout(config.connect_timeout(), attempt)
        .await
        .unwrap_or(Err(sqlx::Error::PoolTimedOut))
}

/// Create the three tables if they are missing
pub async fn ensure_schema(pool: &PgPool) -> Result<(), DatabaseError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

pub async fn health(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
