//! Service configuration with documented defaults
//!
//! Values come from (in increasing precedence) built-in defaults, an
//! optional TOML file, environment variables, and finally CLI flags applied
//! by the binary.

use crate::core::error::ConfigError;
use crate::llm::client::ApiFormat;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub model: ModelConfig,
    pub server: ServerConfig,
}

/// Relational store connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,

    /// Connection attempts made at startup before giving up
    ///
    /// Only startup retries; per-request statements are never retried.
    pub max_attempts: u32,

    /// Fixed delay between connection attempts (milliseconds)
    pub retry_delay_ms: u64,

    /// Deadline for a single connection attempt including the ping (milliseconds)
    pub connect_timeout_ms: u64,

    /// Deadline for every statement issued on behalf of a request (milliseconds)
    pub statement_timeout_ms: u64,

    /// Upper bound of the connection pool
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            user: "postgres".into(),
            password: String::new(),
            dbname: "postgres".into(),
            max_attempts: 5,
            retry_delay_ms: 2_000,
            connect_timeout_ms: 10_000,
            statement_timeout_ms: 5_000,
            max_connections: 10,
        }
    }
}

impl DatabaseConfig {
    /// Read `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD` and `DB_NAME`.
    ///
    /// `DB_PASSWORD` is required.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_lookup(&lookup)?;
        config.require_password()?;
        Ok(config)
    }

    fn apply_lookup(
        &mut self,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(port) = lookup("DB_PORT") {
            self.port = port.parse().map_err(|_| ConfigError::Invalid {
                key: "DB_PORT",
                value: port.clone(),
            })?;
        }
        if let Some(host) = lookup("DB_HOST") {
            self.host = host;
        }
        if let Some(user) = lookup("DB_USER") {
            self.user = user;
        }
        if let Some(password) = lookup("DB_PASSWORD") {
            self.password = password;
        }
        if let Some(dbname) = lookup("DB_NAME") {
            self.dbname = dbname;
        }
        Ok(())
    }

    pub fn require_password(&self) -> Result<(), ConfigError> {
        if self.password.is_empty() {
            return Err(ConfigError::Missing("DB_PASSWORD"));
        }
        Ok(())
    }

    /// Password rendered safe for logs
    pub fn masked_password(&self) -> String {
        mask_password(&self.password)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }
}

/// Generative-model endpoint settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Whether the advisory wrapper is installed at all
    pub enabled: bool,
    pub api_url: String,
    pub api_format: ApiFormat,
    pub api_key: Option<String>,
    pub model: String,

    /// Deadline for the one-time liveness check at construction (milliseconds)
    pub liveness_timeout_ms: u64,

    /// Deadline for each advisory query (milliseconds)
    pub query_timeout_ms: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: "http://127.0.0.1:11434".into(),
            api_format: ApiFormat::Ollama,
            api_key: None,
            model: "llama3.2:1b".into(),
            liveness_timeout_ms: 2_000,
            query_timeout_ms: 5_000,
        }
    }
}

impl ModelConfig {
    /// Read `LLM_API_URL` (or `OLLAMA_HOST`), `LLM_MODEL`, `LLM_API_FORMAT`,
    /// `LLM_API_KEY` and `ADVISORY_ENABLED`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_lookup)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_lookup(&lookup)?;
        Ok(config)
    }

    fn apply_lookup(
        &mut self,
        lookup: &impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(url) = lookup("LLM_API_URL").or_else(|| lookup("OLLAMA_HOST")) {
            self.api_url = normalize_url(&url);
        }
        if let Some(model) = lookup("LLM_MODEL") {
            self.model = model;
        }
        if let Some(format) = lookup("LLM_API_FORMAT") {
            self.api_format = format.parse().map_err(|_| ConfigError::Invalid {
                key: "LLM_API_FORMAT",
                value: format.clone(),
            })?;
        }
        if let Some(key) = lookup("LLM_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(enabled) = lookup("ADVISORY_ENABLED") {
            self.enabled = !matches!(
                enabled.trim().to_ascii_lowercase().as_str(),
                "0" | "false" | "off" | "no"
            );
        }
        Ok(())
    }

    pub fn liveness_timeout(&self) -> Duration {
        Duration::from_millis(self.liveness_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

/// Transport settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".into(),
        }
    }
}

impl AppConfig {
    /// Create a config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document; missing sections and keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Overlay environment variables onto this config.
    ///
    /// The database password is not required here; it is checked when the
    /// relational backend is selected.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_lookup(env_lookup)
    }

    pub fn with_lookup(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        self.database.apply_lookup(&lookup)?;
        self.model.apply_lookup(&lookup)?;
        if let Some(bind) = lookup("DRM_BIND") {
            self.server.bind = bind;
        }
        Ok(self)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<(), String> {
        if self.database.max_attempts == 0 {
            return Err("database.max_attempts must be at least 1".into());
        }

        if self.database.max_connections == 0 {
            return Err("database.max_connections must be at least 1".into());
        }

        // The liveness check runs once; the query deadline bounds every request.
        if self.model.liveness_timeout_ms == 0 || self.model.query_timeout_ms == 0 {
            return Err("model timeouts must be positive".into());
        }

        if self.database.statement_timeout_ms == 0 {
            return Err("database.statement_timeout_ms must be positive".into());
        }

        Ok(())
    }
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// `OLLAMA_HOST` is commonly given without a scheme
fn normalize_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

fn mask_password(password: &str) -> String {
    let chars: Vec<char> = password.chars().collect();
    match chars.len() {
        0 => "<empty>".into(),
        1..=3 => "***".into(),
        _ => format!("{}***", chars[..2].iter().collect::<String>()),
    }
}
