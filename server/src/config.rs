//! Configuration management for the server.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Maximum pooled database connections
    pub max_connections: u32,
    /// Shared secret the identity gateway presents as a bearer token
    pub auth_secret: Option<String>,
    /// Recommended delay before a device syncs again
    pub sync_interval: Duration,
    /// How far `serverTime` is set back so writes still in flight during a
    /// sync read are delivered again on the next incremental sync
    pub sync_overlap: Duration,
    /// Time budget for one activity batch
    pub batch_deadline: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = parse_var("PORT", 3000).map_err(|_| ConfigError::InvalidPort)?;

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        let max_connections = parse_var("DATABASE_MAX_CONNECTIONS", 10)
            .map_err(|_| ConfigError::Invalid("DATABASE_MAX_CONNECTIONS"))?;

        let auth_secret = env::var("AUTH_SECRET").ok().filter(|s| !s.is_empty());

        let sync_interval_secs = parse_var("SYNC_INTERVAL_SECS", 3600)
            .map_err(|_| ConfigError::Invalid("SYNC_INTERVAL_SECS"))?;

        let sync_overlap_ms = parse_var("SYNC_OVERLAP_MS", 5_000)
            .map_err(|_| ConfigError::Invalid("SYNC_OVERLAP_MS"))?;

        let batch_deadline_ms = parse_var("ACTIVITY_BATCH_DEADLINE_MS", 10_000)
            .map_err(|_| ConfigError::Invalid("ACTIVITY_BATCH_DEADLINE_MS"))?;

        Ok(Self {
            host,
            port,
            database_url,
            max_connections,
            auth_secret,
            sync_interval: Duration::from_secs(sync_interval_secs),
            sync_overlap: Duration::from_millis(sync_overlap_ms),
            batch_deadline: Duration::from_millis(batch_deadline_ms),
        })
    }

    /// Configuration for tests and local tooling.
    pub fn for_database(database_url: impl Into<String>) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            database_url: database_url.into(),
            max_connections: 10,
            auth_secret: None,
            sync_interval: Duration::from_secs(3600),
            sync_overlap: Duration::from_secs(5),
            batch_deadline: Duration::from_secs(10),
        }
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, T::Err> {
    match env::var(name) {
        Ok(value) => value.parse(),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid {0} value")]
    Invalid(&'static str),
}
