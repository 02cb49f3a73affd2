//! MySQL connection management for named locks.

use std::fmt;
use std::time::Duration;

use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySql, Pool};

/// Pool sizing applied when the provider creates its own pool.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    /// Upper bound on concurrently open connections. Every composite
    /// operation pins one connection for its whole duration.
    pub max_connections: u32,
    /// How long to wait for a free connection before failing.
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Where the provider gets its connections from.
#[derive(Clone)]
pub enum ConnectionSource {
    /// Connect using a connection string.
    ConnectionString(String),
    /// Use an existing connection pool.
    Pool(Pool<MySql>),
}

impl ConnectionSource {
    /// Get or create a connection pool.
    ///
    /// `settings` only applies to the `ConnectionString` variant; an external
    /// pool keeps its own configuration.
    pub async fn get_pool(&self, settings: PoolSettings) -> Result<Pool<MySql>, sqlx::Error> {
        match self {
            ConnectionSource::ConnectionString(url) => {
                MySqlPoolOptions::new()
                    .max_connections(settings.max_connections)
                    .acquire_timeout(settings.acquire_timeout)
                    .connect(url)
                    .await
            }
            ConnectionSource::Pool(pool) => Ok(pool.clone()),
        }
    }
}

impl fmt::Debug for ConnectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionSource::ConnectionString(_) => {
                write!(f, "ConnectionSource::ConnectionString([REDACTED])")
            }
            ConnectionSource::Pool(_) => write!(f, "ConnectionSource::Pool([POOL])"),
        }
    }
}
