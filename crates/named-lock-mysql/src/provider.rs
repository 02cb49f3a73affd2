//! MySQL session provider.

use std::time::Duration;

use named_lock_core::error::{LockError, LockResult};
use named_lock_core::traits::SessionProvider;

use crate::connection::{ConnectionSource, PoolSettings};
use crate::history::MySqlLockHistory;
use crate::session::{MySqlSession, MySqlTransaction};
use crate::store::ensure_schema;

/// Builder for MySQL provider configuration.
pub struct MySqlLockProviderBuilder {
    connection: Option<ConnectionSource>,
    settings: PoolSettings,
}

impl MySqlLockProviderBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self {
            connection: None,
            settings: PoolSettings::default(),
        }
    }

    /// Sets the MySQL connection string.
    pub fn connection_string(mut self, conn_str: impl Into<String>) -> Self {
        self.connection = Some(ConnectionSource::ConnectionString(conn_str.into()));
        self
    }

    /// Sets an existing connection pool.
    pub fn pool(mut self, pool: sqlx::MySqlPool) -> Self {
        self.connection = Some(ConnectionSource::Pool(pool));
        self
    }

    /// Caps the pool size.
    ///
    /// Every hold in progress pins one connection, so this bounds how many
    /// composite operations can run at once.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.settings.max_connections = max;
        self
    }

    /// Sets how long to wait for a pooled connection.
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.settings.acquire_timeout = timeout;
        self
    }

    /// Builds the provider.
    pub async fn build(self) -> LockResult<MySqlLockProvider> {
        let connection = self
            .connection
            .ok_or_else(|| LockError::Config("connection not specified".to_string()))?;

        if self.settings.max_connections == 0 {
            return Err(LockError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }

        let pool = connection
            .get_pool(self.settings)
            .await
            .map_err(|e| LockError::Connection(Box::new(e)))?;

        Ok(MySqlLockProvider { pool })
    }
}

impl Default for MySqlLockProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Provider of MySQL sessions for named locks.
#[derive(Clone)]
pub struct MySqlLockProvider {
    pool: sqlx::MySqlPool,
}

impl MySqlLockProvider {
    /// Returns a new builder for configuring the provider.
    pub fn builder() -> MySqlLockProviderBuilder {
        MySqlLockProviderBuilder::new()
    }

    /// Creates a provider using the specified connection string.
    pub async fn new(connection_string: impl Into<String>) -> LockResult<Self> {
        Self::builder()
            .connection_string(connection_string)
            .build()
            .await
    }

    pub fn pool(&self) -> &sqlx::MySqlPool {
        &self.pool
    }

    /// History sink writing to the `lock_history` table of this database.
    pub fn history(&self) -> MySqlLockHistory {
        MySqlLockHistory::new(self.pool.clone())
    }

    /// Creates the `products`, `orders` and `lock_history` tables.
    pub async fn ensure_schema(&self) -> LockResult<()> {
        ensure_schema(&self.pool).await
    }

    /// Closes every pooled connection. The server frees any named lock those
    /// sessions still held.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl SessionProvider for MySqlLockProvider {
    type Session = MySqlSession;
    type Transaction = MySqlTransaction;

    async fn session(&self) -> LockResult<MySqlSession> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| LockError::Connection(Box::new(e)))?;
        Ok(MySqlSession::new(conn))
    }

    async fn begin(&self) -> LockResult<MySqlTransaction> {
        MySqlTransaction::begin(&self.pool).await
    }
}
