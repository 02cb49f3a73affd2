//! Lock history persisted to the `lock_history` table.

use sqlx::MySqlPool;
use tracing::instrument;

use named_lock_core::error::{LockError, LockResult};
use named_lock_core::history::{HistoryStatus, LockHistory};
use named_lock_core::traits::SessionId;

/// Writes history rows on pooled connections, outside any lock transaction.
#[derive(Clone)]
pub struct MySqlLockHistory {
    pool: MySqlPool,
}

impl MySqlLockHistory {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

impl LockHistory for MySqlLockHistory {
    #[instrument(skip(self), fields(backend = "mysql"))]
    async fn record_acquired(&self, name: &str, session: SessionId) -> LockResult<()> {
        sqlx::query("INSERT INTO lock_history (lock_name, session_id, status) VALUES (?, ?, ?)")
            .bind(name)
            .bind(session.as_u64())
            .bind(HistoryStatus::Acquired.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| LockError::Query(Box::new(e)))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "mysql"))]
    async fn record_released(&self, name: &str, session: SessionId) -> LockResult<()> {
        sqlx::query(
            r#"
            UPDATE lock_history
            SET status = ?, released_at = CURRENT_TIMESTAMP(6)
            WHERE lock_name = ? AND session_id = ? AND status = ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(HistoryStatus::Released.as_str())
        .bind(name)
        .bind(session.as_u64())
        .bind(HistoryStatus::Acquired.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| LockError::Query(Box::new(e)))?;
        Ok(())
    }
}
