//! MySQL sessions implementing the named-lock capability.
//!
//! `GET_LOCK` locks belong to the connection, not to a transaction. A
//! [`MySqlSession`] goes back to the pool on drop and keeps whatever locks it
//! holds. A [`MySqlTransaction`] is never returned to the pool after a
//! rollback or an abandoned scope: its connection is closed so the server
//! frees every lock the session held.

use sqlx::pool::PoolConnection;
use sqlx::{Connection, Executor, MySql, MySqlConnection, MySqlPool};
use tracing::{debug, instrument, warn};

use named_lock_core::error::{LockError, LockResult};
use named_lock_core::timeout::LockTimeout;
use named_lock_core::traits::{FreeState, NamedLockSession, SessionId, TransactionScope};

use crate::name::encode_lock_name;

// ============================================================================
// Primitives
// ============================================================================

async fn connection_id(conn: &mut MySqlConnection) -> LockResult<SessionId> {
    let id: u64 = sqlx::query_scalar("SELECT CAST(CONNECTION_ID() AS UNSIGNED)")
        .fetch_one(conn)
        .await
        .map_err(|e| LockError::Query(Box::new(e)))?;
    Ok(SessionId::new(id))
}

#[instrument(skip(conn), fields(lock.name = %name, timeout = %timeout, backend = "mysql"))]
async fn get_lock(conn: &mut MySqlConnection, name: &str, timeout: LockTimeout) -> LockResult<bool> {
    let result: Option<i64> = sqlx::query_scalar("SELECT CAST(GET_LOCK(?, ?) AS SIGNED)")
        .bind(encode_lock_name(name))
        .bind(timeout.as_secs())
        .fetch_one(conn)
        .await
        .map_err(|e| LockError::AcquireFailed {
            name: name.to_string(),
            source: Box::new(e),
        })?;

    match result {
        Some(1) => Ok(true),
        Some(0) => Ok(false),
        // NULL: the server hit an error (out of memory, thread killed).
        other => Err(LockError::AcquireFailed {
            name: name.to_string(),
            source: format!("unexpected GET_LOCK result: {other:?}").into(),
        }),
    }
}

#[instrument(skip(conn), fields(lock.name = %name, backend = "mysql"))]
async fn release_lock(conn: &mut MySqlConnection, name: &str) -> LockResult<bool> {
    let result: Option<i64> = sqlx::query_scalar("SELECT CAST(RELEASE_LOCK(?) AS SIGNED)")
        .bind(encode_lock_name(name))
        .fetch_one(conn)
        .await
        .map_err(|e| LockError::ReleaseFailed {
            name: name.to_string(),
            source: Box::new(e),
        })?;

    // 0: held by another session, NULL: no such lock.
    Ok(result == Some(1))
}

async fn is_free_lock(conn: &mut MySqlConnection, name: &str) -> LockResult<FreeState> {
    let result: Option<i64> = sqlx::query_scalar("SELECT CAST(IS_FREE_LOCK(?) AS SIGNED)")
        .bind(encode_lock_name(name))
        .fetch_one(conn)
        .await
        .map_err(|e| LockError::Query(Box::new(e)))?;

    Ok(match result {
        Some(1) => FreeState::Free,
        Some(_) => FreeState::Held,
        None => FreeState::Unknown,
    })
}

async fn lock_owner(conn: &mut MySqlConnection, name: &str) -> LockResult<Option<SessionId>> {
    let owner: Option<u64> = sqlx::query_scalar("SELECT CAST(IS_USED_LOCK(?) AS UNSIGNED)")
        .bind(encode_lock_name(name))
        .fetch_one(conn)
        .await
        .map_err(|e| LockError::Query(Box::new(e)))?;
    Ok(owner.map(SessionId::new))
}

// ============================================================================
// Bare session
// ============================================================================

/// A pooled connection used for bare lock calls.
///
/// Locks acquired here stay with the connection after it returns to the pool,
/// exactly as they would for any other pooled MySQL session.
pub struct MySqlSession {
    conn: PoolConnection<MySql>,
}

impl MySqlSession {
    pub(crate) fn new(conn: PoolConnection<MySql>) -> Self {
        Self { conn }
    }
}

impl NamedLockSession for MySqlSession {
    async fn session_id(&mut self) -> LockResult<SessionId> {
        connection_id(&mut self.conn).await
    }

    async fn get_lock(&mut self, name: &str, timeout: LockTimeout) -> LockResult<bool> {
        get_lock(&mut self.conn, name, timeout).await
    }

    async fn release_lock(&mut self, name: &str) -> LockResult<bool> {
        release_lock(&mut self.conn, name).await
    }

    async fn is_free_lock(&mut self, name: &str) -> LockResult<FreeState> {
        is_free_lock(&mut self.conn, name).await
    }

    async fn lock_owner(&mut self, name: &str) -> LockResult<Option<SessionId>> {
        lock_owner(&mut self.conn, name).await
    }
}

// ============================================================================
// Transaction-scoped session
// ============================================================================

/// A dedicated connection with an open transaction.
///
/// The transaction is driven with explicit `START TRANSACTION` / `COMMIT` /
/// `ROLLBACK` statements, sent unprepared, on the one connection, so the
/// session id never changes for the lifetime of the scope.
pub struct MySqlTransaction {
    /// Taken by `commit`/`rollback`; `None` afterwards.
    conn: Option<PoolConnection<MySql>>,
}

impl MySqlTransaction {
    #[instrument(skip(pool), fields(backend = "mysql"))]
    pub(crate) async fn begin(pool: &MySqlPool) -> LockResult<Self> {
        let mut conn = pool
            .acquire()
            .await
            .map_err(|e| LockError::Connection(Box::new(e)))?;

        Executor::execute(&mut *conn, "START TRANSACTION")
            .await
            .map_err(|e| LockError::Begin(Box::new(e)))?;

        Ok(Self { conn: Some(conn) })
    }

    pub(crate) fn conn(&mut self) -> LockResult<&mut MySqlConnection> {
        self.conn.as_deref_mut().ok_or_else(|| {
            LockError::Connection("transaction scope already finished".into())
        })
    }
}

/// Closes a connection instead of returning it to the pool.
async fn close_detached(conn: PoolConnection<MySql>) {
    if let Err(e) = conn.detach().close().await {
        debug!(error = %e, "closing detached connection failed");
    }
}

impl NamedLockSession for MySqlTransaction {
    async fn session_id(&mut self) -> LockResult<SessionId> {
        connection_id(self.conn()?).await
    }

    async fn get_lock(&mut self, name: &str, timeout: LockTimeout) -> LockResult<bool> {
        get_lock(self.conn()?, name, timeout).await
    }

    async fn release_lock(&mut self, name: &str) -> LockResult<bool> {
        release_lock(self.conn()?, name).await
    }

    async fn is_free_lock(&mut self, name: &str) -> LockResult<FreeState> {
        is_free_lock(self.conn()?, name).await
    }

    async fn lock_owner(&mut self, name: &str) -> LockResult<Option<SessionId>> {
        lock_owner(self.conn()?, name).await
    }
}

impl TransactionScope for MySqlTransaction {
    #[instrument(skip(self), fields(backend = "mysql"))]
    async fn commit(mut self) -> LockResult<()> {
        let Some(mut conn) = self.conn.take() else {
            return Err(LockError::Commit("transaction scope already finished".into()));
        };

        match Executor::execute(&mut *conn, "COMMIT").await {
            // Connection goes back to the pool.
            Ok(_) => Ok(()),
            Err(e) => {
                close_detached(conn).await;
                Err(LockError::Commit(Box::new(e)))
            }
        }
    }

    #[instrument(skip(self), fields(backend = "mysql"))]
    async fn rollback(mut self) -> LockResult<()> {
        let Some(mut conn) = self.conn.take() else {
            return Ok(());
        };

        let result = Executor::execute(&mut *conn, "ROLLBACK").await;
        // Named locks survive ROLLBACK; ending the session is what frees them.
        close_detached(conn).await;
        result
            .map(|_| ())
            .map_err(|e| LockError::Connection(Box::new(e)))
    }
}

impl Drop for MySqlTransaction {
    fn drop(&mut self) {
        // Still present means neither commit nor rollback ran (e.g. the
        // request future was cancelled). Dropping the detached connection
        // closes the socket; the server then rolls back and frees the locks.
        if let Some(conn) = self.conn.take() {
            warn!(backend = "mysql", "transaction dropped while open, closing its connection");
            drop(conn.detach());
        }
    }
}
