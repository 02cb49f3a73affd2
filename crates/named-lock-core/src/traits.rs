//! The session capability consumed by the coordinator.
//!
//! A backend exposes database sessions that can run the store's named-lock
//! primitives. The coordinator never keeps lock state of its own; every
//! question about a lock is answered by one of these calls.

use std::fmt;
use std::future::Future;

use crate::error::LockResult;
use crate::timeout::LockTimeout;

// ============================================================================
// Session Identity
// ============================================================================

/// Identity the store assigns to a live connection.
///
/// Stable for the lifetime of the connection, including across transaction
/// begin/commit/rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Answer of the store's "is this lock free" primitive.
///
/// `Unknown` is what the store reports for a name it cannot evaluate (MySQL
/// returns `NULL`). Whether that counts as free is the caller's decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeState {
    Free,
    Held,
    Unknown,
}

impl FreeState {
    /// Collapses `Unknown` into "free".
    pub fn is_free_or_unknown(self) -> bool {
        !matches!(self, FreeState::Held)
    }
}

// ============================================================================
// Session Capability
// ============================================================================

/// A live database session able to run named-lock primitives.
///
/// Implementations must run every call on the same underlying connection so
/// that acquire and release observe the same [`SessionId`].
pub trait NamedLockSession: Send {
    /// Returns the store-assigned identity of this session.
    fn session_id(&mut self) -> impl Future<Output = LockResult<SessionId>> + Send;

    /// Runs the acquire primitive.
    ///
    /// Returns `Ok(true)` when the session now holds `name` (including when it
    /// already held it), `Ok(false)` when the timeout elapsed while another
    /// session held it. `Err` is reserved for capability faults.
    fn get_lock(
        &mut self,
        name: &str,
        timeout: LockTimeout,
    ) -> impl Future<Output = LockResult<bool>> + Send;

    /// Runs the release primitive.
    ///
    /// Returns `Ok(false)` when this session does not hold `name` or nobody
    /// does.
    fn release_lock(&mut self, name: &str) -> impl Future<Output = LockResult<bool>> + Send;

    /// Asks whether `name` is currently free.
    fn is_free_lock(&mut self, name: &str) -> impl Future<Output = LockResult<FreeState>> + Send;

    /// Returns the holder of `name`, if any. Never blocks on the lock.
    fn lock_owner(
        &mut self,
        name: &str,
    ) -> impl Future<Output = LockResult<Option<SessionId>>> + Send;
}

/// A session with an open transaction.
///
/// Both `commit` and `rollback` consume the scope. After `rollback` returns
/// (successfully or not) the store must no longer see any named lock taken
/// through this scope as held: backends whose locks outlive transactions have
/// to end the session to honour this.
pub trait TransactionScope: NamedLockSession + Sized {
    fn commit(self) -> impl Future<Output = LockResult<()>> + Send;

    fn rollback(self) -> impl Future<Output = LockResult<()>> + Send;
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Factory for sessions and transaction-scoped sessions.
///
/// # Example
///
/// ```rust,ignore
/// let provider = MySqlLockProvider::new(url).await?;
/// let mut session = provider.session().await?;
/// let acquired = session.get_lock("inventory", LockTimeout::NoWait).await?;
/// ```
pub trait SessionProvider: Send + Sync {
    /// Session checked out for bare lock calls.
    type Session: NamedLockSession;
    /// Session with an open transaction, used by composite operations.
    type Transaction: TransactionScope;

    /// Checks out a session.
    fn session(&self) -> impl Future<Output = LockResult<Self::Session>> + Send;

    /// Checks out a dedicated session and opens a transaction on it.
    fn begin(&self) -> impl Future<Output = LockResult<Self::Transaction>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_state_collapse() {
        assert!(FreeState::Free.is_free_or_unknown());
        assert!(FreeState::Unknown.is_free_or_unknown());
        assert!(!FreeState::Held.is_free_or_unknown());
    }

    #[test]
    fn test_session_id_display() {
        assert_eq!(SessionId::new(42).to_string(), "42");
        assert_eq!(SessionId::from(9).as_u64(), 9);
    }
}
