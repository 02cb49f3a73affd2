//! Error types for named lock operations.

use thiserror::Error;

use crate::timeout::LockTimeout;
use crate::traits::SessionId;

/// Boxed error type used for backend and caller-supplied failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during lock operations.
///
/// Contention on a bare `acquire`/`release` is not an error: those calls return
/// [`AcquireOutcome`](crate::coordinator::AcquireOutcome) and
/// [`ReleaseOutcome`](crate::coordinator::ReleaseOutcome). The composite
/// operations report contention as [`LockError::NotAcquired`] because the
/// whole call failed.
#[derive(Error, Debug)]
pub enum LockError {
    /// No session could be obtained from the backend.
    #[error("connection error: {0}")]
    Connection(#[source] BoxError),

    /// The transaction could not be opened.
    #[error("failed to begin transaction: {0}")]
    Begin(#[source] BoxError),

    /// The lock was held elsewhere for the whole timeout.
    #[error("lock `{name}` is held by another session (timeout: {timeout})")]
    NotAcquired { name: String, timeout: LockTimeout },

    /// The acquire primitive itself failed.
    #[error("failed to acquire lock `{name}`: {source}")]
    AcquireFailed {
        name: String,
        #[source]
        source: BoxError,
    },

    /// The session identity changed between acquire and release.
    #[error("session changed while holding the lock: expected {expected}, observed {observed}")]
    SessionChanged {
        expected: SessionId,
        observed: SessionId,
    },

    /// The store refused to release a lock this session acquired.
    #[error("lock `{name}` is not held by this session or does not exist")]
    NotReleased { name: String },

    /// The release primitive itself failed.
    #[error("failed to release lock `{name}`: {source}")]
    ReleaseFailed {
        name: String,
        #[source]
        source: BoxError,
    },

    /// Caller-supplied guarded work failed.
    #[error("guarded work failed: {0}")]
    GuardedWork(#[source] BoxError),

    /// The transaction could not be committed.
    #[error("failed to commit transaction: {0}")]
    Commit(#[source] BoxError),

    /// A read-only query (status, owner, session id, records) failed.
    #[error("query failed: {0}")]
    Query(#[source] BoxError),

    /// A stock change would take a product's quantity outside the `i64` range.
    #[error("quantity of product `{code}` would overflow adding {delta}")]
    QuantityOverflow { code: String, delta: i64 },

    /// Invalid lock name.
    #[error("invalid lock name: {0}")]
    InvalidName(String),

    /// The provider was built with incomplete settings.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl LockError {
    /// Whether the failure happened after the lock had been acquired.
    ///
    /// When this is `true` the enclosing transaction was rolled back and
    /// nothing it wrote was persisted.
    pub fn acquired_before_failure(&self) -> bool {
        matches!(
            self,
            LockError::SessionChanged { .. }
                | LockError::NotReleased { .. }
                | LockError::ReleaseFailed { .. }
                | LockError::GuardedWork(_)
                | LockError::Commit(_)
        )
    }

    /// Whether this is plain contention rather than a fault.
    pub fn is_contention(&self) -> bool {
        matches!(self, LockError::NotAcquired { .. })
    }
}

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Failure of a composite operation, with the session it ran on.
///
/// `session_id` is `None` when the failure happened before a session identity
/// could be observed.
#[derive(Error, Debug)]
#[error("{source}")]
pub struct CompositeError {
    pub session_id: Option<SessionId>,
    #[source]
    pub source: LockError,
}

impl CompositeError {
    pub(crate) fn new(session_id: Option<SessionId>, source: LockError) -> Self {
        Self { session_id, source }
    }

    /// See [`LockError::acquired_before_failure`].
    pub fn rolled_back_after_acquire(&self) -> bool {
        self.source.acquired_before_failure()
    }
}

impl From<LockError> for CompositeError {
    fn from(source: LockError) -> Self {
        Self::new(None, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxed(msg: &str) -> BoxError {
        Box::new(std::io::Error::other(msg.to_string()))
    }

    #[test]
    fn test_contention_is_not_after_acquire() {
        let err = LockError::NotAcquired {
            name: "l".to_string(),
            timeout: LockTimeout::NoWait,
        };
        assert!(err.is_contention());
        assert!(!err.acquired_before_failure());
    }

    #[test]
    fn test_faults_after_acquire() {
        assert!(LockError::NotReleased { name: "l".into() }.acquired_before_failure());
        assert!(LockError::GuardedWork(boxed("boom")).acquired_before_failure());
        assert!(LockError::Commit(boxed("boom")).acquired_before_failure());
        assert!(
            LockError::ReleaseFailed {
                name: "l".into(),
                source: boxed("gone"),
            }
            .acquired_before_failure()
        );
    }

    #[test]
    fn test_faults_before_acquire() {
        assert!(!LockError::Begin(boxed("down")).acquired_before_failure());
        assert!(
            !LockError::AcquireFailed {
                name: "l".into(),
                source: boxed("down"),
            }
            .acquired_before_failure()
        );
        assert!(!LockError::Connection(boxed("down")).acquired_before_failure());
    }

    #[test]
    fn test_composite_error_display_delegates() {
        let err = CompositeError::new(
            Some(SessionId::new(7)),
            LockError::NotReleased { name: "l".into() },
        );
        assert_eq!(
            err.to_string(),
            "lock `l` is not held by this session or does not exist"
        );
        assert!(err.rolled_back_after_acquire());
    }
}
