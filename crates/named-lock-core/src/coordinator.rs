//! Named-lock coordination on top of a [`SessionProvider`].
//!
//! Bare calls (`acquire`, `release`, status queries) run on a session the
//! caller supplies. Composite calls check out one transaction-scoped session
//! and keep every step on it, so acquire and release always see the same
//! session identity:
//!
//! ```text
//! begin -> acquire -> [guarded work | hold] -> release -> commit
//!              \                 \                 \
//!               NotAcquired       +-----------------+--> rollback
//! ```

use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, field, instrument, warn, Span};

use crate::error::{BoxError, CompositeError, LockError, LockResult};
use crate::history::{LockHistory, NoHistory};
use crate::timeout::LockTimeout;
use crate::traits::{FreeState, NamedLockSession, SessionId, SessionProvider, TransactionScope};

/// Result of a bare acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The session holds the lock.
    Acquired(SessionId),
    /// Another session held the lock for the whole timeout.
    NotAcquired,
}

impl AcquireOutcome {
    pub fn is_acquired(&self) -> bool {
        matches!(self, AcquireOutcome::Acquired(_))
    }
}

/// Result of a bare release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// The session did not hold the lock, or nobody did.
    NotReleased,
}

impl ReleaseOutcome {
    pub fn is_released(&self) -> bool {
        matches!(self, ReleaseOutcome::Released)
    }
}

/// Ownership of a lock as seen from one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockStatus {
    pub lock_name: String,
    pub owner: Option<SessionId>,
    pub current_session: SessionId,
}

impl LockStatus {
    pub fn is_locked(&self) -> bool {
        self.owner.is_some()
    }

    pub fn is_owned_by_current_session(&self) -> bool {
        self.owner == Some(self.current_session)
    }
}

/// Output of a committed composite operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guarded<T> {
    pub session_id: SessionId,
    pub value: T,
}

/// Coordinates named locks over sessions handed out by `P`.
///
/// Holds no lock state; ownership always comes from the store.
pub struct LockCoordinator<P, H = NoHistory> {
    provider: P,
    history: H,
}

impl<P: SessionProvider> LockCoordinator<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            history: NoHistory,
        }
    }
}

impl<P: SessionProvider, H: LockHistory> LockCoordinator<P, H> {
    /// Replaces the history sink.
    pub fn with_history<H2: LockHistory>(self, history: H2) -> LockCoordinator<P, H2> {
        LockCoordinator {
            provider: self.provider,
            history,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Checks out a session for bare calls.
    pub async fn session(&self) -> LockResult<P::Session> {
        self.provider.session().await
    }

    // ------------------------------------------------------------------------
    // Bare operations
    // ------------------------------------------------------------------------

    /// Acquires `name` on `session`.
    ///
    /// Reentrant for the session already holding `name`. Contention within
    /// the timeout is reported as [`AcquireOutcome::NotAcquired`].
    #[instrument(skip(self, session), fields(lock.name = %name, timeout = %timeout, session.id = field::Empty, acquired = field::Empty))]
    pub async fn acquire<S: NamedLockSession>(
        &self,
        session: &mut S,
        name: &str,
        timeout: LockTimeout,
    ) -> LockResult<AcquireOutcome> {
        let session_id = session.session_id().await?;
        Span::current().record("session.id", session_id.as_u64());

        if !session.get_lock(name, timeout).await? {
            Span::current().record("acquired", false);
            return Ok(AcquireOutcome::NotAcquired);
        }
        Span::current().record("acquired", true);

        if let Err(e) = self.history.record_acquired(name, session_id).await {
            warn!(error = %e, "failed to save lock history");
        }
        Ok(AcquireOutcome::Acquired(session_id))
    }

    /// Releases `name` held by `session`.
    #[instrument(skip(self, session), fields(lock.name = %name, session.id = field::Empty, released = field::Empty))]
    pub async fn release<S: NamedLockSession>(
        &self,
        session: &mut S,
        name: &str,
    ) -> LockResult<ReleaseOutcome> {
        let session_id = session.session_id().await?;
        Span::current().record("session.id", session_id.as_u64());

        if !session.release_lock(name).await? {
            Span::current().record("released", false);
            return Ok(ReleaseOutcome::NotReleased);
        }
        Span::current().record("released", true);

        if let Err(e) = self.history.record_released(name, session_id).await {
            warn!(error = %e, "failed to update lock history");
        }
        Ok(ReleaseOutcome::Released)
    }

    /// Tri-state free check; the caller decides how to treat `Unknown`.
    pub async fn is_free<S: NamedLockSession>(
        &self,
        session: &mut S,
        name: &str,
    ) -> LockResult<FreeState> {
        session.is_free_lock(name).await
    }

    pub async fn owner<S: NamedLockSession>(
        &self,
        session: &mut S,
        name: &str,
    ) -> LockResult<Option<SessionId>> {
        session.lock_owner(name).await
    }

    pub async fn current_session_id<S: NamedLockSession>(
        &self,
        session: &mut S,
    ) -> LockResult<SessionId> {
        session.session_id().await
    }

    /// Owner of `name` together with the identity of `session`.
    pub async fn status<S: NamedLockSession>(
        &self,
        session: &mut S,
        name: &str,
    ) -> LockResult<LockStatus> {
        let current_session = session.session_id().await?;
        let owner = session.lock_owner(name).await?;
        Ok(LockStatus {
            lock_name: name.to_string(),
            owner,
            current_session,
        })
    }

    // ------------------------------------------------------------------------
    // Composite operations
    // ------------------------------------------------------------------------

    /// Acquires `name`, holds it for `hold`, then releases and commits.
    ///
    /// Returns the session id the whole call ran on.
    #[instrument(skip(self), fields(lock.name = %name, timeout = %timeout, hold = ?hold))]
    pub async fn acquire_hold_release(
        &self,
        name: &str,
        timeout: LockTimeout,
        hold: Duration,
    ) -> Result<SessionId, CompositeError> {
        let guarded = self
            .in_lock_transaction(name, timeout, move |_tx| {
                async move {
                    tokio::time::sleep(hold).await;
                    Ok(())
                }
                .boxed()
            })
            .await?;
        Ok(guarded.session_id)
    }

    /// Acquires `name`, runs `work` inside the same transaction, then
    /// releases and commits.
    ///
    /// Guarded writes, the release and the commit succeed together or the
    /// transaction is rolled back. A `work` error surfaces as
    /// [`LockError::GuardedWork`].
    #[instrument(skip(self, work), fields(lock.name = %name, timeout = %timeout))]
    pub async fn acquire_guarded_release<T, F>(
        &self,
        name: &str,
        timeout: LockTimeout,
        work: F,
    ) -> Result<Guarded<T>, CompositeError>
    where
        T: Send + 'static,
        F: for<'t> FnOnce(&'t mut P::Transaction) -> BoxFuture<'t, Result<T, BoxError>> + Send,
    {
        self.in_lock_transaction(name, timeout, move |tx| {
            let fut = work(tx);
            async move { fut.await.map_err(LockError::GuardedWork) }.boxed()
        })
        .await
    }

    /// Shared envelope of the composite operations.
    async fn in_lock_transaction<T, F>(
        &self,
        name: &str,
        timeout: LockTimeout,
        body: F,
    ) -> Result<Guarded<T>, CompositeError>
    where
        T: Send + 'static,
        F: for<'t> FnOnce(&'t mut P::Transaction) -> BoxFuture<'t, LockResult<T>> + Send,
    {
        let mut tx = self.provider.begin().await?;

        let session_id = match tx.session_id().await {
            Ok(id) => id,
            Err(e) => return Err(abort(tx, None, e).await),
        };
        debug!(session.id = %session_id, "before acquire");

        match tx.get_lock(name, timeout).await {
            Ok(true) => {}
            Ok(false) => {
                let err = LockError::NotAcquired {
                    name: name.to_string(),
                    timeout,
                };
                return Err(abort(tx, Some(session_id), err).await);
            }
            Err(e) => return Err(abort(tx, Some(session_id), e).await),
        }

        if let Err(e) = confirm_session(&mut tx, session_id, "after acquire").await {
            return Err(abort(tx, Some(session_id), e).await);
        }

        let value = match body(&mut tx).await {
            Ok(value) => value,
            Err(e) => return Err(abort(tx, Some(session_id), e).await),
        };

        if let Err(e) = confirm_session(&mut tx, session_id, "before release").await {
            return Err(abort(tx, Some(session_id), e).await);
        }

        match tx.release_lock(name).await {
            Ok(true) => {}
            Ok(false) => {
                let err = LockError::NotReleased {
                    name: name.to_string(),
                };
                return Err(abort(tx, Some(session_id), err).await);
            }
            Err(e) => return Err(abort(tx, Some(session_id), e).await),
        }

        tx.commit()
            .await
            .map_err(|e| CompositeError::new(Some(session_id), e))?;

        Ok(Guarded { session_id, value })
    }
}

/// Re-reads the session id and checks it did not change.
async fn confirm_session<S: NamedLockSession>(
    session: &mut S,
    expected: SessionId,
    stage: &'static str,
) -> LockResult<()> {
    let observed = session.session_id().await?;
    debug!(session.id = %observed, stage, "session observed");
    if observed != expected {
        return Err(LockError::SessionChanged { expected, observed });
    }
    Ok(())
}

/// Rolls back and wraps the primary error. A failed rollback is logged and
/// never replaces the error that caused it.
async fn abort<X: TransactionScope>(
    tx: X,
    session_id: Option<SessionId>,
    error: LockError,
) -> CompositeError {
    if error.is_contention() {
        debug!(error = %error, "lock not acquired, rolling back");
    } else {
        warn!(error = %error, "rolling back transaction");
    }
    if let Err(rollback_err) = tx.rollback().await {
        warn!(error = %rollback_err, "rollback failed");
    }
    CompositeError::new(session_id, error)
}
