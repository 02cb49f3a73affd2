//! Optional lock history.
//!
//! History is an observer: it is written after a successful acquire or
//! release and never read back to make a locking decision. The coordinator
//! logs history failures and carries on.

use std::fmt;
use std::future::Future;

use crate::error::LockResult;
use crate::traits::SessionId;

/// State recorded in a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryStatus {
    Acquired,
    Released,
}

impl HistoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryStatus::Acquired => "acquired",
            HistoryStatus::Released => "released",
        }
    }
}

impl fmt::Display for HistoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only sink for lock history.
pub trait LockHistory: Send + Sync {
    /// Appends an `acquired` entry.
    fn record_acquired(
        &self,
        name: &str,
        session: SessionId,
    ) -> impl Future<Output = LockResult<()>> + Send;

    /// Moves the latest open `acquired` entry for `name` and `session` to
    /// `released`.
    fn record_released(
        &self,
        name: &str,
        session: SessionId,
    ) -> impl Future<Output = LockResult<()>> + Send;
}

/// History sink that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

impl LockHistory for NoHistory {
    async fn record_acquired(&self, _name: &str, _session: SessionId) -> LockResult<()> {
        Ok(())
    }

    async fn record_released(&self, _name: &str, _session: SessionId) -> LockResult<()> {
        Ok(())
    }
}

impl<H: LockHistory> LockHistory for Option<H> {
    async fn record_acquired(&self, name: &str, session: SessionId) -> LockResult<()> {
        match self {
            Some(history) => history.record_acquired(name, session).await,
            None => Ok(()),
        }
    }

    async fn record_released(&self, name: &str, session: SessionId) -> LockResult<()> {
        match self {
            Some(history) => history.record_released(name, session).await,
            None => Ok(()),
        }
    }
}
