//! Convenience prelude for named lock types.

pub use crate::coordinator::{AcquireOutcome, Guarded, LockCoordinator, LockStatus, ReleaseOutcome};
pub use crate::error::{BoxError, CompositeError, LockError, LockResult};
pub use crate::history::{LockHistory, NoHistory};
pub use crate::records::{InventoryStore, Order, Product};
pub use crate::timeout::LockTimeout;
pub use crate::traits::{FreeState, NamedLockSession, SessionId, SessionProvider, TransactionScope};
