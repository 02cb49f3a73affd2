//! Core traits and coordination logic for database-backed named locks.

pub mod coordinator;
pub mod error;
pub mod history;
pub mod prelude;
pub mod records;
pub mod timeout;
pub mod traits;

pub use error::{LockError, LockResult};
pub use prelude::*;
