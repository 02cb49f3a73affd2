//! MySQL backend for named locks.
//!
//! Uses `GET_LOCK`, `RELEASE_LOCK`, `IS_FREE_LOCK` and `IS_USED_LOCK`, which
//! are scoped to the server-side session (connection). Guarded records and
//! lock history live in ordinary tables of the same database.

pub mod connection;
pub mod history;
pub mod name;
pub mod provider;
pub mod session;
pub mod store;

pub use history::MySqlLockHistory;
pub use provider::{MySqlLockProvider, MySqlLockProviderBuilder};
pub use session::{MySqlSession, MySqlTransaction};
