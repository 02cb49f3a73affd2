//! HTTP front end for named locks.
//!
//! [`server::router`] is generic over the session provider so the API can be
//! served on top of MySQL or any other [`SessionProvider`] implementation.
//!
//! [`SessionProvider`]: named_lock_core::traits::SessionProvider

pub mod api;
pub mod config;
pub mod handlers;
pub mod logging;
pub mod server;

pub use config::{ConfigError, ConfigLoader, ServerConfig};
pub use handlers::{AppState, SharedState};
pub use server::{router, serve, shared, shutdown_signal};
