//! Router assembly and the serve loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};

use named_lock_core::coordinator::LockCoordinator;
use named_lock_core::history::LockHistory;
use named_lock_core::records::InventoryStore;
use named_lock_core::traits::SessionProvider;

use crate::handlers::{self, AppState, SharedState};

/// Builds the API router over `state`.
pub fn router<P, H>(state: SharedState<P, H>) -> Router
where
    P: SessionProvider + 'static,
    P::Transaction: InventoryStore,
    H: LockHistory + 'static,
{
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/session", get(handlers::current_session::<P, H>))
        .route("/api/locks", post(handlers::acquire_lock::<P, H>))
        .route(
            "/api/locks/hold-and-release",
            post(handlers::hold_and_release::<P, H>),
        )
        .route("/api/locks/process", post(handlers::process::<P, H>))
        .route("/api/locks/order", post(handlers::place_order_locked::<P, H>))
        .route(
            "/api/locks/:lock_name",
            get(handlers::lock_status::<P, H>).delete(handlers::release_lock::<P, H>),
        )
        .with_state(state)
}

/// Wraps a coordinator into shared handler state.
pub fn shared<P, H>(coordinator: LockCoordinator<P, H>) -> SharedState<P, H> {
    Arc::new(AppState::new(coordinator))
}

/// Serves the API on `listener` until `shutdown` resolves.
///
/// In-flight requests get `grace` to finish after the signal; requests still
/// running after that are dropped, which rolls back their transactions.
pub async fn serve<P, H, S>(
    listener: TcpListener,
    state: SharedState<P, H>,
    shutdown: S,
    grace: Duration,
) -> std::io::Result<()>
where
    P: SessionProvider + 'static,
    P::Transaction: InventoryStore,
    H: LockHistory + 'static,
    S: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "listening");
    }

    let (signalled_tx, signalled_rx) = oneshot::channel::<()>();
    let server = axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            shutdown.await;
            let _ = signalled_tx.send(());
        })
        .into_future();
    let mut server = std::pin::pin!(server);

    tokio::select! {
        biased;
        result = &mut server => return result,
        Ok(()) = signalled_rx => {}
    }

    info!(grace_secs = grace.as_secs(), "shutdown signal received, draining requests");
    match tokio::time::timeout(grace, server).await {
        Ok(result) => result,
        Err(_) => {
            warn!("graceful shutdown timed out");
            Ok(())
        }
    }
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
