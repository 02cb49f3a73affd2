//! HTTP handlers.
//!
//! Every handler answers 200 with a JSON body; failures set `success` to
//! `false` and explain themselves in `message`.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::extract::{Path, State};
use futures::future::{BoxFuture, FutureExt};
use serde_json::json;
use tracing::{instrument, warn};
use uuid::Uuid;

use named_lock_core::coordinator::{AcquireOutcome, LockCoordinator, ReleaseOutcome};
use named_lock_core::error::{BoxError, CompositeError, LockError};
use named_lock_core::history::{LockHistory, NoHistory};
use named_lock_core::records::{InventoryStore, OrderPlacement, Product, add_stock, place_order};
use named_lock_core::traits::SessionProvider;

use crate::api::{
    AcquireRequest, HealthResponse, HoldReleaseRequest, LockResponse, LockStatusResponse,
    OrderRequest, ProcessRequest, SessionResponse,
};

/// State shared by all handlers.
pub struct AppState<P, H = NoHistory> {
    pub coordinator: LockCoordinator<P, H>,
}

impl<P, H> AppState<P, H> {
    pub fn new(coordinator: LockCoordinator<P, H>) -> Self {
        Self { coordinator }
    }
}

pub type SharedState<P, H = NoHistory> = Arc<AppState<P, H>>;

fn require_name(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(LockError::InvalidName(format!("{field} must not be empty")).to_string());
    }
    Ok(())
}

fn composite_failure_message(err: &CompositeError) -> String {
    let source = &err.source;
    if source.is_contention() {
        format!("Failed to acquire lock: {source}")
    } else if err.rolled_back_after_acquire() {
        format!("Lock was acquired but the operation failed; transaction rolled back: {source}")
    } else {
        format!("Operation failed before the lock was acquired: {source}")
    }
}

// ============================================================================
// Bare lock endpoints
// ============================================================================

/// `POST /api/locks`
#[instrument(skip_all, fields(request.id = %Uuid::new_v4()))]
pub async fn acquire_lock<P: SessionProvider, H: LockHistory>(
    State(state): State<SharedState<P, H>>,
    Json(req): Json<AcquireRequest>,
) -> Json<LockResponse> {
    if let Err(message) = require_name("lock_name", &req.lock_name) {
        return Json(LockResponse::failed(None, message));
    }
    let coordinator = &state.coordinator;

    let mut session = match coordinator.session().await {
        Ok(session) => session,
        Err(e) => return Json(LockResponse::failed(None, format!("Failed to get session: {e}"))),
    };
    let current = match coordinator.current_session_id(&mut session).await {
        Ok(id) => id,
        Err(e) => {
            return Json(LockResponse::failed(None, format!("Failed to get current session ID: {e}")));
        }
    };

    let response = match coordinator
        .acquire(&mut session, &req.lock_name, req.lock_timeout())
        .await
    {
        Ok(AcquireOutcome::Acquired(id)) => LockResponse::ok(
            id,
            format!("Lock acquired successfully. Current connection ID: {current}"),
        ),
        Ok(AcquireOutcome::NotAcquired) => {
            let message = match coordinator.owner(&mut session, &req.lock_name).await {
                Ok(Some(owner)) => format!("Lock is already held by session ID: {owner}"),
                Ok(None) => "Failed to acquire lock".to_string(),
                Err(e) => {
                    warn!(error = %e, "owner lookup failed");
                    "Failed to acquire lock".to_string()
                }
            };
            LockResponse::failed(None, message)
        }
        Err(e) => LockResponse::failed(None, format!("Failed to acquire lock: {e}")),
    };
    Json(response)
}

/// `DELETE /api/locks/{lock_name}`
#[instrument(skip_all, fields(request.id = %Uuid::new_v4()))]
pub async fn release_lock<P: SessionProvider, H: LockHistory>(
    State(state): State<SharedState<P, H>>,
    Path(lock_name): Path<String>,
) -> Json<LockResponse> {
    let coordinator = &state.coordinator;

    let mut session = match coordinator.session().await {
        Ok(session) => session,
        Err(e) => return Json(LockResponse::failed(None, format!("Failed to get session: {e}"))),
    };
    let current = match coordinator.current_session_id(&mut session).await {
        Ok(id) => id,
        Err(e) => {
            return Json(LockResponse::failed(None, format!("Failed to get current session ID: {e}")));
        }
    };

    let response = match coordinator.release(&mut session, &lock_name).await {
        Ok(ReleaseOutcome::Released) => LockResponse::ok(current, "Lock released successfully"),
        Ok(ReleaseOutcome::NotReleased) => LockResponse::failed(
            Some(current),
            "Failed to release lock. It may be held by another session or not exist.",
        ),
        Err(e) => LockResponse::failed(Some(current), format!("Failed to release lock: {e}")),
    };
    Json(response)
}

/// `GET /api/locks/{lock_name}`
#[instrument(skip_all, fields(request.id = %Uuid::new_v4()))]
pub async fn lock_status<P: SessionProvider, H: LockHistory>(
    State(state): State<SharedState<P, H>>,
    Path(lock_name): Path<String>,
) -> Json<LockStatusResponse> {
    let coordinator = &state.coordinator;

    let mut session = match coordinator.session().await {
        Ok(session) => session,
        Err(e) => {
            return Json(LockStatusResponse::failed(&lock_name, format!("Failed to get session: {e}")));
        }
    };
    let status = match coordinator.status(&mut session, &lock_name).await {
        Ok(status) => status,
        Err(e) => {
            return Json(LockStatusResponse::failed(
                &lock_name,
                format!("Failed to get lock owner: {e}"),
            ));
        }
    };
    // `is_locked` comes from the owner; the free check is reported alongside.
    match coordinator.is_free(&mut session, &lock_name).await {
        Ok(free) => Json(LockStatusResponse::from_status(&status, free)),
        Err(e) => Json(LockStatusResponse::failed(
            &lock_name,
            format!("Failed to check if lock is free: {e}"),
        )),
    }
}

/// `GET /api/session`
pub async fn current_session<P: SessionProvider, H: LockHistory>(
    State(state): State<SharedState<P, H>>,
) -> Json<SessionResponse> {
    let coordinator = &state.coordinator;
    let result = match coordinator.session().await {
        Ok(mut session) => coordinator.current_session_id(&mut session).await,
        Err(e) => Err(e),
    };

    Json(match result {
        Ok(id) => SessionResponse {
            success: true,
            session_id: Some(id.to_string()),
            message: None,
        },
        Err(e) => SessionResponse {
            success: false,
            session_id: None,
            message: Some(format!("Failed to get current session ID: {e}")),
        },
    })
}

// ============================================================================
// Composite endpoints
// ============================================================================

/// `POST /api/locks/hold-and-release`
#[instrument(skip_all, fields(request.id = %Uuid::new_v4()))]
pub async fn hold_and_release<P: SessionProvider, H: LockHistory>(
    State(state): State<SharedState<P, H>>,
    Json(req): Json<HoldReleaseRequest>,
) -> Json<LockResponse> {
    if let Err(message) = require_name("lock_name", &req.lock_name) {
        return Json(LockResponse::failed(None, message));
    }

    let hold = Duration::from_secs(req.hold_duration);
    let response = match state
        .coordinator
        .acquire_hold_release(&req.lock_name, req.lock_timeout(), hold)
        .await
    {
        Ok(session_id) => LockResponse::ok(
            session_id,
            format!(
                "Lock `{}` acquired, held for {}s and released",
                req.lock_name, req.hold_duration
            ),
        ),
        Err(e) => LockResponse::failed(e.session_id, composite_failure_message(&e)),
    };
    Json(response)
}

fn restock<S: InventoryStore>(
    store: &mut S,
    code: String,
    quantity: i64,
) -> BoxFuture<'_, Result<Product, BoxError>> {
    async move { add_stock(store, &code, quantity).await.map_err(BoxError::from) }.boxed()
}

fn order<S: InventoryStore>(
    store: &mut S,
    code: String,
) -> BoxFuture<'_, Result<OrderPlacement, BoxError>> {
    async move { place_order(store, &code).await.map_err(BoxError::from) }.boxed()
}

/// `POST /api/locks/process`
///
/// Adds `quantity` to the product named by `product_code` while holding the
/// lock of the same name.
#[instrument(skip_all, fields(request.id = %Uuid::new_v4()))]
pub async fn process<P, H>(
    State(state): State<SharedState<P, H>>,
    Json(req): Json<ProcessRequest>,
) -> Json<LockResponse>
where
    P: SessionProvider,
    P::Transaction: InventoryStore,
    H: LockHistory,
{
    if let Err(message) = require_name("product_code", &req.product_code) {
        return Json(LockResponse::failed(None, message));
    }

    let code = req.product_code.clone();
    let quantity = req.quantity;
    let response = match state
        .coordinator
        .acquire_guarded_release(&req.product_code, req.lock_timeout(), move |tx| {
            restock(tx, code, quantity)
        })
        .await
    {
        Ok(guarded) => {
            let product = guarded.value;
            LockResponse::ok(
                guarded.session_id,
                format!(
                    "Processed {} for product {}; quantity is now {}",
                    req.quantity, product.code, product.quantity
                ),
            )
            .with_item(json!({ "code": product.code, "quantity": product.quantity }))
        }
        Err(e) => LockResponse::failed(e.session_id, composite_failure_message(&e)),
    };
    Json(response)
}

/// `POST /api/locks/order`
#[instrument(skip_all, fields(request.id = %Uuid::new_v4()))]
pub async fn place_order_locked<P, H>(
    State(state): State<SharedState<P, H>>,
    Json(req): Json<OrderRequest>,
) -> Json<LockResponse>
where
    P: SessionProvider,
    P::Transaction: InventoryStore,
    H: LockHistory,
{
    if let Err(message) = require_name("product_code", &req.product_code) {
        return Json(LockResponse::failed(None, message));
    }

    let code = req.product_code.clone();
    let response = match state
        .coordinator
        .acquire_guarded_release(&req.product_code, req.lock_timeout(), move |tx| order(tx, code))
        .await
    {
        Ok(guarded) => {
            let placement = guarded.value;
            LockResponse::ok(
                guarded.session_id,
                format!("Order {} placed for product {}", placement.order.id, placement.order.code),
            )
            .with_item(json!({
                "order_id": placement.order.id,
                "code": placement.order.code,
                "previous_orders": placement.previous_orders,
                "product_quantity": placement.product.map(|p| p.quantity),
            }))
        }
        Err(e) => LockResponse::failed(e.session_id, composite_failure_message(&e)),
    };
    Json(response)
}

/// `GET /health`
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}
