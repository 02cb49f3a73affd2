//! Guarded record operations.
//!
//! Records here are only touched inside a transaction that also holds the
//! named lock. Reads that precede a write use the store's write-intent read, so
//! two critical sections that reach the same row under different lock names
//! still serialise on the row.

use std::future::Future;

use tracing::debug;
use uuid::Uuid;

use crate::error::{LockError, LockResult};

/// Inventory row keyed by product code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub code: String,
    pub quantity: i64,
}

/// Order row referencing a product code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: String,
    pub code: String,
}

/// Record access available inside a transaction-scoped session.
pub trait InventoryStore: Send {
    /// Reads a product with write intent (row lock held until the transaction
    /// ends). `None` when no row exists.
    fn product_for_update(
        &mut self,
        code: &str,
    ) -> impl Future<Output = LockResult<Option<Product>>> + Send;

    fn insert_product(&mut self, product: &Product) -> impl Future<Output = LockResult<()>> + Send;

    /// Only valid after `product_for_update` returned the row in the same
    /// transaction.
    fn update_product(&mut self, product: &Product) -> impl Future<Output = LockResult<()>> + Send;

    fn orders_by_code(&mut self, code: &str) -> impl Future<Output = LockResult<Vec<Order>>> + Send;

    fn insert_order(&mut self, order: &Order) -> impl Future<Output = LockResult<()>> + Send;
}

/// Adds `delta` to the product's quantity, creating the row if needed.
pub async fn add_stock<S: InventoryStore>(
    store: &mut S,
    code: &str,
    delta: i64,
) -> LockResult<Product> {
    match store.product_for_update(code).await? {
        Some(mut product) => {
            product.quantity = product.quantity.checked_add(delta).ok_or_else(|| {
                LockError::QuantityOverflow {
                    code: code.to_string(),
                    delta,
                }
            })?;
            store.update_product(&product).await?;
            debug!(product.code = %code, quantity = product.quantity, "updated product");
            Ok(product)
        }
        None => {
            let product = Product {
                code: code.to_string(),
                quantity: delta,
            };
            store.insert_product(&product).await?;
            debug!(product.code = %code, quantity = delta, "inserted product");
            Ok(product)
        }
    }
}

/// Result of [`place_order`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPlacement {
    pub order: Order,
    /// Orders that already existed for the code.
    pub previous_orders: usize,
    /// The product row, if one exists.
    pub product: Option<Product>,
}

/// Records a new order for `code`.
///
/// The product row is read with write intent first so order placement
/// serialises with stock changes on the same code.
pub async fn place_order<S: InventoryStore>(store: &mut S, code: &str) -> LockResult<OrderPlacement> {
    let product = store.product_for_update(code).await?;
    let existing = store.orders_by_code(code).await?;

    let order = Order {
        id: Uuid::new_v4().to_string(),
        code: code.to_string(),
    };
    store.insert_order(&order).await?;
    debug!(order.id = %order.id, product.code = %code, previous = existing.len(), "inserted order");

    Ok(OrderPlacement {
        order,
        previous_orders: existing.len(),
        product,
    })
}
