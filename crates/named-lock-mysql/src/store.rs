//! Guarded product and order records on a MySQL transaction.

use sqlx::{MySqlPool, Row};

use named_lock_core::error::{LockError, LockResult};
use named_lock_core::records::{InventoryStore, Order, Product};

use crate::session::MySqlTransaction;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS products (
        code VARCHAR(255) PRIMARY KEY,
        quantity BIGINT NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        id VARCHAR(36) PRIMARY KEY,
        code VARCHAR(255) NOT NULL,
        created_at TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
        INDEX idx_orders_code (code)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS lock_history (
        id BIGINT AUTO_INCREMENT PRIMARY KEY,
        lock_name VARCHAR(255) NOT NULL,
        session_id BIGINT UNSIGNED NOT NULL,
        status VARCHAR(16) NOT NULL,
        acquired_at TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
        released_at TIMESTAMP(6) NULL,
        INDEX idx_lock_history_open (lock_name, session_id, status)
    )
    "#,
];

/// Creates the record and history tables if they do not exist.
pub async fn ensure_schema(pool: &MySqlPool) -> LockResult<()> {
    for statement in SCHEMA {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| LockError::Query(Box::new(e)))?;
    }
    Ok(())
}

fn query_error(e: sqlx::Error) -> LockError {
    LockError::Query(Box::new(e))
}

impl InventoryStore for MySqlTransaction {
    async fn product_for_update(&mut self, code: &str) -> LockResult<Option<Product>> {
        let row = sqlx::query("SELECT code, quantity FROM products WHERE code = ? FOR UPDATE")
            .bind(code)
            .fetch_optional(self.conn()?)
            .await
            .map_err(query_error)?;

        row.map(|row| {
            Ok(Product {
                code: row.try_get(0).map_err(query_error)?,
                quantity: row.try_get(1).map_err(query_error)?,
            })
        })
        .transpose()
    }

    async fn insert_product(&mut self, product: &Product) -> LockResult<()> {
        sqlx::query("INSERT INTO products (code, quantity) VALUES (?, ?)")
            .bind(&product.code)
            .bind(product.quantity)
            .execute(self.conn()?)
            .await
            .map_err(query_error)?;
        Ok(())
    }

    async fn update_product(&mut self, product: &Product) -> LockResult<()> {
        sqlx::query("UPDATE products SET quantity = ? WHERE code = ?")
            .bind(product.quantity)
            .bind(&product.code)
            .execute(self.conn()?)
            .await
            .map_err(query_error)?;
        Ok(())
    }

    async fn orders_by_code(&mut self, code: &str) -> LockResult<Vec<Order>> {
        let rows = sqlx::query("SELECT id, code FROM orders WHERE code = ? ORDER BY created_at")
            .bind(code)
            .fetch_all(self.conn()?)
            .await
            .map_err(query_error)?;

        rows.iter()
            .map(|row| {
                Ok(Order {
                    id: row.try_get(0).map_err(query_error)?,
                    code: row.try_get(1).map_err(query_error)?,
                })
            })
            .collect()
    }

    async fn insert_order(&mut self, order: &Order) -> LockResult<()> {
        sqlx::query("INSERT INTO orders (id, code) VALUES (?, ?)")
            .bind(&order.id)
            .bind(&order.code)
            .execute(self.conn()?)
            .await
            .map_err(query_error)?;
        Ok(())
    }
}
