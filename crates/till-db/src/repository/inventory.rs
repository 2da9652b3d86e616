//! # Inventory Adjuster
//!
//! Signed stock deltas, applied only from inside a sale transaction.
//!
//! Each delta is one `UPDATE ... SET stock = stock + ?` on the product
//! row, never a read followed by a write. Two sales of the same product
//! serialize on the database write lock.
//!
//! Under `StockPolicy::RejectInsufficient` a negative delta also requires
//! `stock + delta >= 0` in the same statement.

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbError;
use till_core::{ConflictReason, CoreError, CoreResult, StockPolicy};

/// A product after a stock change.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StockLevel {
    pub name: String,
    pub stock: i64,
}

/// Applies `delta` to a product's stock and returns its name and new stock.
///
/// ## Errors
/// - `NotFound` - no such product
/// - `CrossTenant` - the product belongs to another tenant
/// - `Conflict(InsufficientStock)` - rejected by the stock policy
pub async fn apply_delta(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    product_id: &str,
    delta: i64,
    policy: StockPolicy,
) -> CoreResult<StockLevel> {
    debug!(product_id = %product_id, delta = delta, ?policy, "Applying stock delta");

    let guard = matches!(policy, StockPolicy::RejectInsufficient) && delta < 0;

    let level: Option<StockLevel> = sqlx::query_as(
        r#"
        UPDATE products
        SET stock = stock + ?3,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ?1
          AND tenant_id = ?2
          AND (?4 = 0 OR stock + ?3 >= 0)
        RETURNING name, stock
        "#,
    )
    .bind(product_id)
    .bind(tenant_id)
    .bind(delta)
    .bind(guard)
    .fetch_optional(&mut *conn)
    .await
    .map_err(DbError::from)?;

    match level {
        Some(level) => Ok(level),
        None => {
            ensure_product(conn, tenant_id, product_id).await?;
            Err(CoreError::Conflict(ConflictReason::InsufficientStock))
        }
    }
}

/// Checks that `product_id` exists and belongs to `tenant_id`, returning
/// its name.
pub async fn ensure_product(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    product_id: &str,
) -> CoreResult<String> {
    let row: Option<(String, String)> =
        sqlx::query_as("SELECT tenant_id, name FROM products WHERE id = ?1")
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(DbError::from)?;

    match row {
        None => Err(CoreError::not_found("Product", product_id)),
        Some((owner, _)) if owner != tenant_id => {
            Err(CoreError::cross_tenant("Product", product_id))
        }
        Some((_, name)) => Ok(name),
    }
}
