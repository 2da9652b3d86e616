//! # Sale Repository
//!
//! Storage for sales, their line items and payment rows. Every function
//! runs on a connection the caller supplies; `TillService` wraps each
//! mutating sequence in one transaction.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. NUMBER                                                             │
//! │     └── next_sale_number() → upsert sale_sequences ... RETURNING        │
//! │                                                                         │
//! │  2. HEADER                                                             │
//! │     └── insert_if_shift_open() → INSERT ... SELECT ... WHERE EXISTS     │
//! │         (shift open in this tenant, checked by the same statement)      │
//! │                                                                         │
//! │  3. LINES + PAYMENTS                                                   │
//! │     └── insert_line_item() / insert_payment()                          │
//! │                                                                         │
//! │  4. (OPTIONAL) CANCEL                                                  │
//! │     └── mark_cancelled() → UPDATE ... WHERE state <> 'cancelled'        │
//! │         RETURNING stock_applied                                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use till_core::{Money, Payment, Sale, SaleDetail, SaleLineItem};

const SALE_COLUMNS: &str = r#"
    id, tenant_id, shift_id, sale_number, cashier_id, customer_name,
    subtotal, discount, tip, total, state, payment_method, notes,
    created_at, cancelled_at
"#;

/// Live counts for a shift, by sale state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShiftStats {
    pub completed_sales: i64,
    pub completed_total: Money,
    pub temporary_sales: i64,
    pub cancelled_sales: i64,
}

// =============================================================================
// Numbering
// =============================================================================

/// Allocates the next sale number for a tenant.
///
/// ## Format
/// `{prefix}{YYYYMMDD}-{tenant_code:03}-{seq:06}`, e.g. `V20261017-001-000042`.
///
/// The tenant code is assigned on the tenant's first sale and never reused,
/// so numbers are unique across tenants. The counter bump is a single
/// statement, so two concurrent sales can never draw the same value.
pub async fn next_sale_number(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    prefix: &str,
    now: DateTime<Utc>,
) -> DbResult<String> {
    let (tenant_code, seq): (i64, i64) = sqlx::query_as(
        r#"
        INSERT INTO sale_sequences (tenant_code, tenant_id, last_value)
        VALUES ((SELECT COALESCE(MAX(tenant_code), 0) + 1 FROM sale_sequences), ?1, 1)
        ON CONFLICT(tenant_id) DO UPDATE SET last_value = last_value + 1
        RETURNING tenant_code, last_value
        "#,
    )
    .bind(tenant_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(format_sale_number(prefix, now, tenant_code, seq))
}

pub fn format_sale_number(prefix: &str, now: DateTime<Utc>, tenant_code: i64, seq: i64) -> String {
    format!(
        "{}{}-{:03}-{:06}",
        prefix,
        now.format("%Y%m%d"),
        tenant_code,
        seq
    )
}

// =============================================================================
// Writes
// =============================================================================

/// Inserts the sale header only if its shift is open in the sale's tenant.
///
/// ## Returns
/// `false` if nothing was inserted; the caller works out why.
pub async fn insert_if_shift_open(
    conn: &mut SqliteConnection,
    sale: &Sale,
    stock_applied: bool,
) -> DbResult<bool> {
    debug!(id = %sale.id, sale_number = %sale.sale_number, "Inserting sale");

    let result = sqlx::query(
        r#"
        INSERT INTO sales (
            id, tenant_id, shift_id, sale_number, cashier_id, customer_name,
            subtotal, discount, tip, total, state, payment_method,
            stock_applied, notes, created_at, updated_at
        )
        SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15
        WHERE EXISTS (
            SELECT 1 FROM shifts
            WHERE id = ?3 AND tenant_id = ?2 AND state = 'open'
        )
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.tenant_id)
    .bind(&sale.shift_id)
    .bind(&sale.sale_number)
    .bind(&sale.cashier_id)
    .bind(&sale.customer_name)
    .bind(sale.subtotal)
    .bind(sale.discount)
    .bind(sale.tip)
    .bind(sale.total)
    .bind(sale.state)
    .bind(sale.payment_method)
    .bind(stock_applied)
    .bind(&sale.notes)
    .bind(sale.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Inserts one line item.
pub async fn insert_line_item(conn: &mut SqliteConnection, item: &SaleLineItem) -> DbResult<()> {
    debug!(sale_id = %item.sale_id, product_id = %item.product_id, "Adding sale item");

    sqlx::query(
        r#"
        INSERT INTO sale_items (
            id, tenant_id, sale_id, product_id, quantity, unit_price, subtotal, discount, total
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&item.id)
    .bind(&item.tenant_id)
    .bind(&item.sale_id)
    .bind(&item.product_id)
    .bind(item.quantity)
    .bind(item.unit_price)
    .bind(item.subtotal)
    .bind(item.discount)
    .bind(item.total)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Inserts one payment row exactly as tendered.
pub async fn insert_payment(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
    debug!(
        sale_id = %payment.sale_id,
        method = ?payment.method,
        amount = %payment.amount,
        "Adding payment"
    );

    sqlx::query(
        r#"
        INSERT INTO payments (id, tenant_id, sale_id, method, amount, reference, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.tenant_id)
    .bind(&payment.sale_id)
    .bind(payment.method)
    .bind(payment.amount)
    .bind(&payment.reference)
    .bind(payment.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Cancels a sale that is not already cancelled.
///
/// ## Returns
/// * `Some(stock_applied)` - the sale is now cancelled; `stock_applied`
///   says whether its stock decrement must be reversed
/// * `None` - no such sale in the tenant, or it was already cancelled
pub async fn mark_cancelled(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    id: &str,
    now: DateTime<Utc>,
) -> DbResult<Option<bool>> {
    debug!(id = %id, "Cancelling sale");

    let stock_applied: Option<bool> = sqlx::query_scalar(
        r#"
        UPDATE sales
        SET state = 'cancelled', cancelled_at = ?3, updated_at = ?3
        WHERE id = ?1 AND tenant_id = ?2 AND state <> 'cancelled'
        RETURNING stock_applied
        "#,
    )
    .bind(id)
    .bind(tenant_id)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(stock_applied)
}

/// Records that the sale no longer holds any stock.
pub async fn clear_stock_applied(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    sqlx::query("UPDATE sales SET stock_applied = 0 WHERE id = ?1")
        .bind(id)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

// =============================================================================
// Reads
// =============================================================================

/// Gets a sale header by ID regardless of tenant; callers check ownership.
pub async fn get_by_id(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Sale>> {
    let sql = format!("SELECT {} FROM sales WHERE id = ?1", SALE_COLUMNS);

    let sale = sqlx::query_as::<_, Sale>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(sale)
}

/// Line columns with the product name joined from the tenant's catalog.
const LINE_COLUMNS: &str = r#"
    si.id, si.tenant_id, si.sale_id, si.product_id, pr.name AS product_name,
    si.quantity, si.unit_price, si.subtotal, si.discount, si.total
"#;

const PAYMENT_COLUMNS: &str = r#"
    p.id, p.tenant_id, p.sale_id, p.method, p.amount, p.reference, p.created_at
"#;

/// Gets the line items of a sale in insertion order.
pub async fn get_line_items(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    sale_id: &str,
) -> DbResult<Vec<SaleLineItem>> {
    let sql = format!(
        r#"
        SELECT {}
        FROM sale_items si
        LEFT JOIN products pr ON pr.id = si.product_id AND pr.tenant_id = si.tenant_id
        WHERE si.sale_id = ?1 AND si.tenant_id = ?2
        ORDER BY si.rowid
        "#,
        LINE_COLUMNS
    );

    let items = sqlx::query_as::<_, SaleLineItem>(&sql)
        .bind(sale_id)
        .bind(tenant_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(items)
}

/// Gets the payment rows of a sale in insertion order.
pub async fn get_payments(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    sale_id: &str,
) -> DbResult<Vec<Payment>> {
    let sql = format!(
        "SELECT {} FROM payments p WHERE p.sale_id = ?1 AND p.tenant_id = ?2 ORDER BY p.rowid",
        PAYMENT_COLUMNS
    );

    let payments = sqlx::query_as::<_, Payment>(&sql)
        .bind(sale_id)
        .bind(tenant_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(payments)
}

/// Composes a sale with its lines and payments.
pub async fn get_detail(conn: &mut SqliteConnection, sale: Sale) -> DbResult<SaleDetail> {
    let line_items = get_line_items(conn, &sale.tenant_id, &sale.id).await?;
    let payments = get_payments(conn, &sale.tenant_id, &sale.id).await?;

    Ok(SaleDetail {
        sale,
        line_items,
        payments,
    })
}

/// Gets every sale of a shift, any state, newest first.
pub async fn list_for_shift(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    shift_id: &str,
) -> DbResult<Vec<Sale>> {
    let sql = format!(
        "SELECT {} FROM sales WHERE shift_id = ?1 AND tenant_id = ?2 ORDER BY rowid DESC",
        SALE_COLUMNS
    );

    let sales = sqlx::query_as::<_, Sale>(&sql)
        .bind(shift_id)
        .bind(tenant_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(sales)
}

/// Gets every sale of a shift, newest first, each composed with its lines
/// and payments (those in insertion order).
///
/// Three queries in total, grouped in memory.
pub async fn list_details_for_shift(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    shift_id: &str,
) -> DbResult<Vec<SaleDetail>> {
    let sales = list_for_shift(conn, tenant_id, shift_id).await?;

    let items_sql = format!(
        r#"
        SELECT {}
        FROM sale_items si
        JOIN sales s ON s.id = si.sale_id
        LEFT JOIN products pr ON pr.id = si.product_id AND pr.tenant_id = si.tenant_id
        WHERE s.shift_id = ?1 AND s.tenant_id = ?2 AND si.tenant_id = ?2
        ORDER BY si.rowid
        "#,
        LINE_COLUMNS
    );
    let items = sqlx::query_as::<_, SaleLineItem>(&items_sql)
        .bind(shift_id)
        .bind(tenant_id)
        .fetch_all(&mut *conn)
        .await?;

    let payments_sql = format!(
        r#"
        SELECT {}
        FROM payments p
        JOIN sales s ON s.id = p.sale_id
        WHERE s.shift_id = ?1 AND s.tenant_id = ?2 AND p.tenant_id = ?2
        ORDER BY p.rowid
        "#,
        PAYMENT_COLUMNS
    );
    let payments = sqlx::query_as::<_, Payment>(&payments_sql)
        .bind(shift_id)
        .bind(tenant_id)
        .fetch_all(&mut *conn)
        .await?;

    let mut items_by_sale: HashMap<String, Vec<SaleLineItem>> = HashMap::new();
    for item in items {
        items_by_sale.entry(item.sale_id.clone()).or_default().push(item);
    }
    let mut payments_by_sale: HashMap<String, Vec<Payment>> = HashMap::new();
    for payment in payments {
        payments_by_sale
            .entry(payment.sale_id.clone())
            .or_default()
            .push(payment);
    }

    Ok(sales
        .into_iter()
        .map(|sale| SaleDetail {
            line_items: items_by_sale.remove(&sale.id).unwrap_or_default(),
            payments: payments_by_sale.remove(&sale.id).unwrap_or_default(),
            sale,
        })
        .collect())
}

/// Counts a shift's sales by state.
pub async fn shift_stats(conn: &mut SqliteConnection, shift_id: &str) -> DbResult<ShiftStats> {
    let (completed_sales, completed_total, temporary_sales, cancelled_sales): (i64, i64, i64, i64) =
        sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN state = 'completed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN state = 'completed' THEN total ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN state = 'temporary' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN state = 'cancelled' THEN 1 ELSE 0 END), 0)
            FROM sales
            WHERE shift_id = ?1
            "#,
        )
        .bind(shift_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(ShiftStats {
        completed_sales,
        completed_total: Money::from_cents(completed_total),
        temporary_sales,
        cancelled_sales,
    })
}

// =============================================================================
// ID Helpers
// =============================================================================

pub fn generate_sale_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn generate_sale_item_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn generate_payment_id() -> String {
    Uuid::new_v4().to_string()
}
