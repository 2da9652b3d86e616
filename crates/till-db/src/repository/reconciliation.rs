//! # Reconciliation Reads
//!
//! Loads the rows an arqueo is computed from. Only `completed` sales of the
//! shift are read; the aggregation itself is
//! [`till_core::reconciliation::compute_arqueo`].

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use till_core::reconciliation::{compute_arqueo, SoldLine};
use till_core::{Arqueo, Payment, Sale, Shift};

/// Completed sales, their payments and their sold lines for one shift.
#[derive(Debug, Clone, Default)]
pub struct ShiftLedger {
    pub sales: Vec<Sale>,
    pub payments: Vec<Payment>,
    pub lines: Vec<SoldLine>,
}

/// Reads the completed-sale rows of a shift, each list in insertion order.
///
/// Every row read is also filtered by `tenant_id`.
pub async fn load_completed(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    shift_id: &str,
) -> DbResult<ShiftLedger> {
    debug!(shift_id = %shift_id, "Loading completed sales for arqueo");

    let sales = sqlx::query_as::<_, Sale>(
        r#"
        SELECT id, tenant_id, shift_id, sale_number, cashier_id, customer_name,
               subtotal, discount, tip, total, state, payment_method, notes,
               created_at, cancelled_at
        FROM sales
        WHERE shift_id = ?1 AND tenant_id = ?2 AND state = 'completed'
        ORDER BY rowid
        "#,
    )
    .bind(shift_id)
    .bind(tenant_id)
    .fetch_all(&mut *conn)
    .await?;

    let payments = sqlx::query_as::<_, Payment>(
        r#"
        SELECT p.id, p.tenant_id, p.sale_id, p.method, p.amount, p.reference, p.created_at
        FROM payments p
        JOIN sales s ON s.id = p.sale_id
        WHERE s.shift_id = ?1 AND s.tenant_id = ?2 AND p.tenant_id = ?2 AND s.state = 'completed'
        ORDER BY p.rowid
        "#,
    )
    .bind(shift_id)
    .bind(tenant_id)
    .fetch_all(&mut *conn)
    .await?;

    let lines = sqlx::query_as::<_, SoldLine>(
        r#"
        SELECT si.sale_id, si.product_id, pr.name AS product_name, si.quantity, si.total
        FROM sale_items si
        JOIN sales s ON s.id = si.sale_id
        LEFT JOIN products pr ON pr.id = si.product_id AND pr.tenant_id = si.tenant_id
        WHERE s.shift_id = ?1 AND s.tenant_id = ?2 AND si.tenant_id = ?2 AND s.state = 'completed'
        ORDER BY si.rowid
        "#,
    )
    .bind(shift_id)
    .bind(tenant_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(ShiftLedger {
        sales,
        payments,
        lines,
    })
}

/// Loads the rows and computes the arqueo for `shift`.
pub async fn arqueo_for(conn: &mut SqliteConnection, shift: &Shift) -> DbResult<Arqueo> {
    let ledger = load_completed(conn, &shift.tenant_id, &shift.id).await?;
    Ok(compute_arqueo(
        shift,
        &ledger.sales,
        &ledger.payments,
        &ledger.lines,
    ))
}
