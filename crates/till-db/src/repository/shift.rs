//! # Shift Repository
//!
//! Storage for cash-drawer shifts. Every function runs on a connection the
//! caller supplies, normally an open transaction.
//!
//! ## Shift Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  insert_open()         INSERT ... state = 'open'                        │
//! │       │                (idx_shifts_one_open rejects a second one)       │
//! │       ▼                                                                 │
//! │  mark_closed()         UPDATE ... WHERE state = 'open'                  │
//! │       │                (0 rows → someone else closed it first)         │
//! │       ▼                                                                 │
//! │  record_reconciliation()  expected_amount, difference                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use till_core::{Money, Shift};

const SHIFT_COLUMNS: &str = r#"
    id, tenant_id, cashier_id, opening_amount, opening_time,
    closing_amount, expected_amount, difference, closing_time, notes, state
"#;

/// Inserts a new open shift.
///
/// ## Returns
/// * `Err(DbError::UniqueViolation)` on `shifts.*` - the cashier already has
///   an open shift in this tenant
pub async fn insert_open(conn: &mut SqliteConnection, shift: &Shift) -> DbResult<()> {
    debug!(id = %shift.id, cashier_id = %shift.cashier_id, "Inserting shift");

    sqlx::query(
        r#"
        INSERT INTO shifts (
            id, tenant_id, cashier_id, opening_amount, opening_time, notes, state
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&shift.id)
    .bind(&shift.tenant_id)
    .bind(&shift.cashier_id)
    .bind(shift.opening_amount)
    .bind(shift.opening_time)
    .bind(&shift.notes)
    .bind(shift.state)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Gets a shift by ID regardless of tenant; callers check ownership.
pub async fn get_by_id(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Shift>> {
    let sql = format!("SELECT {} FROM shifts WHERE id = ?1", SHIFT_COLUMNS);

    let shift = sqlx::query_as::<_, Shift>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(shift)
}

/// Gets the open shift of a cashier, if any.
pub async fn find_open(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    cashier_id: &str,
) -> DbResult<Option<Shift>> {
    let sql = format!(
        "SELECT {} FROM shifts WHERE tenant_id = ?1 AND cashier_id = ?2 AND state = 'open'",
        SHIFT_COLUMNS
    );

    let shift = sqlx::query_as::<_, Shift>(&sql)
        .bind(tenant_id)
        .bind(cashier_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(shift)
}

/// Transitions an open shift to closed.
///
/// `notes` replaces the shift notes when given.
///
/// ## Returns
/// `true` if the shift was open and is now closed; `false` if no open
/// shift with that id exists in the tenant.
pub async fn mark_closed(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    id: &str,
    closing_amount: Money,
    notes: Option<&str>,
    closed_at: DateTime<Utc>,
) -> DbResult<bool> {
    debug!(id = %id, closing_amount = %closing_amount, "Closing shift");

    let result = sqlx::query(
        r#"
        UPDATE shifts
        SET state = 'closed',
            closing_amount = ?3,
            closing_time = ?4,
            notes = COALESCE(?5, notes)
        WHERE id = ?1 AND tenant_id = ?2 AND state = 'open'
        "#,
    )
    .bind(id)
    .bind(tenant_id)
    .bind(closing_amount)
    .bind(closed_at)
    .bind(notes)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Stores the expected cash and the difference computed at close.
pub async fn record_reconciliation(
    conn: &mut SqliteConnection,
    id: &str,
    expected_amount: Money,
    difference: Money,
) -> DbResult<()> {
    sqlx::query("UPDATE shifts SET expected_amount = ?2, difference = ?3 WHERE id = ?1")
        .bind(id)
        .bind(expected_amount)
        .bind(difference)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Helper to generate a new shift ID.
pub fn generate_shift_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
