//! # Till Service
//!
//! The ledger's public operations. Each mutating call is one sqlx
//! transaction; validation runs before it begins, and any error drops the
//! transaction, which rolls everything back.
//!
//! ## Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Shifts                         Sales                                   │
//! │  ├── open_shift                 ├── create_sale                         │
//! │  ├── get_active_shift           ├── get_sale                            │
//! │  ├── get_active_shift_summary   ├── get_sales_for_shift                 │
//! │  ├── preview_close              └── cancel_sale                         │
//! │  └── close_shift                                                        │
//! │                                 Reconciliation                          │
//! │                                 └── compute_arqueo                      │
//! │                                                                         │
//! │  Every call takes a TenantContext. A resource stored under another     │
//! │  tenant yields CrossTenant whatever the caller's role.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Race Handling
//! Each mutating transaction opens with a write whose WHERE clause (or
//! unique index) encodes the precondition:
//!
//! | Operation     | First write                                  | 0 rows / violation |
//! |---------------|----------------------------------------------|--------------------|
//! | open_shift    | INSERT shift (partial unique index)          | ShiftAlreadyOpen   |
//! | create_sale   | sequence bump, INSERT ... WHERE shift open   | ShiftNotOpen       |
//! | close_shift   | UPDATE ... WHERE state = 'open'              | ShiftAlreadyClosed |
//! | cancel_sale   | UPDATE ... WHERE state <> 'cancelled'        | AlreadyCancelled   |
//!
//! When the write matches nothing, the row is looked up to tell NotFound,
//! CrossTenant and the conflict apart.

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::{LedgerSettings, TillConfig};
use crate::error::DbError;
use crate::pool::Database;
use crate::repository::{inventory, reconciliation, sale, shift};
use till_core::totals::{tender_tag, LineTotals, SaleTotals};
use till_core::validation::{
    validate_closing_amount, validate_id, validate_new_sale, validate_notes,
    validate_opening_amount,
};
use till_core::{
    ActiveShiftSummary, Arqueo, ClosePreview, CloseShiftRequest, ConflictReason, CoreError,
    CoreResult, Money, NewSale, OpenShiftRequest, Payment, Sale, SaleDetail, SaleLineItem,
    SaleState, Shift, ShiftState, TenantContext,
};

/// The ledger facade handed to the HTTP layer.
///
/// Cheap to clone.
#[derive(Debug, Clone)]
pub struct TillService {
    db: Database,
    ledger: LedgerSettings,
}

impl TillService {
    pub fn new(db: Database, ledger: LedgerSettings) -> Self {
        TillService { db, ledger }
    }

    /// Opens the database described by `config` and wraps it.
    pub async fn from_config(config: &TillConfig) -> CoreResult<Self> {
        let db = Database::new(config.database_config()).await?;
        Ok(TillService::new(db, config.ledger.clone()))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn ledger_settings(&self) -> &LedgerSettings {
        &self.ledger
    }

    // =========================================================================
    // Shifts
    // =========================================================================

    /// Opens a shift for the calling cashier.
    ///
    /// ## Errors
    /// - `Validation` - negative opening amount
    /// - `Conflict(ShiftAlreadyOpen)` - the cashier already has one open
    pub async fn open_shift(
        &self,
        ctx: &TenantContext,
        request: OpenShiftRequest,
    ) -> CoreResult<Shift> {
        validate_opening_amount(request.opening_amount)?;
        let notes = validate_notes(request.notes.as_deref())?;

        let shift = Shift {
            id: shift::generate_shift_id(),
            tenant_id: ctx.tenant_id.clone(),
            cashier_id: ctx.cashier_id.clone(),
            opening_amount: request.opening_amount,
            opening_time: Utc::now(),
            closing_amount: None,
            expected_amount: None,
            difference: None,
            closing_time: None,
            notes,
            state: ShiftState::Open,
        };

        let mut tx = self.db.begin().await?;

        match shift::insert_open(&mut tx, &shift).await {
            Ok(()) => {}
            Err(e) if e.is_unique_on("shifts") => {
                warn!(
                    tenant_id = %ctx.tenant_id,
                    cashier_id = %ctx.cashier_id,
                    "Shift already open for cashier"
                );
                return Err(ConflictReason::ShiftAlreadyOpen.into());
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await.map_err(DbError::from)?;

        info!(
            shift_id = %shift.id,
            tenant_id = %shift.tenant_id,
            cashier_id = %shift.cashier_id,
            opening_amount = %shift.opening_amount,
            "Shift opened"
        );

        Ok(shift)
    }

    /// Returns the calling cashier's open shift.
    pub async fn get_active_shift(&self, ctx: &TenantContext) -> CoreResult<Shift> {
        let mut conn = self.db.pool().acquire().await.map_err(DbError::from)?;

        shift::find_open(&mut conn, &ctx.tenant_id, &ctx.cashier_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Active shift", ctx.cashier_id.as_str()))
    }

    /// Returns the calling cashier's open shift with live sale counts.
    pub async fn get_active_shift_summary(
        &self,
        ctx: &TenantContext,
    ) -> CoreResult<ActiveShiftSummary> {
        let mut tx = self.db.begin().await?;

        let shift = shift::find_open(&mut tx, &ctx.tenant_id, &ctx.cashier_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Active shift", ctx.cashier_id.as_str()))?;
        let stats = sale::shift_stats(&mut tx, &shift.id).await?;

        tx.commit().await.map_err(DbError::from)?;

        Ok(ActiveShiftSummary {
            shift,
            completed_sales: stats.completed_sales,
            completed_total: stats.completed_total,
            temporary_sales: stats.temporary_sales,
            cancelled_sales: stats.cancelled_sales,
        })
    }

    /// Shows what closing with `counted_cash` would record, without closing.
    pub async fn preview_close(
        &self,
        ctx: &TenantContext,
        shift_id: &str,
        counted_cash: Money,
    ) -> CoreResult<ClosePreview> {
        validate_id("shift_id", shift_id)?;
        validate_closing_amount(counted_cash)?;

        let mut tx = self.db.begin().await?;

        let shift = load_shift(&mut tx, ctx, shift_id).await?;
        if !shift.is_open() {
            return Err(ConflictReason::ShiftAlreadyClosed.into());
        }
        let arqueo = reconciliation::arqueo_for(&mut tx, &shift).await?;

        tx.commit().await.map_err(DbError::from)?;

        Ok(ClosePreview::new(shift_id, arqueo.expected_cash, counted_cash))
    }

    /// Closes a shift and records the cash variance.
    ///
    /// ## What This Does
    /// 1. Flips the shift to closed, if it is still open
    /// 2. Computes expected cash from the same transaction's view
    /// 3. Stores expected amount and difference (counted − expected)
    ///
    /// ## Errors
    /// - `Conflict(ShiftAlreadyClosed)` - closing is terminal
    pub async fn close_shift(
        &self,
        ctx: &TenantContext,
        shift_id: &str,
        request: CloseShiftRequest,
    ) -> CoreResult<Shift> {
        validate_id("shift_id", shift_id)?;
        validate_closing_amount(request.closing_amount)?;
        let notes = request
            .notes
            .as_deref()
            .map(|n| validate_notes(Some(n)))
            .transpose()?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let closed = shift::mark_closed(
            &mut tx,
            &ctx.tenant_id,
            shift_id,
            request.closing_amount,
            notes.as_deref(),
            now,
        )
        .await?;

        if !closed {
            let existing = shift::get_by_id(&mut tx, shift_id).await?;
            return Err(explain_no_match(
                ctx,
                "Shift",
                shift_id,
                existing.as_ref().map(|s| s.tenant_id.as_str()),
                ConflictReason::ShiftAlreadyClosed,
            ));
        }

        let mut closed_shift = shift::get_by_id(&mut tx, shift_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Shift", shift_id))?;

        let arqueo = reconciliation::arqueo_for(&mut tx, &closed_shift).await?;
        let difference = request.closing_amount - arqueo.expected_cash;
        shift::record_reconciliation(&mut tx, shift_id, arqueo.expected_cash, difference).await?;

        tx.commit().await.map_err(DbError::from)?;

        closed_shift.expected_amount = Some(arqueo.expected_cash);
        closed_shift.difference = Some(difference);

        info!(
            shift_id = %shift_id,
            tenant_id = %ctx.tenant_id,
            closing_amount = %request.closing_amount,
            expected_amount = %arqueo.expected_cash,
            difference = %difference,
            "Shift closed"
        );

        Ok(closed_shift)
    }

    // =========================================================================
    // Sales
    // =========================================================================

    /// Records a sale, its lines and payments, and (if completed) takes the
    /// sold quantities out of stock. All or nothing.
    ///
    /// ## Errors
    /// - `Validation` - empty cart, bad quantity, bad payment
    /// - `NotFound` / `CrossTenant` - unknown or foreign shift or product
    /// - `Conflict(ShiftNotOpen)` - the shift is closed
    /// - `Conflict(InsufficientStock)` - under `reject_insufficient`
    pub async fn create_sale(&self, ctx: &TenantContext, request: NewSale) -> CoreResult<SaleDetail> {
        validate_new_sale(&request)?;
        let notes = validate_notes(request.notes.as_deref())?;

        let totals = SaleTotals::compute(&request.line_items, request.discount, request.tip);
        let takes_stock = request.state == SaleState::Completed;
        let now = Utc::now();

        debug!(
            tenant_id = %ctx.tenant_id,
            shift_id = %request.shift_id,
            lines = request.line_items.len(),
            total = %totals.total,
            "Creating sale"
        );

        let mut tx = self.db.begin().await?;

        let sale_number = sale::next_sale_number(
            &mut tx,
            &ctx.tenant_id,
            &self.ledger.sale_number_prefix,
            now,
        )
        .await?;

        let header = Sale {
            id: sale::generate_sale_id(),
            tenant_id: ctx.tenant_id.clone(),
            shift_id: request.shift_id.clone(),
            sale_number,
            cashier_id: ctx.cashier_id.clone(),
            customer_name: request
                .customer_name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            subtotal: totals.subtotal,
            discount: totals.discount,
            tip: totals.tip,
            total: totals.total,
            state: request.state,
            payment_method: tender_tag(&request.payments),
            notes,
            created_at: now,
            cancelled_at: None,
        };

        if !sale::insert_if_shift_open(&mut tx, &header, takes_stock).await? {
            let existing = shift::get_by_id(&mut tx, &request.shift_id).await?;
            return Err(explain_no_match(
                ctx,
                "Shift",
                &request.shift_id,
                existing.as_ref().map(|s| s.tenant_id.as_str()),
                ConflictReason::ShiftNotOpen,
            ));
        }

        let mut line_items = Vec::with_capacity(request.line_items.len());
        for item in &request.line_items {
            let product_name = if takes_stock {
                inventory::apply_delta(
                    &mut tx,
                    &ctx.tenant_id,
                    &item.product_id,
                    -item.quantity,
                    self.ledger.stock_policy,
                )
                .await?
                .name
            } else {
                inventory::ensure_product(&mut tx, &ctx.tenant_id, &item.product_id).await?
            };

            let line = LineTotals::compute(item);
            let row = SaleLineItem {
                id: sale::generate_sale_item_id(),
                tenant_id: ctx.tenant_id.clone(),
                sale_id: header.id.clone(),
                product_id: item.product_id.clone(),
                product_name: Some(product_name),
                quantity: item.quantity,
                unit_price: item.unit_price,
                subtotal: line.subtotal,
                discount: line.discount,
                total: line.total,
            };
            sale::insert_line_item(&mut tx, &row).await?;
            line_items.push(row);
        }

        let mut payments = Vec::with_capacity(request.payments.len());
        for tendered in &request.payments {
            let row = Payment {
                id: sale::generate_payment_id(),
                tenant_id: ctx.tenant_id.clone(),
                sale_id: header.id.clone(),
                method: tendered.method,
                amount: tendered.amount,
                reference: tendered
                    .reference
                    .as_deref()
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(str::to_string),
                created_at: now,
            };
            sale::insert_payment(&mut tx, &row).await?;
            payments.push(row);
        }

        tx.commit().await.map_err(DbError::from)?;

        info!(
            sale_id = %header.id,
            sale_number = %header.sale_number,
            shift_id = %header.shift_id,
            state = ?header.state,
            total = %header.total,
            "Sale created"
        );

        Ok(SaleDetail {
            sale: header,
            line_items,
            payments,
        })
    }

    /// Returns a sale with its lines and payments.
    pub async fn get_sale(&self, ctx: &TenantContext, sale_id: &str) -> CoreResult<SaleDetail> {
        validate_id("sale_id", sale_id)?;

        let mut tx = self.db.begin().await?;

        let header = sale::get_by_id(&mut tx, sale_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Sale", sale_id))?;
        ensure_owned(ctx, "Sale", sale_id, &header.tenant_id)?;
        let detail = sale::get_detail(&mut tx, header).await?;

        tx.commit().await.map_err(DbError::from)?;
        Ok(detail)
    }

    /// Returns every sale of a shift (any state), newest first.
    pub async fn get_sales_for_shift(
        &self,
        ctx: &TenantContext,
        shift_id: &str,
    ) -> CoreResult<Vec<SaleDetail>> {
        validate_id("shift_id", shift_id)?;

        let mut tx = self.db.begin().await?;

        load_shift(&mut tx, ctx, shift_id).await?;
        let details = sale::list_details_for_shift(&mut tx, &ctx.tenant_id, shift_id).await?;

        tx.commit().await.map_err(DbError::from)?;
        Ok(details)
    }

    /// Cancels a sale and returns any stock it took.
    ///
    /// ## What This Does
    /// 1. Flips the sale to cancelled, unless it already is
    /// 2. If the sale holds stock, adds every line's quantity back
    ///
    /// Temporary sales never took stock, so cancelling one restores none.
    ///
    /// ## Errors
    /// - `Conflict(AlreadyCancelled)` - a second cancel never restores twice
    pub async fn cancel_sale(&self, ctx: &TenantContext, sale_id: &str) -> CoreResult<SaleDetail> {
        validate_id("sale_id", sale_id)?;

        let now = Utc::now();
        let mut tx = self.db.begin().await?;

        let held_stock = match sale::mark_cancelled(&mut tx, &ctx.tenant_id, sale_id, now).await? {
            Some(held_stock) => held_stock,
            None => {
                let existing = sale::get_by_id(&mut tx, sale_id).await?;
                return Err(explain_no_match(
                    ctx,
                    "Sale",
                    sale_id,
                    existing.as_ref().map(|s| s.tenant_id.as_str()),
                    ConflictReason::AlreadyCancelled,
                ));
            }
        };

        let header = sale::get_by_id(&mut tx, sale_id)
            .await?
            .ok_or_else(|| CoreError::not_found("Sale", sale_id))?;
        let detail = sale::get_detail(&mut tx, header).await?;

        if held_stock {
            for item in &detail.line_items {
                inventory::apply_delta(
                    &mut tx,
                    &ctx.tenant_id,
                    &item.product_id,
                    item.quantity,
                    self.ledger.stock_policy,
                )
                .await?;
            }
            sale::clear_stock_applied(&mut tx, sale_id).await?;
        }

        tx.commit().await.map_err(DbError::from)?;

        info!(
            sale_id = %sale_id,
            sale_number = %detail.sale.sale_number,
            tenant_id = %ctx.tenant_id,
            stock_restored = held_stock,
            "Sale cancelled"
        );

        Ok(detail)
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Computes the arqueo of a shift, open or closed. Read-only.
    pub async fn compute_arqueo(&self, ctx: &TenantContext, shift_id: &str) -> CoreResult<Arqueo> {
        validate_id("shift_id", shift_id)?;

        let mut tx = self.db.begin().await?;

        let shift = load_shift(&mut tx, ctx, shift_id).await?;
        let arqueo = reconciliation::arqueo_for(&mut tx, &shift).await?;

        tx.commit().await.map_err(DbError::from)?;
        Ok(arqueo)
    }
}

// =============================================================================
// Helpers
// =============================================================================

async fn load_shift(
    conn: &mut sqlx::SqliteConnection,
    ctx: &TenantContext,
    shift_id: &str,
) -> CoreResult<Shift> {
    let shift = shift::get_by_id(conn, shift_id)
        .await?
        .ok_or_else(|| CoreError::not_found("Shift", shift_id))?;
    ensure_owned(ctx, "Shift", shift_id, &shift.tenant_id)?;
    Ok(shift)
}

fn ensure_owned(ctx: &TenantContext, entity: &str, id: &str, owner: &str) -> CoreResult<()> {
    if ctx.owns(owner) {
        Ok(())
    } else {
        warn!(
            entity = entity,
            id = %id,
            tenant_id = %ctx.tenant_id,
            role = ?ctx.role,
            "Cross-tenant access rejected"
        );
        Err(CoreError::cross_tenant(entity, id))
    }
}

/// Explains why a conditional write matched no row.
fn explain_no_match(
    ctx: &TenantContext,
    entity: &str,
    id: &str,
    owner: Option<&str>,
    conflict: ConflictReason,
) -> CoreError {
    match owner {
        None => CoreError::not_found(entity, id),
        Some(owner) => match ensure_owned(ctx, entity, id, owner) {
            Err(e) => e,
            Ok(()) => {
                warn!(entity = entity, id = %id, reason = %conflict, "Request rejected");
                CoreError::Conflict(conflict)
            }
        },
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::DbConfig;
    use crate::repository::product::generate_product_id;
    use till_core::{ErrorKind, NewLineItem, NewPayment, PaymentMethod, Product, StockPolicy};
    use till_core::{CashVariance, TenderTag};

    struct Fixture {
        service: TillService,
        ctx: TenantContext,
        cola: String,
        chips: String,
    }

    fn cents(c: i64) -> Money {
        Money::from_cents(c)
    }

    async fn fixture_with(policy: StockPolicy) -> Fixture {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let ledger = LedgerSettings {
            stock_policy: policy,
            ..LedgerSettings::default()
        };
        let service = TillService::new(db, ledger);

        let cola = add_product(&service, "tenant-a", "Cola", 50).await;
        let chips = add_product(&service, "tenant-a", "Chips", 20).await;

        Fixture {
            service,
            ctx: TenantContext::cashier("tenant-a", "cashier-1"),
            cola,
            chips,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(StockPolicy::AllowNegative).await
    }

    async fn add_product(service: &TillService, tenant: &str, name: &str, stock: i64) -> String {
        let product = Product {
            id: generate_product_id(),
            tenant_id: tenant.to_string(),
            name: name.to_string(),
            stock,
            min_stock: 0,
        };
        service.database().products().insert(&product).await.unwrap();
        product.id
    }

    async fn stock(f: &Fixture, id: &str) -> i64 {
        f.service
            .database()
            .products()
            .stock_of("tenant-a", id)
            .await
            .unwrap()
    }

    async fn open(f: &Fixture, opening: i64) -> Shift {
        f.service
            .open_shift(
                &f.ctx,
                OpenShiftRequest {
                    opening_amount: cents(opening),
                    notes: None,
                },
            )
            .await
            .unwrap()
    }

    /// (3 × 10.00) + (1 × 5.00), discount 5.00, tip 2.00 → 32.00
    fn scenario_sale(f: &Fixture, shift_id: &str, payments: Vec<NewPayment>) -> NewSale {
        let mut sale = NewSale::new(
            shift_id,
            vec![
                NewLineItem::new(f.cola.as_str(), 3, cents(1000)),
                NewLineItem::new(f.chips.as_str(), 1, cents(500)),
            ],
        );
        sale.discount = cents(500);
        sale.tip = cents(200);
        sale.payments = payments;
        sale
    }

    fn close_request(counted: i64) -> CloseShiftRequest {
        CloseShiftRequest {
            closing_amount: cents(counted),
            notes: None,
        }
    }

    // -------------------------------------------------------------------------
    // Scenarios
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_create_sale_persists_and_takes_stock() {
        let f = fixture().await;
        let shift = open(&f, 10000).await;

        let detail = f
            .service
            .create_sale(&f.ctx, scenario_sale(&f, &shift.id, vec![NewPayment::cash(cents(3200))]))
            .await
            .unwrap();

        assert_eq!(detail.sale.subtotal, cents(3500));
        assert_eq!(detail.sale.total, cents(3200));
        assert!(detail.sale.totals_balance());
        assert_eq!(detail.sale.state, SaleState::Completed);
        assert_eq!(detail.sale.payment_method, Some(TenderTag::Cash));
        assert_eq!(detail.line_items.len(), 2);
        assert_eq!(detail.line_items[0].subtotal, cents(3000));
        assert_eq!(detail.payments.len(), 1);
        assert!(detail.sale.sale_number.starts_with('V'));
        assert!(detail.sale.sale_number.ends_with("-001-000001"));

        assert_eq!(stock(&f, &f.cola).await, 47);
        assert_eq!(stock(&f, &f.chips).await, 19);

        let stored = f.service.get_sale(&f.ctx, &detail.sale.id).await.unwrap();
        assert_eq!(stored.sale.total, cents(3200));
        assert_eq!(stored.line_items.len(), 2);
        assert_eq!(stored.line_items[0].product_id, f.cola);
        assert_eq!(stored.line_items[0].product_name.as_deref(), Some("Cola"));
        assert_eq!(stored.line_items[1].product_name.as_deref(), Some("Chips"));
        assert!(stored.line_items.iter().all(|l| l.tenant_id == "tenant-a"));
        assert!(stored.payments.iter().all(|p| p.tenant_id == "tenant-a"));
        assert_eq!(stored.payments[0].method, PaymentMethod::Cash);
    }

    #[tokio::test]
    async fn test_cancel_restores_stock_and_leaves_arqueo() {
        let f = fixture().await;
        let shift = open(&f, 10000).await;
        let detail = f
            .service
            .create_sale(&f.ctx, scenario_sale(&f, &shift.id, vec![NewPayment::cash(cents(3200))]))
            .await
            .unwrap();

        let cancelled = f.service.cancel_sale(&f.ctx, &detail.sale.id).await.unwrap();
        assert_eq!(cancelled.sale.state, SaleState::Cancelled);
        assert!(cancelled.sale.cancelled_at.is_some());

        assert_eq!(stock(&f, &f.cola).await, 50);
        assert_eq!(stock(&f, &f.chips).await, 20);

        let arqueo = f.service.compute_arqueo(&f.ctx, &shift.id).await.unwrap();
        assert_eq!(arqueo.totals.sale_count, 0);
        assert!(arqueo.totals.total.is_zero());
        assert!(arqueo.payments_by_method.is_empty());
        assert!(arqueo.top_products.is_empty());
        assert_eq!(arqueo.expected_cash, cents(10000));
    }

    #[tokio::test]
    async fn test_close_records_shortage() {
        let f = fixture().await;
        let shift = open(&f, 10000).await;
        f.service
            .create_sale(&f.ctx, scenario_sale(&f, &shift.id, vec![NewPayment::cash(cents(3200))]))
            .await
            .unwrap();

        let closed = f
            .service
            .close_shift(&f.ctx, &shift.id, close_request(13000))
            .await
            .unwrap();

        assert_eq!(closed.state, ShiftState::Closed);
        assert_eq!(closed.closing_amount, Some(cents(13000)));
        assert_eq!(closed.expected_amount, Some(cents(13200)));
        assert_eq!(closed.difference, Some(cents(-200)));
        assert_eq!(closed.variance(), Some(CashVariance::Shortage));
        assert!(closed.closing_time.is_some());

        let arqueo = f.service.compute_arqueo(&f.ctx, &shift.id).await.unwrap();
        assert_eq!(arqueo.counted_cash, Some(cents(13000)));
        assert_eq!(arqueo.difference, Some(cents(-200)));
    }

    #[tokio::test]
    async fn test_sale_on_closed_shift_is_rejected() {
        let f = fixture().await;
        let shift = open(&f, 10000).await;
        f.service
            .close_shift(&f.ctx, &shift.id, close_request(10000))
            .await
            .unwrap();

        let err = f
            .service
            .create_sale(&f.ctx, scenario_sale(&f, &shift.id, vec![NewPayment::cash(cents(3200))]))
            .await
            .unwrap_err();

        assert_eq!(err.conflict_reason(), Some(ConflictReason::ShiftNotOpen));
        assert_eq!(stock(&f, &f.cola).await, 50);
        assert_eq!(stock(&f, &f.chips).await, 20);
        assert!(f
            .service
            .get_sales_for_shift(&f.ctx, &shift.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_mixed_payments_stay_in_their_methods() {
        let f = fixture().await;
        let shift = open(&f, 10000).await;

        let detail = f
            .service
            .create_sale(
                &f.ctx,
                scenario_sale(
                    &f,
                    &shift.id,
                    vec![
                        NewPayment::cash(cents(2000)),
                        NewPayment::with_reference(PaymentMethod::Card, cents(1200), "AUTH-7781"),
                    ],
                ),
            )
            .await
            .unwrap();
        assert_eq!(detail.sale.payment_method, Some(TenderTag::Mixed));

        let arqueo = f.service.compute_arqueo(&f.ctx, &shift.id).await.unwrap();
        assert_eq!(arqueo.payments_by_method.len(), 2);
        assert_eq!(arqueo.method_total(PaymentMethod::Cash), cents(2000));
        assert_eq!(arqueo.method_total(PaymentMethod::Card), cents(1200));
        assert_eq!(arqueo.method(PaymentMethod::Card).unwrap().sale_count, 1);
        assert_eq!(arqueo.expected_cash, cents(12000));
    }

    // -------------------------------------------------------------------------
    // Shift invariants
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_second_open_shift_conflicts() {
        let f = fixture().await;
        open(&f, 0).await;

        let err = f
            .service
            .open_shift(&f.ctx, OpenShiftRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.conflict_reason(), Some(ConflictReason::ShiftAlreadyOpen));

        // Another cashier in the same tenant is unaffected
        let other = TenantContext::cashier("tenant-a", "cashier-2");
        assert!(f
            .service
            .open_shift(&other, OpenShiftRequest::default())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_open_exactly_one_wins() {
        let f = fixture().await;

        let (a, b) = tokio::join!(
            f.service.open_shift(&f.ctx, OpenShiftRequest::default()),
            f.service.open_shift(&f.ctx, OpenShiftRequest::default()),
        );

        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
        assert_eq!(loser.conflict_reason(), Some(ConflictReason::ShiftAlreadyOpen));

        let open_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM shifts WHERE tenant_id = 'tenant-a' AND cashier_id = 'cashier-1' AND state = 'open'",
        )
        .fetch_one(f.service.database().pool())
        .await
        .unwrap();
        assert_eq!(open_count, 1);
    }

    #[tokio::test]
    async fn test_reopen_after_close_and_no_double_close() {
        let f = fixture().await;
        let first = open(&f, 5000).await;

        f.service
            .close_shift(&f.ctx, &first.id, close_request(5000))
            .await
            .unwrap();
        let err = f
            .service
            .close_shift(&f.ctx, &first.id, close_request(5000))
            .await
            .unwrap_err();
        assert_eq!(err.conflict_reason(), Some(ConflictReason::ShiftAlreadyClosed));

        let second = open(&f, 2000).await;
        assert_ne!(first.id, second.id);
        assert_eq!(f.service.get_active_shift(&f.ctx).await.unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_no_active_shift_is_not_found() {
        let f = fixture().await;
        let err = f.service.get_active_shift(&f.ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = f
            .service
            .close_shift(&f.ctx, "no-such-shift", close_request(0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_active_shift_summary_counts_by_state() {
        let f = fixture().await;
        let shift = open(&f, 0).await;

        let kept = f
            .service
            .create_sale(&f.ctx, scenario_sale(&f, &shift.id, vec![NewPayment::cash(cents(3200))]))
            .await
            .unwrap();
        let dropped = f
            .service
            .create_sale(&f.ctx, scenario_sale(&f, &shift.id, vec![NewPayment::cash(cents(3200))]))
            .await
            .unwrap();
        f.service.cancel_sale(&f.ctx, &dropped.sale.id).await.unwrap();

        let mut parked = scenario_sale(&f, &shift.id, vec![]);
        parked.state = SaleState::Temporary;
        f.service.create_sale(&f.ctx, parked).await.unwrap();

        let summary = f.service.get_active_shift_summary(&f.ctx).await.unwrap();
        assert_eq!(summary.shift.id, shift.id);
        assert_eq!(summary.completed_sales, 1);
        assert_eq!(summary.completed_total, kept.sale.total);
        assert_eq!(summary.cancelled_sales, 1);
        assert_eq!(summary.temporary_sales, 1);
    }

    #[tokio::test]
    async fn test_preview_matches_close() {
        let f = fixture().await;
        let shift = open(&f, 10000).await;
        f.service
            .create_sale(&f.ctx, scenario_sale(&f, &shift.id, vec![NewPayment::cash(cents(3200))]))
            .await
            .unwrap();

        let preview = f
            .service
            .preview_close(&f.ctx, &shift.id, cents(13250))
            .await
            .unwrap();
        assert_eq!(preview.expected_cash, cents(13200));
        assert_eq!(preview.difference, cents(50));
        assert_eq!(preview.variance, CashVariance::Surplus);

        // Nothing was written
        assert!(f.service.get_active_shift(&f.ctx).await.unwrap().is_open());

        let closed = f
            .service
            .close_shift(&f.ctx, &shift.id, close_request(13250))
            .await
            .unwrap();
        assert_eq!(closed.difference, Some(preview.difference));
    }

    // -------------------------------------------------------------------------
    // Sale invariants
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_unknown_product_rolls_back_everything() {
        let f = fixture().await;
        let shift = open(&f, 0).await;

        let sale = NewSale::new(
            shift.id.as_str(),
            vec![
                NewLineItem::new(f.cola.as_str(), 2, cents(1000)),
                NewLineItem::new("no-such-product", 1, cents(100)),
            ],
        );
        let err = f.service.create_sale(&f.ctx, sale).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        assert_eq!(stock(&f, &f.cola).await, 50);
        assert!(f
            .service
            .get_sales_for_shift(&f.ctx, &shift.id)
            .await
            .unwrap()
            .is_empty());

        // The sequence bump was rolled back too
        let next = f
            .service
            .create_sale(&f.ctx, scenario_sale(&f, &shift.id, vec![]))
            .await
            .unwrap();
        assert!(next.sale.sale_number.ends_with("-000001"));
    }

    #[tokio::test]
    async fn test_reject_policy_refuses_oversell() {
        let f = fixture_with(StockPolicy::RejectInsufficient).await;
        let shift = open(&f, 0).await;

        let sale = NewSale::new(
            shift.id.as_str(),
            vec![
                NewLineItem::new(f.chips.as_str(), 1, cents(500)),
                NewLineItem::new(f.cola.as_str(), 51, cents(1000)),
            ],
        );
        let err = f.service.create_sale(&f.ctx, sale).await.unwrap_err();
        assert_eq!(err.conflict_reason(), Some(ConflictReason::InsufficientStock));

        assert_eq!(stock(&f, &f.cola).await, 50);
        assert_eq!(stock(&f, &f.chips).await, 20);
    }

    #[tokio::test]
    async fn test_allow_negative_by_default() {
        let f = fixture().await;
        let shift = open(&f, 0).await;

        let sale = NewSale::new(
            shift.id.as_str(),
            vec![NewLineItem::new(f.cola.as_str(), 60, cents(1000))],
        );
        f.service.create_sale(&f.ctx, sale).await.unwrap();
        assert_eq!(stock(&f, &f.cola).await, -10);
    }

    #[tokio::test]
    async fn test_temporary_sale_touches_nothing() {
        let f = fixture().await;
        let shift = open(&f, 10000).await;

        let mut parked = scenario_sale(&f, &shift.id, vec![NewPayment::cash(cents(3200))]);
        parked.state = SaleState::Temporary;
        let detail = f.service.create_sale(&f.ctx, parked).await.unwrap();
        assert_eq!(detail.sale.state, SaleState::Temporary);
        assert_eq!(stock(&f, &f.cola).await, 50);

        let arqueo = f.service.compute_arqueo(&f.ctx, &shift.id).await.unwrap();
        assert_eq!(arqueo.totals.sale_count, 0);
        assert_eq!(arqueo.expected_cash, cents(10000));

        let cancelled = f.service.cancel_sale(&f.ctx, &detail.sale.id).await.unwrap();
        assert_eq!(cancelled.sale.state, SaleState::Cancelled);
        assert_eq!(stock(&f, &f.cola).await, 50);
    }

    #[tokio::test]
    async fn test_double_cancel_restores_once() {
        let f = fixture().await;
        let shift = open(&f, 0).await;
        let detail = f
            .service
            .create_sale(&f.ctx, scenario_sale(&f, &shift.id, vec![]))
            .await
            .unwrap();

        f.service.cancel_sale(&f.ctx, &detail.sale.id).await.unwrap();
        let err = f
            .service
            .cancel_sale(&f.ctx, &detail.sale.id)
            .await
            .unwrap_err();
        assert_eq!(err.conflict_reason(), Some(ConflictReason::AlreadyCancelled));
        assert_eq!(stock(&f, &f.cola).await, 50);
        assert_eq!(stock(&f, &f.chips).await, 20);
    }

    #[tokio::test]
    async fn test_validation_fails_before_storage() {
        let f = fixture().await;
        let shift = open(&f, 0).await;

        let err = f
            .service
            .create_sale(&f.ctx, NewSale::new(shift.id.as_str(), vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);

        let err = f
            .service
            .open_shift(
                &TenantContext::cashier("tenant-a", "cashier-9"),
                OpenShiftRequest {
                    opening_amount: cents(-1),
                    notes: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn test_sale_numbers_are_sequential_per_tenant() {
        let f = fixture().await;
        let shift = open(&f, 0).await;

        let first = f
            .service
            .create_sale(&f.ctx, scenario_sale(&f, &shift.id, vec![]))
            .await
            .unwrap();
        let second = f
            .service
            .create_sale(&f.ctx, scenario_sale(&f, &shift.id, vec![]))
            .await
            .unwrap();
        assert!(first.sale.sale_number.ends_with("-001-000001"));
        assert!(second.sale.sale_number.ends_with("-001-000002"));

        let water = add_product(&f.service, "tenant-b", "Water", 10).await;
        let ctx_b = TenantContext::cashier("tenant-b", "cashier-1");
        let shift_b = f
            .service
            .open_shift(&ctx_b, OpenShiftRequest::default())
            .await
            .unwrap();
        let other = f
            .service
            .create_sale(
                &ctx_b,
                NewSale::new(shift_b.id.as_str(), vec![NewLineItem::new(water, 1, cents(100))]),
            )
            .await
            .unwrap();
        assert!(other.sale.sale_number.ends_with("-002-000001"));
    }

    #[tokio::test]
    async fn test_cash_payments_match_arqueo_cash_bucket() {
        let f = fixture().await;
        let shift = open(&f, 2500).await;

        let tenders = vec![
            vec![NewPayment::cash(cents(5000))],
            vec![
                NewPayment::cash(cents(1000)),
                NewPayment::with_reference(PaymentMethod::Transfer, cents(2200), "TRX-1"),
            ],
            vec![NewPayment::with_reference(PaymentMethod::Card, cents(3200), "AUTH-2")],
        ];
        for payments in tenders {
            f.service
                .create_sale(&f.ctx, scenario_sale(&f, &shift.id, payments))
                .await
                .unwrap();
        }

        let details = f.service.get_sales_for_shift(&f.ctx, &shift.id).await.unwrap();
        assert_eq!(details.len(), 3);
        let cash_paid: Money = details
            .iter()
            .filter(|d| d.sale.is_completed())
            .flat_map(|d| d.payments.iter())
            .filter(|p| p.method == PaymentMethod::Cash)
            .map(|p| p.amount)
            .sum();

        let arqueo = f.service.compute_arqueo(&f.ctx, &shift.id).await.unwrap();
        assert_eq!(arqueo.method_total(PaymentMethod::Cash), cash_paid);
        assert_eq!(arqueo.expected_cash, cents(2500) + cash_paid);
        assert_eq!(arqueo.totals.sale_count, 3);
        assert_eq!(arqueo.totals.total, cents(9600));
        assert_eq!(arqueo.top_products[0].product_id, f.cola);
        assert_eq!(arqueo.top_products[0].quantity, 9);
        assert_eq!(arqueo.top_products[0].product_name.as_deref(), Some("Cola"));
    }

    // -------------------------------------------------------------------------
    // Tenant isolation
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_cross_tenant_access_is_rejected() {
        let f = fixture().await;
        let shift = open(&f, 10000).await;
        let detail = f
            .service
            .create_sale(&f.ctx, scenario_sale(&f, &shift.id, vec![NewPayment::cash(cents(3200))]))
            .await
            .unwrap();

        let intruder = TenantContext::new("tenant-b", "admin-1", till_core::Role::SuperAdmin);

        let err = f.service.get_sale(&intruder, &detail.sale.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CrossTenant);

        let err = f.service.cancel_sale(&intruder, &detail.sale.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CrossTenant);

        let err = f
            .service
            .close_shift(&intruder, &shift.id, close_request(0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CrossTenant);

        let err = f.service.compute_arqueo(&intruder, &shift.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CrossTenant);

        let err = f
            .service
            .get_sales_for_shift(&intruder, &shift.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CrossTenant);

        let err = f
            .service
            .create_sale(&intruder, scenario_sale(&f, &shift.id, vec![]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CrossTenant);

        // Nothing moved
        assert_eq!(stock(&f, &f.cola).await, 47);
        let still = f.service.get_sale(&f.ctx, &detail.sale.id).await.unwrap();
        assert_eq!(still.sale.state, SaleState::Completed);
        assert!(f.service.get_active_shift(&f.ctx).await.unwrap().is_open());
    }

    #[tokio::test]
    async fn test_foreign_product_rolls_back() {
        let f = fixture().await;
        let ctx_b = TenantContext::cashier("tenant-b", "cashier-1");
        let shift_b = f
            .service
            .open_shift(&ctx_b, OpenShiftRequest::default())
            .await
            .unwrap();

        let err = f
            .service
            .create_sale(
                &ctx_b,
                NewSale::new(
                    shift_b.id.as_str(),
                    vec![NewLineItem::new(f.cola.as_str(), 1, cents(1000))],
                ),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CrossTenant);
        assert_eq!(stock(&f, &f.cola).await, 50);
    }

    #[tokio::test]
    async fn test_oversized_amount_is_rejected_before_storage() {
        let f = fixture().await;
        let shift = open(&f, 0).await;

        let sale = NewSale::new(
            shift.id.as_str(),
            vec![NewLineItem::new(f.cola.as_str(), 3, cents(i64::MAX / 2))],
        );
        let err = f.service.create_sale(&f.ctx, sale).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(stock(&f, &f.cola).await, 50);
    }

    #[tokio::test]
    async fn test_line_and_payment_rows_carry_tenant() {
        let f = fixture().await;
        let shift = open(&f, 0).await;
        f.service
            .create_sale(
                &f.ctx,
                scenario_sale(
                    &f,
                    &shift.id,
                    vec![
                        NewPayment::cash(cents(2000)),
                        NewPayment::with_reference(PaymentMethod::Card, cents(1200), "AUTH-1"),
                    ],
                ),
            )
            .await
            .unwrap();

        let (lines, payments): (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM sale_items WHERE tenant_id = 'tenant-a'),
                (SELECT COUNT(*) FROM payments WHERE tenant_id = 'tenant-a')
            "#,
        )
        .fetch_one(f.service.database().pool())
        .await
        .unwrap();
        assert_eq!(lines, 2);
        assert_eq!(payments, 2);
    }

    #[tokio::test]
    async fn test_sales_for_shift_newest_first() {
        let f = fixture().await;
        let shift = open(&f, 0).await;

        let first = f
            .service
            .create_sale(&f.ctx, scenario_sale(&f, &shift.id, vec![]))
            .await
            .unwrap();
        let second = f
            .service
            .create_sale(&f.ctx, scenario_sale(&f, &shift.id, vec![]))
            .await
            .unwrap();

        let details = f.service.get_sales_for_shift(&f.ctx, &shift.id).await.unwrap();
        let ids: Vec<_> = details.iter().map(|d| d.sale.id.as_str()).collect();
        assert_eq!(ids, vec![second.sale.id.as_str(), first.sale.id.as_str()]);
        assert_eq!(details[1].line_items[0].product_name.as_deref(), Some("Cola"));
    }

    // -------------------------------------------------------------------------
    // Contention (file database, several connections, parallel tasks)
    // -------------------------------------------------------------------------

    async fn file_backed(dir: &tempfile::TempDir, policy: StockPolicy) -> TillService {
        let config = DbConfig::new(dir.path().join("till.db")).max_connections(8);
        let db = Database::new(config).await.unwrap();
        let ledger = LedgerSettings {
            stock_policy: policy,
            ..LedgerSettings::default()
        };
        TillService::new(db, ledger)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_opens_leave_one_open_shift() {
        let dir = tempfile::tempdir().unwrap();
        let service = file_backed(&dir, StockPolicy::AllowNegative).await;
        let ctx = TenantContext::cashier("tenant-a", "cashier-1");

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let service = service.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    service.open_shift(&ctx, OpenShiftRequest::default()).await
                })
            })
            .collect();

        let mut opened = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => opened += 1,
                Err(e) => {
                    assert_eq!(e.conflict_reason(), Some(ConflictReason::ShiftAlreadyOpen))
                }
            }
        }
        assert_eq!(opened, 1);

        let open_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM shifts WHERE state = 'open'")
                .fetch_one(service.database().pool())
                .await
                .unwrap();
        assert_eq!(open_count, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_sales_of_one_product() {
        let dir = tempfile::tempdir().unwrap();
        let service = file_backed(&dir, StockPolicy::AllowNegative).await;
        let ctx = TenantContext::cashier("tenant-a", "cashier-1");
        let cola = add_product(&service, "tenant-a", "Cola", 100).await;
        let shift = service
            .open_shift(&ctx, OpenShiftRequest::default())
            .await
            .unwrap();

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let service = service.clone();
                let ctx = ctx.clone();
                let sale = NewSale::new(
                    shift.id.as_str(),
                    vec![NewLineItem::new(cola.as_str(), 2, cents(1000))],
                );
                tokio::spawn(async move { service.create_sale(&ctx, sale).await })
            })
            .collect();

        let mut numbers = std::collections::HashSet::new();
        for handle in handles {
            let detail = handle.await.unwrap().unwrap();
            numbers.insert(detail.sale.sale_number);
        }
        assert_eq!(numbers.len(), 20);

        let stock = service
            .database()
            .products()
            .stock_of("tenant-a", &cola)
            .await
            .unwrap();
        assert_eq!(stock, 60);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_parallel_sales_never_oversell_under_reject_policy() {
        let dir = tempfile::tempdir().unwrap();
        let service = file_backed(&dir, StockPolicy::RejectInsufficient).await;
        let ctx = TenantContext::cashier("tenant-a", "cashier-1");
        let cola = add_product(&service, "tenant-a", "Cola", 10).await;
        let shift = service
            .open_shift(&ctx, OpenShiftRequest::default())
            .await
            .unwrap();

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let service = service.clone();
                let ctx = ctx.clone();
                let sale = NewSale::new(
                    shift.id.as_str(),
                    vec![NewLineItem::new(cola.as_str(), 1, cents(1000))],
                );
                tokio::spawn(async move { service.create_sale(&ctx, sale).await })
            })
            .collect();

        let mut sold = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => sold += 1,
                Err(e) => {
                    assert_eq!(e.conflict_reason(), Some(ConflictReason::InsufficientStock))
                }
            }
        }
        assert_eq!(sold, 10);

        let stock = service
            .database()
            .products()
            .stock_of("tenant-a", &cola)
            .await
            .unwrap();
        assert_eq!(stock, 0);
    }
}
