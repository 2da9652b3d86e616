//! # Reconciliation (Arqueo)
//!
//! Derives the end-of-shift cash reconciliation report from ledger rows.
//!
//! ## Data Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  till-db (reads, inside a transaction when closing)                     │
//! │  ├── shift row                                                          │
//! │  ├── sales of the shift                                                 │
//! │  ├── their payment rows                                                 │
//! │  └── their line items joined with product names                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  compute_arqueo() ← THIS MODULE (pure, deterministic)                   │
//! │  ├── totals            count, Σsubtotal, Σdiscount, Σtip, Σtotal        │
//! │  ├── payments_by_method  one bucket per row-level method                │
//! │  ├── top_products      top 10 by quantity                               │
//! │  └── expected_cash     opening + Σ cash payments                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only `completed` sales of the given shift count. Rows belonging to other
//! sales are ignored, so callers may pass a superset.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{CashVariance, Payment, PaymentMethod, Sale, SaleState, Shift, ShiftState};
use crate::TOP_PRODUCTS_LIMIT;

// =============================================================================
// Input Rows
// =============================================================================

/// A sold line as read for reporting, joined with the product name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SoldLine {
    pub sale_id: String,
    pub product_id: String,
    /// `None` if the product row no longer exists.
    pub product_name: Option<String>,
    pub quantity: i64,
    pub total: Money,
}

// =============================================================================
// Report Types
// =============================================================================

/// Σ over completed sales.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ArqueoTotals {
    pub sale_count: i64,
    pub subtotal: Money,
    pub discount: Money,
    pub tip: Money,
    pub total: Money,
}

/// Payments of one method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MethodBreakdown {
    pub method: PaymentMethod,
    /// Distinct sales with at least one row of this method.
    pub sale_count: i64,
    pub total: Money,
}

/// One entry of the best-sellers list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TopProduct {
    pub product_id: String,
    pub product_name: Option<String>,
    pub quantity: i64,
    pub total: Money,
}

/// The arqueo report for one shift.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Arqueo {
    pub shift_id: String,
    pub shift_state: ShiftState,
    pub opening_amount: Money,
    pub totals: ArqueoTotals,
    /// In `PaymentMethod` order; methods with no rows are omitted.
    pub payments_by_method: Vec<MethodBreakdown>,
    pub top_products: Vec<TopProduct>,
    /// opening_amount + Σ cash payments of completed sales.
    pub expected_cash: Money,
    /// Cash counted at close; `None` while the shift is open.
    pub counted_cash: Option<Money>,
    /// counted_cash − expected_cash against the current ledger.
    pub difference: Option<Money>,
}

impl Arqueo {
    /// Returns the bucket for `method`, if any row used it.
    pub fn method(&self, method: PaymentMethod) -> Option<&MethodBreakdown> {
        self.payments_by_method.iter().find(|b| b.method == method)
    }

    /// Total taken by `method`; zero if unused.
    pub fn method_total(&self, method: PaymentMethod) -> Money {
        self.method(method).map(|b| b.total).unwrap_or_default()
    }

    pub fn variance(&self) -> Option<CashVariance> {
        self.difference.map(CashVariance::classify)
    }
}

/// Live "expected vs counted" preview for a shift that has not closed yet.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ClosePreview {
    pub shift_id: String,
    pub expected_cash: Money,
    pub counted_cash: Money,
    pub difference: Money,
    pub variance: CashVariance,
}

impl ClosePreview {
    pub fn new(shift_id: impl Into<String>, expected_cash: Money, counted_cash: Money) -> Self {
        let difference = counted_cash - expected_cash;
        ClosePreview {
            shift_id: shift_id.into(),
            expected_cash,
            counted_cash,
            difference,
            variance: CashVariance::classify(difference),
        }
    }
}

// =============================================================================
// Computation
// =============================================================================

/// Builds the arqueo for `shift`.
///
/// `lines` must be in insertion order; ties in the best-sellers list are
/// broken by which product sold first.
pub fn compute_arqueo(
    shift: &Shift,
    sales: &[Sale],
    payments: &[Payment],
    lines: &[SoldLine],
) -> Arqueo {
    let completed: Vec<&Sale> = sales
        .iter()
        .filter(|s| s.shift_id == shift.id && s.state == SaleState::Completed)
        .collect();
    let completed_ids: HashSet<&str> = completed.iter().map(|s| s.id.as_str()).collect();

    let totals = completed.iter().fold(ArqueoTotals::default(), |mut acc, sale| {
        acc.sale_count += 1;
        acc.subtotal += sale.subtotal;
        acc.discount += sale.discount;
        acc.tip += sale.tip;
        acc.total += sale.total;
        acc
    });

    let payments_by_method = group_payments(payments, &completed_ids);
    let cash_taken = payments_by_method
        .iter()
        .find(|b| b.method == PaymentMethod::Cash)
        .map(|b| b.total)
        .unwrap_or_default();
    let expected_cash = shift.opening_amount + cash_taken;

    let counted_cash = match shift.state {
        ShiftState::Closed => shift.closing_amount,
        ShiftState::Open => None,
    };

    Arqueo {
        shift_id: shift.id.clone(),
        shift_state: shift.state,
        opening_amount: shift.opening_amount,
        totals,
        payments_by_method,
        top_products: top_products(lines, &completed_ids),
        expected_cash,
        counted_cash,
        difference: counted_cash.map(|counted| counted - expected_cash),
    }
}

/// Groups payment rows by their own method. There is no mixed bucket.
fn group_payments(payments: &[Payment], sale_ids: &HashSet<&str>) -> Vec<MethodBreakdown> {
    let mut buckets: BTreeMap<PaymentMethod, (BTreeSet<&str>, Money)> = BTreeMap::new();

    for payment in payments.iter().filter(|p| sale_ids.contains(p.sale_id.as_str())) {
        let (sales, total) = buckets
            .entry(payment.method)
            .or_insert_with(|| (BTreeSet::new(), Money::zero()));
        sales.insert(payment.sale_id.as_str());
        *total += payment.amount;
    }

    buckets
        .into_iter()
        .map(|(method, (sales, total))| MethodBreakdown {
            method,
            sale_count: sales.len() as i64,
            total,
        })
        .collect()
}

fn top_products(lines: &[SoldLine], sale_ids: &HashSet<&str>) -> Vec<TopProduct> {
    // (first_seen, product)
    let mut by_product: HashMap<&str, (usize, TopProduct)> = HashMap::new();

    for (idx, line) in lines
        .iter()
        .filter(|l| sale_ids.contains(l.sale_id.as_str()))
        .enumerate()
    {
        let (_, entry) = by_product.entry(line.product_id.as_str()).or_insert_with(|| {
            (
                idx,
                TopProduct {
                    product_id: line.product_id.clone(),
                    product_name: line.product_name.clone(),
                    quantity: 0,
                    total: Money::zero(),
                },
            )
        });
        entry.quantity += line.quantity;
        entry.total += line.total;
    }

    let mut ranked: Vec<(usize, TopProduct)> = by_product.into_values().collect();
    ranked.sort_by(|(a_seen, a), (b_seen, b)| {
        b.quantity
            .cmp(&a.quantity)
            .then_with(|| a_seen.cmp(b_seen))
    });

    ranked
        .into_iter()
        .take(TOP_PRODUCTS_LIMIT)
        .map(|(_, product)| product)
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
