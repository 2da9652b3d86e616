//! # Sale Totals
//!
//! Pure computation of line and sale totals, and the sale-level tender tag.
//!
//! ## Formulas
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  line.subtotal = quantity × unit_price                                  │
//! │  line.total    = line.subtotal − line.discount                          │
//! │                                                                         │
//! │  sale.subtotal = Σ line.subtotal                                        │
//! │  sale.total    = sale.subtotal − sale.discount + sale.tip               │
//! │                                                                         │
//! │  Example: (3 × $10.00) + (1 × $5.00) = $35.00                           │
//! │           $35.00 − $5.00 + $2.00     = $32.00                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Line discounts are recorded on the line only. The sale-level discount is
//! what the sale total subtracts.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::money::Money;
use crate::types::{NewLineItem, NewPayment, TenderTag};

/// Computed amounts for a single line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
}

impl LineTotals {
    pub fn compute(item: &NewLineItem) -> Self {
        let subtotal = item.unit_price.multiply_quantity(item.quantity);
        LineTotals {
            subtotal,
            discount: item.discount,
            total: subtotal - item.discount,
        }
    }
}

/// Computed amounts for a whole sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub tip: Money,
    pub total: Money,
}

impl SaleTotals {
    /// Computes the sale totals from the requested lines.
    ///
    /// ```rust
    /// use till_core::money::Money;
    /// use till_core::totals::SaleTotals;
    /// use till_core::types::NewLineItem;
    ///
    /// let items = vec![
    ///     NewLineItem::new("a", 3, Money::from_cents(1000)),
    ///     NewLineItem::new("b", 1, Money::from_cents(500)),
    /// ];
    /// let totals = SaleTotals::compute(&items, Money::from_cents(500), Money::from_cents(200));
    /// assert_eq!(totals.subtotal.cents(), 3500);
    /// assert_eq!(totals.total.cents(), 3200);
    /// ```
    pub fn compute(items: &[NewLineItem], discount: Money, tip: Money) -> Self {
        let subtotal: Money = items.iter().map(|i| LineTotals::compute(i).subtotal).sum();
        SaleTotals {
            subtotal,
            discount,
            tip,
            total: subtotal - discount + tip,
        }
    }

    /// Like [`compute`](Self::compute), `None` if any step overflows.
    pub fn checked_compute(items: &[NewLineItem], discount: Money, tip: Money) -> Option<Self> {
        let mut subtotal = Money::zero();
        for item in items {
            let line = item.unit_price.checked_multiply_quantity(item.quantity)?;
            subtotal = subtotal.checked_add(line)?;
        }
        let total = subtotal.checked_sub(discount)?.checked_add(tip)?;

        Some(SaleTotals {
            subtotal,
            discount,
            tip,
            total,
        })
    }

    /// Checks `total == subtotal - discount + tip` within the fixed tolerance.
    pub fn is_balanced(&self) -> bool {
        self.total
            .within(self.subtotal - self.discount + self.tip, crate::TOTAL_TOLERANCE_CENTS)
    }
}

/// Derives the sale-level tag from the payment rows.
///
/// - no payments → `None`
/// - one distinct method → that method
/// - two or more distinct methods → `Mixed`
pub fn tender_tag(payments: &[NewPayment]) -> Option<TenderTag> {
    let methods: BTreeSet<_> = payments.iter().map(|p| p.method).collect();
    match methods.len() {
        0 => None,
        1 => methods.into_iter().next().map(TenderTag::from),
        _ => Some(TenderTag::Mixed),
    }
}
