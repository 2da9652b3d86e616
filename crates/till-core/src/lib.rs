//! # till-core: Pure Business Logic for the Till Ledger
//!
//! The transactional heart of a multi-tenant point of sale: cash-drawer
//! shifts, sales, stock effects and the end-of-shift arqueo. Everything in
//! this crate is pure; persistence and transactions live in `till-db`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Till Architecture                                │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              HTTP / routing layer (collaborator)                │   │
//! │  │    auth → TenantContext { tenant_id, cashier_id, role }         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 till-db: TillService                            │   │
//! │  │    open_shift, close_shift, create_sale, cancel_sale, ...      │   │
//! │  │    one sqlx transaction per mutating call                      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ till-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌─────────────────┐    │   │
//! │  │   │  types  │ │  money  │ │  totals  │ │ reconciliation  │    │   │
//! │  │   │  Shift  │ │  Money  │ │ SaleTot. │ │  Arqueo         │    │   │
//! │  │   │  Sale   │ │         │ │ tender   │ │  ClosePreview   │    │   │
//! │  │   └─────────┘ └─────────┘ └──────────┘ └─────────────────┘    │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Shift, Sale, Payment, TenantContext, ...)
//! - [`money`] - Money type with integer arithmetic
//! - [`totals`] - Line/sale totals and the sale tender tag
//! - [`reconciliation`] - The arqueo report
//! - [`validation`] - Request validation, run before any transaction
//! - [`error`] - The error taxonomy
//!
//! ## Example Usage
//!
//! ```rust
//! use till_core::money::Money;
//! use till_core::totals::SaleTotals;
//! use till_core::types::NewLineItem;
//!
//! let items = vec![NewLineItem::new("cola", 3, Money::from_cents(1000))];
//! let totals = SaleTotals::compute(&items, Money::zero(), Money::from_cents(200));
//! assert_eq!(totals.total.cents(), 3200);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod reconciliation;
pub mod totals;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{ConflictReason, CoreError, CoreResult, ErrorBody, ErrorKind, ValidationError};
pub use money::Money;
pub use reconciliation::{Arqueo, ClosePreview};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single sale.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity on a single line.
///
/// Catches typos such as 1000 instead of 10.
pub const MAX_ITEM_QUANTITY: i64 = 9_999;

/// Largest single amount accepted from a caller: $100,000,000.00.
///
/// Applies to unit prices, discounts, tips, payments and drawer counts, so
/// that no line or sale total can approach the `i64` range.
pub const MAX_AMOUNT_CENTS: i64 = 10_000_000_000;

/// Maximum length of any caller-supplied id.
pub const MAX_ID_LEN: usize = 64;

/// Maximum length of shift and sale notes.
pub const MAX_NOTES_LEN: usize = 500;

/// Allowed drift, in cents, between `total` and `subtotal - discount + tip`.
pub const TOTAL_TOLERANCE_CENTS: i64 = 1;

/// Length of the arqueo best-sellers list.
pub const TOP_PRODUCTS_LIMIT: usize = 10;
