//! # Domain Types
//!
//! Core domain types used throughout the till ledger.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Shift       │ 1 │      Sale       │ 1 │  SaleLineItem   │       │
//! │  │  ─────────────  │──►│  ─────────────  │──►│  ─────────────  │       │
//! │  │  cashier_id     │ * │  sale_number    │ * │  product_id     │       │
//! │  │  opening_amount │   │  subtotal/total │   │  quantity       │       │
//! │  │  state          │   │  state          │   │  unit_price     │       │
//! │  └─────────────────┘   └────────┬────────┘   └─────────────────┘       │
//! │                                 │ 1..*                                  │
//! │                        ┌────────▼────────┐                              │
//! │                        │    Payment      │                              │
//! │                        │  method, amount │                              │
//! │                        └─────────────────┘                              │
//! │                                                                         │
//! │  ShiftState: Open → Closed            SaleState: Completed → Cancelled │
//! │                                                  Temporary → Cancelled │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every persisted record carries `tenant_id` (directly, or through its
//! sale). Nothing here is ever read across tenants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Authenticated Context
// =============================================================================

/// Role of the authenticated principal.
///
/// The core carries the role for logging only; role policy (such as a
/// super-admin bypass) is applied by the auth layer before calling in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    Cashier,
    Administrator,
    SuperAdmin,
}

/// Authenticated context supplied by the auth layer on every call.
///
/// Tenant and cashier identity always come from here, never from request
/// payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TenantContext {
    pub tenant_id: String,
    pub cashier_id: String,
    pub role: Role,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>, cashier_id: impl Into<String>, role: Role) -> Self {
        TenantContext {
            tenant_id: tenant_id.into(),
            cashier_id: cashier_id.into(),
            role,
        }
    }

    /// Shorthand for a cashier context.
    pub fn cashier(tenant_id: impl Into<String>, cashier_id: impl Into<String>) -> Self {
        Self::new(tenant_id, cashier_id, Role::Cashier)
    }

    /// Returns true if a record stamped with `tenant_id` is visible here.
    #[inline]
    pub fn owns(&self, tenant_id: &str) -> bool {
        self.tenant_id == tenant_id
    }
}

// =============================================================================
// Shift
// =============================================================================

/// Cash-drawer shift state. `Open → Closed` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ShiftState {
    Open,
    Closed,
}

/// A cashier's drawer session.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Shift {
    pub id: String,
    pub tenant_id: String,
    pub cashier_id: String,
    /// Cash in the drawer when the shift opened.
    pub opening_amount: Money,
    #[ts(as = "String")]
    pub opening_time: DateTime<Utc>,
    /// Cash counted at close.
    pub closing_amount: Option<Money>,
    /// opening_amount + cash taken by completed sales, frozen at close.
    pub expected_amount: Option<Money>,
    /// closing_amount - expected_amount (positive = surplus).
    pub difference: Option<Money>,
    #[ts(as = "Option<String>")]
    pub closing_time: Option<DateTime<Utc>>,
    pub notes: String,
    pub state: ShiftState,
}

impl Shift {
    #[inline]
    pub fn is_open(&self) -> bool {
        self.state == ShiftState::Open
    }

    /// Classifies the recorded difference; `None` until the shift closes.
    pub fn variance(&self) -> Option<CashVariance> {
        self.difference.map(CashVariance::classify)
    }
}

/// Direction of a cash difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum CashVariance {
    /// More cash than expected.
    Surplus,
    /// Less cash than expected.
    Shortage,
    Balanced,
}

impl CashVariance {
    pub fn classify(difference: Money) -> Self {
        if difference.is_positive() {
            CashVariance::Surplus
        } else if difference.is_negative() {
            CashVariance::Shortage
        } else {
            CashVariance::Balanced
        }
    }
}

/// Active shift plus live statistics, as shown on the register.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ActiveShiftSummary {
    pub shift: Shift,
    pub completed_sales: i64,
    pub completed_total: Money,
    pub temporary_sales: i64,
    pub cancelled_sales: i64,
}

// =============================================================================
// Sale State / Payment Method
// =============================================================================

/// The state of a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum SaleState {
    /// Paid and final. Counts toward totals and has taken stock.
    #[default]
    Completed,
    /// Reversed. Terminal.
    Cancelled,
    /// Parked; outside financial totals, stock untouched.
    Temporary,
}

/// How a single payment row was tendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum PaymentMethod {
    Cash,
    Card,
    Transfer,
}

impl PaymentMethod {
    /// All methods, in report order.
    pub const ALL: [PaymentMethod; 3] = [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::Transfer,
    ];

    /// Non-cash tenders must carry an external reference.
    #[inline]
    pub fn requires_reference(&self) -> bool {
        !matches!(self, PaymentMethod::Cash)
    }
}

/// Sale-level summary of how it was paid.
///
/// `Mixed` is a label on the sale only; each payment row keeps its own
/// `PaymentMethod`, and reconciliation never groups by `Mixed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum TenderTag {
    Cash,
    Card,
    Transfer,
    Mixed,
}

impl From<PaymentMethod> for TenderTag {
    fn from(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::Cash => TenderTag::Cash,
            PaymentMethod::Card => TenderTag::Card,
            PaymentMethod::Transfer => TenderTag::Transfer,
        }
    }
}

// =============================================================================
// Sale
// =============================================================================

/// A sale header.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub tenant_id: String,
    pub shift_id: String,
    /// Human-readable, globally unique: `V20261017-001-000042`.
    pub sale_number: String,
    pub cashier_id: String,
    pub customer_name: Option<String>,
    /// Σ line subtotals.
    pub subtotal: Money,
    pub discount: Money,
    pub tip: Money,
    /// subtotal - discount + tip.
    pub total: Money,
    pub state: SaleState,
    /// `None` when no payment rows were recorded.
    pub payment_method: Option<TenderTag>,
    pub notes: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Sale {
    /// Checks `total == subtotal - discount + tip` within the fixed tolerance.
    pub fn totals_balance(&self) -> bool {
        let expected = self.subtotal - self.discount + self.tip;
        self.total.within(expected, crate::TOTAL_TOLERANCE_CENTS)
    }

    #[inline]
    pub fn is_completed(&self) -> bool {
        self.state == SaleState::Completed
    }
}

/// A line in a sale. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleLineItem {
    pub id: String,
    pub tenant_id: String,
    pub sale_id: String,
    pub product_id: String,
    /// Current catalog name; `None` if the product row is gone.
    pub product_name: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    /// quantity × unit_price.
    pub subtotal: Money,
    pub discount: Money,
    /// subtotal - discount.
    pub total: Money,
}

/// One tender toward a sale. Several may exceed the total (cash change is
/// computed by the caller and never stored).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub tenant_id: String,
    pub sale_id: String,
    pub method: PaymentMethod,
    pub amount: Money,
    pub reference: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// A sale composed with its lines and payments.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleDetail {
    pub sale: Sale,
    pub line_items: Vec<SaleLineItem>,
    pub payments: Vec<Payment>,
}

impl SaleDetail {
    /// Σ of all payment rows as given.
    pub fn total_paid(&self) -> Money {
        self.payments.iter().map(|p| p.amount).sum()
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Input for opening a shift.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OpenShiftRequest {
    pub opening_amount: Money,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Input for closing a shift.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CloseShiftRequest {
    /// Cash counted in the drawer.
    pub closing_amount: Money,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A requested line item.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewLineItem {
    pub product_id: String,
    pub quantity: i64,
    pub unit_price: Money,
    /// Per-line discount; defaults to zero.
    #[serde(default)]
    pub discount: Money,
}

impl NewLineItem {
    pub fn new(product_id: impl Into<String>, quantity: i64, unit_price: Money) -> Self {
        NewLineItem {
            product_id: product_id.into(),
            quantity,
            unit_price,
            discount: Money::zero(),
        }
    }
}

/// A requested payment row.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewPayment {
    pub method: PaymentMethod,
    pub amount: Money,
    #[serde(default)]
    pub reference: Option<String>,
}

impl NewPayment {
    pub fn cash(amount: Money) -> Self {
        NewPayment {
            method: PaymentMethod::Cash,
            amount,
            reference: None,
        }
    }

    pub fn with_reference(method: PaymentMethod, amount: Money, reference: impl Into<String>) -> Self {
        NewPayment {
            method,
            amount,
            reference: Some(reference.into()),
        }
    }
}

/// Input for creating a sale. Tenant and cashier come from the context.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSale {
    pub shift_id: String,
    #[serde(default)]
    pub customer_name: Option<String>,
    pub line_items: Vec<NewLineItem>,
    #[serde(default)]
    pub discount: Money,
    #[serde(default)]
    pub tip: Money,
    #[serde(default)]
    pub payments: Vec<NewPayment>,
    #[serde(default)]
    pub notes: Option<String>,
    /// `completed` (default) or `temporary`.
    #[serde(default)]
    pub state: SaleState,
}

impl NewSale {
    /// A completed sale with no discount, tip or payments yet.
    pub fn new(shift_id: impl Into<String>, line_items: Vec<NewLineItem>) -> Self {
        NewSale {
            shift_id: shift_id.into(),
            customer_name: None,
            line_items,
            discount: Money::zero(),
            tip: Money::zero(),
            payments: Vec::new(),
            notes: None,
            state: SaleState::Completed,
        }
    }
}

// =============================================================================
// Product (collaborator-owned)
// =============================================================================

/// The slice of a product the ledger touches: identity, owner and stock.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    /// May go negative under `StockPolicy::AllowNegative`.
    pub stock: i64,
    pub min_stock: i64,
}

impl Product {
    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.min_stock
    }
}

/// What happens when a sale would take stock below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum StockPolicy {
    /// Decrement unconditionally; stock may go negative.
    #[default]
    AllowNegative,
    /// Refuse the sale with `ConflictReason::InsufficientStock`.
    RejectInsufficient,
}

impl std::str::FromStr for StockPolicy {
    type Err = crate::error::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "allow_negative" | "allow" => Ok(StockPolicy::AllowNegative),
            "reject_insufficient" | "reject" => Ok(StockPolicy::RejectInsufficient),
            other => Err(crate::error::ValidationError::InvalidFormat {
                field: "stock_policy".to_string(),
                reason: format!(
                    "unknown policy '{}', expected allow_negative or reject_insufficient",
                    other
                ),
            }),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
