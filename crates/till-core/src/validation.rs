//! # Validation Module
//!
//! Input validation for ledger requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP adapter                                                 │
//! │  └── Type validation (deserialization)                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (before any transaction begins)                  │
//! │  ├── Non-empty cart, positive quantities                               │
//! │  ├── Positive payment amounts, references for non-cash                 │
//! │  └── Non-negative discounts, tips, opening/closing cash                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK constraints on states and methods                           │
//! │  ├── UNIQUE (one open shift per cashier, sale numbers)                 │
//! │  └── Foreign keys                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::totals::SaleTotals;
use crate::types::{NewLineItem, NewPayment, NewSale, SaleState};
use crate::{MAX_AMOUNT_CENTS, MAX_CART_ITEMS, MAX_ID_LEN, MAX_ITEM_QUANTITY, MAX_NOTES_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an identifier supplied by the caller (shift, sale, product).
///
/// Only shape is checked here; existence and ownership are resolved
/// against the store.
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if id.len() > MAX_ID_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_ID_LEN,
        });
    }

    Ok(())
}

/// Validates free-text notes and returns them trimmed (empty if absent).
pub fn validate_notes(notes: Option<&str>) -> ValidationResult<String> {
    let notes = notes.map(str::trim).unwrap_or_default();

    if notes.len() > MAX_NOTES_LEN {
        return Err(ValidationError::TooLong {
            field: "notes".to_string(),
            max: MAX_NOTES_LEN,
        });
    }

    Ok(notes.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates that an amount is zero or more.
///
/// ```rust
/// use till_core::money::Money;
/// use till_core::validation::validate_non_negative;
///
/// assert!(validate_non_negative("tip", Money::zero()).is_ok());
/// assert!(validate_non_negative("tip", Money::from_cents(-1)).is_err());
/// ```
pub fn validate_non_negative(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a caller-supplied amount: zero up to `MAX_AMOUNT_CENTS`.
pub fn validate_amount(field: &str, amount: Money) -> ValidationResult<()> {
    validate_non_negative(field, amount)?;

    if amount.cents() > MAX_AMOUNT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_AMOUNT_CENTS,
        });
    }

    Ok(())
}

/// Validates the cash placed in the drawer at shift open.
pub fn validate_opening_amount(amount: Money) -> ValidationResult<()> {
    validate_amount("opening_amount", amount)
}

/// Validates the cash counted at shift close.
pub fn validate_closing_amount(amount: Money) -> ValidationResult<()> {
    validate_amount("closing_amount", amount)
}

// =============================================================================
// Sale Validators
// =============================================================================

/// Validates one requested line.
///
/// The line discount may not exceed the line subtotal.
pub fn validate_line_item(item: &NewLineItem) -> ValidationResult<()> {
    validate_id("product_id", &item.product_id)?;
    validate_quantity(item.quantity)?;
    validate_amount("unit_price", item.unit_price)?;
    validate_amount("line discount", item.discount)?;

    let subtotal = item
        .unit_price
        .checked_multiply_quantity(item.quantity)
        .ok_or_else(|| ValidationError::OutOfRange {
            field: "line subtotal".to_string(),
            min: 0,
            max: i64::MAX,
        })?;
    if item.discount > subtotal {
        return Err(ValidationError::OutOfRange {
            field: "line discount".to_string(),
            min: 0,
            max: subtotal.cents(),
        });
    }

    Ok(())
}

/// Validates one payment row.
///
/// ## Rules
/// - Amount must be positive and at most `MAX_AMOUNT_CENTS`
/// - Card and transfer payments must carry a reference
pub fn validate_payment(payment: &NewPayment) -> ValidationResult<()> {
    if !payment.amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }
    validate_amount("payment amount", payment.amount)?;

    if payment.method.requires_reference() {
        let has_reference = payment
            .reference
            .as_deref()
            .map(|r| !r.trim().is_empty())
            .unwrap_or(false);
        if !has_reference {
            return Err(ValidationError::Required {
                field: "payment reference".to_string(),
            });
        }
    }

    Ok(())
}

/// Validates a whole sale request, failing on the first problem.
///
/// Payments may sum to more than the total (the caller hands back change)
/// or to less; neither is checked here.
pub fn validate_new_sale(sale: &NewSale) -> ValidationResult<()> {
    validate_id("shift_id", &sale.shift_id)?;

    if sale.line_items.is_empty() {
        return Err(ValidationError::Required {
            field: "line_items".to_string(),
        });
    }

    if sale.line_items.len() > MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "line_items".to_string(),
            min: 1,
            max: MAX_CART_ITEMS as i64,
        });
    }

    if sale.state == SaleState::Cancelled {
        return Err(ValidationError::InvalidFormat {
            field: "state".to_string(),
            reason: "a sale can only be created as completed or temporary".to_string(),
        });
    }

    for item in &sale.line_items {
        validate_line_item(item)?;
    }

    validate_amount("discount", sale.discount)?;
    validate_amount("tip", sale.tip)?;

    let totals = SaleTotals::checked_compute(&sale.line_items, sale.discount, sale.tip)
        .ok_or_else(|| ValidationError::OutOfRange {
            field: "total".to_string(),
            min: 0,
            max: i64::MAX,
        })?;
    validate_non_negative("total", totals.total)?;

    for payment in &sale.payments {
        validate_payment(payment)?;
    }

    validate_notes(sale.notes.as_deref())?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PaymentMethod;

    fn sale_with(items: Vec<NewLineItem>) -> NewSale {
        NewSale::new("shift-1", items)
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-1).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("shift_id", "abc").is_ok());
        assert!(validate_id("shift_id", "   ").is_err());
        assert!(validate_id("shift_id", &"x".repeat(MAX_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_empty_cart_rejected() {
        let err = validate_new_sale(&sale_with(vec![])).unwrap_err();
        assert!(matches!(err, ValidationError::Required { ref field } if field == "line_items"));
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let sale = sale_with(vec![NewLineItem::new("p-1", 0, Money::from_cents(100))]);
        assert!(validate_new_sale(&sale).is_err());
    }

    #[test]
    fn test_line_discount_cannot_exceed_subtotal() {
        let mut item = NewLineItem::new("p-1", 2, Money::from_cents(500));
        item.discount = Money::from_cents(1000);
        assert!(validate_line_item(&item).is_ok());

        item.discount = Money::from_cents(1001);
        assert!(validate_line_item(&item).is_err());
    }

    #[test]
    fn test_payment_rules() {
        assert!(validate_payment(&NewPayment::cash(Money::from_cents(100))).is_ok());
        assert!(validate_payment(&NewPayment::cash(Money::zero())).is_err());

        let card = NewPayment {
            method: PaymentMethod::Card,
            amount: Money::from_cents(100),
            reference: None,
        };
        assert!(validate_payment(&card).is_err());

        let card = NewPayment::with_reference(PaymentMethod::Card, Money::from_cents(100), "AUTH-1");
        assert!(validate_payment(&card).is_ok());

        let blank = NewPayment::with_reference(PaymentMethod::Transfer, Money::from_cents(100), " ");
        assert!(validate_payment(&blank).is_err());
    }

    #[test]
    fn test_negative_tip_and_discount_rejected() {
        let mut sale = sale_with(vec![NewLineItem::new("p-1", 1, Money::from_cents(100))]);
        sale.tip = Money::from_cents(-1);
        assert!(validate_new_sale(&sale).is_err());

        sale.tip = Money::zero();
        sale.discount = Money::from_cents(-1);
        assert!(validate_new_sale(&sale).is_err());
    }

    #[test]
    fn test_discount_cannot_push_total_below_zero() {
        let mut sale = sale_with(vec![NewLineItem::new("p-1", 1, Money::from_cents(1000))]);
        sale.tip = Money::from_cents(100);
        sale.discount = Money::from_cents(1100);
        assert!(validate_new_sale(&sale).is_ok());

        sale.discount = Money::from_cents(1101);
        assert!(validate_new_sale(&sale).is_err());
    }

    #[test]
    fn test_cannot_create_cancelled_sale() {
        let mut sale = sale_with(vec![NewLineItem::new("p-1", 1, Money::from_cents(100))]);
        sale.state = SaleState::Cancelled;
        assert!(validate_new_sale(&sale).is_err());

        sale.state = SaleState::Temporary;
        assert!(validate_new_sale(&sale).is_ok());
    }

    #[test]
    fn test_oversized_unit_price_is_a_validation_error() {
        let sale = sale_with(vec![NewLineItem::new(
            "p-1",
            3,
            Money::from_cents(i64::MAX / 2),
        )]);
        let err = validate_new_sale(&sale).unwrap_err();
        assert!(matches!(err, ValidationError::OutOfRange { ref field, .. } if field == "unit_price"));
    }

    #[test]
    fn test_amount_bounds() {
        assert!(validate_amount("tip", Money::from_cents(MAX_AMOUNT_CENTS)).is_ok());
        assert!(validate_amount("tip", Money::from_cents(MAX_AMOUNT_CENTS + 1)).is_err());
        assert!(validate_opening_amount(Money::from_cents(i64::MAX)).is_err());

        let mut sale = sale_with(vec![NewLineItem::new("p-1", 1, Money::from_cents(100))]);
        sale.tip = Money::from_cents(i64::MAX);
        assert!(validate_new_sale(&sale).is_err());

        sale.tip = Money::zero();
        sale.payments = vec![NewPayment::cash(Money::from_cents(MAX_AMOUNT_CENTS + 1))];
        assert!(validate_new_sale(&sale).is_err());
    }

    #[test]
    fn test_largest_cart_stays_in_range() {
        let items = (0..MAX_CART_ITEMS)
            .map(|i| {
                NewLineItem::new(
                    format!("p-{}", i),
                    MAX_ITEM_QUANTITY,
                    Money::from_cents(MAX_AMOUNT_CENTS),
                )
            })
            .collect();
        let mut sale = sale_with(items);
        sale.tip = Money::from_cents(MAX_AMOUNT_CENTS);
        assert!(validate_new_sale(&sale).is_ok());
    }

    #[test]
    fn test_notes_are_trimmed() {
        assert_eq!(validate_notes(Some("  late start ")).unwrap(), "late start");
        assert_eq!(validate_notes(None).unwrap(), "");
        assert!(validate_notes(Some(&"n".repeat(MAX_NOTES_LEN + 1))).is_err());
    }
}
