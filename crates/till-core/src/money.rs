//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A drawer that should hold 132.00 can "hold" 131.99999999 and the      │
//! │  arqueo reports a phantom shortage.                                     │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Cents                                            │
//! │    13200 cents - 13000 cents = 200 cents, exactly                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use till_core::money::Money;
//!
//! let price = Money::from_cents(1000);          // $10.00
//! let line = price * 3_i64;                      // $30.00
//! let parsed: Money = "32.00".parse().unwrap();  // from a decimal string
//! assert_eq!(parsed.cents(), 3200);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: variances and refunds are negative
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Serialized as integer cents**: the HTTP layer formats for display
///
/// ## Where Money Flows
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  LineItem.unit_price × qty ──► LineItem.subtotal ──► Sale.subtotal     │
/// │                                                                         │
/// │  Sale.subtotal − discount + tip ──► Sale.total                         │
/// │                                                                         │
/// │  Σ cash payments + opening_amount ──► expected cash ──► difference     │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[serde(transparent)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ## Example
    /// ```rust
    /// use till_core::money::Money;
    ///
    /// let price = Money::from_cents(1099);
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from major and minor units.
    ///
    /// For negative amounts only the major unit carries the sign:
    /// `from_major_minor(-5, 50)` is -$5.50.
    ///
    /// ```rust
    /// use till_core::money::Money;
    ///
    /// assert_eq!(Money::from_major_minor(10, 99).cents(), 1099);
    /// assert_eq!(Money::from_major_minor(-5, 50).cents(), -550);
    /// ```
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion (truncated toward zero).
    #[inline]
    pub const fn dollars(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Zero.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Multiplies a unit price by a quantity.
    ///
    /// ```rust
    /// use till_core::money::Money;
    ///
    /// let line = Money::from_cents(1000).multiply_quantity(3);
    /// assert_eq!(line.cents(), 3000);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Like [`multiply_quantity`](Self::multiply_quantity), `None` on overflow.
    #[inline]
    pub const fn checked_multiply_quantity(&self, qty: i64) -> Option<Self> {
        match self.0.checked_mul(qty) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    #[inline]
    pub const fn checked_add(&self, other: Money) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    #[inline]
    pub const fn checked_sub(&self, other: Money) -> Option<Self> {
        match self.0.checked_sub(other.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Returns true if `self` and `other` differ by at most `tolerance_cents`.
    ///
    /// Used to check the `total == subtotal - discount + tip` invariant
    /// against a fixed rounding tolerance.
    #[inline]
    pub const fn within(&self, other: Money, tolerance_cents: i64) -> bool {
        (self.0 - other.0).abs() <= tolerance_cents
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parses a decimal string such as `"32"`, `"32.5"`, `"-2.00"` into cents.
///
/// ## Rules
/// - Optional leading `-`
/// - At most two fractional digits (no silent rounding)
/// - No thousands separators, no currency symbol
///
/// Parsing goes digit by digit; no floating point is involved at any step.
impl FromStr for Money {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "amount".to_string(),
            reason: reason.to_string(),
        };

        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (major_str, minor_str) = match digits.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (digits, ""),
        };

        if major_str.is_empty() || !major_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("expected a decimal number such as 12.50"));
        }
        if minor_str.len() > 2 || !minor_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("at most two decimal places are allowed"));
        }

        let major: i64 = major_str
            .parse()
            .map_err(|_| invalid("amount is too large"))?;
        let minor: i64 = match minor_str.len() {
            0 => 0,
            1 => minor_str.parse::<i64>().map_err(|_| invalid("bad fraction"))? * 10,
            _ => minor_str.parse::<i64>().map_err(|_| invalid("bad fraction"))?,
        };

        let cents = major
            .checked_mul(100)
            .and_then(|c| c.checked_add(minor))
            .ok_or_else(|| invalid("amount is too large"))?;

        Ok(Money(if negative { -cents } else { cents }))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Display shows money as `$10.99` / `-$2.00`.
///
/// Only display formatting ever renders a decimal point; stored and
/// compared values stay in cents.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, self.dollars().abs(), self.cents_part())
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

/// Multiplication by a quantity.
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
        assert_eq!(money.dollars(), 10);
        assert_eq!(money.cents_part(), 99);
    }

    #[test]
    fn test_checked_arithmetic() {
        let big = Money::from_cents(i64::MAX / 2);
        assert_eq!(big.checked_multiply_quantity(3), None);
        assert_eq!(
            Money::from_cents(1000).checked_multiply_quantity(3),
            Some(Money::from_cents(3000))
        );
        assert_eq!(big.checked_add(big).and_then(|m| m.checked_add(big)), None);
        assert_eq!(Money::from_cents(i64::MIN).checked_sub(Money::from_cents(1)), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(3200)), "$32.00");
        assert_eq!(format!("{}", Money::from_cents(-200)), "-$2.00");
        assert_eq!(format!("{}", Money::from_cents(5)), "$0.05");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(3500);
        let b = Money::from_cents(500);

        assert_eq!((a - b + Money::from_cents(200)).cents(), 3200);
        assert_eq!((-b).cents(), -500);
        assert_eq!((Money::from_cents(1000) * 3_i64).cents(), 3000);
    }

    #[test]
    fn test_sum() {
        let amounts = vec![Money::from_cents(2000), Money::from_cents(1200)];
        let total: Money = amounts.iter().sum();
        assert_eq!(total.cents(), 3200);

        let empty: Vec<Money> = Vec::new();
        assert!(empty.into_iter().sum::<Money>().is_zero());
    }

    #[test]
    fn test_parse_decimal_strings() {
        assert_eq!("32".parse::<Money>().unwrap().cents(), 3200);
        assert_eq!("32.5".parse::<Money>().unwrap().cents(), 3250);
        assert_eq!("32.05".parse::<Money>().unwrap().cents(), 3205);
        assert_eq!("-2.00".parse::<Money>().unwrap().cents(), -200);
        assert_eq!(" 0.01 ".parse::<Money>().unwrap().cents(), 1);
    }

    #[test]
    fn test_parse_rejects_imprecise_or_malformed() {
        assert!("32.005".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!("".parse::<Money>().is_err());
        assert!(".50".parse::<Money>().is_err());
        assert!("1,000.00".parse::<Money>().is_err());
    }

    #[test]
    fn test_within_tolerance() {
        let a = Money::from_cents(3200);
        assert!(a.within(Money::from_cents(3201), 1));
        assert!(a.within(Money::from_cents(3199), 1));
        assert!(!a.within(Money::from_cents(3202), 1));
    }

    #[test]
    fn test_zero_and_checks() {
        assert!(Money::zero().is_zero());
        assert!(Money::from_cents(100).is_positive());
        assert!(Money::from_cents(-100).is_negative());
        assert_eq!(Money::from_cents(-550).abs().cents(), 550);
    }
}
