//! Amount - Non-negative fixed-point wrapper for caller-supplied quantities
//!
//! Every underlying amount, share amount and repay amount that enters the
//! protocol from outside is an `Amount`. Negative values and values with
//! more than 18 fractional digits are unrepresentable.

use crate::fixed::SCALE;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur when constructing amounts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Amount cannot be negative: {0}")]
    NegativeAmount(Decimal),

    #[error("Amount has more than {max} fractional digits: {value}")]
    ExcessPrecision { value: Decimal, max: u32 },
}

/// A non-negative 18-digit fixed-point amount.
///
/// # Invariant
/// The inner value is always >= 0 and has at most 18 fractional digits.
///
/// # Example
/// ```
/// use bilend_core::Amount;
/// use rust_decimal::Decimal;
///
/// let amount = Amount::new(Decimal::new(100, 0)).unwrap();
/// assert_eq!(amount.value(), Decimal::new(100, 0));
///
/// // Negative amounts are rejected
/// let negative = Amount::new(Decimal::new(-100, 0));
/// assert!(negative.is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    /// Zero amount constant
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new Amount from a Decimal.
    ///
    /// Returns an error if the value is negative or finer than 1e-18.
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::NegativeAmount(value));
        }
        let normalized = value.normalize();
        if normalized.scale() > SCALE {
            return Err(AmountError::ExcessPrecision {
                value,
                max: SCALE,
            });
        }
        Ok(Self(normalized))
    }

    /// Whole units, e.g. `Amount::units(100)`.
    pub fn units(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    /// Get the inner Decimal value
    #[inline]
    pub const fn value(&self) -> Decimal {
        self.0
    }

    /// Check if the amount is zero
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Checked addition - returns None on overflow
    pub fn checked_add(&self, other: &Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Checked subtraction - returns None if result would be negative
    pub fn checked_sub(&self, other: &Amount) -> Option<Amount> {
        let result = self.0.checked_sub(other.0)?;
        if result < Decimal::ZERO {
            None
        } else {
            Some(Amount(result))
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl Default for Amount {
    fn default() -> Self {
        Self::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_positive() {
        let amount = Amount::new(dec!(100)).unwrap();
        assert_eq!(amount.value(), dec!(100));
    }

    #[test]
    fn test_amount_zero() {
        assert!(Amount::new(Decimal::ZERO).unwrap().is_zero());
        assert!(Amount::ZERO.is_zero());
    }

    #[test]
    fn test_amount_negative_rejected() {
        let result = Amount::new(dec!(-100));
        assert!(matches!(result, Err(AmountError::NegativeAmount(_))));
    }

    #[test]
    fn test_amount_excess_precision_rejected() {
        let result = Amount::new(dec!(0.0000000000000000001));
        assert!(matches!(result, Err(AmountError::ExcessPrecision { .. })));

        // Trailing zeros beyond 18 digits are not extra precision
        let padded = Amount::new(dec!(1.0000000000000000000)).unwrap();
        assert_eq!(padded.value(), dec!(1));
    }

    #[test]
    fn test_checked_sub_prevents_negative() {
        let a = Amount::units(50);
        let b = Amount::units(100);
        assert!(a.checked_sub(&b).is_none());
        assert_eq!(b.checked_sub(&a).unwrap(), Amount::units(50));
    }

    #[test]
    fn test_serde_rejects_negative() {
        let parsed: Result<Amount, _> = serde_json::from_str("\"-1\"");
        assert!(parsed.is_err());

        let amount: Amount = serde_json::from_str("\"123.45\"").unwrap();
        assert_eq!(amount.value(), dec!(123.45));
    }
}
