//! Fixed-point arithmetic with 18 fractional digits
//!
//! Every product and quotient in the protocol goes through this module.
//! Results are truncated toward zero to `SCALE` digits so that the same
//! inputs produce the same outputs in every execution environment.

use crate::error::MathError;
use rust_decimal::{Decimal, RoundingStrategy};

/// Number of fractional digits kept by every fixed-point value
pub const SCALE: u32 = 18;

/// 1.0 in fixed-point
pub const ONE: Decimal = Decimal::ONE;

/// Truncate toward zero to `SCALE` fractional digits.
#[inline]
pub fn truncate(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(SCALE, RoundingStrategy::ToZero)
}

/// `a * b`, truncated.
pub fn mul(a: Decimal, b: Decimal) -> Result<Decimal, MathError> {
    a.checked_mul(b)
        .map(truncate)
        .ok_or(MathError::Overflow { op: "mul" })
}

/// `a / b`, truncated. Division by zero is an error, never a panic.
pub fn div(a: Decimal, b: Decimal) -> Result<Decimal, MathError> {
    if b.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    a.checked_div(b)
        .map(truncate)
        .ok_or(MathError::Overflow { op: "div" })
}

/// `a / b`, rounded up to the next 1e-18 when the quotient is inexact.
pub fn div_up(a: Decimal, b: Decimal) -> Result<Decimal, MathError> {
    let down = div(a, b)?;
    let product = down.checked_mul(b).ok_or(MathError::Overflow { op: "mul" })?;
    if product < a {
        add(down, Decimal::new(1, SCALE))
    } else {
        Ok(down)
    }
}

/// `a * b + c`, truncated after the product.
pub fn mul_add(a: Decimal, b: Decimal, c: Decimal) -> Result<Decimal, MathError> {
    add(mul(a, b)?, c)
}

/// `a * b / c` with the multiplication first.
pub fn mul_div(a: Decimal, b: Decimal, c: Decimal) -> Result<Decimal, MathError> {
    if c.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let product = a.checked_mul(b).ok_or(MathError::Overflow { op: "mul" })?;
    product
        .checked_div(c)
        .map(truncate)
        .ok_or(MathError::Overflow { op: "div" })
}

pub fn add(a: Decimal, b: Decimal) -> Result<Decimal, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow { op: "add" })
}

/// `a - b`; a negative result is an underflow.
pub fn sub(a: Decimal, b: Decimal) -> Result<Decimal, MathError> {
    let result = a.checked_sub(b).ok_or(MathError::Overflow { op: "sub" })?;
    if result.is_sign_negative() && !result.is_zero() {
        return Err(MathError::Underflow);
    }
    Ok(result)
}

/// `a - b`, clamped at zero. Overflow is still an error.
pub fn saturating_sub(a: Decimal, b: Decimal) -> Result<Decimal, MathError> {
    match sub(a, b) {
        Err(MathError::Underflow) => Ok(Decimal::ZERO),
        other => other,
    }
}
