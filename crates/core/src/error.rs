//! Shared error taxonomy

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

/// Arithmetic failures in fixed-point math
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathError {
    #[error("Arithmetic overflow in {op}")]
    Overflow { op: &'static str },

    #[error("Arithmetic underflow")]
    Underflow,

    #[error("Division by zero")]
    DivisionByZero,
}

/// Flat classification of every error the protocol can return.
///
/// Each crate's error enum maps onto one of these through `kind()`, so a
/// caller (or a scenario file) can match on the failure class without
/// depending on which layer raised it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Pool lacks liquid underlying for the requested withdrawal/borrow
    InsufficientCash,
    /// Post-action risk check fails
    InsufficientLiquidity,
    /// Redeem/transfer exceeds held shares
    InsufficientBalance,
    /// Exit requested while a position is open
    NonzeroBalance,
    /// Liquidation repay exceeds the close-factor cap
    TooMuchRepay,
    /// Zero or otherwise unusable input amount
    InvalidAmount,
    /// A price the action requires is missing or zero
    PriceUnavailable,
    MarketNotListed,
    TooManyMarkets,
    NotLiquidatable,
    SeizeTooMuch,
    SelfLiquidation,
    RepayExceedsBorrow,
    TransferFailed,
    Math,
    InvalidConfig,
    PeriodRegression,
    InvalidRateInputs,
}

impl MathError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Math
    }
}
