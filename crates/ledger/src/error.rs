//! Ledger errors

use bilend_core::{ErrorKind, MarketId, MathError};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur in ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(&'static str),

    #[error("Insufficient cash in {market}: available {available}, requested {requested}")]
    InsufficientCash {
        market: MarketId,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Insufficient shares in {market}: held {held}, requested {requested}")]
    InsufficientBalance {
        market: MarketId,
        held: Decimal,
        requested: Decimal,
    },

    #[error("Cannot move shares to the same account")]
    SelfTransfer,

    #[error("Insufficient reserves in {market}: available {available}, requested {requested}")]
    InsufficientReserves {
        market: MarketId,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Repay of {requested} exceeds borrow balance {owed} in {market}")]
    RepayExceedsBorrow {
        market: MarketId,
        owed: Decimal,
        requested: Decimal,
    },

    #[error("Accrual period went backwards in {market}: last {last}, requested {requested}")]
    PeriodRegression {
        market: MarketId,
        last: u64,
        requested: u64,
    },

    #[error("Rate model inputs out of domain: reserves {reserves} > cash {cash} + borrows {borrows}")]
    InvalidRateInputs {
        cash: Decimal,
        borrows: Decimal,
        reserves: Decimal,
    },

    #[error("Invalid market parameter {name}: {reason}")]
    InvalidParams {
        name: &'static str,
        reason: String,
    },

    #[error("Pool balance sheet would become insolvent in {0}")]
    Insolvent(MarketId),

    #[error("Math error: {0}")]
    Math(#[from] MathError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAmount(_)
            | LedgerError::SelfTransfer
            | LedgerError::InsufficientReserves { .. } => ErrorKind::InvalidAmount,
            LedgerError::InsufficientCash { .. } => ErrorKind::InsufficientCash,
            LedgerError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            LedgerError::RepayExceedsBorrow { .. } => ErrorKind::RepayExceedsBorrow,
            LedgerError::PeriodRegression { .. } => ErrorKind::PeriodRegression,
            LedgerError::InvalidRateInputs { .. } => ErrorKind::InvalidRateInputs,
            LedgerError::InvalidParams { .. } => ErrorKind::InvalidConfig,
            LedgerError::Insolvent(_) | LedgerError::Math(_) => ErrorKind::Math,
        }
    }
}
