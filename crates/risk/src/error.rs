//! Risk controller errors

use bilend_core::{AccountId, ErrorKind, MarketId, MathError};
use bilend_ledger::LedgerError;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RiskError {
    #[error("Market not listed: {0}")]
    MarketNotListed(MarketId),

    #[error("Account {account} is already in the maximum of {max} markets")]
    TooManyMarkets { account: AccountId, max: usize },

    #[error("Account {account} has an open position in {market}: shares {shares}, borrows {borrows}")]
    NonzeroBalance {
        account: AccountId,
        market: MarketId,
        shares: Decimal,
        borrows: Decimal,
    },

    #[error("Insufficient liquidity for {account}: shortfall {shortfall}")]
    InsufficientLiquidity { account: AccountId, shortfall: Decimal },

    #[error("Price unavailable for {0}")]
    PriceUnavailable(MarketId),

    #[error("Account {0} is not in shortfall")]
    NotLiquidatable(AccountId),

    #[error("Repay {requested} exceeds close-factor limit {max_close}")]
    TooMuchRepay { max_close: Decimal, requested: Decimal },

    #[error("Seize of {requested} shares exceeds borrower collateral {held}")]
    SeizeTooMuch { held: Decimal, requested: Decimal },

    #[error("Liquidator and borrower are the same account: {0}")]
    SelfLiquidation(AccountId),

    #[error("Invalid risk parameter {name}: {reason}")]
    InvalidConfig { name: &'static str, reason: String },

    #[error("Math error: {0}")]
    Math(#[from] MathError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl RiskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RiskError::MarketNotListed(_) => ErrorKind::MarketNotListed,
            RiskError::TooManyMarkets { .. } => ErrorKind::TooManyMarkets,
            RiskError::NonzeroBalance { .. } => ErrorKind::NonzeroBalance,
            RiskError::InsufficientLiquidity { .. } => ErrorKind::InsufficientLiquidity,
            RiskError::PriceUnavailable(_) => ErrorKind::PriceUnavailable,
            RiskError::NotLiquidatable(_) => ErrorKind::NotLiquidatable,
            RiskError::TooMuchRepay { .. } => ErrorKind::TooMuchRepay,
            RiskError::SeizeTooMuch { .. } => ErrorKind::SeizeTooMuch,
            RiskError::SelfLiquidation(_) => ErrorKind::SelfLiquidation,
            RiskError::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            RiskError::Math(_) => ErrorKind::Math,
            RiskError::Ledger(err) => err.kind(),
        }
    }
}
