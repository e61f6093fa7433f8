//! Protocol errors

use bilend_core::{AccountId, AmountError, ErrorKind, MarketId, MathError};
use bilend_ledger::LedgerError;
use bilend_oracle::OracleError;
use bilend_risk::RiskError;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Risk error: {0}")]
    Risk(#[from] RiskError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid amount: {0}")]
    Amount(#[from] AmountError),

    #[error("Math error: {0}")]
    Math(#[from] MathError),

    #[error("Market not listed: {0}")]
    MarketNotListed(MarketId),

    #[error("Market already listed: {0}")]
    MarketAlreadyListed(MarketId),

    #[error("Underlying transfer of {amount} in {market} for {account} failed")]
    TransferFailed {
        market: MarketId,
        account: AccountId,
        amount: Decimal,
    },

    #[error("Period cannot move backwards: current {current}, requested {requested}")]
    PeriodRegression { current: u64, requested: u64 },
}

impl ProtocolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::Ledger(err) => err.kind(),
            ProtocolError::Risk(err) => err.kind(),
            ProtocolError::Oracle(err) => err.kind(),
            ProtocolError::Config(_) => ErrorKind::InvalidConfig,
            ProtocolError::Amount(_) => ErrorKind::InvalidAmount,
            ProtocolError::Math(_) => ErrorKind::Math,
            ProtocolError::MarketNotListed(_) => ErrorKind::MarketNotListed,
            ProtocolError::MarketAlreadyListed(_) => ErrorKind::InvalidConfig,
            ProtocolError::TransferFailed { .. } => ErrorKind::TransferFailed,
            ProtocolError::PeriodRegression { .. } => ErrorKind::PeriodRegression,
        }
    }
}
