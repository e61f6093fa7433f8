//! Oracle error types

use bilend_core::{ErrorKind, MarketId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Oracle-related errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// No price has been posted for the market
    #[error("Price not found for market {market}")]
    PriceNotFound { market: MarketId },

    /// Price data is invalid
    #[error("Invalid price for {market}: {price}")]
    InvalidPrice { market: MarketId, price: Decimal },
}

impl OracleError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::PriceUnavailable
    }
}
