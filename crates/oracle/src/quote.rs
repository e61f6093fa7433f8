//! Core oracle types

use bilend_core::MarketId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::OracleError;

/// A unit price for one market's underlying asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// The market this price applies to
    pub market: MarketId,
    /// Price of one unit of underlying in the numeraire (18 digits)
    pub price: Decimal,
    /// Source of the price (e.g., "mock", "admin-override")
    pub source: String,
}

impl PriceQuote {
    pub fn new(market: MarketId, price: Decimal, source: impl Into<String>) -> Self {
        Self {
            market,
            price,
            source: source.into(),
        }
    }
}

/// Price Oracle trait - read-only interface for price feeds
///
/// Lookups are synchronous snapshots: an action reads all the prices it needs
/// after accrual and before any mutation, and nothing suspends in between.
pub trait PriceOracle: Send + Sync {
    /// Get the current price for a market
    fn price_of(&self, market: &MarketId) -> Result<PriceQuote, OracleError>;

    /// Get a list of all markets that have a price
    fn supported_markets(&self) -> Vec<MarketId>;

    /// Price usable for valuation, or `None` when it is missing or zero.
    ///
    /// Callers treat `None` as "contributes no collateral value and blocks
    /// new borrows against this market".
    fn usable_price(&self, market: &MarketId) -> Option<Decimal> {
        match self.price_of(market) {
            Ok(quote) if quote.price > Decimal::ZERO => Some(quote.price),
            Ok(_) => {
                warn!(%market, "zero price treated as unavailable");
                None
            }
            Err(err) => {
                warn!(%market, error = %err, "price unavailable");
                None
            }
        }
    }
}
