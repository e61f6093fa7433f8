//! Mock Oracle for testing
//!
//! Provides configurable fixed prices. It doubles as the admin price
//! override feed for the scenario runner.

use bilend_core::MarketId;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::OracleError;
use crate::quote::{PriceOracle, PriceQuote};

/// Mock Price Oracle
///
/// Stores fixed prices that can be updated programmatically.
#[derive(Debug, Default)]
pub struct MockOracle {
    /// Stored prices (market -> quote)
    prices: RwLock<HashMap<MarketId, PriceQuote>>,
}

impl MockOracle {
    /// Create a new empty mock oracle
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock oracle seeded with prices
    pub fn with_prices(prices: impl IntoIterator<Item = (MarketId, Decimal)>) -> Result<Self, OracleError> {
        let oracle = Self::new();
        for (market, price) in prices {
            oracle.set_price(market, price)?;
        }
        Ok(oracle)
    }

    /// Set a fixed price for a market. Zero is accepted (it reads as
    /// unavailable); negative prices are rejected.
    pub fn set_price(&self, market: MarketId, price: Decimal) -> Result<(), OracleError> {
        if price.is_sign_negative() && !price.is_zero() {
            return Err(OracleError::InvalidPrice { market, price });
        }
        let quote = PriceQuote::new(market.clone(), price, "mock");
        self.prices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(market, quote);
        Ok(())
    }

    /// Remove a price (for testing the missing-price path)
    pub fn remove_price(&self, market: &MarketId) {
        self.prices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(market);
    }

    /// Get number of priced markets
    pub fn market_count(&self) -> usize {
        self.prices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl PriceOracle for MockOracle {
    fn price_of(&self, market: &MarketId) -> Result<PriceQuote, OracleError> {
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);
        prices
            .get(market)
            .cloned()
            .ok_or_else(|| OracleError::PriceNotFound {
                market: market.clone(),
            })
    }

    fn supported_markets(&self) -> Vec<MarketId> {
        let prices = self.prices.read().unwrap_or_else(PoisonError::into_inner);
        let mut markets: Vec<MarketId> = prices.keys().cloned().collect();
        markets.sort();
        markets
    }
}
