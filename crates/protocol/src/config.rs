//! Protocol configuration
//!
//! One JSON document holds every admin-set parameter: per-market ledger
//! parameters and the risk parameters. Missing fields take their defaults.
//!
//! ```json
//! {
//!   "markets": {
//!     "CETH": { "reserve_factor": "0.1", "rate_model": { "kind": "white_paper", "base_rate_per_period": "0", "multiplier_per_period": "0.0000001" } }
//!   },
//!   "risk": { "close_factor": "0.5", "collateral_factors": { "CETH": "0.75" } }
//! }
//! ```

use bilend_core::MarketId;
use bilend_ledger::{LedgerError, MarketParams};
use bilend_risk::{RiskError, RiskParams};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid market parameters for {market}: {source}")]
    Market {
        market: MarketId,
        #[source]
        source: LedgerError,
    },

    #[error("Invalid risk parameters: {0}")]
    Risk(#[from] RiskError),

    #[error("Collateral factor set for unconfigured market {0}")]
    UnknownMarket(MarketId),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default)]
    pub markets: BTreeMap<MarketId, MarketParams>,

    #[serde(default)]
    pub risk: RiskParams,
}

impl ProtocolConfig {
    /// Load and validate a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn market_params(&self, market: &MarketId) -> Option<&MarketParams> {
        self.markets.get(market)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (market, params) in &self.markets {
            params.validate().map_err(|source| ConfigError::Market {
                market: market.clone(),
                source,
            })?;
        }
        self.risk.validate()?;
        if let Some(market) = self
            .risk
            .collateral_factors
            .keys()
            .find(|market| !self.markets.contains_key(*market))
        {
            return Err(ConfigError::UnknownMarket(market.clone()));
        }
        Ok(())
    }
}
