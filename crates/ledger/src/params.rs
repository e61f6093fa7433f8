//! Admin-set market parameters
//!
//! These are owned by the protocol configuration and passed by reference
//! into every ledger call, so a parameter change takes effect on the very
//! next action without any ledger-side caching.

use bilend_core::fixed;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::interest::RateModelConfig;

/// Share of seized collateral kept by the pool as reserves (2.8%)
pub const DEFAULT_PROTOCOL_SEIZE_SHARE: Decimal = Decimal::from_parts(28, 0, 0, false, 3);

fn default_initial_exchange_rate() -> Decimal {
    fixed::ONE
}

fn default_protocol_seize_share() -> Decimal {
    DEFAULT_PROTOCOL_SEIZE_SHARE
}

/// Ledger-side parameters of one market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketParams {
    /// Fraction of accrued interest retained as reserves, in [0, 1]
    #[serde(default)]
    pub reserve_factor: Decimal,

    /// Underlying per share while the market has no supply
    #[serde(default = "default_initial_exchange_rate")]
    pub initial_exchange_rate: Decimal,

    /// Fraction of seized shares burned into reserves during liquidation
    #[serde(default = "default_protocol_seize_share")]
    pub protocol_seize_share: Decimal,

    #[serde(default)]
    pub rate_model: RateModelConfig,
}

impl MarketParams {
    pub fn with_rate_model(mut self, rate_model: RateModelConfig) -> Self {
        self.rate_model = rate_model;
        self
    }

    pub fn with_reserve_factor(mut self, reserve_factor: Decimal) -> Self {
        self.reserve_factor = reserve_factor;
        self
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.reserve_factor.is_sign_negative() || self.reserve_factor > fixed::ONE {
            return Err(LedgerError::InvalidParams {
                name: "reserve_factor",
                reason: format!("must be in [0, 1], got {}", self.reserve_factor),
            });
        }
        if self.initial_exchange_rate <= Decimal::ZERO {
            return Err(LedgerError::InvalidParams {
                name: "initial_exchange_rate",
                reason: format!("must be > 0, got {}", self.initial_exchange_rate),
            });
        }
        if self.protocol_seize_share.is_sign_negative() || self.protocol_seize_share > fixed::ONE {
            return Err(LedgerError::InvalidParams {
                name: "protocol_seize_share",
                reason: format!("must be in [0, 1], got {}", self.protocol_seize_share),
            });
        }
        self.rate_model.validate()
    }
}

impl Default for MarketParams {
    fn default() -> Self {
        Self {
            reserve_factor: Decimal::ZERO,
            initial_exchange_rate: default_initial_exchange_rate(),
            protocol_seize_share: DEFAULT_PROTOCOL_SEIZE_SHARE,
            rate_model: RateModelConfig::default(),
        }
    }
}
