//! Risk parameters
//!
//! Admin-set, read on every check. Markets without an explicit collateral
//! factor lend nothing against their supply.

use bilend_core::{fixed, MarketId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::RiskError;

/// Upper bound on any collateral factor (90%)
pub const MAX_COLLATERAL_FACTOR: Decimal = Decimal::from_parts(9, 0, 0, false, 1);
/// Close factor bounds: [5%, 90%]
pub const MIN_CLOSE_FACTOR: Decimal = Decimal::from_parts(5, 0, 0, false, 2);
pub const MAX_CLOSE_FACTOR: Decimal = Decimal::from_parts(9, 0, 0, false, 1);

fn default_close_factor() -> Decimal {
    Decimal::from_parts(5, 0, 0, false, 1) // 50%
}

fn default_liquidation_incentive() -> Decimal {
    Decimal::from_parts(108, 0, 0, false, 2) // 8% bonus
}

fn default_max_assets() -> usize {
    20
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskParams {
    /// Max fraction of one borrow a single liquidation may repay
    #[serde(default = "default_close_factor")]
    pub close_factor: Decimal,

    /// Collateral value paid per unit of repaid value (1.08 = 8% bonus)
    #[serde(default = "default_liquidation_incentive")]
    pub liquidation_incentive: Decimal,

    /// Max markets one account may be a member of
    #[serde(default = "default_max_assets")]
    pub max_assets: usize,

    #[serde(default)]
    pub collateral_factors: BTreeMap<MarketId, Decimal>,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            close_factor: default_close_factor(),
            liquidation_incentive: default_liquidation_incentive(),
            max_assets: default_max_assets(),
            collateral_factors: BTreeMap::new(),
        }
    }
}

impl RiskParams {
    /// Collateral factor of a market, zero when unset
    pub fn collateral_factor(&self, market: &MarketId) -> Decimal {
        self.collateral_factors
            .get(market)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    pub fn with_collateral_factor(mut self, market: MarketId, factor: Decimal) -> Self {
        self.collateral_factors.insert(market, factor);
        self
    }

    pub fn validate_collateral_factor(factor: Decimal) -> Result<(), RiskError> {
        if factor.is_sign_negative() || factor > MAX_COLLATERAL_FACTOR {
            return Err(RiskError::InvalidConfig {
                name: "collateral_factor",
                reason: format!("must be in [0, {MAX_COLLATERAL_FACTOR}], got {factor}"),
            });
        }
        Ok(())
    }

    pub fn validate_close_factor(factor: Decimal) -> Result<(), RiskError> {
        if factor < MIN_CLOSE_FACTOR || factor > MAX_CLOSE_FACTOR {
            return Err(RiskError::InvalidConfig {
                name: "close_factor",
                reason: format!("must be in [{MIN_CLOSE_FACTOR}, {MAX_CLOSE_FACTOR}], got {factor}"),
            });
        }
        Ok(())
    }

    pub fn validate_liquidation_incentive(incentive: Decimal) -> Result<(), RiskError> {
        if incentive < fixed::ONE {
            return Err(RiskError::InvalidConfig {
                name: "liquidation_incentive",
                reason: format!("must be >= 1, got {incentive}"),
            });
        }
        Ok(())
    }

    pub fn validate_max_assets(max_assets: usize) -> Result<(), RiskError> {
        if max_assets == 0 {
            return Err(RiskError::InvalidConfig {
                name: "max_assets",
                reason: "must be >= 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), RiskError> {
        Self::validate_close_factor(self.close_factor)?;
        Self::validate_liquidation_incentive(self.liquidation_incentive)?;
        Self::validate_max_assets(self.max_assets)?;
        for factor in self.collateral_factors.values() {
            Self::validate_collateral_factor(*factor)?;
        }
        Ok(())
    }
}
