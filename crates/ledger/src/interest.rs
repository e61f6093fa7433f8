//! Interest Rate Models
//!
//! Pure functions from pool utilization to a per-period borrow rate.
//! A period is one discrete time step of the executing environment
//! (e.g. a block). Supply rates are derived from the borrow rate.

use bilend_core::fixed;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Periods per year used by the annual-rate constructors (~15s periods)
pub const PERIODS_PER_YEAR: u64 = 2_102_400;

/// Default cap on the per-period borrow rate (0.0005% per period)
pub const DEFAULT_MAX_BORROW_RATE: Decimal = Decimal::from_parts(5, 0, 0, false, 6); // 0.000005

fn default_max_rate() -> Decimal {
    DEFAULT_MAX_BORROW_RATE
}

/// Utilization -> rate contract shared by every model
pub trait InterestRateModel {
    /// Per-period borrow rate for the given pool state
    fn borrow_rate(
        &self,
        cash: Decimal,
        borrows: Decimal,
        reserves: Decimal,
    ) -> Result<Decimal, LedgerError>;

    /// Per-period supply rate: `borrow_rate * u * (1 - reserve_factor)`
    fn supply_rate(
        &self,
        cash: Decimal,
        borrows: Decimal,
        reserves: Decimal,
        reserve_factor: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let borrow_rate = self.borrow_rate(cash, borrows, reserves)?;
        let one_minus_reserve_factor = fixed::sub(fixed::ONE, reserve_factor)?;
        let rate_to_pool = fixed::mul(borrow_rate, one_minus_reserve_factor)?;
        Ok(fixed::mul(utilization(cash, borrows)?, rate_to_pool)?)
    }
}

/// `borrows / (cash + borrows)`, zero for an empty pool
pub fn utilization(cash: Decimal, borrows: Decimal) -> Result<Decimal, LedgerError> {
    let denominator = fixed::add(cash, borrows)?;
    if denominator.is_zero() {
        return Ok(Decimal::ZERO);
    }
    Ok(fixed::div(borrows, denominator)?)
}

fn check_domain(cash: Decimal, borrows: Decimal, reserves: Decimal) -> Result<(), LedgerError> {
    if reserves > fixed::add(cash, borrows)? {
        return Err(LedgerError::InvalidRateInputs {
            cash,
            borrows,
            reserves,
        });
    }
    Ok(())
}

fn invalid(name: &'static str, reason: impl Into<String>) -> LedgerError {
    LedgerError::InvalidParams {
        name,
        reason: reason.into(),
    }
}

fn require_non_negative(name: &'static str, value: Decimal) -> Result<(), LedgerError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(invalid(name, format!("must be >= 0, got {value}")));
    }
    Ok(())
}

/// Linear model: `base + u * multiplier`, capped at `max_rate_per_period`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitePaperModel {
    pub base_rate_per_period: Decimal,
    pub multiplier_per_period: Decimal,
    #[serde(default = "default_max_rate")]
    pub max_rate_per_period: Decimal,
}

impl WhitePaperModel {
    pub fn new(base_rate_per_period: Decimal, multiplier_per_period: Decimal) -> Self {
        Self {
            base_rate_per_period,
            multiplier_per_period,
            max_rate_per_period: DEFAULT_MAX_BORROW_RATE,
        }
    }

    /// Build from annual rates, spread over `periods_per_year`
    pub fn from_annual(
        base_rate_per_year: Decimal,
        multiplier_per_year: Decimal,
        periods_per_year: u64,
    ) -> Result<Self, LedgerError> {
        let periods = Decimal::from(periods_per_year);
        Ok(Self::new(
            fixed::div(base_rate_per_year, periods)?,
            fixed::div(multiplier_per_year, periods)?,
        ))
    }

    /// A model that never charges interest
    pub fn zero() -> Self {
        Self::new(Decimal::ZERO, Decimal::ZERO)
    }

    pub fn with_max_rate(mut self, max_rate_per_period: Decimal) -> Self {
        self.max_rate_per_period = max_rate_per_period;
        self
    }

    pub fn validate(&self) -> Result<(), LedgerError> {
        require_non_negative("base_rate_per_period", self.base_rate_per_period)?;
        require_non_negative("multiplier_per_period", self.multiplier_per_period)?;
        require_non_negative("max_rate_per_period", self.max_rate_per_period)
    }
}

impl InterestRateModel for WhitePaperModel {
    fn borrow_rate(
        &self,
        cash: Decimal,
        borrows: Decimal,
        reserves: Decimal,
    ) -> Result<Decimal, LedgerError> {
        check_domain(cash, borrows, reserves)?;
        let u = utilization(cash, borrows)?;
        let rate = fixed::mul_add(u, self.multiplier_per_period, self.base_rate_per_period)?;
        Ok(rate.min(self.max_rate_per_period))
    }
}

/// Kinked model: linear up to `kink`, steeper `jump_multiplier` above it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumpRateModel {
    pub base_rate_per_period: Decimal,
    pub multiplier_per_period: Decimal,
    pub jump_multiplier_per_period: Decimal,
    /// Utilization at which the jump multiplier kicks in
    pub kink: Decimal,
    #[serde(default = "default_max_rate")]
    pub max_rate_per_period: Decimal,
}

impl JumpRateModel {
    pub fn validate(&self) -> Result<(), LedgerError> {
        require_non_negative("base_rate_per_period", self.base_rate_per_period)?;
        require_non_negative("multiplier_per_period", self.multiplier_per_period)?;
        require_non_negative("jump_multiplier_per_period", self.jump_multiplier_per_period)?;
        require_non_negative("max_rate_per_period", self.max_rate_per_period)?;
        if self.kink.is_sign_negative() || self.kink > fixed::ONE {
            return Err(invalid("kink", format!("must be in [0, 1], got {}", self.kink)));
        }
        Ok(())
    }
}

impl InterestRateModel for JumpRateModel {
    fn borrow_rate(
        &self,
        cash: Decimal,
        borrows: Decimal,
        reserves: Decimal,
    ) -> Result<Decimal, LedgerError> {
        check_domain(cash, borrows, reserves)?;
        let u = utilization(cash, borrows)?;

        let normal = fixed::mul_add(
            u.min(self.kink),
            self.multiplier_per_period,
            self.base_rate_per_period,
        )?;
        let rate = if u > self.kink {
            let excess = fixed::sub(u, self.kink)?;
            fixed::mul_add(excess, self.jump_multiplier_per_period, normal)?
        } else {
            normal
        };
        Ok(rate.min(self.max_rate_per_period))
    }
}

/// Serializable choice of rate model, as it appears in market config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateModelConfig {
    WhitePaper(WhitePaperModel),
    JumpRate(JumpRateModel),
}

impl RateModelConfig {
    pub fn validate(&self) -> Result<(), LedgerError> {
        match self {
            RateModelConfig::WhitePaper(model) => model.validate(),
            RateModelConfig::JumpRate(model) => model.validate(),
        }
    }

    fn model(&self) -> &dyn InterestRateModel {
        match self {
            RateModelConfig::WhitePaper(model) => model,
            RateModelConfig::JumpRate(model) => model,
        }
    }
}

impl Default for RateModelConfig {
    fn default() -> Self {
        RateModelConfig::WhitePaper(WhitePaperModel::zero())
    }
}

impl InterestRateModel for RateModelConfig {
    fn borrow_rate(
        &self,
        cash: Decimal,
        borrows: Decimal,
        reserves: Decimal,
    ) -> Result<Decimal, LedgerError> {
        self.model().borrow_rate(cash, borrows, reserves)
    }
}
