//! BiLend Risk Controller - Pre-mutation gatekeeper
//!
//! The risk controller decides whether an action may touch the ledgers.
//! It owns each account's market memberships and computes collateral-weighted
//! liquidity across all of them. Ledgers are queried through `MarketView`,
//! never owned.

pub mod config;
pub mod controller;
pub mod error;
pub mod liquidation;
pub mod membership;

pub use config::RiskParams;
pub use controller::{Hypothetical, Liquidity, MarketView, RiskContext, RiskController};
pub use error::RiskError;
pub use liquidation::LiquidationPlan;
pub use membership::{MembershipSet, PositionState};
