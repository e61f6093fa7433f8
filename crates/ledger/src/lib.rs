//! BiLend Ledger - Per-market accounting core
//!
//! All supply/borrow state changes of a pool go through this crate.
//!
//! # Key Types
//! - `Market`: One pool's totals, per-account positions and borrow index
//! - `InterestRateModel`: Utilization -> per-period borrow/supply rate
//! - `MarketParams`: Admin-set parameters, injected into every call
//! - `UnderlyingAsset`: Fungible-token interface of the pooled asset

pub mod error;
pub mod interest;
pub mod market;
pub mod params;
pub mod token;

pub use error::LedgerError;
pub use interest::{InterestRateModel, JumpRateModel, RateModelConfig, WhitePaperModel};
pub use market::{
    AccountSnapshot, AccrualOutcome, BorrowOutcome, BorrowSnapshot, Market, MintOutcome, RedeemOutcome,
    RedeemRequest, RepayAmount, RepayOutcome, SeizeOutcome,
};
pub use params::MarketParams;
pub use token::{InMemoryToken, UnderlyingAsset};
