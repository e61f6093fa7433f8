//! BiLend Price Oracle
//!
//! Read-only price lookups consumed by the risk controller.
//! Prices are unit prices of a market's underlying in a common numeraire.
//! `MockOracle` is the in-memory feed used by tests and the CLI.

mod error;
mod mock;
mod quote;

pub use error::OracleError;
pub use mock::MockOracle;
pub use quote::{PriceOracle, PriceQuote};
