//! BiLend Protocol - Action orchestrator
//!
//! This crate wires the ledgers, the risk controller, the price oracle and
//! the underlying tokens into one all-or-nothing action surface, and hosts
//! the scenario runner behind the `bilend` CLI.

pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod scenario;

pub use config::{ConfigError, ProtocolConfig};
pub use error::ProtocolError;
pub use events::{ProtocolEvent, RecordedEvent};
pub use protocol::{MarketSnapshot, Protocol};
pub use scenario::{run_scenario, Scenario, ScenarioError, ScenarioReport, Step, StepAction};
