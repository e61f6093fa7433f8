//! BiLend Core - Domain types
//!
//! This crate contains the fundamental types shared by every BiLend crate:
//! - `Amount`: Non-negative decimal wrapper for caller-supplied quantities
//! - `fixed`: 18-digit truncating fixed-point arithmetic
//! - `MarketId` / `AccountId`: Validated identifiers
//! - `ErrorKind`: Flat error taxonomy shared by all error types

pub mod amount;
pub mod error;
pub mod fixed;
pub mod id;

pub use amount::{Amount, AmountError};
pub use error::{ErrorKind, MathError};
pub use id::{AccountId, IdError, MarketId};
