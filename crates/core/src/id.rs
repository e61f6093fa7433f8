//! Identifiers - Type-safe market and account identifiers
//!
//! Instead of raw strings, markets and accounts are identified by validated
//! newtypes. Both share the same normalization rules: trimmed, uppercased,
//! 1..=32 characters of ASCII alphanumerics, `_` or `-`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MAX_ID_LEN: usize = 32;

/// Errors that can occur when parsing identifiers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("Empty identifier")]
    Empty,

    #[error("Identifier too long (max {MAX_ID_LEN} chars): {0}")]
    TooLong(String),

    #[error("Invalid identifier format: {0}")]
    InvalidFormat(String),
}

fn normalize(raw: &str) -> Result<String, IdError> {
    let s = raw.trim().to_uppercase();

    if s.is_empty() {
        return Err(IdError::Empty);
    }

    if s.len() > MAX_ID_LEN {
        return Err(IdError::TooLong(s));
    }

    if !s
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(IdError::InvalidFormat(s));
    }

    Ok(s)
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse and normalize an identifier
            pub fn new(raw: &str) -> Result<Self, IdError> {
                normalize(raw).map(Self)
            }

            /// Returns the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::new(&s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Identifier of one pool, e.g. `CUSDC`
    ///
    /// # Examples
    /// ```
    /// use bilend_core::MarketId;
    ///
    /// let market: MarketId = "cusdc".parse().unwrap();
    /// assert_eq!(market.to_string(), "CUSDC");
    /// ```
    MarketId
);

define_id!(
    /// Identifier of a protocol participant (supplier, borrower, liquidator)
    AccountId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_case_and_whitespace() {
        let id: MarketId = "  cDai ".parse().unwrap();
        assert_eq!(id.as_str(), "CDAI");
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!("".parse::<AccountId>(), Err(IdError::Empty)));
        assert!(matches!("   ".parse::<MarketId>(), Err(IdError::Empty)));
    }

    #[test]
    fn test_too_long_rejected() {
        let raw = "A".repeat(MAX_ID_LEN + 1);
        assert!(matches!(raw.parse::<AccountId>(), Err(IdError::TooLong(_))));
    }

    #[test]
    fn test_invalid_format_rejected() {
        assert!(matches!(
            "BTC/USD".parse::<MarketId>(),
            Err(IdError::InvalidFormat(_))
        ));
        assert!("market_a-1".parse::<MarketId>().is_ok());
    }

    #[test]
    fn test_serde_roundtrip_normalizes() {
        let id: AccountId = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(id.as_str(), "ALICE");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"ALICE\"");
        assert!(serde_json::from_str::<AccountId>("\"a b\"").is_err());
    }
}
