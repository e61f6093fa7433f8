//! Market membership of one account
//!
//! Only markets an account has entered count toward its collateral and
//! debt. Membership order is entry order.

use bilend_core::MarketId;
use serde::Serialize;

/// Lifecycle of an account in one market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    NonMember,
    /// Member with no supply and no borrow, free to exit
    Member,
    /// Member holding supply or owing a borrow
    Active,
}

/// Ordered, duplicate-free set of entered markets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MembershipSet {
    markets: Vec<MarketId>,
}

impl MembershipSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, market: &MarketId) -> bool {
        self.markets.contains(market)
    }

    /// Add `market` unless present. Returns `Some(true)` when added,
    /// `Some(false)` when already present, `None` when the set is full.
    pub fn insert(&mut self, market: MarketId, max: usize) -> Option<bool> {
        if self.contains(&market) {
            return Some(false);
        }
        if self.markets.len() >= max {
            return None;
        }
        self.markets.push(market);
        Some(true)
    }

    pub fn remove(&mut self, market: &MarketId) -> bool {
        match self.markets.iter().position(|m| m == market) {
            Some(index) => {
                self.markets.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn as_slice(&self) -> &[MarketId] {
        &self.markets
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }
}
