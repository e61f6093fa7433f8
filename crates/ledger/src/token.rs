//! Underlying asset - the fungible token a market pools
//!
//! The protocol only needs three calls: pull tokens into the pool, pay
//! tokens out of it, and read balances. A `false` return means the token
//! refused the transfer and the enclosing action must abort.

use bilend_core::AccountId;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Standard fungible-token interface as seen from one pool
pub trait UnderlyingAsset {
    /// Move `amount` from `from` into the pool, spending the allowance
    /// `from` granted to the pool.
    fn transfer_from(&mut self, from: &AccountId, amount: Decimal) -> bool;

    /// Pay `amount` out of the pool to `to`.
    fn transfer(&mut self, to: &AccountId, amount: Decimal) -> bool;

    fn balance_of(&self, account: &AccountId) -> Decimal;

    /// Tokens held by the pool itself
    fn pool_balance(&self) -> Decimal;
}

/// In-memory token ledger with allowances toward the pool
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryToken {
    symbol: String,
    balances: BTreeMap<AccountId, Decimal>,
    allowances: BTreeMap<AccountId, Decimal>,
    pool: Decimal,
}

impl InMemoryToken {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Create new tokens for `account` (faucet / test setup)
    pub fn mint_to(&mut self, account: &AccountId, amount: Decimal) {
        let balance = self.balances.entry(account.clone()).or_insert(Decimal::ZERO);
        *balance += amount;
    }

    /// Let the pool pull up to `amount` from `owner`. `Decimal::MAX` never decreases.
    pub fn approve(&mut self, owner: &AccountId, amount: Decimal) {
        self.allowances.insert(owner.clone(), amount);
    }

    pub fn allowance(&self, owner: &AccountId) -> Decimal {
        self.allowances.get(owner).copied().unwrap_or(Decimal::ZERO)
    }

    /// Plain holder-to-holder transfer, outside the pool
    pub fn transfer_between(&mut self, from: &AccountId, to: &AccountId, amount: Decimal) -> bool {
        let held = self.balance_of(from);
        if amount > held || amount.is_sign_negative() {
            return false;
        }
        self.balances.insert(from.clone(), held - amount);
        let balance = self.balances.entry(to.clone()).or_insert(Decimal::ZERO);
        *balance += amount;
        true
    }
}

impl UnderlyingAsset for InMemoryToken {
    fn transfer_from(&mut self, from: &AccountId, amount: Decimal) -> bool {
        let held = self.balance_of(from);
        let allowance = self.allowance(from);
        if amount.is_sign_negative() || amount > held || amount > allowance {
            return false;
        }
        if allowance != Decimal::MAX {
            self.allowances.insert(from.clone(), allowance - amount);
        }
        self.balances.insert(from.clone(), held - amount);
        self.pool += amount;
        true
    }

    fn transfer(&mut self, to: &AccountId, amount: Decimal) -> bool {
        if amount.is_sign_negative() || amount > self.pool {
            return false;
        }
        self.pool -= amount;
        let balance = self.balances.entry(to.clone()).or_insert(Decimal::ZERO);
        *balance += amount;
        true
    }

    fn balance_of(&self, account: &AccountId) -> Decimal {
        self.balances.get(account).copied().unwrap_or(Decimal::ZERO)
    }

    fn pool_balance(&self) -> Decimal {
        self.pool
    }
}
