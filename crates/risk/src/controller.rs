//! Risk Controller - Pre-mutation liquidity checks
//!
//! Every supply-reducing or debt-increasing action asks the controller
//! first. The controller reads ledger state through `MarketView` and
//! prices through `PriceOracle`; the only state it owns is membership.

use bilend_core::{fixed, AccountId, MarketId};
use bilend_ledger::AccountSnapshot;
use bilend_oracle::PriceOracle;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::RiskParams;
use crate::error::RiskError;
use crate::membership::{MembershipSet, PositionState};

/// Read-only access to the listed markets
pub trait MarketView {
    fn is_listed(&self, market: &MarketId) -> bool;

    /// Supply shares, current borrow balance and exchange rate of `account`
    fn account_snapshot(
        &self,
        market: &MarketId,
        account: &AccountId,
    ) -> Result<AccountSnapshot, RiskError>;

    fn exchange_rate(&self, market: &MarketId) -> Result<Decimal, RiskError>;
}

/// Everything a check reads besides membership
#[derive(Clone, Copy)]
pub struct RiskContext<'a> {
    pub view: &'a dyn MarketView,
    pub oracle: &'a dyn PriceOracle,
    pub params: &'a RiskParams,
}

impl<'a> RiskContext<'a> {
    pub fn new(view: &'a dyn MarketView, oracle: &'a dyn PriceOracle, params: &'a RiskParams) -> Self {
        Self { view, oracle, params }
    }

    fn ensure_listed(&self, market: &MarketId) -> Result<(), RiskError> {
        if self.view.is_listed(market) {
            Ok(())
        } else {
            Err(RiskError::MarketNotListed(market.clone()))
        }
    }
}

/// Account liquidity in the price unit. At most one side is nonzero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Liquidity {
    pub excess: Decimal,
    pub shortfall: Decimal,
}

impl Liquidity {
    fn from_sums(collateral: Decimal, debt: Decimal) -> Self {
        if collateral >= debt {
            Self {
                excess: collateral - debt,
                shortfall: Decimal::ZERO,
            }
        } else {
            Self {
                excess: Decimal::ZERO,
                shortfall: debt - collateral,
            }
        }
    }

    pub fn is_shortfall(&self) -> bool {
        self.shortfall > Decimal::ZERO
    }
}

/// A pending redeem and/or borrow applied on top of current balances
#[derive(Debug, Clone, Copy)]
pub struct Hypothetical<'a> {
    pub market: &'a MarketId,
    pub redeem_shares: Decimal,
    pub borrow_amount: Decimal,
}

impl<'a> Hypothetical<'a> {
    pub fn redeem(market: &'a MarketId, shares: Decimal) -> Self {
        Self {
            market,
            redeem_shares: shares,
            borrow_amount: Decimal::ZERO,
        }
    }

    pub fn borrow(market: &'a MarketId, amount: Decimal) -> Self {
        Self {
            market,
            redeem_shares: Decimal::ZERO,
            borrow_amount: amount,
        }
    }
}

/// Risk controller
#[derive(Debug, Clone, Default)]
pub struct RiskController {
    memberships: BTreeMap<AccountId, MembershipSet>,
}

impl RiskController {
    pub fn new() -> Self {
        Self::default()
    }

    // === Membership ===

    /// Markets `account` has entered, in entry order
    pub fn assets_in(&self, account: &AccountId) -> &[MarketId] {
        self.memberships
            .get(account)
            .map(MembershipSet::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_member(&self, account: &AccountId, market: &MarketId) -> bool {
        self.memberships
            .get(account)
            .is_some_and(|set| set.contains(market))
    }

    /// Enter one market. Returns `false` if already a member.
    pub fn enter_market(
        &mut self,
        account: &AccountId,
        market: &MarketId,
        ctx: RiskContext<'_>,
    ) -> Result<bool, RiskError> {
        ctx.ensure_listed(market)?;
        let max = ctx.params.max_assets;
        let set = self.memberships.entry(account.clone()).or_default();
        match set.insert(market.clone(), max) {
            Some(added) => {
                if added {
                    debug!(%account, %market, "entered market");
                }
                Ok(added)
            }
            None => Err(RiskError::TooManyMarkets {
                account: account.clone(),
                max,
            }),
        }
    }

    /// Enter several markets; each one succeeds or fails on its own
    pub fn enter_markets(
        &mut self,
        account: &AccountId,
        markets: &[MarketId],
        ctx: RiskContext<'_>,
    ) -> Vec<Result<bool, RiskError>> {
        markets
            .iter()
            .map(|market| self.enter_market(account, market, ctx))
            .collect()
    }

    /// Leave a market. Only a position with no supply and no borrow may
    /// exit; leaving a market one is not in is a no-op returning `false`.
    pub fn exit_market(
        &mut self,
        account: &AccountId,
        market: &MarketId,
        ctx: RiskContext<'_>,
    ) -> Result<bool, RiskError> {
        if !self.is_member(account, market) {
            return Ok(false);
        }
        let snapshot = ctx.view.account_snapshot(market, account)?;
        if !snapshot.shares.is_zero() || !snapshot.borrow_balance.is_zero() {
            return Err(RiskError::NonzeroBalance {
                account: account.clone(),
                market: market.clone(),
                shares: snapshot.shares,
                borrows: snapshot.borrow_balance,
            });
        }
        let removed = self
            .memberships
            .get_mut(account)
            .is_some_and(|set| set.remove(market));
        if removed {
            debug!(%account, %market, "exited market");
        }
        Ok(removed)
    }

    /// Overwrite `account`'s memberships with the ones `source` holds.
    /// Moves one account between a staged controller and the committed one.
    pub fn copy_account(&mut self, account: &AccountId, source: &RiskController) {
        match source.memberships.get(account) {
            Some(set) => {
                self.memberships.insert(account.clone(), set.clone());
            }
            None => {
                self.memberships.remove(account);
            }
        }
    }

    pub fn position_state(
        &self,
        account: &AccountId,
        market: &MarketId,
        ctx: RiskContext<'_>,
    ) -> Result<PositionState, RiskError> {
        if !self.is_member(account, market) {
            return Ok(PositionState::NonMember);
        }
        let snapshot = ctx.view.account_snapshot(market, account)?;
        if snapshot.shares.is_zero() && snapshot.borrow_balance.is_zero() {
            Ok(PositionState::Member)
        } else {
            Ok(PositionState::Active)
        }
    }

    // === Liquidity ===

    pub fn account_liquidity(
        &self,
        account: &AccountId,
        ctx: RiskContext<'_>,
    ) -> Result<Liquidity, RiskError> {
        self.hypothetical_liquidity(account, None, ctx)
    }

    /// Collateral minus debt over all entered markets, optionally as if
    /// `hypothetical` had already happened.
    ///
    /// A market without a usable price contributes no collateral. Any debt
    /// in such a market, real or hypothetical, fails the whole computation.
    pub fn hypothetical_liquidity(
        &self,
        account: &AccountId,
        hypothetical: Option<Hypothetical<'_>>,
        ctx: RiskContext<'_>,
    ) -> Result<Liquidity, RiskError> {
        let mut collateral = Decimal::ZERO;
        let mut debt = Decimal::ZERO;

        for market in self.assets_in(account) {
            let snapshot = ctx.view.account_snapshot(market, account)?;
            let (redeem_shares, borrow_amount) = match hypothetical {
                Some(h) if h.market == market => (h.redeem_shares, h.borrow_amount),
                _ => (Decimal::ZERO, Decimal::ZERO),
            };

            let Some(price) = ctx.oracle.usable_price(market) else {
                if !snapshot.borrow_balance.is_zero() || !borrow_amount.is_zero() {
                    warn!(%account, %market, "debt in market without a price");
                    return Err(RiskError::PriceUnavailable(market.clone()));
                }
                continue;
            };

            let factor = ctx.params.collateral_factor(market);
            let share_value = fixed::mul(fixed::mul(factor, snapshot.exchange_rate)?, price)?;

            collateral = fixed::mul_add(share_value, snapshot.shares, collateral)?;
            debt = fixed::mul_add(price, snapshot.borrow_balance, debt)?;
            debt = fixed::mul_add(share_value, redeem_shares, debt)?;
            debt = fixed::mul_add(price, borrow_amount, debt)?;
        }

        Ok(Liquidity::from_sums(collateral, debt))
    }

    /// Redeeming `shares` must not leave the account in shortfall.
    /// Supply in a market the account never entered backs nothing, so it
    /// is always free to leave.
    pub fn redeem_allowed(
        &self,
        account: &AccountId,
        market: &MarketId,
        shares: Decimal,
        ctx: RiskContext<'_>,
    ) -> Result<(), RiskError> {
        ctx.ensure_listed(market)?;
        if !self.is_member(account, market) {
            return Ok(());
        }
        let liquidity =
            self.hypothetical_liquidity(account, Some(Hypothetical::redeem(market, shares)), ctx)?;
        if liquidity.is_shortfall() {
            return Err(RiskError::InsufficientLiquidity {
                account: account.clone(),
                shortfall: liquidity.shortfall,
            });
        }
        Ok(())
    }

    /// Moving shares out of an account is a redeem from the sender's view
    pub fn transfer_allowed(
        &self,
        from: &AccountId,
        market: &MarketId,
        shares: Decimal,
        ctx: RiskContext<'_>,
    ) -> Result<(), RiskError> {
        self.redeem_allowed(from, market, shares, ctx)
    }

    /// Check a borrow, entering the market on the borrower's behalf when
    /// needed. Returns whether the market was entered by this call.
    ///
    /// Membership changes even when the borrow is then refused; callers
    /// run this on staged state.
    pub fn borrow_allowed(
        &mut self,
        account: &AccountId,
        market: &MarketId,
        amount: Decimal,
        ctx: RiskContext<'_>,
    ) -> Result<bool, RiskError> {
        ctx.ensure_listed(market)?;
        let entered = if self.is_member(account, market) {
            false
        } else {
            self.enter_market(account, market, ctx)?
        };

        if ctx.oracle.usable_price(market).is_none() {
            return Err(RiskError::PriceUnavailable(market.clone()));
        }

        let liquidity =
            self.hypothetical_liquidity(account, Some(Hypothetical::borrow(market, amount)), ctx)?;
        if liquidity.is_shortfall() {
            return Err(RiskError::InsufficientLiquidity {
                account: account.clone(),
                shortfall: liquidity.shortfall,
            });
        }
        Ok(entered)
    }

    /// True when the account's debt exceeds its weighted collateral
    pub fn liquidation_eligible(
        &self,
        account: &AccountId,
        ctx: RiskContext<'_>,
    ) -> Result<bool, RiskError> {
        Ok(self.account_liquidity(account, ctx)?.is_shortfall())
    }
}
