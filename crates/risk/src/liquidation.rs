//! Liquidation checks for under-collateralized borrows
//!
//! A liquidator repays part of a borrower's debt in one market and takes
//! collateral shares from another at a bonus. The controller only decides
//! and sizes; the ledgers move the balances.

use bilend_core::{fixed, AccountId, MarketId};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::controller::{RiskContext, RiskController};
use crate::error::RiskError;

/// Sized liquidation, ready to apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiquidationPlan {
    pub borrower: AccountId,
    pub liquidator: AccountId,
    pub repay_market: MarketId,
    pub collateral_market: MarketId,
    pub repay_amount: Decimal,
    /// Upper bound the close factor put on `repay_amount`
    pub max_close: Decimal,
    /// Collateral shares taken from the borrower
    pub seize_shares: Decimal,
}

impl RiskController {
    /// Gate a liquidation: distinct accounts, both markets listed,
    /// borrower in shortfall, repay within the close factor.
    /// Returns the close-factor limit.
    pub fn liquidate_allowed(
        &self,
        borrower: &AccountId,
        liquidator: &AccountId,
        repay_market: &MarketId,
        collateral_market: &MarketId,
        repay_amount: Decimal,
        ctx: RiskContext<'_>,
    ) -> Result<Decimal, RiskError> {
        if borrower == liquidator {
            return Err(RiskError::SelfLiquidation(borrower.clone()));
        }
        for market in [repay_market, collateral_market] {
            if !ctx.view.is_listed(market) {
                return Err(RiskError::MarketNotListed(market.clone()));
            }
        }

        if !self.account_liquidity(borrower, ctx)?.is_shortfall() {
            return Err(RiskError::NotLiquidatable(borrower.clone()));
        }

        let owed = ctx.view.account_snapshot(repay_market, borrower)?.borrow_balance;
        let max_close = fixed::mul(ctx.params.close_factor, owed)?;
        if repay_amount > max_close {
            return Err(RiskError::TooMuchRepay {
                max_close,
                requested: repay_amount,
            });
        }
        Ok(max_close)
    }

    /// Collateral shares worth `repay_amount` of the repaid asset plus the
    /// liquidation incentive:
    /// `repay * incentive * price_repay / (price_collateral * exchange_rate)`
    pub fn seize_shares(
        &self,
        repay_market: &MarketId,
        collateral_market: &MarketId,
        repay_amount: Decimal,
        ctx: RiskContext<'_>,
    ) -> Result<Decimal, RiskError> {
        let price_repay = ctx
            .oracle
            .usable_price(repay_market)
            .ok_or_else(|| RiskError::PriceUnavailable(repay_market.clone()))?;
        let price_collateral = ctx
            .oracle
            .usable_price(collateral_market)
            .ok_or_else(|| RiskError::PriceUnavailable(collateral_market.clone()))?;
        let exchange_rate = ctx.view.exchange_rate(collateral_market)?;

        let value = fixed::mul(
            fixed::mul(repay_amount, ctx.params.liquidation_incentive)?,
            price_repay,
        )?;
        let share_price = fixed::mul(price_collateral, exchange_rate)?;
        Ok(fixed::div(value, share_price)?)
    }

    /// Full pre-mutation check of a liquidation, including that the
    /// borrower holds enough collateral shares to seize.
    pub fn plan_liquidation(
        &self,
        borrower: &AccountId,
        liquidator: &AccountId,
        repay_market: &MarketId,
        collateral_market: &MarketId,
        repay_amount: Decimal,
        ctx: RiskContext<'_>,
    ) -> Result<LiquidationPlan, RiskError> {
        let max_close = self.liquidate_allowed(
            borrower,
            liquidator,
            repay_market,
            collateral_market,
            repay_amount,
            ctx,
        )?;
        let seize_shares = self.seize_shares(repay_market, collateral_market, repay_amount, ctx)?;

        let held = ctx.view.account_snapshot(collateral_market, borrower)?.shares;
        if seize_shares > held {
            return Err(RiskError::SeizeTooMuch {
                held,
                requested: seize_shares,
            });
        }

        info!(
            %borrower,
            %liquidator,
            %repay_market,
            %collateral_market,
            %repay_amount,
            %seize_shares,
            "liquidation planned"
        );

        Ok(LiquidationPlan {
            borrower: borrower.clone(),
            liquidator: liquidator.clone(),
            repay_market: repay_market.clone(),
            collateral_market: collateral_market.clone(),
            repay_amount,
            max_close,
            seize_shares,
        })
    }
}
