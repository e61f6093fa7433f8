//! Market - one pool's accounting ledger
//!
//! A `Market` owns the supply/borrow totals of one underlying asset, the
//! per-account share balances and borrow snapshots, and the borrow index.
//! Every operation validates first and only then writes, so an `Err` never
//! leaves a partially updated market behind.
//!
//! Risk checks (liquidity, membership) are not done here; the protocol
//! facade asks the risk controller before calling the mutating methods.

use bilend_core::{fixed, AccountId, Amount, MarketId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::LedgerError;
use crate::interest::InterestRateModel;
use crate::params::MarketParams;

/// Per-account borrow position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowSnapshot {
    /// Amount owed as of the last touch, interest included
    pub principal: Decimal,
    /// Market borrow index at the last touch
    pub interest_index: Decimal,
}

/// How much to redeem: a share count or an underlying amount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemRequest {
    Shares(Amount),
    Underlying(Amount),
}

/// How much to repay: an exact amount or the full outstanding balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepayAmount {
    Exact(Amount),
    All,
}

/// Balances of one account in one market, as the risk controller sees them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub shares: Decimal,
    pub borrow_balance: Decimal,
    pub exchange_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccrualOutcome {
    pub cash_prior: Decimal,
    pub borrow_rate: Decimal,
    pub periods_elapsed: u64,
    pub interest_accumulated: Decimal,
    pub borrow_index: Decimal,
    pub total_borrows: Decimal,
    pub total_reserves: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintOutcome {
    pub underlying: Decimal,
    pub shares: Decimal,
    pub exchange_rate: Decimal,
}

/// A validated redeem, computed before anything is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemOutcome {
    pub shares: Decimal,
    pub underlying: Decimal,
    pub exchange_rate: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowOutcome {
    pub amount: Decimal,
    pub account_borrows: Decimal,
    pub total_borrows: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepayOutcome {
    pub amount: Decimal,
    pub account_borrows: Decimal,
    pub total_borrows: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeizeOutcome {
    pub seized_shares: Decimal,
    pub liquidator_shares: Decimal,
    pub protocol_shares: Decimal,
    pub protocol_amount: Decimal,
}

/// One lending pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Market {
    id: MarketId,
    cash: Decimal,
    total_supply: Decimal,
    total_borrows: Decimal,
    total_reserves: Decimal,
    borrow_index: Decimal,
    accrual_period: u64,
    supply: BTreeMap<AccountId, Decimal>,
    borrows: BTreeMap<AccountId, BorrowSnapshot>,
}

impl Market {
    /// Create an empty market whose accrual clock starts at `period`
    pub fn new(id: MarketId, period: u64) -> Self {
        Self {
            id,
            cash: Decimal::ZERO,
            total_supply: Decimal::ZERO,
            total_borrows: Decimal::ZERO,
            total_reserves: Decimal::ZERO,
            borrow_index: fixed::ONE,
            accrual_period: period,
            supply: BTreeMap::new(),
            borrows: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &MarketId {
        &self.id
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn total_supply(&self) -> Decimal {
        self.total_supply
    }

    pub fn total_borrows(&self) -> Decimal {
        self.total_borrows
    }

    pub fn total_reserves(&self) -> Decimal {
        self.total_reserves
    }

    pub fn borrow_index(&self) -> Decimal {
        self.borrow_index
    }

    pub fn accrual_period(&self) -> u64 {
        self.accrual_period
    }

    // === Interest ===

    /// Bring the market up to `period`.
    ///
    /// Idempotent within a period: returns `Ok(None)` when already current.
    pub fn accrue_interest(
        &mut self,
        params: &MarketParams,
        period: u64,
    ) -> Result<Option<AccrualOutcome>, LedgerError> {
        if period == self.accrual_period {
            return Ok(None);
        }
        if period < self.accrual_period {
            return Err(LedgerError::PeriodRegression {
                market: self.id.clone(),
                last: self.accrual_period,
                requested: period,
            });
        }

        let periods_elapsed = period - self.accrual_period;
        let borrow_rate =
            params
                .rate_model
                .borrow_rate(self.cash, self.total_borrows, self.total_reserves)?;

        let simple_interest_factor = fixed::mul(borrow_rate, Decimal::from(periods_elapsed))?;
        let interest_accumulated = fixed::mul(simple_interest_factor, self.total_borrows)?;
        let total_borrows = fixed::add(interest_accumulated, self.total_borrows)?;
        let total_reserves =
            fixed::mul_add(params.reserve_factor, interest_accumulated, self.total_reserves)?;
        let borrow_index =
            fixed::mul_add(simple_interest_factor, self.borrow_index, self.borrow_index)?;

        self.accrual_period = period;
        self.total_borrows = total_borrows;
        self.total_reserves = total_reserves;
        self.borrow_index = borrow_index;

        debug!(
            market = %self.id,
            periods_elapsed,
            %borrow_rate,
            %interest_accumulated,
            %borrow_index,
            "interest accrued"
        );

        Ok(Some(AccrualOutcome {
            cash_prior: self.cash,
            borrow_rate,
            periods_elapsed,
            interest_accumulated,
            borrow_index,
            total_borrows,
            total_reserves,
        }))
    }

    /// Underlying per share: `(cash + borrows - reserves) / total_supply`
    pub fn exchange_rate(&self, params: &MarketParams) -> Result<Decimal, LedgerError> {
        if self.total_supply.is_zero() {
            return Ok(params.initial_exchange_rate);
        }
        let pool_value = self.pool_value()?;
        Ok(fixed::div(pool_value, self.total_supply)?)
    }

    pub fn borrow_rate(&self, params: &MarketParams) -> Result<Decimal, LedgerError> {
        params
            .rate_model
            .borrow_rate(self.cash, self.total_borrows, self.total_reserves)
    }

    pub fn supply_rate(&self, params: &MarketParams) -> Result<Decimal, LedgerError> {
        params.rate_model.supply_rate(
            self.cash,
            self.total_borrows,
            self.total_reserves,
            params.reserve_factor,
        )
    }

    // === Account views ===

    pub fn supply_shares(&self, account: &AccountId) -> Decimal {
        self.supply.get(account).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn borrow_snapshot(&self, account: &AccountId) -> Option<BorrowSnapshot> {
        self.borrows.get(account).copied()
    }

    /// Currently owed: `principal * borrow_index / interest_index`
    pub fn borrow_balance(&self, account: &AccountId) -> Result<Decimal, LedgerError> {
        match self.borrows.get(account) {
            Some(snapshot) if !snapshot.principal.is_zero() => Ok(fixed::mul_div(
                snapshot.principal,
                self.borrow_index,
                snapshot.interest_index,
            )?),
            _ => Ok(Decimal::ZERO),
        }
    }

    pub fn balance_of_underlying(
        &self,
        account: &AccountId,
        params: &MarketParams,
    ) -> Result<Decimal, LedgerError> {
        let rate = self.exchange_rate(params)?;
        Ok(fixed::mul(rate, self.supply_shares(account))?)
    }

    pub fn account_snapshot(
        &self,
        account: &AccountId,
        params: &MarketParams,
    ) -> Result<AccountSnapshot, LedgerError> {
        Ok(AccountSnapshot {
            shares: self.supply_shares(account),
            borrow_balance: self.borrow_balance(account)?,
            exchange_rate: self.exchange_rate(params)?,
        })
    }

    /// All accounts that ever supplied or borrowed, in id order
    pub fn accounts(&self) -> Vec<AccountId> {
        let mut accounts: Vec<AccountId> = self
            .supply
            .keys()
            .chain(self.borrows.keys())
            .cloned()
            .collect();
        accounts.sort();
        accounts.dedup();
        accounts
    }

    // === Supply side ===

    /// Credit `amount` of underlying (already received) as new shares.
    pub fn mint(
        &mut self,
        account: &AccountId,
        amount: Amount,
        params: &MarketParams,
    ) -> Result<MintOutcome, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount("mint amount must be positive"));
        }
        let exchange_rate = self.exchange_rate(params)?;
        let shares = fixed::div(amount.value(), exchange_rate)?;
        if shares.is_zero() {
            return Err(LedgerError::InvalidAmount("mint amount is worth less than one share unit"));
        }

        let total_supply = fixed::add(self.total_supply, shares)?;
        let balance = fixed::add(self.supply_shares(account), shares)?;
        let cash = fixed::add(self.cash, amount.value())?;

        self.total_supply = total_supply;
        self.supply.insert(account.clone(), balance);
        self.cash = cash;

        Ok(MintOutcome {
            underlying: amount.value(),
            shares,
            exchange_rate,
        })
    }

    /// Work out a redeem without writing anything.
    ///
    /// Both directions round against the redeemer: share requests pay
    /// `floor(shares * rate)`, underlying requests burn `ceil(amount / rate)`.
    pub fn plan_redeem(
        &self,
        account: &AccountId,
        request: RedeemRequest,
        params: &MarketParams,
    ) -> Result<RedeemOutcome, LedgerError> {
        let exchange_rate = self.exchange_rate(params)?;
        let (shares, underlying) = match request {
            RedeemRequest::Shares(shares) => {
                if shares.is_zero() {
                    return Err(LedgerError::InvalidAmount("redeem amount must be positive"));
                }
                (shares.value(), fixed::mul(exchange_rate, shares.value())?)
            }
            RedeemRequest::Underlying(amount) => {
                if amount.is_zero() {
                    return Err(LedgerError::InvalidAmount("redeem amount must be positive"));
                }
                (fixed::div_up(amount.value(), exchange_rate)?, amount.value())
            }
        };
        if shares.is_zero() {
            return Err(LedgerError::InvalidAmount("redeem rounds to zero shares"));
        }

        let held = self.supply_shares(account);
        if shares > held {
            return Err(LedgerError::InsufficientBalance {
                market: self.id.clone(),
                held,
                requested: shares,
            });
        }
        if underlying > self.cash {
            return Err(LedgerError::InsufficientCash {
                market: self.id.clone(),
                available: self.cash,
                requested: underlying,
            });
        }

        Ok(RedeemOutcome {
            shares,
            underlying,
            exchange_rate,
        })
    }

    /// Apply a redeem produced by `plan_redeem` in the same period.
    pub fn apply_redeem(
        &mut self,
        account: &AccountId,
        plan: &RedeemOutcome,
    ) -> Result<(), LedgerError> {
        let balance = fixed::sub(self.supply_shares(account), plan.shares).map_err(|_| {
            LedgerError::InsufficientBalance {
                market: self.id.clone(),
                held: self.supply_shares(account),
                requested: plan.shares,
            }
        })?;
        let cash = fixed::sub(self.cash, plan.underlying).map_err(|_| {
            LedgerError::InsufficientCash {
                market: self.id.clone(),
                available: self.cash,
                requested: plan.underlying,
            }
        })?;
        let total_supply = fixed::sub(self.total_supply, plan.shares)?;

        self.supply.insert(account.clone(), balance);
        self.cash = cash;
        self.total_supply = total_supply;
        Ok(())
    }

    pub fn redeem(
        &mut self,
        account: &AccountId,
        request: RedeemRequest,
        params: &MarketParams,
    ) -> Result<RedeemOutcome, LedgerError> {
        let plan = self.plan_redeem(account, request, params)?;
        self.apply_redeem(account, &plan)?;
        Ok(plan)
    }

    /// Move shares between accounts. Totals do not change.
    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        shares: Amount,
    ) -> Result<(), LedgerError> {
        if from == to {
            return Err(LedgerError::SelfTransfer);
        }
        if shares.is_zero() {
            return Err(LedgerError::InvalidAmount("transfer amount must be positive"));
        }
        let held = self.supply_shares(from);
        if shares.value() > held {
            return Err(LedgerError::InsufficientBalance {
                market: self.id.clone(),
                held,
                requested: shares.value(),
            });
        }

        let from_balance = fixed::sub(held, shares.value())?;
        let to_balance = fixed::add(self.supply_shares(to), shares.value())?;

        self.supply.insert(from.clone(), from_balance);
        self.supply.insert(to.clone(), to_balance);
        Ok(())
    }

    /// Move `shares` of the borrower's collateral to the liquidator.
    ///
    /// `protocol_seize_share` of the seized shares is burned and its
    /// underlying value added to reserves.
    pub fn seize(
        &mut self,
        liquidator: &AccountId,
        borrower: &AccountId,
        shares: Decimal,
        params: &MarketParams,
    ) -> Result<SeizeOutcome, LedgerError> {
        if liquidator == borrower {
            return Err(LedgerError::SelfTransfer);
        }
        let held = self.supply_shares(borrower);
        if shares > held {
            return Err(LedgerError::InsufficientBalance {
                market: self.id.clone(),
                held,
                requested: shares,
            });
        }

        let exchange_rate = self.exchange_rate(params)?;
        let protocol_shares = fixed::mul(shares, params.protocol_seize_share)?;
        let liquidator_shares = fixed::sub(shares, protocol_shares)?;
        let protocol_amount = fixed::mul(exchange_rate, protocol_shares)?;

        let borrower_balance = fixed::sub(held, shares)?;
        let liquidator_balance = fixed::add(self.supply_shares(liquidator), liquidator_shares)?;
        let total_reserves = fixed::add(self.total_reserves, protocol_amount)?;
        let total_supply = fixed::sub(self.total_supply, protocol_shares)?;

        self.supply.insert(borrower.clone(), borrower_balance);
        self.supply.insert(liquidator.clone(), liquidator_balance);
        self.total_reserves = total_reserves;
        self.total_supply = total_supply;

        Ok(SeizeOutcome {
            seized_shares: shares,
            liquidator_shares,
            protocol_shares,
            protocol_amount,
        })
    }

    // === Borrow side ===

    /// Lend `amount` of cash to `account`. The caller pays it out.
    pub fn borrow(&mut self, account: &AccountId, amount: Amount) -> Result<BorrowOutcome, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount("borrow amount must be positive"));
        }
        self.ensure_cash(amount.value())?;

        let owed = self.borrow_balance(account)?;
        let account_borrows = fixed::add(owed, amount.value())?;
        let total_borrows = fixed::add(self.total_borrows, amount.value())?;
        let cash = fixed::sub(self.cash, amount.value())?;

        self.borrows.insert(
            account.clone(),
            BorrowSnapshot {
                principal: account_borrows,
                interest_index: self.borrow_index,
            },
        );
        self.total_borrows = total_borrows;
        self.cash = cash;

        Ok(BorrowOutcome {
            amount: amount.value(),
            account_borrows,
            total_borrows,
        })
    }

    /// Resolve a repay request against the current balance without writing.
    pub fn resolve_repay(&self, borrower: &AccountId, amount: RepayAmount) -> Result<Decimal, LedgerError> {
        let owed = self.borrow_balance(borrower)?;
        let amount = match amount {
            RepayAmount::All => owed,
            RepayAmount::Exact(amount) => {
                if amount.is_zero() {
                    return Err(LedgerError::InvalidAmount("repay amount must be positive"));
                }
                if amount.value() > owed {
                    return Err(LedgerError::RepayExceedsBorrow {
                        market: self.id.clone(),
                        owed,
                        requested: amount.value(),
                    });
                }
                amount.value()
            }
        };
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount("nothing to repay"));
        }
        Ok(amount)
    }

    /// Reduce `borrower`'s debt by the (already received) repay amount.
    pub fn repay(&mut self, borrower: &AccountId, amount: RepayAmount) -> Result<RepayOutcome, LedgerError> {
        let amount = self.resolve_repay(borrower, amount)?;
        let owed = self.borrow_balance(borrower)?;

        let account_borrows = fixed::sub(owed, amount)?;
        // Per-account truncation can leave the sum of balances above the total
        let total_borrows = fixed::saturating_sub(self.total_borrows, amount)?;
        let cash = fixed::add(self.cash, amount)?;

        self.borrows.insert(
            borrower.clone(),
            BorrowSnapshot {
                principal: account_borrows,
                interest_index: self.borrow_index,
            },
        );
        self.total_borrows = total_borrows;
        self.cash = cash;

        Ok(RepayOutcome {
            amount,
            account_borrows,
            total_borrows,
        })
    }

    // === Reserves ===

    pub fn add_reserves(&mut self, amount: Amount) -> Result<Decimal, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount("reserve amount must be positive"));
        }
        let total_reserves = fixed::add(self.total_reserves, amount.value())?;
        let cash = fixed::add(self.cash, amount.value())?;
        self.total_reserves = total_reserves;
        self.cash = cash;
        Ok(total_reserves)
    }

    pub fn reduce_reserves(&mut self, amount: Amount) -> Result<Decimal, LedgerError> {
        if amount.is_zero() {
            return Err(LedgerError::InvalidAmount("reserve amount must be positive"));
        }
        if amount.value() > self.total_reserves {
            return Err(LedgerError::InsufficientReserves {
                market: self.id.clone(),
                available: self.total_reserves,
                requested: amount.value(),
            });
        }
        self.ensure_cash(amount.value())?;

        let total_reserves = fixed::sub(self.total_reserves, amount.value())?;
        let cash = fixed::sub(self.cash, amount.value())?;
        self.total_reserves = total_reserves;
        self.cash = cash;
        Ok(total_reserves)
    }

    // === Invariants ===

    /// `cash + borrows - reserves`, the value owned by suppliers
    fn pool_value(&self) -> Result<Decimal, LedgerError> {
        let gross = fixed::add(self.cash, self.total_borrows)?;
        fixed::sub(gross, self.total_reserves).map_err(|_| LedgerError::Insolvent(self.id.clone()))
    }

    /// Verify the pool's own balance sheet is solvent
    pub fn check_invariants(&self) -> Result<(), LedgerError> {
        self.pool_value().map(|_| ())
    }

    fn ensure_cash(&self, requested: Decimal) -> Result<(), LedgerError> {
        if requested > self.cash {
            return Err(LedgerError::InsufficientCash {
                market: self.id.clone(),
                available: self.cash,
                requested,
            });
        }
        Ok(())
    }
}
