//! Protocol facade - wires markets, risk controller, oracle and tokens
//!
//! Every user action runs against a staging area layered over the
//! committed state:
//!
//! 1. accrue each market the action touches or whose liquidity it reads
//! 2. ask the risk controller
//! 3. mutate the ledgers
//! 4. move the underlying (always last)
//! 5. commit the staged markets, tokens and memberships and journal events
//!
//! Only what the action touches is copied into the staging area: the
//! markets and tokens it reads or writes and the memberships of the
//! accounts it checks. An error drops the staging area, so a rejected
//! action leaves no trace.

use bilend_core::{AccountId, Amount, MarketId, MathError};
use bilend_ledger::{
    AccountSnapshot, BorrowOutcome, InMemoryToken, LedgerError, Market, MarketParams, MintOutcome,
    RateModelConfig, RedeemOutcome, RedeemRequest, RepayAmount, RepayOutcome, UnderlyingAsset,
};
use bilend_oracle::PriceOracle;
use bilend_risk::{
    LiquidationPlan, Liquidity, MarketView, PositionState, RiskContext, RiskController, RiskError,
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};

use crate::config::{ConfigError, ProtocolConfig};
use crate::error::ProtocolError;
use crate::events::{ProtocolEvent, RecordedEvent};

/// Committed protocol state
#[derive(Debug, Default)]
struct State {
    markets: BTreeMap<MarketId, Market>,
    tokens: BTreeMap<MarketId, InMemoryToken>,
    risk: RiskController,
}

/// `MarketView` over staged ledgers, falling back to the committed ones
struct LedgerView<'a> {
    staged: &'a BTreeMap<MarketId, Market>,
    committed: &'a BTreeMap<MarketId, Market>,
    config: &'a ProtocolConfig,
}

impl<'a> LedgerView<'a> {
    fn new(
        staged: &'a BTreeMap<MarketId, Market>,
        committed: &'a BTreeMap<MarketId, Market>,
        config: &'a ProtocolConfig,
    ) -> Self {
        Self {
            staged,
            committed,
            config,
        }
    }

    fn ledger(&self, market: &MarketId) -> Option<&'a Market> {
        self.staged
            .get(market)
            .or_else(|| self.committed.get(market))
    }

    fn get(&self, market: &MarketId) -> Result<(&'a Market, &'a MarketParams), RiskError> {
        let ledger = self.ledger(market);
        let params = self.config.market_params(market);
        ledger
            .zip(params)
            .ok_or_else(|| RiskError::MarketNotListed(market.clone()))
    }
}

impl MarketView for LedgerView<'_> {
    fn is_listed(&self, market: &MarketId) -> bool {
        self.ledger(market).is_some()
    }

    fn account_snapshot(
        &self,
        market: &MarketId,
        account: &AccountId,
    ) -> Result<AccountSnapshot, RiskError> {
        let (ledger, params) = self.get(market)?;
        Ok(ledger.account_snapshot(account, params)?)
    }

    fn exchange_rate(&self, market: &MarketId) -> Result<Decimal, RiskError> {
        let (ledger, params) = self.get(market)?;
        Ok(ledger.exchange_rate(params)?)
    }
}

/// One action in flight: copies of what it touched plus what it reads
struct Action<'a, O> {
    committed: &'a State,
    config: &'a ProtocolConfig,
    oracle: &'a O,
    period: u64,
    markets: BTreeMap<MarketId, Market>,
    tokens: BTreeMap<MarketId, InMemoryToken>,
    /// Memberships of `accounts` only
    risk: RiskController,
    accounts: BTreeSet<AccountId>,
    events: Vec<ProtocolEvent>,
}

impl<'a, O: PriceOracle> Action<'a, O> {
    fn new(committed: &'a State, config: &'a ProtocolConfig, oracle: &'a O, period: u64) -> Self {
        Self {
            committed,
            config,
            oracle,
            period,
            markets: BTreeMap::new(),
            tokens: BTreeMap::new(),
            risk: RiskController::new(),
            accounts: BTreeSet::new(),
            events: Vec::new(),
        }
    }

    fn params(&self, market: &MarketId) -> Result<&'a MarketParams, ProtocolError> {
        self.config
            .market_params(market)
            .ok_or_else(|| ProtocolError::MarketNotListed(market.clone()))
    }

    fn market(&self, market: &MarketId) -> Result<&Market, ProtocolError> {
        self.markets
            .get(market)
            .or_else(|| self.committed.markets.get(market))
            .ok_or_else(|| ProtocolError::MarketNotListed(market.clone()))
    }

    /// Staged copy of the market, taken on first write
    fn market_mut(&mut self, market: &MarketId) -> Result<&mut Market, ProtocolError> {
        match self.markets.entry(market.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let ledger = self
                    .committed
                    .markets
                    .get(market)
                    .ok_or_else(|| ProtocolError::MarketNotListed(market.clone()))?;
                Ok(entry.insert(ledger.clone()))
            }
        }
    }

    fn emit(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    fn accrue(&mut self, market: &MarketId) -> Result<(), ProtocolError> {
        if self.market(market)?.accrual_period() == self.period {
            return Ok(());
        }
        let params = self.params(market)?;
        let period = self.period;
        let accrued = self.market_mut(market)?.accrue_interest(params, period)?;
        if let Some(outcome) = accrued {
            self.emit(ProtocolEvent::AccrueInterest {
                market: market.clone(),
                cash_prior: outcome.cash_prior,
                interest_accumulated: outcome.interest_accumulated,
                borrow_index: outcome.borrow_index,
                total_borrows: outcome.total_borrows,
            });
        }
        Ok(())
    }

    /// Bring `account`'s memberships into the staging area
    fn stage_account(&mut self, account: &AccountId) {
        if self.accounts.insert(account.clone()) {
            self.risk.copy_account(account, &self.committed.risk);
        }
    }

    /// Accrue every market the account's liquidity reads
    fn accrue_account(&mut self, account: &AccountId) -> Result<(), ProtocolError> {
        self.stage_account(account);
        let markets = self.risk.assets_in(account).to_vec();
        for market in &markets {
            self.accrue(market)?;
        }
        Ok(())
    }

    /// Run a risk check against the staged ledgers and memberships
    fn with_risk<T>(
        &mut self,
        check: impl FnOnce(&mut RiskController, RiskContext<'_>) -> Result<T, RiskError>,
    ) -> Result<T, ProtocolError> {
        let view = LedgerView::new(&self.markets, &self.committed.markets, self.config);
        let ctx = RiskContext::new(&view, self.oracle, &self.config.risk);
        Ok(check(&mut self.risk, ctx)?)
    }

    fn token_mut(&mut self, market: &MarketId) -> Result<&mut InMemoryToken, ProtocolError> {
        match self.tokens.entry(market.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let token = self
                    .committed
                    .tokens
                    .get(market)
                    .ok_or_else(|| ProtocolError::MarketNotListed(market.clone()))?;
                Ok(entry.insert(token.clone()))
            }
        }
    }

    /// Pull underlying from `from` into the market's pool
    fn pull(&mut self, market: &MarketId, from: &AccountId, amount: Decimal) -> Result<(), ProtocolError> {
        if self.token_mut(market)?.transfer_from(from, amount) {
            Ok(())
        } else {
            Err(ProtocolError::TransferFailed {
                market: market.clone(),
                account: from.clone(),
                amount,
            })
        }
    }

    /// Pay underlying out of the market's pool to `to`
    fn pay(&mut self, market: &MarketId, to: &AccountId, amount: Decimal) -> Result<(), ProtocolError> {
        if self.token_mut(market)?.transfer(to, amount) {
            Ok(())
        } else {
            Err(ProtocolError::TransferFailed {
                market: market.clone(),
                account: to.clone(),
                amount,
            })
        }
    }
}

/// What a successful action leaves behind
struct Staged {
    markets: BTreeMap<MarketId, Market>,
    tokens: BTreeMap<MarketId, InMemoryToken>,
    risk: RiskController,
    accounts: BTreeSet<AccountId>,
}

impl State {
    fn commit(&mut self, staged: Staged) {
        self.markets.extend(staged.markets);
        self.tokens.extend(staged.tokens);
        for account in &staged.accounts {
            self.risk.copy_account(account, &staged.risk);
        }
    }
}

/// Point-in-time totals of one market, interest included
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketSnapshot {
    pub market: MarketId,
    pub cash: Decimal,
    pub total_supply: Decimal,
    pub total_borrows: Decimal,
    pub total_reserves: Decimal,
    pub borrow_index: Decimal,
    pub exchange_rate: Decimal,
    pub borrow_rate_per_period: Decimal,
    pub supply_rate_per_period: Decimal,
}

/// The lending protocol
pub struct Protocol<O: PriceOracle> {
    config: ProtocolConfig,
    oracle: O,
    state: State,
    period: u64,
    journal: Vec<RecordedEvent>,
}

impl<O: PriceOracle> Protocol<O> {
    /// Create a protocol with every configured market listed at period 0
    pub fn new(config: ProtocolConfig, oracle: O) -> Result<Self, ProtocolError> {
        config.validate()?;

        let mut state = State::default();
        let mut events = Vec::new();
        for market in config.markets.keys() {
            state.markets.insert(market.clone(), Market::new(market.clone(), 0));
            state
                .tokens
                .insert(market.clone(), InMemoryToken::new(market.as_str()));
            events.push(ProtocolEvent::MarketListed {
                market: market.clone(),
            });
        }

        let mut protocol = Self {
            config,
            oracle,
            state,
            period: 0,
            journal: Vec::new(),
        };
        protocol.record(events);
        Ok(protocol)
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Committed events, oldest first
    pub fn events(&self) -> &[RecordedEvent] {
        &self.journal
    }

    pub fn market_ids(&self) -> Vec<MarketId> {
        self.state.markets.keys().cloned().collect()
    }

    /// Raw ledger as of its last accrual
    pub fn market(&self, market: &MarketId) -> Option<&Market> {
        self.state.markets.get(market)
    }

    fn record(&mut self, events: Vec<ProtocolEvent>) {
        for event in events {
            let sequence = self.journal.len() as u64 + 1;
            self.journal.push(RecordedEvent {
                sequence,
                period: self.period,
                event,
            });
        }
    }

    /// Run `run` against a staging area and commit it only if it succeeds
    fn execute<T>(
        &mut self,
        action: &'static str,
        run: impl FnOnce(&mut Action<'_, O>) -> Result<T, ProtocolError>,
    ) -> Result<T, ProtocolError> {
        let mut tx = Action::new(&self.state, &self.config, &self.oracle, self.period);

        match run(&mut tx) {
            Ok(value) => {
                let Action {
                    markets,
                    tokens,
                    risk,
                    accounts,
                    events,
                    ..
                } = tx;
                self.state.commit(Staged {
                    markets,
                    tokens,
                    risk,
                    accounts,
                });
                self.record(events);
                Ok(value)
            }
            Err(err) => {
                warn!(action, kind = %err.kind(), error = %err, "action rejected");
                Err(err)
            }
        }
    }

    // === Clock ===

    pub fn period(&self) -> u64 {
        self.period
    }

    /// Move the clock forward. Markets accrue lazily on their next touch.
    pub fn advance_periods(&mut self, periods: u64) -> Result<u64, ProtocolError> {
        self.period = self
            .period
            .checked_add(periods)
            .ok_or(MathError::Overflow { op: "advance_periods" })?;
        Ok(self.period)
    }

    pub fn set_period(&mut self, period: u64) -> Result<(), ProtocolError> {
        if period < self.period {
            return Err(ProtocolError::PeriodRegression {
                current: self.period,
                requested: period,
            });
        }
        self.period = period;
        Ok(())
    }

    // === Underlying token ===

    /// Credit `account` with freshly created underlying (faucet)
    pub fn grant_underlying(
        &mut self,
        market: &MarketId,
        account: &AccountId,
        amount: Decimal,
    ) -> Result<(), ProtocolError> {
        let amount = Amount::new(amount)?;
        let token = self
            .state
            .tokens
            .get_mut(market)
            .ok_or_else(|| ProtocolError::MarketNotListed(market.clone()))?;
        token.mint_to(account, amount.value());
        Ok(())
    }

    /// Allow the market's pool to pull up to `amount` from `owner`
    pub fn approve(
        &mut self,
        market: &MarketId,
        owner: &AccountId,
        amount: Decimal,
    ) -> Result<(), ProtocolError> {
        let amount = Amount::new(amount)?;
        let token = self
            .state
            .tokens
            .get_mut(market)
            .ok_or_else(|| ProtocolError::MarketNotListed(market.clone()))?;
        token.approve(owner, amount.value());
        Ok(())
    }

    pub fn underlying_balance(
        &self,
        market: &MarketId,
        account: &AccountId,
    ) -> Result<Decimal, ProtocolError> {
        self.state
            .tokens
            .get(market)
            .map(|token| token.balance_of(account))
            .ok_or_else(|| ProtocolError::MarketNotListed(market.clone()))
    }

    // === User actions ===

    /// Supply `amount` of underlying and receive shares
    pub fn mint(
        &mut self,
        account: &AccountId,
        market: &MarketId,
        amount: Decimal,
    ) -> Result<MintOutcome, ProtocolError> {
        let outcome = self.execute("mint", |tx| {
            let amount = Amount::new(amount)?;
            tx.accrue(market)?;
            let params = tx.params(market)?;
            let outcome = tx.market_mut(market)?.mint(account, amount, params)?;
            tx.pull(market, account, outcome.underlying)?;
            tx.emit(ProtocolEvent::Mint {
                market: market.clone(),
                account: account.clone(),
                underlying: outcome.underlying,
                shares: outcome.shares,
            });
            Ok(outcome)
        })?;
        info!(%account, %market, underlying = %outcome.underlying, shares = %outcome.shares, "mint");
        Ok(outcome)
    }

    /// Burn `shares` and receive their underlying
    pub fn redeem(
        &mut self,
        account: &AccountId,
        market: &MarketId,
        shares: Decimal,
    ) -> Result<RedeemOutcome, ProtocolError> {
        self.redeem_with("redeem", account, market, shares, RedeemRequest::Shares)
    }

    /// Receive exactly `amount` of underlying, burning the shares it takes
    pub fn redeem_underlying(
        &mut self,
        account: &AccountId,
        market: &MarketId,
        amount: Decimal,
    ) -> Result<RedeemOutcome, ProtocolError> {
        self.redeem_with("redeem_underlying", account, market, amount, RedeemRequest::Underlying)
    }

    fn redeem_with(
        &mut self,
        action: &'static str,
        account: &AccountId,
        market: &MarketId,
        amount: Decimal,
        request: fn(Amount) -> RedeemRequest,
    ) -> Result<RedeemOutcome, ProtocolError> {
        let outcome = self.execute(action, |tx| {
            let amount = Amount::new(amount)?;
            tx.accrue(market)?;
            tx.accrue_account(account)?;
            let params = tx.params(market)?;
            let plan = tx.market(market)?.plan_redeem(account, request(amount), params)?;
            tx.with_risk(|risk, ctx| risk.redeem_allowed(account, market, plan.shares, ctx))?;
            tx.market_mut(market)?.apply_redeem(account, &plan)?;
            tx.pay(market, account, plan.underlying)?;
            tx.emit(ProtocolEvent::Redeem {
                market: market.clone(),
                account: account.clone(),
                underlying: plan.underlying,
                shares: plan.shares,
            });
            Ok(plan)
        })?;
        info!(%account, %market, underlying = %outcome.underlying, shares = %outcome.shares, "redeem");
        Ok(outcome)
    }

    /// Borrow `amount` of underlying against the account's collateral
    pub fn borrow(
        &mut self,
        account: &AccountId,
        market: &MarketId,
        amount: Decimal,
    ) -> Result<BorrowOutcome, ProtocolError> {
        let outcome = self.execute("borrow", |tx| {
            let amount = Amount::new(amount)?;
            tx.accrue(market)?;
            tx.accrue_account(account)?;
            let entered =
                tx.with_risk(|risk, ctx| risk.borrow_allowed(account, market, amount.value(), ctx))?;
            if entered {
                tx.emit(ProtocolEvent::MarketEntered {
                    market: market.clone(),
                    account: account.clone(),
                });
            }
            let outcome = tx.market_mut(market)?.borrow(account, amount)?;
            tx.pay(market, account, outcome.amount)?;
            tx.emit(ProtocolEvent::Borrow {
                market: market.clone(),
                account: account.clone(),
                amount: outcome.amount,
                account_borrows: outcome.account_borrows,
                total_borrows: outcome.total_borrows,
            });
            Ok(outcome)
        })?;
        info!(%account, %market, amount = %outcome.amount, account_borrows = %outcome.account_borrows, "borrow");
        Ok(outcome)
    }

    /// Repay the account's own borrow
    pub fn repay_borrow(
        &mut self,
        account: &AccountId,
        market: &MarketId,
        amount: RepayAmount,
    ) -> Result<RepayOutcome, ProtocolError> {
        self.repay_borrow_behalf(account, account, market, amount)
    }

    /// Repay `borrower`'s debt with `payer`'s underlying
    pub fn repay_borrow_behalf(
        &mut self,
        payer: &AccountId,
        borrower: &AccountId,
        market: &MarketId,
        amount: RepayAmount,
    ) -> Result<RepayOutcome, ProtocolError> {
        let outcome = self.execute("repay_borrow", |tx| {
            tx.accrue(market)?;
            let outcome = tx.market_mut(market)?.repay(borrower, amount)?;
            tx.pull(market, payer, outcome.amount)?;
            tx.emit(ProtocolEvent::RepayBorrow {
                market: market.clone(),
                payer: payer.clone(),
                borrower: borrower.clone(),
                amount: outcome.amount,
                account_borrows: outcome.account_borrows,
                total_borrows: outcome.total_borrows,
            });
            Ok(outcome)
        })?;
        info!(%payer, %borrower, %market, amount = %outcome.amount, "repay_borrow");
        Ok(outcome)
    }

    /// Move shares to another account
    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        market: &MarketId,
        shares: Decimal,
    ) -> Result<(), ProtocolError> {
        self.execute("transfer", |tx| {
            let shares = Amount::new(shares)?;
            tx.accrue(market)?;
            tx.accrue_account(from)?;
            tx.with_risk(|risk, ctx| risk.transfer_allowed(from, market, shares.value(), ctx))?;
            tx.market_mut(market)?.transfer(from, to, shares)?;
            tx.emit(ProtocolEvent::Transfer {
                market: market.clone(),
                from: from.clone(),
                to: to.clone(),
                shares: shares.value(),
            });
            Ok(())
        })?;
        info!(%from, %to, %market, %shares, "transfer");
        Ok(())
    }

    /// Repay part of an under-collateralized borrow and seize collateral
    pub fn liquidate_borrow(
        &mut self,
        liquidator: &AccountId,
        borrower: &AccountId,
        repay_market: &MarketId,
        repay_amount: Decimal,
        collateral_market: &MarketId,
    ) -> Result<LiquidationPlan, ProtocolError> {
        let plan = self.execute("liquidate_borrow", |tx| {
            let amount = Amount::new(repay_amount)?;
            if amount.is_zero() {
                return Err(LedgerError::InvalidAmount("liquidation repay must be positive").into());
            }
            tx.accrue(repay_market)?;
            tx.accrue(collateral_market)?;
            tx.accrue_account(borrower)?;

            let plan = tx.with_risk(|risk, ctx| {
                risk.plan_liquidation(
                    borrower,
                    liquidator,
                    repay_market,
                    collateral_market,
                    amount.value(),
                    ctx,
                )
            })?;

            let repaid = tx
                .market_mut(repay_market)?
                .repay(borrower, RepayAmount::Exact(amount))?;
            let params = tx.params(collateral_market)?;
            tx.market_mut(collateral_market)?
                .seize(liquidator, borrower, plan.seize_shares, params)?;
            tx.pull(repay_market, liquidator, repaid.amount)?;

            tx.emit(ProtocolEvent::RepayBorrow {
                market: repay_market.clone(),
                payer: liquidator.clone(),
                borrower: borrower.clone(),
                amount: repaid.amount,
                account_borrows: repaid.account_borrows,
                total_borrows: repaid.total_borrows,
            });
            tx.emit(ProtocolEvent::LiquidateBorrow {
                liquidator: liquidator.clone(),
                borrower: borrower.clone(),
                repay_market: repay_market.clone(),
                repay_amount: repaid.amount,
                collateral_market: collateral_market.clone(),
                seize_shares: plan.seize_shares,
            });
            Ok(plan)
        })?;
        info!(
            %liquidator,
            %borrower,
            repay_amount = %plan.repay_amount,
            seize_shares = %plan.seize_shares,
            "liquidate_borrow"
        );
        Ok(plan)
    }

    /// Enter each market independently. Returns, per market, whether it
    /// was newly entered.
    pub fn enter_markets(
        &mut self,
        account: &AccountId,
        markets: &[MarketId],
    ) -> Vec<Result<bool, ProtocolError>> {
        let unstaged = BTreeMap::new();
        let view = LedgerView::new(&unstaged, &self.state.markets, &self.config);
        let ctx = RiskContext::new(&view, &self.oracle, &self.config.risk);
        let results = self.state.risk.enter_markets(account, markets, ctx);

        let events = markets
            .iter()
            .zip(&results)
            .filter(|(_, result)| matches!(result, Ok(true)))
            .map(|(market, _)| ProtocolEvent::MarketEntered {
                market: market.clone(),
                account: account.clone(),
            })
            .collect();
        self.record(events);

        results
            .into_iter()
            .zip(markets)
            .map(|(result, market)| match result {
                Ok(entered) => Ok(entered),
                Err(err) => {
                    warn!(%account, %market, error = %err, "enter market rejected");
                    Err(err.into())
                }
            })
            .collect()
    }

    /// Leave a market with no open position in it
    pub fn exit_market(&mut self, account: &AccountId, market: &MarketId) -> Result<bool, ProtocolError> {
        let exited = self.execute("exit_market", |tx| {
            tx.accrue(market)?;
            tx.stage_account(account);
            let exited = tx.with_risk(|risk, ctx| risk.exit_market(account, market, ctx))?;
            if exited {
                tx.emit(ProtocolEvent::MarketExited {
                    market: market.clone(),
                    account: account.clone(),
                });
            }
            Ok(exited)
        })?;
        if exited {
            info!(%account, %market, "exit_market");
        }
        Ok(exited)
    }

    // === Admin ===

    /// List a new market at the current period
    pub fn list_market(
        &mut self,
        market: MarketId,
        params: MarketParams,
        collateral_factor: Decimal,
    ) -> Result<(), ProtocolError> {
        if self.state.markets.contains_key(&market) {
            return Err(ProtocolError::MarketAlreadyListed(market));
        }
        let mut config = self.config.clone();
        config.markets.insert(market.clone(), params);
        config
            .risk
            .collateral_factors
            .insert(market.clone(), collateral_factor);
        config.validate()?;

        self.config = config;
        self.state
            .markets
            .insert(market.clone(), Market::new(market.clone(), self.period));
        self.state
            .tokens
            .insert(market.clone(), InMemoryToken::new(market.as_str()));
        info!(%market, %collateral_factor, "market listed");
        self.record(vec![
            ProtocolEvent::MarketListed {
                market: market.clone(),
            },
            ProtocolEvent::config_updated("collateral_factor", Some(&market), collateral_factor),
        ]);
        Ok(())
    }

    /// Validate a changed config and install it. Market-scoped changes
    /// accrue that market under the old parameters first.
    fn update_config(
        &mut self,
        parameter: &'static str,
        market: Option<&MarketId>,
        value: String,
        apply: impl FnOnce(&mut ProtocolConfig),
    ) -> Result<(), ProtocolError> {
        if let Some(market) = market {
            if !self.state.markets.contains_key(market) {
                return Err(ProtocolError::MarketNotListed(market.clone()));
            }
        }
        let mut config = self.config.clone();
        apply(&mut config);
        config.validate()?;

        if let Some(market) = market {
            self.execute(parameter, |tx| tx.accrue(market))?;
        }
        self.config = config;
        info!(parameter, market = ?market, %value, "config updated");
        self.record(vec![ProtocolEvent::config_updated(parameter, market, value)]);
        Ok(())
    }

    pub fn set_collateral_factor(&mut self, market: &MarketId, factor: Decimal) -> Result<(), ProtocolError> {
        self.update_config("collateral_factor", Some(market), factor.to_string(), |config| {
            config.risk.collateral_factors.insert(market.clone(), factor);
        })
    }

    pub fn set_reserve_factor(&mut self, market: &MarketId, factor: Decimal) -> Result<(), ProtocolError> {
        self.update_config("reserve_factor", Some(market), factor.to_string(), |config| {
            if let Some(params) = config.markets.get_mut(market) {
                params.reserve_factor = factor;
            }
        })
    }

    pub fn set_rate_model(&mut self, market: &MarketId, model: RateModelConfig) -> Result<(), ProtocolError> {
        let value = serde_json::to_string(&model).map_err(ConfigError::from)?;
        self.update_config("rate_model", Some(market), value, |config| {
            if let Some(params) = config.markets.get_mut(market) {
                params.rate_model = model;
            }
        })
    }

    pub fn set_close_factor(&mut self, factor: Decimal) -> Result<(), ProtocolError> {
        self.update_config("close_factor", None, factor.to_string(), |config| {
            config.risk.close_factor = factor;
        })
    }

    pub fn set_liquidation_incentive(&mut self, incentive: Decimal) -> Result<(), ProtocolError> {
        self.update_config("liquidation_incentive", None, incentive.to_string(), |config| {
            config.risk.liquidation_incentive = incentive;
        })
    }

    pub fn set_max_assets(&mut self, max_assets: usize) -> Result<(), ProtocolError> {
        self.update_config("max_assets", None, max_assets.to_string(), |config| {
            config.risk.max_assets = max_assets;
        })
    }

    /// Add underlying from `benefactor` straight to reserves
    pub fn add_reserves(
        &mut self,
        market: &MarketId,
        benefactor: &AccountId,
        amount: Decimal,
    ) -> Result<Decimal, ProtocolError> {
        self.execute("add_reserves", |tx| {
            let amount = Amount::new(amount)?;
            tx.accrue(market)?;
            let total_reserves = tx.market_mut(market)?.add_reserves(amount)?;
            tx.pull(market, benefactor, amount.value())?;
            tx.emit(ProtocolEvent::ReservesAdded {
                market: market.clone(),
                benefactor: benefactor.clone(),
                amount: amount.value(),
                total_reserves,
            });
            Ok(total_reserves)
        })
    }

    /// Withdraw reserves to `to`
    pub fn reduce_reserves(
        &mut self,
        market: &MarketId,
        amount: Decimal,
        to: &AccountId,
    ) -> Result<Decimal, ProtocolError> {
        let total_reserves = self.execute("reduce_reserves", |tx| {
            let amount = Amount::new(amount)?;
            tx.accrue(market)?;
            let total_reserves = tx.market_mut(market)?.reduce_reserves(amount)?;
            tx.pay(market, to, amount.value())?;
            tx.emit(ProtocolEvent::ReservesReduced {
                market: market.clone(),
                to: to.clone(),
                amount: amount.value(),
                total_reserves,
            });
            Ok(total_reserves)
        })?;
        info!(%market, %amount, %to, %total_reserves, "reserves reduced");
        Ok(total_reserves)
    }

    // === Queries ===
    //
    // Queries accrue on a private copy, so reading never writes.

    fn accrued(&self, market: &MarketId) -> Result<(Market, &MarketParams), ProtocolError> {
        let params = self
            .config
            .market_params(market)
            .ok_or_else(|| ProtocolError::MarketNotListed(market.clone()))?;
        let mut ledger = self
            .state
            .markets
            .get(market)
            .cloned()
            .ok_or_else(|| ProtocolError::MarketNotListed(market.clone()))?;
        ledger.accrue_interest(params, self.period)?;
        Ok((ledger, params))
    }

    /// Accrued copies of the markets the account has entered
    fn accrued_for(&self, account: &AccountId) -> Result<BTreeMap<MarketId, Market>, ProtocolError> {
        self.state
            .risk
            .assets_in(account)
            .iter()
            .map(|market| self.accrued(market).map(|(ledger, _)| (market.clone(), ledger)))
            .collect()
    }

    pub fn market_snapshot(&self, market: &MarketId) -> Result<MarketSnapshot, ProtocolError> {
        let (ledger, params) = self.accrued(market)?;
        Ok(MarketSnapshot {
            market: market.clone(),
            cash: ledger.cash(),
            total_supply: ledger.total_supply(),
            total_borrows: ledger.total_borrows(),
            total_reserves: ledger.total_reserves(),
            borrow_index: ledger.borrow_index(),
            exchange_rate: ledger.exchange_rate(params)?,
            borrow_rate_per_period: ledger.borrow_rate(params)?,
            supply_rate_per_period: ledger.supply_rate(params)?,
        })
    }

    pub fn exchange_rate(&self, market: &MarketId) -> Result<Decimal, ProtocolError> {
        let (ledger, params) = self.accrued(market)?;
        Ok(ledger.exchange_rate(params)?)
    }

    pub fn total_supply(&self, market: &MarketId) -> Result<Decimal, ProtocolError> {
        Ok(self.accrued(market)?.0.total_supply())
    }

    pub fn total_borrows(&self, market: &MarketId) -> Result<Decimal, ProtocolError> {
        Ok(self.accrued(market)?.0.total_borrows())
    }

    pub fn total_reserves(&self, market: &MarketId) -> Result<Decimal, ProtocolError> {
        Ok(self.accrued(market)?.0.total_reserves())
    }

    pub fn cash(&self, market: &MarketId) -> Result<Decimal, ProtocolError> {
        Ok(self.accrued(market)?.0.cash())
    }

    pub fn borrow_rate_per_period(&self, market: &MarketId) -> Result<Decimal, ProtocolError> {
        let (ledger, params) = self.accrued(market)?;
        Ok(ledger.borrow_rate(params)?)
    }

    pub fn supply_rate_per_period(&self, market: &MarketId) -> Result<Decimal, ProtocolError> {
        let (ledger, params) = self.accrued(market)?;
        Ok(ledger.supply_rate(params)?)
    }

    pub fn supply_shares(&self, market: &MarketId, account: &AccountId) -> Result<Decimal, ProtocolError> {
        Ok(self.accrued(market)?.0.supply_shares(account))
    }

    pub fn balance_of_underlying(
        &self,
        market: &MarketId,
        account: &AccountId,
    ) -> Result<Decimal, ProtocolError> {
        let (ledger, params) = self.accrued(market)?;
        Ok(ledger.balance_of_underlying(account, params)?)
    }

    pub fn borrow_balance(&self, market: &MarketId, account: &AccountId) -> Result<Decimal, ProtocolError> {
        Ok(self.accrued(market)?.0.borrow_balance(account)?)
    }

    pub fn assets_in(&self, account: &AccountId) -> Vec<MarketId> {
        self.state.risk.assets_in(account).to_vec()
    }

    pub fn account_liquidity(&self, account: &AccountId) -> Result<Liquidity, ProtocolError> {
        let markets = self.accrued_for(account)?;
        let view = LedgerView::new(&markets, &self.state.markets, &self.config);
        let ctx = RiskContext::new(&view, &self.oracle, &self.config.risk);
        Ok(self.state.risk.account_liquidity(account, ctx)?)
    }

    pub fn liquidation_eligible(&self, account: &AccountId) -> Result<bool, ProtocolError> {
        Ok(self.account_liquidity(account)?.is_shortfall())
    }

    pub fn position_state(
        &self,
        account: &AccountId,
        market: &MarketId,
    ) -> Result<PositionState, ProtocolError> {
        let markets = self.accrued_for(account)?;
        let view = LedgerView::new(&markets, &self.state.markets, &self.config);
        let ctx = RiskContext::new(&view, &self.oracle, &self.config.risk);
        Ok(self.state.risk.position_state(account, market, ctx)?)
    }

    /// Every account with a position in any market, in id order
    pub fn accounts(&self) -> Vec<AccountId> {
        let mut accounts: Vec<AccountId> = self
            .state
            .markets
            .values()
            .flat_map(Market::accounts)
            .collect();
        accounts.sort();
        accounts.dedup();
        accounts
    }

    /// Pool solvency and token custody agree for every market
    pub fn check_invariants(&self) -> Result<(), ProtocolError> {
        for (id, market) in &self.state.markets {
            market.check_invariants()?;
            let pool = self
                .state
                .tokens
                .get(id)
                .map(|token| token.pool_balance())
                .unwrap_or(Decimal::ZERO);
            if pool != market.cash() {
                return Err(LedgerError::Insolvent(id.clone()).into());
            }
        }
        Ok(())
    }
}
