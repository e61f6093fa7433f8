//! Scenario runner
//!
//! A scenario is a JSON script: a protocol config, starting prices, wallet
//! grants and a list of steps. Each step may name the error kind it is
//! expected to fail with; any other outcome stops the run.

use bilend_core::{AccountId, ErrorKind, MarketId};
use bilend_ledger::RepayAmount;
use bilend_oracle::{MockOracle, OracleError};
use bilend_risk::Liquidity;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{ConfigError, ProtocolConfig};
use crate::error::ProtocolError;
use crate::protocol::{MarketSnapshot, Protocol};

#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("Failed to load scenario: {0}")]
    Load(#[from] ConfigError),

    #[error("Invalid starting price: {0}")]
    Oracle(#[from] OracleError),

    #[error("Scenario setup failed: {0}")]
    Setup(#[source] ProtocolError),

    #[error("Step {step} ({action}) failed: {source}")]
    Unexpected {
        step: usize,
        action: &'static str,
        #[source]
        source: ProtocolError,
    },

    #[error("Step {step} ({action}) succeeded but was expected to fail with {expected}")]
    MissingError {
        step: usize,
        action: &'static str,
        expected: ErrorKind,
    },

    #[error("Step {step} ({action}) failed with {actual}, expected {expected}")]
    WrongError {
        step: usize,
        action: &'static str,
        expected: ErrorKind,
        actual: ErrorKind,
    },
}

/// Underlying handed to an account before the first step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grant {
    pub market: MarketId,
    pub account: AccountId,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedeemBy {
    #[default]
    Shares,
    Underlying,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    Mint {
        account: AccountId,
        market: MarketId,
        amount: Decimal,
    },
    Redeem {
        account: AccountId,
        market: MarketId,
        amount: Decimal,
        #[serde(default)]
        by: RedeemBy,
    },
    Borrow {
        account: AccountId,
        market: MarketId,
        amount: Decimal,
    },
    /// `borrower` defaults to `payer`
    Repay {
        payer: AccountId,
        #[serde(default)]
        borrower: Option<AccountId>,
        market: MarketId,
        amount: RepayAmount,
    },
    Liquidate {
        liquidator: AccountId,
        borrower: AccountId,
        repay_market: MarketId,
        amount: Decimal,
        collateral_market: MarketId,
    },
    Transfer {
        from: AccountId,
        to: AccountId,
        market: MarketId,
        shares: Decimal,
    },
    EnterMarkets {
        account: AccountId,
        markets: Vec<MarketId>,
    },
    ExitMarket {
        account: AccountId,
        market: MarketId,
    },
    Advance {
        periods: u64,
    },
    SetPrice {
        market: MarketId,
        price: Decimal,
    },
    ReduceReserves {
        market: MarketId,
        amount: Decimal,
        to: AccountId,
    },
}

impl StepAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mint { .. } => "mint",
            Self::Redeem { .. } => "redeem",
            Self::Borrow { .. } => "borrow",
            Self::Repay { .. } => "repay",
            Self::Liquidate { .. } => "liquidate",
            Self::Transfer { .. } => "transfer",
            Self::EnterMarkets { .. } => "enter_markets",
            Self::ExitMarket { .. } => "exit_market",
            Self::Advance { .. } => "advance",
            Self::SetPrice { .. } => "set_price",
            Self::ReduceReserves { .. } => "reduce_reserves",
        }
    }

    fn apply(&self, protocol: &mut Protocol<MockOracle>) -> Result<(), ProtocolError> {
        match self {
            Self::Mint {
                account,
                market,
                amount,
            } => protocol.mint(account, market, *amount).map(|_| ()),
            Self::Redeem {
                account,
                market,
                amount,
                by: RedeemBy::Shares,
            } => protocol.redeem(account, market, *amount).map(|_| ()),
            Self::Redeem {
                account,
                market,
                amount,
                by: RedeemBy::Underlying,
            } => protocol.redeem_underlying(account, market, *amount).map(|_| ()),
            Self::Borrow {
                account,
                market,
                amount,
            } => protocol.borrow(account, market, *amount).map(|_| ()),
            Self::Repay {
                payer,
                borrower,
                market,
                amount,
            } => {
                let borrower = borrower.as_ref().unwrap_or(payer);
                protocol
                    .repay_borrow_behalf(payer, borrower, market, *amount)
                    .map(|_| ())
            }
            Self::Liquidate {
                liquidator,
                borrower,
                repay_market,
                amount,
                collateral_market,
            } => protocol
                .liquidate_borrow(liquidator, borrower, repay_market, *amount, collateral_market)
                .map(|_| ()),
            Self::Transfer {
                from,
                to,
                market,
                shares,
            } => protocol.transfer(from, to, market, *shares),
            Self::EnterMarkets { account, markets } => protocol
                .enter_markets(account, markets)
                .into_iter()
                .find_map(Result::err)
                .map_or(Ok(()), Err),
            Self::ExitMarket { account, market } => protocol.exit_market(account, market).map(|_| ()),
            Self::Advance { periods } => protocol.advance_periods(*periods).map(|_| ()),
            Self::SetPrice { market, price } => Ok(protocol.oracle().set_price(market.clone(), *price)?),
            Self::ReduceReserves { market, amount, to } => {
                protocol.reduce_reserves(market, *amount, to).map(|_| ())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub action: StepAction,
    #[serde(default)]
    pub expect_error: Option<ErrorKind>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: ProtocolConfig,
    #[serde(default)]
    pub prices: BTreeMap<MarketId, Decimal>,
    #[serde(default)]
    pub balances: Vec<Grant>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

impl Scenario {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::from)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ScenarioError> {
        let scenario: Self = serde_json::from_str(content).map_err(ConfigError::from)?;
        scenario.config.validate()?;
        Ok(scenario)
    }
}

/// How one step ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    pub action: &'static str,
    /// Expected error the step failed with, if any
    pub error: Option<ErrorKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PositionReport {
    pub market: MarketId,
    pub shares: Decimal,
    pub underlying: Decimal,
    pub borrow_balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountReport {
    pub account: AccountId,
    pub assets_in: Vec<MarketId>,
    pub positions: Vec<PositionReport>,
    /// `None` when liquidity cannot be valued (debt without a price)
    pub liquidity: Option<Liquidity>,
}

/// Final protocol state after a scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    pub period: u64,
    pub steps: Vec<StepOutcome>,
    pub markets: Vec<MarketSnapshot>,
    pub accounts: Vec<AccountReport>,
    pub events: usize,
}

impl ScenarioReport {
    fn collect(protocol: &Protocol<MockOracle>, steps: Vec<StepOutcome>) -> Result<Self, ProtocolError> {
        let markets = protocol
            .market_ids()
            .iter()
            .map(|market| protocol.market_snapshot(market))
            .collect::<Result<Vec<_>, _>>()?;

        let mut accounts = Vec::new();
        for account in protocol.accounts() {
            let mut positions = Vec::new();
            for market in protocol.market_ids() {
                let shares = protocol.supply_shares(&market, &account)?;
                let borrow_balance = protocol.borrow_balance(&market, &account)?;
                if shares.is_zero() && borrow_balance.is_zero() {
                    continue;
                }
                positions.push(PositionReport {
                    underlying: protocol.balance_of_underlying(&market, &account)?,
                    market,
                    shares,
                    borrow_balance,
                });
            }
            accounts.push(AccountReport {
                assets_in: protocol.assets_in(&account),
                liquidity: protocol.account_liquidity(&account).ok(),
                account,
                positions,
            });
        }

        Ok(Self {
            period: protocol.period(),
            steps,
            markets,
            accounts,
            events: protocol.events().len(),
        })
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Period {} ({} steps, {} events)", self.period, self.steps.len(), self.events)?;
        writeln!(f)?;
        writeln!(f, "Markets:")?;
        for m in &self.markets {
            writeln!(
                f,
                "  {:<8} cash {:>14}  supply {:>14}  borrows {:>14}  reserves {:>12}  rate {}",
                m.market.as_str(),
                m.cash,
                m.total_supply,
                m.total_borrows,
                m.total_reserves,
                m.exchange_rate
            )?;
        }
        writeln!(f)?;
        writeln!(f, "Accounts:")?;
        for account in &self.accounts {
            match &account.liquidity {
                Some(l) => writeln!(
                    f,
                    "  {} (liquidity {}, shortfall {})",
                    account.account, l.excess, l.shortfall
                )?,
                None => writeln!(f, "  {} (liquidity unavailable)", account.account)?,
            }
            for p in &account.positions {
                writeln!(
                    f,
                    "    {:<8} shares {:>14}  underlying {:>14}  owed {:>14}",
                    p.market.as_str(),
                    p.shares,
                    p.underlying,
                    p.borrow_balance
                )?;
            }
        }
        Ok(())
    }
}

/// Execute a scenario and report the final state
pub fn run_scenario(scenario: &Scenario) -> Result<ScenarioReport, ScenarioError> {
    let oracle = MockOracle::with_prices(scenario.prices.iter().map(|(m, p)| (m.clone(), *p)))?;
    let mut protocol = Protocol::new(scenario.config.clone(), oracle).map_err(ScenarioError::Setup)?;

    for grant in &scenario.balances {
        protocol
            .grant_underlying(&grant.market, &grant.account, grant.amount)
            .and_then(|()| protocol.approve(&grant.market, &grant.account, Decimal::MAX))
            .map_err(ScenarioError::Setup)?;
    }

    let mut outcomes = Vec::with_capacity(scenario.steps.len());
    for (index, step) in scenario.steps.iter().enumerate() {
        let step_no = index + 1;
        let action = step.action.name();
        let result = step.action.apply(&mut protocol);
        debug!(step = step_no, action, ok = result.is_ok(), "scenario step");

        let error = match (result, step.expect_error) {
            (Ok(()), None) => None,
            (Err(err), Some(expected)) if err.kind() == expected => Some(expected),
            (Err(err), Some(expected)) => {
                return Err(ScenarioError::WrongError {
                    step: step_no,
                    action,
                    expected,
                    actual: err.kind(),
                })
            }
            (Err(source), None) => {
                return Err(ScenarioError::Unexpected {
                    step: step_no,
                    action,
                    source,
                })
            }
            (Ok(()), Some(expected)) => {
                return Err(ScenarioError::MissingError {
                    step: step_no,
                    action,
                    expected,
                })
            }
        };
        outcomes.push(StepOutcome {
            step: step_no,
            action,
            error,
        });
    }

    protocol.check_invariants().map_err(ScenarioError::Setup)?;
    info!(steps = outcomes.len(), period = protocol.period(), "scenario complete");
    ScenarioReport::collect(&protocol, outcomes).map_err(ScenarioError::Setup)
}
