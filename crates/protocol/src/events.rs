//! Protocol events, journaled in commit order

use bilend_core::{AccountId, MarketId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Events emitted by committed actions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// Interest accrued on a market
    AccrueInterest {
        market: MarketId,
        cash_prior: Decimal,
        interest_accumulated: Decimal,
        borrow_index: Decimal,
        total_borrows: Decimal,
    },

    Mint {
        market: MarketId,
        account: AccountId,
        underlying: Decimal,
        shares: Decimal,
    },

    Redeem {
        market: MarketId,
        account: AccountId,
        underlying: Decimal,
        shares: Decimal,
    },

    Borrow {
        market: MarketId,
        account: AccountId,
        amount: Decimal,
        account_borrows: Decimal,
        total_borrows: Decimal,
    },

    RepayBorrow {
        market: MarketId,
        payer: AccountId,
        borrower: AccountId,
        amount: Decimal,
        account_borrows: Decimal,
        total_borrows: Decimal,
    },

    LiquidateBorrow {
        liquidator: AccountId,
        borrower: AccountId,
        repay_market: MarketId,
        repay_amount: Decimal,
        collateral_market: MarketId,
        seize_shares: Decimal,
    },

    /// Shares moved between accounts
    Transfer {
        market: MarketId,
        from: AccountId,
        to: AccountId,
        shares: Decimal,
    },

    MarketEntered { market: MarketId, account: AccountId },

    MarketExited { market: MarketId, account: AccountId },

    MarketListed { market: MarketId },

    ReservesAdded {
        market: MarketId,
        benefactor: AccountId,
        amount: Decimal,
        total_reserves: Decimal,
    },

    ReservesReduced {
        market: MarketId,
        to: AccountId,
        amount: Decimal,
        total_reserves: Decimal,
    },

    /// An admin parameter changed. `market` is `None` for global parameters.
    ConfigUpdated {
        parameter: String,
        market: Option<MarketId>,
        value: String,
    },
}

impl ProtocolEvent {
    pub fn config_updated(parameter: &str, market: Option<&MarketId>, value: impl ToString) -> Self {
        Self::ConfigUpdated {
            parameter: parameter.to_string(),
            market: market.cloned(),
            value: value.to_string(),
        }
    }

    /// Short event name, as used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::AccrueInterest { .. } => "accrue_interest",
            Self::Mint { .. } => "mint",
            Self::Redeem { .. } => "redeem",
            Self::Borrow { .. } => "borrow",
            Self::RepayBorrow { .. } => "repay_borrow",
            Self::LiquidateBorrow { .. } => "liquidate_borrow",
            Self::Transfer { .. } => "transfer",
            Self::MarketEntered { .. } => "market_entered",
            Self::MarketExited { .. } => "market_exited",
            Self::MarketListed { .. } => "market_listed",
            Self::ReservesAdded { .. } => "reserves_added",
            Self::ReservesReduced { .. } => "reserves_reduced",
            Self::ConfigUpdated { .. } => "config_updated",
        }
    }
}

/// An event with its position in the journal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// 1-based, gap-free
    pub sequence: u64,
    /// Protocol period at commit time
    pub period: u64,
    #[serde(flatten)]
    pub event: ProtocolEvent,
}
