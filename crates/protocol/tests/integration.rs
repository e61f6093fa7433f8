//! Integration tests for BiLend
//!
//! These drive the protocol facade end to end: accrual, risk checks,
//! ledger mutation, underlying transfers and the event journal.

use bilend_core::{AccountId, ErrorKind, MarketId};
use bilend_ledger::{MarketParams, RateModelConfig, RepayAmount, WhitePaperModel};
use bilend_oracle::MockOracle;
use bilend_protocol::{Protocol, ProtocolConfig, ProtocolEvent};
use bilend_risk::{Liquidity, PositionState};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::process::Command;
use tempfile::TempDir;

fn account(id: &str) -> AccountId {
    id.parse().unwrap()
}

fn market(id: &str) -> MarketId {
    id.parse().unwrap()
}

/// Markets as (id, collateral factor, price), all on default parameters
fn protocol_with(markets: &[(&str, Decimal, Decimal)]) -> Protocol<MockOracle> {
    let mut config = ProtocolConfig::default();
    for (id, factor, _) in markets {
        config.markets.insert(market(id), MarketParams::default());
        config.risk.collateral_factors.insert(market(id), *factor);
    }
    let oracle =
        MockOracle::with_prices(markets.iter().map(|(id, _, price)| (market(id), *price))).unwrap();
    Protocol::new(config, oracle).unwrap()
}

/// Give `who` underlying and an unlimited allowance toward the pool
fn fund(protocol: &mut Protocol<MockOracle>, in_market: &str, who: &str, amount: Decimal) {
    protocol
        .grant_underlying(&market(in_market), &account(who), amount)
        .unwrap();
    protocol
        .approve(&market(in_market), &account(who), Decimal::MAX)
        .unwrap();
}

/// CA (factor 0.5, price 1) as collateral, CB (factor 0, price 1) to borrow,
/// with 1000 CB supplied by LENDER and 100 CA supplied and entered by ALICE
fn borrower_setup() -> Protocol<MockOracle> {
    let mut p = protocol_with(&[("CA", dec!(0.5), dec!(1)), ("CB", dec!(0), dec!(1))]);
    fund(&mut p, "CB", "LENDER", dec!(1000));
    p.mint(&account("LENDER"), &market("CB"), dec!(1000)).unwrap();
    fund(&mut p, "CA", "ALICE", dec!(100));
    p.mint(&account("ALICE"), &market("CA"), dec!(100)).unwrap();
    let entered = p.enter_markets(&account("ALICE"), &[market("CA")]);
    assert!(matches!(entered[0], Ok(true)));
    p
}

#[test]
fn test_mint_then_full_redeem() {
    let mut p = protocol_with(&[("CA", dec!(0.5), dec!(1))]);
    let (alice, ca) = (account("ALICE"), market("CA"));
    fund(&mut p, "CA", "ALICE", dec!(100));

    let minted = p.mint(&alice, &ca, dec!(100)).unwrap();
    assert_eq!(minted.shares, dec!(100));
    assert_eq!(p.cash(&ca).unwrap(), dec!(100));
    assert_eq!(p.underlying_balance(&ca, &alice).unwrap(), Decimal::ZERO);

    let redeemed = p.redeem(&alice, &ca, dec!(100)).unwrap();
    assert_eq!(redeemed.underlying, dec!(100));
    assert_eq!(p.total_supply(&ca).unwrap(), Decimal::ZERO);
    assert_eq!(p.cash(&ca).unwrap(), Decimal::ZERO);
    assert_eq!(p.supply_rate_per_period(&ca).unwrap(), Decimal::ZERO);
    assert_eq!(p.underlying_balance(&ca, &alice).unwrap(), dec!(100));
    assert_eq!(p.supply_shares(&ca, &alice).unwrap(), Decimal::ZERO);
}

#[test]
fn test_redeem_underlying_round_trip() {
    let mut p = protocol_with(&[("CA", dec!(0.5), dec!(1))]);
    let (alice, ca) = (account("ALICE"), market("CA"));
    fund(&mut p, "CA", "ALICE", dec!(250));

    p.mint(&alice, &ca, dec!(250)).unwrap();
    let redeemed = p.redeem_underlying(&alice, &ca, dec!(250)).unwrap();
    assert_eq!(redeemed.shares, dec!(250));
    assert_eq!(p.underlying_balance(&ca, &alice).unwrap(), dec!(250));
    assert_eq!(p.balance_of_underlying(&ca, &alice).unwrap(), Decimal::ZERO);
}

#[test]
fn test_borrow_to_exact_collateral_boundary() {
    let mut p = borrower_setup();
    let (alice, cb) = (account("ALICE"), market("CB"));

    p.borrow(&alice, &cb, dec!(50)).unwrap();
    assert_eq!(p.account_liquidity(&alice).unwrap(), Liquidity::default());
    assert_eq!(p.assets_in(&alice), vec![market("CA"), market("CB")]);
    assert_eq!(p.underlying_balance(&cb, &alice).unwrap(), dec!(50));

    let err = p.borrow(&alice, &cb, dec!(0.000001)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientLiquidity);
}

#[test]
fn test_boundary_borrow_in_one_step_fails() {
    let mut p = borrower_setup();
    let err = p
        .borrow(&account("ALICE"), &market("CB"), dec!(50.000001))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientLiquidity);
}

#[test]
fn test_rejected_borrow_leaves_no_trace() {
    let mut p = borrower_setup();
    let (alice, cb) = (account("ALICE"), market("CB"));

    let events_before = p.events().len();
    let snapshot_before = p.market_snapshot(&cb).unwrap();

    // Would auto-enter CB, but the liquidity check fails
    let err = p.borrow(&alice, &cb, dec!(60)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientLiquidity);

    assert_eq!(p.events().len(), events_before);
    assert_eq!(p.market_snapshot(&cb).unwrap(), snapshot_before);
    assert_eq!(p.assets_in(&alice), vec![market("CA")]);
    assert_eq!(p.borrow_balance(&cb, &alice).unwrap(), Decimal::ZERO);
    assert_eq!(p.underlying_balance(&cb, &alice).unwrap(), Decimal::ZERO);
}

#[test]
fn test_action_leaves_other_markets_and_accounts_alone() {
    let mut p = protocol_with(&[
        ("CA", dec!(0.5), dec!(1)),
        ("CB", dec!(0), dec!(1)),
        ("CC", dec!(0.5), dec!(1)),
    ]);
    let (alice, bob) = (account("ALICE"), account("BOB"));
    let (ca, cb, cc) = (market("CA"), market("CB"), market("CC"));
    fund(&mut p, "CB", "LENDER", dec!(1000));
    p.mint(&account("LENDER"), &cb, dec!(1000)).unwrap();
    fund(&mut p, "CA", "ALICE", dec!(100));
    p.mint(&alice, &ca, dec!(100)).unwrap();
    fund(&mut p, "CC", "BOB", dec!(100));
    p.mint(&bob, &cc, dec!(100)).unwrap();
    p.enter_markets(&alice, &[ca.clone()]);
    p.enter_markets(&bob, &[cc.clone()]);
    let model = WhitePaperModel::new(dec!(0.01), Decimal::ZERO).with_max_rate(dec!(0.01));
    p.set_rate_model(&cb, RateModelConfig::WhitePaper(model)).unwrap();

    p.advance_periods(10).unwrap();
    p.borrow(&alice, &cb, dec!(20)).unwrap();

    assert_eq!(p.market(&ca).unwrap().accrual_period(), 10);
    assert_eq!(p.market(&cb).unwrap().accrual_period(), 10);
    assert_eq!(p.market(&cc).unwrap().accrual_period(), 0);
    assert_eq!(p.assets_in(&alice), vec![ca.clone(), cb.clone()]);
    assert_eq!(p.assets_in(&bob), vec![cc.clone()]);
    assert_eq!(p.position_state(&bob, &cc).unwrap(), PositionState::Active);
    assert_eq!(p.underlying_balance(&cc, &bob).unwrap(), Decimal::ZERO);

    // Queries accrue the account's markets on the side
    p.advance_periods(10).unwrap();
    let liquidity = p.account_liquidity(&alice).unwrap();
    assert_eq!(liquidity.excess, dec!(28));
    assert_eq!(p.market(&cb).unwrap().accrual_period(), 10);
    p.check_invariants().unwrap();
}

#[test]
fn test_borrow_beyond_cash() {
    let mut p = protocol_with(&[("CA", dec!(0.9), dec!(1)), ("CB", dec!(0), dec!(1))]);
    fund(&mut p, "CB", "LENDER", dec!(10));
    p.mint(&account("LENDER"), &market("CB"), dec!(10)).unwrap();
    fund(&mut p, "CA", "ALICE", dec!(1000));
    p.mint(&account("ALICE"), &market("CA"), dec!(1000)).unwrap();
    p.enter_markets(&account("ALICE"), &[market("CA")]);

    let err = p.borrow(&account("ALICE"), &market("CB"), dec!(11)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientCash);
}

#[test]
fn test_redeem_blocked_by_outstanding_borrow() {
    let mut p = borrower_setup();
    let (alice, ca, cb) = (account("ALICE"), market("CA"), market("CB"));
    p.borrow(&alice, &cb, dec!(40)).unwrap();

    // Collateral 50 against debt 40 frees exactly 20 shares
    let err = p.redeem(&alice, &ca, dec!(20.000001)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientLiquidity);
    assert_eq!(p.supply_shares(&ca, &alice).unwrap(), dec!(100));

    p.redeem(&alice, &ca, dec!(20)).unwrap();
    assert_eq!(p.account_liquidity(&alice).unwrap(), Liquidity::default());

    let err = p
        .transfer(&alice, &account("BOB"), &ca, dec!(1))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientLiquidity);
}

#[test]
fn test_two_market_balance_and_repay() {
    let mut p = protocol_with(&[("CA", dec!(0.5), dec!(1)), ("CB", dec!(0.5), dec!(100))]);
    let (alice, ca, cb) = (account("ALICE"), market("CA"), market("CB"));
    fund(&mut p, "CA", "LENDER", dec!(1000));
    p.mint(&account("LENDER"), &ca, dec!(1000)).unwrap();

    fund(&mut p, "CB", "ALICE", dec!(1));
    p.mint(&alice, &cb, dec!(1)).unwrap();
    p.enter_markets(&alice, &[cb.clone()]);
    p.borrow(&alice, &ca, dec!(50)).unwrap();
    assert_eq!(p.account_liquidity(&alice).unwrap(), Liquidity::default());

    p.approve(&ca, &alice, Decimal::MAX).unwrap();
    p.repay_borrow(&alice, &ca, RepayAmount::Exact(dec!(1).try_into().unwrap()))
        .unwrap();
    let liquidity = p.account_liquidity(&alice).unwrap();
    assert_eq!(liquidity.excess, dec!(1));
    assert_eq!(liquidity.shortfall, Decimal::ZERO);
}

#[test]
fn test_failed_token_pull_aborts_mint() {
    let mut p = protocol_with(&[("CA", dec!(0.5), dec!(1))]);
    let (alice, ca) = (account("ALICE"), market("CA"));
    // Funded but never approved the pool
    p.grant_underlying(&ca, &alice, dec!(100)).unwrap();

    let err = p.mint(&alice, &ca, dec!(100)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransferFailed);
    assert_eq!(p.total_supply(&ca).unwrap(), Decimal::ZERO);
    assert_eq!(p.supply_shares(&ca, &alice).unwrap(), Decimal::ZERO);
    assert_eq!(p.cash(&ca).unwrap(), Decimal::ZERO);
    p.check_invariants().unwrap();
}

#[test]
fn test_invalid_amounts() {
    let mut p = borrower_setup();
    let (alice, ca) = (account("ALICE"), market("CA"));

    assert_eq!(p.mint(&alice, &ca, Decimal::ZERO).unwrap_err().kind(), ErrorKind::InvalidAmount);
    assert_eq!(p.mint(&alice, &ca, dec!(-1)).unwrap_err().kind(), ErrorKind::InvalidAmount);
    assert_eq!(p.redeem(&alice, &ca, Decimal::ZERO).unwrap_err().kind(), ErrorKind::InvalidAmount);
    assert_eq!(
        p.redeem(&alice, &ca, dec!(100.5)).unwrap_err().kind(),
        ErrorKind::InsufficientBalance
    );
    assert_eq!(
        p.mint(&alice, &market("ZZ"), dec!(1)).unwrap_err().kind(),
        ErrorKind::MarketNotListed
    );
}

#[test]
fn test_interest_accrues_lazily_and_raises_exchange_rate() {
    let mut config = ProtocolConfig::default();
    let rate_model = RateModelConfig::WhitePaper(WhitePaperModel::new(dec!(0.000001), dec!(0.000002)));
    config.markets.insert(market("CA"), MarketParams::default());
    config.markets.insert(
        market("CB"),
        MarketParams::default()
            .with_rate_model(rate_model)
            .with_reserve_factor(dec!(0.1)),
    );
    config.risk.collateral_factors.insert(market("CA"), dec!(0.5));
    let oracle = MockOracle::with_prices([(market("CA"), dec!(1)), (market("CB"), dec!(1))]).unwrap();
    let mut p = Protocol::new(config, oracle).unwrap();
    let (alice, cb) = (account("ALICE"), market("CB"));

    fund(&mut p, "CB", "LENDER", dec!(1000));
    p.mint(&account("LENDER"), &cb, dec!(1000)).unwrap();
    fund(&mut p, "CA", "ALICE", dec!(1000));
    p.mint(&alice, &market("CA"), dec!(1000)).unwrap();
    p.enter_markets(&alice, &[market("CA")]);
    p.borrow(&alice, &cb, dec!(100)).unwrap();

    let mut last_rate = p.exchange_rate(&cb).unwrap();
    assert_eq!(last_rate, dec!(1));
    for _ in 0..5 {
        p.advance_periods(10).unwrap();
        let rate = p.exchange_rate(&cb).unwrap();
        assert!(rate >= last_rate);
        last_rate = rate;
    }
    assert!(last_rate > dec!(1));

    // Reads do not commit accrual
    assert_eq!(p.market(&cb).unwrap().accrual_period(), 0);
    assert!(p.total_reserves(&cb).unwrap() > Decimal::ZERO);
    assert!(p.borrow_balance(&cb, &alice).unwrap() > dec!(100));
}

#[test]
fn test_repeated_accrual_in_one_period_is_idempotent() {
    let mut config = ProtocolConfig::default();
    config.markets.insert(market("CA"), MarketParams::default());
    config.markets.insert(
        market("CB"),
        MarketParams::default().with_rate_model(RateModelConfig::WhitePaper(WhitePaperModel::new(
            dec!(0.000002),
            Decimal::ZERO,
        ))),
    );
    config.risk.collateral_factors.insert(market("CA"), dec!(0.5));
    let oracle = MockOracle::with_prices([(market("CA"), dec!(1)), (market("CB"), dec!(1))]).unwrap();
    let mut p = Protocol::new(config, oracle).unwrap();
    let (alice, cb) = (account("ALICE"), market("CB"));

    fund(&mut p, "CB", "LENDER", dec!(1000));
    p.mint(&account("LENDER"), &cb, dec!(1000)).unwrap();
    fund(&mut p, "CA", "ALICE", dec!(1000));
    p.mint(&alice, &market("CA"), dec!(1000)).unwrap();
    p.enter_markets(&alice, &[market("CA")]);
    p.borrow(&alice, &cb, dec!(100)).unwrap();

    p.advance_periods(500).unwrap();
    // Two actions in the same period: only the first one accrues
    fund(&mut p, "CB", "BOB", dec!(2));
    p.mint(&account("BOB"), &cb, dec!(1)).unwrap();
    let index = p.market(&cb).unwrap().borrow_index();
    p.mint(&account("BOB"), &cb, dec!(1)).unwrap();
    assert_eq!(p.market(&cb).unwrap().borrow_index(), index);

    // 1 + 0.000002 * 500
    assert_eq!(index, dec!(1.001));
    assert_eq!(p.borrow_balance(&cb, &alice).unwrap(), dec!(100.1));

    let accruals = p
        .events()
        .iter()
        .filter(|e| matches!(e.event, ProtocolEvent::AccrueInterest { .. }))
        .count();
    assert_eq!(accruals, 1);
}

#[test]
fn test_liquidation_end_to_end() {
    let mut p = borrower_setup();
    let (alice, bob, ca, cb) = (account("ALICE"), account("BOB"), market("CA"), market("CB"));
    p.borrow(&alice, &cb, dec!(50)).unwrap();
    fund(&mut p, "CB", "BOB", dec!(100));

    assert_eq!(
        p.liquidate_borrow(&bob, &alice, &cb, dec!(10), &ca).unwrap_err().kind(),
        ErrorKind::NotLiquidatable
    );

    p.oracle().set_price(ca.clone(), dec!(0.8)).unwrap();
    assert!(p.liquidation_eligible(&alice).unwrap());
    assert_eq!(p.account_liquidity(&alice).unwrap().shortfall, dec!(10));

    assert_eq!(
        p.liquidate_borrow(&alice, &alice, &cb, dec!(10), &ca).unwrap_err().kind(),
        ErrorKind::SelfLiquidation
    );
    assert_eq!(
        p.liquidate_borrow(&bob, &alice, &cb, dec!(25.000001), &ca).unwrap_err().kind(),
        ErrorKind::TooMuchRepay
    );

    let plan = p.liquidate_borrow(&bob, &alice, &cb, dec!(25), &ca).unwrap();
    // 25 * 1.08 * 1 / (0.8 * 1)
    assert_eq!(plan.seize_shares, dec!(33.75));

    assert_eq!(p.borrow_balance(&cb, &alice).unwrap(), dec!(25));
    assert_eq!(p.supply_shares(&ca, &alice).unwrap(), dec!(66.25));
    // 2.8% of the seized shares go to reserves
    assert_eq!(p.supply_shares(&ca, &bob).unwrap(), dec!(32.805));
    assert_eq!(p.total_reserves(&ca).unwrap(), dec!(0.945));
    assert_eq!(p.total_supply(&ca).unwrap(), dec!(99.055));
    assert_eq!(p.exchange_rate(&ca).unwrap(), dec!(1));
    assert_eq!(p.underlying_balance(&cb, &bob).unwrap(), dec!(75));

    let liquidity = p.account_liquidity(&alice).unwrap();
    assert_eq!(liquidity.excess, dec!(1.5));
    p.check_invariants().unwrap();

    let last = &p.events().last().unwrap().event;
    assert!(matches!(last, ProtocolEvent::LiquidateBorrow { .. }));
}

#[test]
fn test_exit_market_lifecycle() {
    let mut p = borrower_setup();
    let (alice, ca, cb) = (account("ALICE"), market("CA"), market("CB"));
    p.enter_markets(&alice, &[cb.clone()]);

    assert_eq!(p.position_state(&alice, &cb).unwrap(), PositionState::Member);
    assert_eq!(p.position_state(&alice, &ca).unwrap(), PositionState::Active);

    assert!(p.exit_market(&alice, &cb).unwrap());
    assert!(!p.exit_market(&alice, &cb).unwrap());
    assert_eq!(
        p.exit_market(&alice, &ca).unwrap_err().kind(),
        ErrorKind::NonzeroBalance
    );

    p.redeem(&alice, &ca, dec!(100)).unwrap();
    assert!(p.exit_market(&alice, &ca).unwrap());
    assert_eq!(p.position_state(&alice, &ca).unwrap(), PositionState::NonMember);
    assert!(p.assets_in(&alice).is_empty());
}

#[test]
fn test_membership_cap() {
    let mut p = borrower_setup();
    p.set_max_assets(1).unwrap();
    let results = p.enter_markets(&account("ALICE"), &[market("CA"), market("CB")]);
    assert!(matches!(results[0], Ok(false)));
    assert_eq!(
        results[1].as_ref().unwrap_err().kind(),
        ErrorKind::TooManyMarkets
    );
}

#[test]
fn test_missing_prices() {
    let mut p = borrower_setup();
    let (alice, ca, cb) = (account("ALICE"), market("CA"), market("CB"));

    p.oracle().remove_price(&cb);
    assert_eq!(
        p.borrow(&alice, &cb, dec!(1)).unwrap_err().kind(),
        ErrorKind::PriceUnavailable
    );

    p.oracle().set_price(cb.clone(), dec!(1)).unwrap();
    p.borrow(&alice, &cb, dec!(10)).unwrap();

    // Debt that cannot be valued blocks anything that reads liquidity
    p.oracle().remove_price(&cb);
    assert_eq!(
        p.account_liquidity(&alice).unwrap_err().kind(),
        ErrorKind::PriceUnavailable
    );
    assert_eq!(
        p.redeem(&alice, &ca, dec!(1)).unwrap_err().kind(),
        ErrorKind::PriceUnavailable
    );

    // Unpriced collateral is worth nothing
    p.oracle().set_price(cb.clone(), dec!(1)).unwrap();
    p.oracle().set_price(ca.clone(), Decimal::ZERO).unwrap();
    assert_eq!(p.account_liquidity(&alice).unwrap().shortfall, dec!(10));
}

#[test]
fn test_repay_on_behalf_and_repay_all() {
    let mut p = borrower_setup();
    let (alice, bob, cb) = (account("ALICE"), account("BOB"), market("CB"));
    p.borrow(&alice, &cb, dec!(30)).unwrap();
    fund(&mut p, "CB", "BOB", dec!(100));

    let err = p
        .repay_borrow_behalf(&bob, &alice, &cb, RepayAmount::Exact(dec!(31).try_into().unwrap()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RepayExceedsBorrow);

    p.repay_borrow_behalf(&bob, &alice, &cb, RepayAmount::Exact(dec!(10).try_into().unwrap()))
        .unwrap();
    let outcome = p.repay_borrow_behalf(&bob, &alice, &cb, RepayAmount::All).unwrap();
    assert_eq!(outcome.amount, dec!(20));
    assert_eq!(p.borrow_balance(&cb, &alice).unwrap(), Decimal::ZERO);
    assert_eq!(p.underlying_balance(&cb, &bob).unwrap(), dec!(70));
    assert_eq!(p.underlying_balance(&cb, &alice).unwrap(), dec!(30));
}

#[test]
fn test_share_transfer() {
    let mut p = borrower_setup();
    let (alice, bob, ca) = (account("ALICE"), account("BOB"), market("CA"));

    p.transfer(&alice, &bob, &ca, dec!(40)).unwrap();
    assert_eq!(p.supply_shares(&ca, &alice).unwrap(), dec!(60));
    assert_eq!(p.supply_shares(&ca, &bob).unwrap(), dec!(40));
    assert_eq!(p.total_supply(&ca).unwrap(), dec!(100));

    assert_eq!(
        p.transfer(&bob, &bob, &ca, dec!(1)).unwrap_err().kind(),
        ErrorKind::InvalidAmount
    );
    assert_eq!(
        p.transfer(&bob, &alice, &ca, dec!(41)).unwrap_err().kind(),
        ErrorKind::InsufficientBalance
    );
}

#[test]
fn test_admin_setters_validate() {
    let mut p = borrower_setup();
    let ca = market("CA");

    let err = p.set_collateral_factor(&ca, dec!(0.95)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    assert_eq!(p.config().risk.collateral_factor(&ca), dec!(0.5));

    assert_eq!(p.set_close_factor(dec!(0.01)).unwrap_err().kind(), ErrorKind::InvalidConfig);
    assert_eq!(
        p.set_liquidation_incentive(dec!(0.9)).unwrap_err().kind(),
        ErrorKind::InvalidConfig
    );
    assert_eq!(
        p.set_reserve_factor(&market("ZZ"), dec!(0.1)).unwrap_err().kind(),
        ErrorKind::MarketNotListed
    );

    p.set_collateral_factor(&ca, dec!(0.75)).unwrap();
    assert_eq!(p.account_liquidity(&account("ALICE")).unwrap().excess, dec!(75));

    let last = &p.events().last().unwrap().event;
    assert_eq!(
        last,
        &ProtocolEvent::config_updated("collateral_factor", Some(&ca), dec!(0.75))
    );
}

#[test]
fn test_list_market_and_reserves() {
    let mut p = protocol_with(&[("CA", dec!(0.5), dec!(1))]);
    let cc = market("CC");

    p.advance_periods(7).unwrap();
    p.list_market(cc.clone(), MarketParams::default(), dec!(0.6)).unwrap();
    assert_eq!(p.market(&cc).unwrap().accrual_period(), 7);
    assert_eq!(
        p.list_market(cc.clone(), MarketParams::default(), dec!(0.6)).unwrap_err().kind(),
        ErrorKind::InvalidConfig
    );

    fund(&mut p, "CC", "ADMIN", dec!(5));
    p.add_reserves(&cc, &account("ADMIN"), dec!(5)).unwrap();
    assert_eq!(p.total_reserves(&cc).unwrap(), dec!(5));

    assert_eq!(
        p.reduce_reserves(&cc, dec!(6), &account("TREASURY")).unwrap_err().kind(),
        ErrorKind::InvalidAmount
    );
    let left = p.reduce_reserves(&cc, dec!(2), &account("TREASURY")).unwrap();
    assert_eq!(left, dec!(3));
    assert_eq!(p.underlying_balance(&cc, &account("TREASURY")).unwrap(), dec!(2));
    p.check_invariants().unwrap();
}

#[test]
fn test_clock_cannot_go_backwards() {
    let mut p = protocol_with(&[("CA", dec!(0.5), dec!(1))]);
    p.set_period(10).unwrap();
    assert_eq!(p.set_period(9).unwrap_err().kind(), ErrorKind::PeriodRegression);
    assert_eq!(p.advance_periods(5).unwrap(), 15);
}

#[test]
fn test_event_journal_is_sequenced() {
    let p = borrower_setup();
    let events = p.events();
    for (index, recorded) in events.iter().enumerate() {
        assert_eq!(recorded.sequence, index as u64 + 1);
    }
    let names: Vec<&str> = events.iter().map(|e| e.event.name()).collect();
    assert_eq!(
        names,
        vec!["market_listed", "market_listed", "mint", "mint", "market_entered"]
    );
}

const CONFIG: &str = r#"{
    "markets": { "CA": { "reserve_factor": "0.1" }, "CB": {} },
    "risk": { "collateral_factors": { "CA": "0.5" } }
}"#;

const SCENARIO: &str = r#"{
    "config": {
        "markets": { "CA": {}, "CB": {} },
        "risk": { "collateral_factors": { "CA": "0.5" } }
    },
    "prices": { "CA": "1", "CB": "1" },
    "balances": [
        { "market": "CA", "account": "ALICE", "amount": "100" },
        { "market": "CB", "account": "LENDER", "amount": "1000" },
        { "market": "CB", "account": "BOB", "amount": "100" }
    ],
    "steps": [
        { "action": "mint", "account": "LENDER", "market": "CB", "amount": "1000" },
        { "action": "mint", "account": "ALICE", "market": "CA", "amount": "100" },
        { "action": "enter_markets", "account": "ALICE", "markets": ["CA"] },
        { "action": "borrow", "account": "ALICE", "market": "CB", "amount": "50" },
        { "action": "set_price", "market": "CA", "price": "0.8" },
        { "action": "liquidate", "liquidator": "BOB", "borrower": "ALICE",
          "repay_market": "CB", "amount": "30", "collateral_market": "CA",
          "expect_error": "too_much_repay" },
        { "action": "liquidate", "liquidator": "BOB", "borrower": "ALICE",
          "repay_market": "CB", "amount": "25", "collateral_market": "CA" }
    ]
}"#;

#[test]
fn test_cli_check_config() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(&path, CONFIG).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_bilend"))
        .arg("check-config")
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("2 markets"));

    let bad = temp_dir.path().join("bad.json");
    std::fs::write(&bad, r#"{"risk":{"close_factor":"2"}}"#).unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_bilend"))
        .arg("check-config")
        .arg(&bad)
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_cli_simulate_json() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("scenario.json");
    std::fs::write(&path, SCENARIO).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_bilend"))
        .args(["simulate", "--json"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["steps"].as_array().unwrap().len(), 7);
    assert_eq!(report["steps"][5]["error"], "too_much_repay");

    let alice = report["accounts"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["account"] == "ALICE")
        .unwrap();
    let excess: Decimal = alice["liquidity"]["excess"].as_str().unwrap().parse().unwrap();
    assert_eq!(excess, dec!(1.5));
}
