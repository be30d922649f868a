//! Tests for action feasibility, weighting and selection

use rebase_simulator_core::policy::{
    choose_action, feasible_actions, has_redeemable, portion_dedusted, Action, ActionWeights,
    MarketView, Strategy, StrategyConfig,
};
use rebase_simulator_core::{Agent, Asset, Market, Protocol, ProtocolParams, RngManager};

fn running_market() -> Market {
    let mut market = Market::new();
    market.deposit(1000.0, 1000.0);
    market
}

fn started_protocol(price: f64) -> Protocol {
    let mut protocol = Protocol::new(ProtocolParams::default());
    let fee = protocol.fee();
    protocol.advance(0, fee, price).unwrap();
    protocol
}

#[test]
fn test_feasibility_follows_balances() {
    let market = running_market();
    let protocol = started_protocol(1.0);
    let mut agent = Agent::new("a".to_string(), 100.0, 0.0).with_tokens(50.0);
    agent.credit(Asset::LpShares, 0.5);
    agent.credit(Asset::BondingShares, 5.0);

    let feasible = feasible_actions(&agent, &market, &protocol, 1);
    assert_eq!(
        feasible,
        vec![
            Action::Buy,
            Action::Sell,
            Action::Bond,
            Action::Unbond,
            Action::Deposit,
            Action::Withdraw,
        ]
    );
}

#[test]
fn test_trading_needs_operational_market() {
    let market = Market::new();
    let protocol = started_protocol(1.0);
    let agent = Agent::new("a".to_string(), 100.0, 0.0).with_tokens(50.0);

    let feasible = feasible_actions(&agent, &market, &protocol, 1);
    assert!(!feasible.contains(&Action::Buy));
    assert!(!feasible.contains(&Action::Sell));
    assert!(feasible.contains(&Action::Deposit));
}

#[test]
fn test_advance_needs_fee_and_epoch_gap() {
    let market = running_market();
    let protocol = started_protocol(1.0);
    let agent = Agent::new("a".to_string(), 0.0, 1.0);

    assert!(!feasible_actions(&agent, &market, &protocol, 5).contains(&Action::Advance));
    assert!(feasible_actions(&agent, &market, &protocol, 10).contains(&Action::Advance));

    let broke = Agent::new("b".to_string(), 0.0, 0.0001);
    assert!(!feasible_actions(&broke, &market, &protocol, 10).contains(&Action::Advance));
}

#[test]
fn test_coupon_needs_debt() {
    let market = running_market();
    let mut protocol = started_protocol(0.5);
    let agent = Agent::new("a".to_string(), 0.0, 0.0).with_tokens(50.0);

    // First contracting epoch accrues debt on zero supply
    assert!(!feasible_actions(&agent, &market, &protocol, 10).contains(&Action::Coupon));

    let fee = protocol.fee();
    protocol.advance(10, fee, 0.5).unwrap();
    assert!(feasible_actions(&agent, &market, &protocol, 11).contains(&Action::Coupon));
}

#[test]
fn test_redeem_needs_payable_coupon() {
    let params = ProtocolParams {
        min_epoch_length: 1,
        ..Default::default()
    };
    let mut protocol = Protocol::new(params);
    let fee = protocol.fee();
    protocol.advance(0, fee, 0.5).unwrap();
    protocol.bond(500.0).unwrap();
    protocol.advance(1, fee, 0.5).unwrap();
    let issue = protocol.coupon(protocol.debt()).unwrap();

    let mut agent = Agent::new("a".to_string(), 0.0, 0.0);
    agent.add_coupons(issue.epoch, issue.underlying, issue.premium);
    assert!(!has_redeemable(&agent, &protocol));

    protocol.advance(2, fee, 1.5).unwrap();
    assert!(!has_redeemable(&agent, &protocol));
    protocol.advance(3, fee, 1.5).unwrap();
    assert!(has_redeemable(&agent, &protocol));

    let market = running_market();
    assert!(feasible_actions(&agent, &market, &protocol, 4).contains(&Action::Redeem));
}

#[test]
fn test_choice_is_deterministic_per_seed() {
    let feasible = [Action::Buy, Action::Sell, Action::Bond];
    let weights = ActionWeights::new();

    let draws = |seed: u64| -> Vec<Action> {
        let mut rng = RngManager::new(seed);
        (0..50)
            .filter_map(|_| choose_action(&feasible, &weights, &mut rng))
            .collect()
    };
    assert_eq!(draws(11), draws(11));
    assert_eq!(draws(11).len(), 50);
}

#[test]
fn test_heavy_weight_dominates() {
    let feasible = [Action::Bond, Action::Redeem];
    let mut weights = ActionWeights::new();
    weights.set(Action::Redeem, 100.0);

    let mut rng = RngManager::new(8);
    let redeems = (0..1000)
        .filter(|_| choose_action(&feasible, &weights, &mut rng) == Some(Action::Redeem))
        .count();
    assert!(redeems > 950, "redeems: {}", redeems);
}

#[test]
fn test_portion_dedusted() {
    assert_eq!(portion_dedusted(1000.0, 0.1), 100.0);
    // Remainder of exactly one unit is dust
    assert_eq!(portion_dedusted(2.0, 0.5), 2.0);
    assert_eq!(portion_dedusted(0.5, 0.01), 0.5);
    assert_eq!(portion_dedusted(0.0, 0.05), 0.0);
}

#[test]
fn test_strategy_config_builds_named_strategies() {
    let agent = Agent::new("a".to_string(), 0.0, 0.0);
    let view = MarketView {
        block: 0,
        price: 1.1,
        total_supply: 100.0,
        epoch: 4,
        is_expanding: true,
        faith_period_blocks: 5000,
    };

    let peg = StrategyConfig::Peg.build();
    assert_eq!(peg.name(), "peg");
    assert_eq!(peg.weights(&agent, &view).get(Action::Redeem), 100.0);

    let basic = StrategyConfig::Basic.build();
    assert_eq!(basic.name(), "basic");
    assert_eq!(basic.weights(&agent, &view).get(Action::Redeem), 1.0);
    assert_eq!(basic.weights(&agent, &view).get(Action::Bond), 2.0);
}
