//! Tests for the constant-product market

use proptest::prelude::*;
use rebase_simulator_core::{Market, PEG_PRICE};

fn seeded(tokens: f64, stable: f64) -> Market {
    let mut market = Market::new();
    market.deposit(tokens, stable);
    market
}

fn close(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance * a.abs().max(b.abs()).max(1.0)
}

#[test]
fn test_first_deposit_mints_one_share() {
    let mut market = Market::new();
    let shares = market.deposit(100.0, 100.0);
    assert_eq!(shares, 1.0);
    assert_eq!(market.total_shares(), 1.0);
    assert_eq!(market.price(), 1.0);
}

#[test]
fn test_buy_scenario() {
    let mut market = seeded(100.0, 100.0);
    let tokens = market.buy(50.0);
    let expected = 100.0 - (100.0 * 100.0) / 150.0;
    assert!((tokens - expected).abs() < 1e-9);
    assert!((tokens - 33.333333).abs() < 1e-6);
    assert_eq!(market.reserve_stable(), 150.0);
}

#[test]
fn test_sell_is_symmetric_to_buy() {
    let mut market = seeded(100.0, 100.0);
    let stable = market.sell(50.0);
    assert!((stable - 33.333333).abs() < 1e-6);
    assert!(market.price() < PEG_PRICE);
}

#[test]
fn test_empty_pool_guards() {
    let mut market = Market::new();
    assert!(!market.operational());
    assert_eq!(market.price(), PEG_PRICE);
    assert_eq!(market.buy(10.0), 0.0);
    assert_eq!(market.sell(10.0), 0.0);
    assert_eq!(market.withdraw(1.0), (0.0, 0.0));
    assert_eq!(market.total_shares(), 0.0);
}

#[test]
fn test_second_deposit_is_proportional() {
    let mut market = seeded(100.0, 200.0);
    // Price is 2; adding 10% of the pool value mints 10% more shares
    let shares = market.deposit(10.0, 20.0);
    assert!((shares - 0.1).abs() < 1e-12);
}

#[test]
fn test_partial_withdraw() {
    let mut market = seeded(100.0, 100.0);
    market.deposit(100.0, 100.0);
    let (tokens, stable) = market.withdraw(1.0);
    assert!((tokens - 100.0).abs() < 1e-9);
    assert!((stable - 100.0).abs() < 1e-9);
    assert!((market.total_shares() - 1.0).abs() < 1e-12);
}

proptest! {
    #[test]
    fn prop_swaps_preserve_product(
        tokens in 1.0f64..1e6,
        stable in 1.0f64..1e6,
        trades in prop::collection::vec((any::<bool>(), 0.0f64..1e5), 1..30),
    ) {
        let mut market = seeded(tokens, stable);
        let k = market.product();
        for (is_buy, amount) in trades {
            if is_buy {
                market.buy(amount);
            } else {
                market.sell(amount);
            }
            prop_assert!(close(market.product(), k, 1e-9));
            prop_assert!(market.reserve_token() > 0.0);
            prop_assert!(market.reserve_stable() > 0.0);
        }
    }

    #[test]
    fn prop_deposit_withdraw_round_trip(
        tokens in 1.0f64..1e6,
        stable in 1.0f64..1e6,
        added in 0.01f64..1e5,
    ) {
        let mut market = seeded(tokens, stable);
        let shares_before = market.total_shares();
        let price = market.price();

        let minted = market.deposit(added, added * price);
        let (out_tokens, out_stable) = market.withdraw(minted);

        prop_assert!(close(out_tokens, added, 1e-9));
        prop_assert!(close(out_stable, added * price, 1e-9));
        prop_assert!(close(market.reserve_token(), tokens, 1e-9));
        prop_assert!(close(market.reserve_stable(), stable, 1e-9));
        prop_assert!(close(market.total_shares(), shares_before, 1e-9));
    }
}
