//! Backend failure handling
//!
//! Wraps the in-memory backends in adapters that fail on demand, the way a
//! chain adapter would on a dropped RPC call, and checks that the
//! orchestrator skips or aborts as the failure kind requires.

use rebase_simulator_core::models::protocol::{CouponIssue, Redemption, Unbonding};
use rebase_simulator_core::orchestrator::actions::execute;
use rebase_simulator_core::orchestrator::{ActionError, AgentConfig, Orchestrator, SimulationConfig, SimulationError};
use rebase_simulator_core::ports::BackendResult;
use rebase_simulator_core::{
    Action, Agent, Asset, BackendError, Event, Market, MarketBackend, Protocol, ProtocolBackend, ProtocolError,
    ProtocolParams,
};

// ============================================================================
// Failing adapters
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum Failure {
    Unavailable,
    Contract,
}

impl Failure {
    fn error(self) -> BackendError {
        match self {
            Failure::Unavailable => BackendError::Unavailable("rpc timeout".to_string()),
            Failure::Contract => BackendError::Contract(ProtocolError::InvalidAmount(-1.0)),
        }
    }
}

/// Fails `remaining` calls to operation `op` once `pass` calls have gone
/// through, delegates everything else
#[derive(Debug)]
struct Flaky<T> {
    inner: T,
    op: &'static str,
    failure: Failure,
    pass: usize,
    remaining: usize,
}

impl<T> Flaky<T> {
    fn new(inner: T, op: &'static str, failure: Failure, remaining: usize) -> Self {
        Self {
            inner,
            op,
            failure,
            pass: 0,
            remaining,
        }
    }

    /// Let the first `calls` calls to the operation succeed
    fn after(mut self, calls: usize) -> Self {
        self.pass = calls;
        self
    }

    /// Never fails
    fn reliable(inner: T) -> Self {
        Self::new(inner, "", Failure::Unavailable, 0)
    }

    fn check(&mut self, op: &'static str) -> BackendResult<()> {
        if op != self.op {
            return Ok(());
        }
        if self.pass > 0 {
            self.pass -= 1;
            return Ok(());
        }
        if self.remaining > 0 {
            self.remaining -= 1;
            return Err(self.failure.error());
        }
        Ok(())
    }
}

impl MarketBackend for Flaky<Market> {
    fn operational(&self) -> bool {
        self.inner.operational()
    }

    fn price(&self) -> f64 {
        self.inner.price()
    }

    fn reserves(&self) -> (f64, f64) {
        MarketBackend::reserves(&self.inner)
    }

    fn total_shares(&self) -> f64 {
        self.inner.total_shares()
    }

    fn buy(&mut self, stable_in: f64) -> BackendResult<f64> {
        self.check("buy")?;
        MarketBackend::buy(&mut self.inner, stable_in)
    }

    fn sell(&mut self, tokens_in: f64) -> BackendResult<f64> {
        self.check("sell")?;
        MarketBackend::sell(&mut self.inner, tokens_in)
    }

    fn deposit(&mut self, token_amount: f64, stable_amount: f64) -> BackendResult<f64> {
        self.check("deposit")?;
        MarketBackend::deposit(&mut self.inner, token_amount, stable_amount)
    }

    fn withdraw(&mut self, shares: f64) -> BackendResult<(f64, f64)> {
        self.check("withdraw")?;
        MarketBackend::withdraw(&mut self.inner, shares)
    }
}

impl ProtocolBackend for Flaky<Protocol> {
    fn epoch(&self) -> i64 {
        self.inner.epoch()
    }

    fn is_expanding(&self) -> bool {
        self.inner.is_expanding()
    }

    fn total_supply(&self) -> f64 {
        self.inner.total_supply()
    }

    fn bonded_supply(&self) -> f64 {
        self.inner.bonded_supply()
    }

    fn debt(&self) -> f64 {
        self.inner.debt()
    }

    fn redeemable_budget(&self) -> f64 {
        self.inner.redeemable_budget()
    }

    fn total_coupons(&self) -> f64 {
        self.inner.total_coupons()
    }

    fn fee(&self) -> f64 {
        self.inner.fee()
    }

    fn expire_all(&self) -> bool {
        self.inner.params().expire_all
    }

    fn is_expired(&self, issue_epoch: i64) -> bool {
        self.inner.is_expired(issue_epoch)
    }

    fn can_advance(&self, block: u64) -> bool {
        self.inner.can_advance(block)
    }

    fn advance(&mut self, block: u64, fee: f64, price: f64) -> BackendResult<f64> {
        self.check("advance")?;
        ProtocolBackend::advance(&mut self.inner, block, fee, price)
    }

    fn bond(&mut self, amount: f64) -> BackendResult<f64> {
        self.check("bond")?;
        ProtocolBackend::bond(&mut self.inner, amount)
    }

    fn unbond(&mut self, shares: f64) -> BackendResult<Unbonding> {
        self.check("unbond")?;
        ProtocolBackend::unbond(&mut self.inner, shares)
    }

    fn couponable(&self, amount: f64) -> f64 {
        self.inner.couponable(amount)
    }

    fn coupon(&mut self, amount: f64) -> BackendResult<CouponIssue> {
        self.check("coupon")?;
        ProtocolBackend::coupon(&mut self.inner, amount)
    }

    fn redeemable(&self, issue_epoch: i64, underlying: f64, premium: f64) -> Redemption {
        self.inner.redeemable(issue_epoch, underlying, premium)
    }

    fn redeem(&mut self, issue_epoch: i64, underlying: f64, premium: f64) -> BackendResult<f64> {
        self.check("redeem")?;
        ProtocolBackend::redeem(&mut self.inner, issue_epoch, underlying, premium)
    }

    fn expire_coupons(&mut self) -> BackendResult<f64> {
        self.check("expire_coupons")?;
        ProtocolBackend::expire_coupons(&mut self.inner)
    }
}

fn single_agent(stable: f64, eth: f64) -> SimulationConfig {
    SimulationConfig {
        agent_configs: vec![AgentConfig {
            starting_stable: stable,
            starting_eth: eth,
            ..Default::default()
        }],
        ..SimulationConfig::uniform(0, 11)
    }
}

fn seeded_market() -> Market {
    let mut market = Market::new();
    market.deposit(1000.0, 1000.0);
    market
}

// ============================================================================
// Recoverable failures
// ============================================================================

#[test]
fn test_unavailable_advance_is_skipped_then_retried() {
    let protocol = Flaky::new(Protocol::new(ProtocolParams::default()), "advance", Failure::Unavailable, 1);
    let mut orchestrator =
        Orchestrator::with_backends(single_agent(0.0, 1.0), Flaky::reliable(Market::new()), protocol).unwrap();

    let first = orchestrator.tick().unwrap();
    assert!(first.acted);
    assert_eq!(first.actions, 0);
    assert_eq!(first.skipped, 1);

    // Ledger untouched: the fee was debited on the trial copy only
    let agent = &orchestrator.agents()[0];
    assert_eq!(agent.balance(Asset::Eth), 1.0);
    assert_eq!(agent.balance(Asset::Token), 0.0);
    assert_eq!(orchestrator.protocol().epoch(), -1);

    let skipped = orchestrator.event_log().events_of_type("ActionSkipped");
    assert_eq!(skipped.len(), 1);
    assert!(matches!(skipped[0], Event::ActionSkipped { action: Action::Advance, reason, .. }
        if reason.contains("rpc timeout")));

    let second = orchestrator.tick().unwrap();
    assert_eq!(second.actions, 1);
    assert_eq!(second.epoch, 0);
    let agent = &orchestrator.agents()[0];
    assert!((agent.balance(Asset::Eth) - 0.999).abs() < 1e-12);
    assert_eq!(agent.balance(Asset::Token), 1000.0);
}

#[test]
fn test_unavailable_buy_leaves_market_and_agent_untouched() {
    let market = Flaky::new(seeded_market(), "buy", Failure::Unavailable, 1);
    let protocol = Flaky::reliable(Protocol::new(ProtocolParams::default()));
    // No ETH and no tokens: buying is the only thing this agent can do
    let mut orchestrator = Orchestrator::with_backends(single_agent(500.0, 0.0), market, protocol).unwrap();

    let result = orchestrator.tick().unwrap();
    assert_eq!(result.skipped, 1);
    assert_eq!(orchestrator.agents()[0].balance(Asset::Stable), 500.0);
    assert_eq!(orchestrator.agents()[0].balance(Asset::Token), 0.0);
    assert_eq!(orchestrator.market().reserves(), (1000.0, 1000.0));

    let result = orchestrator.tick().unwrap();
    assert_eq!(result.actions, 1);
    let agent = &orchestrator.agents()[0];
    assert!(agent.balance(Asset::Stable) < 500.0);
    assert!(agent.balance(Asset::Token) > 0.0);
}

#[test]
fn test_unavailable_sweep_does_not_stop_the_tick() {
    let protocol = Flaky::new(
        Protocol::new(ProtocolParams::default()),
        "expire_coupons",
        Failure::Unavailable,
        1,
    );
    let mut orchestrator =
        Orchestrator::with_backends(single_agent(0.0, 1.0), Flaky::reliable(Market::new()), protocol).unwrap();

    let result = orchestrator.tick().unwrap();
    assert_eq!(result.expired, 0.0);
    assert_eq!(result.actions, 1);
    assert!(orchestrator.event_log().events_of_type("ActionSkipped").is_empty());
}

#[test]
fn test_intermittent_failures_keep_balances_consistent() {
    let config = SimulationConfig::uniform(10, 404);
    let market = Flaky::new(Market::new(), "sell", Failure::Unavailable, 25);
    let protocol = Flaky::new(Protocol::new(ProtocolParams::default()), "bond", Failure::Unavailable, 25);
    let mut orchestrator = Orchestrator::with_backends(config, market, protocol).unwrap();

    let mut total_skipped = 0;
    for _ in 0..300 {
        total_skipped += orchestrator.tick().unwrap().skipped;
    }
    assert_eq!(
        total_skipped,
        orchestrator.event_log().events_of_type("ActionSkipped").len()
    );
    assert!(total_skipped <= 50);

    let agents = orchestrator.agents();
    let (reserve_token, reserve_stable) = orchestrator.market().reserves();
    let protocol = &orchestrator.protocol().inner;

    let stable: f64 = agents.iter().map(|a| a.balance(Asset::Stable)).sum();
    assert!((stable + reserve_stable - 10_000.0).abs() < 1e-6);

    let tokens: f64 = agents
        .iter()
        .map(|a| a.balance(Asset::Token) + a.pending_total())
        .sum();
    let supply = protocol.total_supply();
    assert!((tokens + reserve_token + protocol.bonded_supply() - supply).abs() <= 1e-6 * supply.max(1.0));
}

/// Expanding protocol at epoch 4 whose budget covers 5-token coupons from
/// epochs 1 and 2, plus the agent holding them
fn funded_coupons() -> (Protocol, Agent) {
    let params = ProtocolParams {
        min_epoch_length: 1,
        ..Default::default()
    };
    let mut protocol = Protocol::new(params);
    let fee = protocol.fee();
    let mut agent = Agent::new("agent_00".to_string(), 0.0, 0.0);

    protocol.advance(0, fee, 0.5).unwrap();
    protocol.bond(500.0).unwrap();
    protocol.advance(1, fee, 0.5).unwrap();
    let first = protocol.coupon(5.0).unwrap();
    agent.add_coupons(first.epoch, first.underlying, first.premium);
    protocol.advance(2, fee, 0.5).unwrap();
    let second = protocol.coupon(5.0).unwrap();
    agent.add_coupons(second.epoch, second.underlying, second.premium);
    protocol.advance(3, fee, 1.5).unwrap();
    protocol.advance(4, fee, 1.5).unwrap();

    assert!(protocol.redeemable_budget() >= protocol.total_coupons() - 1e-9);
    (protocol, agent)
}

#[test]
fn test_interrupted_redeem_keeps_settled_epochs() {
    let (protocol, agent) = funded_coupons();
    let supply_before = protocol.total_supply();
    let mut protocol = Flaky::new(protocol, "redeem", Failure::Unavailable, 1).after(1);
    let mut market = Market::new();

    // Run on a copy and commit it on success, as the orchestrator does
    let mut trial = agent.clone();
    let events = execute(Action::Redeem, &mut trial, &mut market, &mut protocol, 5, 0.05).unwrap();

    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Event::CouponsRedeemed { issue_epoch: 1, .. }));
    assert_eq!(trial.coupons_at(1), (0.0, 0.0));
    assert_eq!(trial.coupons_at(2), agent.coupons_at(2));

    // Agent ledger matches the protocol's and every minted token has an owner
    for epoch in [1, 2] {
        let (held_underlying, held_premium) = trial.coupons_at(epoch);
        let ledger_underlying = protocol.inner.underlying_coupons().get(&epoch).copied().unwrap_or(0.0);
        let ledger_premium = protocol.inner.premium_coupons().get(&epoch).copied().unwrap_or(0.0);
        assert!((held_underlying - ledger_underlying).abs() < 1e-9);
        assert!((held_premium - ledger_premium).abs() < 1e-9);
    }
    let minted = protocol.total_supply() - supply_before;
    assert!((trial.balance(Asset::Token) - minted).abs() < 1e-9);

    // The adapter is back: the newer epoch redeems on the next attempt
    let events = execute(Action::Redeem, &mut trial, &mut market, &mut protocol, 6, 0.05).unwrap();
    assert_eq!(events.len(), 1);
    assert!(!trial.has_coupons());
    assert!(protocol.total_coupons() < 1e-9);
}

#[test]
fn test_redeem_unavailable_on_first_epoch_changes_nothing() {
    let (protocol, agent) = funded_coupons();
    let coupons_before = protocol.total_coupons();
    let mut protocol = Flaky::new(protocol, "redeem", Failure::Unavailable, 1);
    let mut market = Market::new();

    let mut trial = agent.clone();
    let failure = execute(Action::Redeem, &mut trial, &mut market, &mut protocol, 5, 0.05).unwrap_err();
    assert!(failure.error.is_recoverable());
    assert_eq!(protocol.total_coupons(), coupons_before);
}

#[test]
fn test_flaky_redeems_keep_ledgers_consistent_over_a_run() {
    let mut config = SimulationConfig::uniform(20, 31);
    config.protocol.min_epoch_length = 2;
    let market = Flaky::reliable(Market::new());
    let protocol = Flaky::new(Protocol::new(config.protocol.clone()), "redeem", Failure::Unavailable, 40).after(2);
    let mut orchestrator = Orchestrator::with_backends(config, market, protocol).unwrap();

    for _ in 0..300 {
        orchestrator.tick().unwrap();

        let state = orchestrator.state();
        let protocol = &state.protocol().inner;
        let (reserve_token, _) = state.market().reserves();
        assert!(state.agent_coupon_total() <= protocol.total_coupons() + 1e-6);

        let tokens: f64 = state
            .agents()
            .iter()
            .map(|a| a.balance(Asset::Token) + a.pending_total())
            .sum();
        let supply = protocol.total_supply();
        assert!((tokens + reserve_token + protocol.bonded_supply() - supply).abs() <= 1e-6 * supply.max(1.0));
    }
}

// ============================================================================
// Fatal failures
// ============================================================================

#[test]
fn test_contract_error_aborts_the_run() {
    let protocol = Flaky::new(Protocol::new(ProtocolParams::default()), "advance", Failure::Contract, 1);
    let mut orchestrator =
        Orchestrator::with_backends(single_agent(0.0, 1.0), Flaky::reliable(Market::new()), protocol).unwrap();

    match orchestrator.tick() {
        Err(SimulationError::ActionFailed {
            agent,
            action,
            amounts,
            source,
        }) => {
            assert_eq!(agent, "agent_00");
            assert_eq!(action, Action::Advance);
            assert_eq!(amounts, vec![0.001, 1.0]);
            assert_eq!(
                source,
                ActionError::Backend(BackendError::Contract(ProtocolError::InvalidAmount(-1.0)))
            );
        }
        other => panic!("expected ActionFailed, got {:?}", other),
    }
    assert_eq!(orchestrator.agents()[0].balance(Asset::Eth), 1.0);
}

#[test]
fn test_contract_error_in_sweep_is_fatal() {
    let protocol = Flaky::new(
        Protocol::new(ProtocolParams::default()),
        "expire_coupons",
        Failure::Contract,
        1,
    );
    let mut orchestrator =
        Orchestrator::with_backends(single_agent(0.0, 1.0), Flaky::reliable(Market::new()), protocol).unwrap();

    assert!(matches!(orchestrator.tick(), Err(SimulationError::ExpiryFailed(_))));
}
