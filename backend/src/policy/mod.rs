//! Agent Strategy Module
//!
//! Decides which action an agent takes each tick.
//!
//! # Overview
//!
//! A decision has three stages:
//! 1. **Feasibility**: `feasible_actions()` lists what the agent can do
//!    given its balances and the market/protocol state.
//! 2. **Weighting**: the agent's `Strategy` builds a fresh `ActionWeights`
//!    table. Actions the strategy does not mention weigh 1.0.
//! 3. **Selection**: `choose_action()` makes one weighted draw from the
//!    feasible list using the orchestrator's RNG.
//!
//! The size of the chosen action is a random fraction of what the agent
//! holds, dust-adjusted by `portion_dedusted()`.
//!
//! # Strategies
//!
//! 1. **Peg**: bonds and redeems above peg, unbonds and buys coupons
//!    below it, optionally trading against its faith in the market cap
//! 2. **Basic**: only prefers bonding above peg
//!
//! ```rust
//! use rebase_simulator_core::policy::{Action, ActionWeights};
//!
//! let mut weights = ActionWeights::new();
//! weights.set(Action::Bond, 2.0);
//! assert_eq!(weights.get(Action::Bond), 2.0);
//! assert_eq!(weights.get(Action::Sell), 1.0);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::agent::{Agent, Asset};
use crate::models::protocol::DUST;
use crate::ports::{MarketBackend, ProtocolBackend};
use crate::rng::RngManager;

pub mod basic;
pub mod peg;

pub use basic::BasicStrategy;
pub use peg::PegStrategy;

/// Weight given to actions a strategy leaves unlisted
pub const NEUTRAL_WEIGHT: f64 = 1.0;

/// Remainder at or below which a commitment takes the whole balance
pub const DUST_REMAINDER: f64 = 1.0;

// ============================================================================
// Actions
// ============================================================================

/// Everything an agent can do in one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Spend stable for tokens
    Buy,
    /// Sell tokens for stable
    Sell,
    /// Pay the fee to advance the protocol epoch
    Advance,
    /// Lock tokens into the bonding pool
    Bond,
    /// Burn bonding shares; tokens unlock after the unbond delay
    Unbond,
    /// Provide liquidity at the current price
    Deposit,
    /// Burn LP shares
    Withdraw,
    /// Burn tokens for coupons while contracting
    Coupon,
    /// Redeem coupons oldest first
    Redeem,
}

impl Action {
    /// All actions, in feasibility-check order
    pub const ALL: [Action; 9] = [
        Action::Buy,
        Action::Sell,
        Action::Advance,
        Action::Bond,
        Action::Unbond,
        Action::Deposit,
        Action::Withdraw,
        Action::Coupon,
        Action::Redeem,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Advance => "advance",
            Action::Bond => "bond",
            Action::Unbond => "unbond",
            Action::Deposit => "deposit",
            Action::Withdraw => "withdraw",
            Action::Coupon => "coupon",
            Action::Redeem => "redeem",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Weight table
// ============================================================================

/// Action weights for one decision
///
/// Built fresh per decision; unlisted actions weigh `NEUTRAL_WEIGHT`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionWeights {
    weights: BTreeMap<Action, f64>,
}

impl ActionWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, action: Action) -> f64 {
        self.weights.get(&action).copied().unwrap_or(NEUTRAL_WEIGHT)
    }

    /// Set the weight of an action
    ///
    /// # Panics
    /// Panics if `weight` is not a positive finite number
    pub fn set(&mut self, action: Action, weight: f64) {
        assert!(
            weight.is_finite() && weight > 0.0,
            "action weight must be positive and finite"
        );
        self.weights.insert(action, weight);
    }

    /// Multiply the current weight (neutral if unset) by `factor`
    pub fn scale(&mut self, action: Action, factor: f64) {
        let scaled = self.get(action) * factor;
        self.set(action, scaled);
    }

    /// Weights for `actions`, in the same order
    pub fn for_actions(&self, actions: &[Action]) -> Vec<f64> {
        actions.iter().map(|&a| self.get(a)).collect()
    }
}

// ============================================================================
// Strategy interface
// ============================================================================

/// What a strategy can observe about the system at decision time
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketView {
    pub block: u64,
    pub price: f64,
    pub total_supply: f64,
    pub epoch: i64,
    pub is_expanding: bool,
    /// Period of the agents' faith oscillation
    pub faith_period_blocks: u64,
}

impl MarketView {
    /// Capture the view from live backends
    pub fn observe<M: MarketBackend, P: ProtocolBackend>(
        block: u64,
        market: &M,
        protocol: &P,
        faith_period_blocks: u64,
    ) -> Self {
        Self {
            block,
            price: market.price(),
            total_supply: protocol.total_supply(),
            epoch: protocol.epoch(),
            is_expanding: protocol.is_expanding(),
            faith_period_blocks,
        }
    }

    /// Market capitalization in stable
    pub fn market_cap(&self) -> f64 {
        self.price * self.total_supply
    }
}

/// Maps system state to action weights for one agent
pub trait Strategy: fmt::Debug {
    fn weights(&self, agent: &Agent, view: &MarketView) -> ActionWeights;

    fn name(&self) -> &'static str;
}

/// Strategy selection in the run configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyConfig {
    #[default]
    Peg,
    Basic,
}

impl StrategyConfig {
    pub fn build(&self) -> Box<dyn Strategy> {
        match self {
            StrategyConfig::Peg => Box::new(PegStrategy),
            StrategyConfig::Basic => Box::new(BasicStrategy),
        }
    }
}

// ============================================================================
// Feasibility and selection
// ============================================================================

/// Actions `agent` can take right now, in `Action::ALL` order
pub fn feasible_actions<M, P>(agent: &Agent, market: &M, protocol: &P, block: u64) -> Vec<Action>
where
    M: MarketBackend,
    P: ProtocolBackend,
{
    let tokens = agent.balance(Asset::Token);
    let stable = agent.balance(Asset::Stable);
    let operational = market.operational();

    Action::ALL
        .into_iter()
        .filter(|action| match action {
            Action::Buy => stable > DUST && operational,
            Action::Sell => tokens > DUST && operational,
            Action::Advance => {
                agent.balance(Asset::Eth) >= protocol.fee() && protocol.can_advance(block)
            }
            Action::Bond => tokens > DUST,
            Action::Unbond => agent.balance(Asset::BondingShares) > DUST,
            Action::Deposit => tokens > DUST && stable > DUST,
            Action::Withdraw => agent.balance(Asset::LpShares) > DUST,
            Action::Coupon => tokens > DUST && protocol.couponable(tokens) > DUST,
            Action::Redeem => has_redeemable(agent, protocol),
        })
        .collect()
}

/// True if any of the agent's coupons are payable now
pub fn has_redeemable<P: ProtocolBackend>(agent: &Agent, protocol: &P) -> bool {
    agent.coupon_epochs().into_iter().any(|epoch| {
        let (underlying, premium) = agent.coupons_at(epoch);
        !protocol.redeemable(epoch, underlying, premium).is_zero()
    })
}

/// One weighted draw over `feasible`; `None` if nothing is feasible
pub fn choose_action(feasible: &[Action], weights: &ActionWeights, rng: &mut RngManager) -> Option<Action> {
    if feasible.is_empty() {
        return None;
    }
    let index = rng.weighted_index(&weights.for_actions(feasible))?;
    feasible.get(index).copied()
}

/// Commit `fraction` of `total`, or all of it if the rest would be dust
///
/// ```rust
/// use rebase_simulator_core::policy::portion_dedusted;
///
/// assert_eq!(portion_dedusted(100.0, 0.05), 5.0);
/// assert_eq!(portion_dedusted(1.5, 0.05), 1.5);
/// ```
pub fn portion_dedusted(total: f64, fraction: f64) -> f64 {
    let portion = fraction * total;
    if total - portion <= DUST_REMAINDER {
        total
    } else {
        portion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::market::Market;
    use crate::models::protocol::{Protocol, ProtocolParams};

    #[test]
    fn test_fresh_agent_can_only_advance() {
        let agent = Agent::new("a".to_string(), 1000.0, 1.0);
        let market = Market::new();
        let protocol = Protocol::new(ProtocolParams::default());

        let feasible = feasible_actions(&agent, &market, &protocol, 1);
        assert_eq!(feasible, vec![Action::Advance]);
    }

    #[test]
    fn test_no_eth_no_advance() {
        let agent = Agent::new("a".to_string(), 1000.0, 0.0);
        let market = Market::new();
        let protocol = Protocol::new(ProtocolParams::default());

        assert!(feasible_actions(&agent, &market, &protocol, 1).is_empty());
    }

    #[test]
    fn test_choose_action_empty() {
        let mut rng = RngManager::new(1);
        assert_eq!(choose_action(&[], &ActionWeights::new(), &mut rng), None);
    }

    #[test]
    fn test_choose_single_feasible() {
        let mut rng = RngManager::new(1);
        let mut weights = ActionWeights::new();
        weights.set(Action::Sell, 0.01);
        assert_eq!(
            choose_action(&[Action::Sell], &weights, &mut rng),
            Some(Action::Sell)
        );
    }

    #[test]
    fn test_scale_from_neutral() {
        let mut weights = ActionWeights::new();
        weights.scale(Action::Unbond, 2.0);
        assert_eq!(weights.get(Action::Unbond), 2.0);
    }

    #[test]
    #[should_panic(expected = "action weight must be positive")]
    fn test_zero_weight_rejected() {
        ActionWeights::new().set(Action::Buy, 0.0);
    }

    #[test]
    fn test_action_serde_names() {
        let json = serde_json::to_string(&Action::Redeem).unwrap();
        assert_eq!(json, "\"redeem\"");
    }
}
