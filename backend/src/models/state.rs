//! Simulation State
//!
//! Owns the market, the protocol and the ordered list of agents. Nothing
//! here is shared outside the orchestrator; agents act one at a time in
//! list order, each observing the state the previous agent left behind.
//!
//! # Critical Invariants
//!
//! 1. Agent order is fixed for the whole run
//! 2. Agent coupon claims never exceed the protocol's coupon ledgers

use crate::models::agent::Agent;
use crate::ports::{MarketBackend, ProtocolBackend};

/// Complete simulation state
#[derive(Debug, Clone)]
pub struct SimulationState<M, P> {
    market: M,
    protocol: P,
    agents: Vec<Agent>,
}

impl<M: MarketBackend, P: ProtocolBackend> SimulationState<M, P> {
    pub fn new(market: M, protocol: P, agents: Vec<Agent>) -> Self {
        Self {
            market,
            protocol,
            agents,
        }
    }

    pub fn market(&self) -> &M {
        &self.market
    }

    pub fn market_mut(&mut self) -> &mut M {
        &mut self.market
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub fn protocol_mut(&mut self) -> &mut P {
        &mut self.protocol
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut [Agent] {
        &mut self.agents
    }

    pub fn num_agents(&self) -> usize {
        self.agents.len()
    }

    pub fn get_agent(&self, id: &str) -> Option<&Agent> {
        self.agents.iter().find(|a| a.id() == id)
    }

    /// Split borrow: one agent plus the shared market and protocol
    pub fn split_mut(&mut self, index: usize) -> Option<(&mut Agent, &mut M, &mut P)> {
        let agent = self.agents.get_mut(index)?;
        Some((agent, &mut self.market, &mut self.protocol))
    }

    /// Tokens held by agents, locked in unbonding, or sitting in the pool
    ///
    /// Together with the bonded supply this accounts for every token the
    /// protocol has minted.
    pub fn circulating_tokens(&self) -> f64 {
        let held: f64 = self
            .agents
            .iter()
            .map(|a| a.balance(crate::models::agent::Asset::Token) + a.pending_total())
            .sum();
        held + self.market.reserves().0
    }

    /// Coupon claims held across all agents
    pub fn agent_coupon_total(&self) -> f64 {
        self.agents.iter().map(|a| a.total_coupons()).sum()
    }
}
