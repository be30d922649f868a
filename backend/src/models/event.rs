//! Event logging for simulation replay and analysis.
//!
//! Every state change the orchestrator makes is recorded as an `Event`
//! stamped with the block it happened in. Events are logged in execution
//! order, so the log doubles as a trace of which agent saw which state.
//!
//! # Event Types
//!
//! - **Epoch**: epoch advances (with the phase decided)
//! - **Trade**: buys and sells against the market
//! - **Bonding**: bonds, unbonds and unbond releases
//! - **Liquidity**: LP deposits and withdrawals
//! - **Coupon**: purchases, redemptions and expiry sweeps
//! - **Agent**: idle agents and actions skipped after a backend failure

use crate::models::protocol::Phase;
use crate::policy::Action;

/// Simulation event capturing a state change.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// An agent advanced the protocol epoch
    EpochAdvanced {
        block: u64,
        agent_id: String,
        epoch: i64,
        phase: Phase,
        price: f64,
        reward: f64,
    },

    Bought {
        block: u64,
        agent_id: String,
        stable_in: f64,
        tokens_out: f64,
    },

    Sold {
        block: u64,
        agent_id: String,
        tokens_in: f64,
        stable_out: f64,
    },

    Bonded {
        block: u64,
        agent_id: String,
        tokens: f64,
        shares: f64,
    },

    Unbonded {
        block: u64,
        agent_id: String,
        shares: f64,
        tokens: f64,
        release_epoch: i64,
    },

    /// Unbonded tokens became spendable
    UnbondReleased {
        block: u64,
        agent_id: String,
        tokens: f64,
    },

    LiquidityAdded {
        block: u64,
        agent_id: String,
        tokens: f64,
        stable: f64,
        shares: f64,
    },

    LiquidityRemoved {
        block: u64,
        agent_id: String,
        shares: f64,
        tokens: f64,
        stable: f64,
    },

    CouponsPurchased {
        block: u64,
        agent_id: String,
        epoch: i64,
        underlying: f64,
        premium: f64,
    },

    CouponsRedeemed {
        block: u64,
        agent_id: String,
        issue_epoch: i64,
        underlying: f64,
        premium: f64,
        payout: f64,
    },

    /// Periodic sweep destroyed expired coupon value
    CouponsExpired { block: u64, amount: f64 },

    /// Agent had no feasible action this tick
    AgentIdle { block: u64, agent_id: String },

    /// A backend call failed; the agent's ledger was left untouched
    ActionSkipped {
        block: u64,
        agent_id: String,
        action: Action,
        reason: String,
    },
}

impl Event {
    /// Block in which this event occurred
    pub fn block(&self) -> u64 {
        match self {
            Event::EpochAdvanced { block, .. }
            | Event::Bought { block, .. }
            | Event::Sold { block, .. }
            | Event::Bonded { block, .. }
            | Event::Unbonded { block, .. }
            | Event::UnbondReleased { block, .. }
            | Event::LiquidityAdded { block, .. }
            | Event::LiquidityRemoved { block, .. }
            | Event::CouponsPurchased { block, .. }
            | Event::CouponsRedeemed { block, .. }
            | Event::CouponsExpired { block, .. }
            | Event::AgentIdle { block, .. }
            | Event::ActionSkipped { block, .. } => *block,
        }
    }

    /// Short name of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::EpochAdvanced { .. } => "EpochAdvanced",
            Event::Bought { .. } => "Bought",
            Event::Sold { .. } => "Sold",
            Event::Bonded { .. } => "Bonded",
            Event::Unbonded { .. } => "Unbonded",
            Event::UnbondReleased { .. } => "UnbondReleased",
            Event::LiquidityAdded { .. } => "LiquidityAdded",
            Event::LiquidityRemoved { .. } => "LiquidityRemoved",
            Event::CouponsPurchased { .. } => "CouponsPurchased",
            Event::CouponsRedeemed { .. } => "CouponsRedeemed",
            Event::CouponsExpired { .. } => "CouponsExpired",
            Event::AgentIdle { .. } => "AgentIdle",
            Event::ActionSkipped { .. } => "ActionSkipped",
        }
    }

    /// Agent ID if the event relates to a specific agent
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            Event::EpochAdvanced { agent_id, .. }
            | Event::Bought { agent_id, .. }
            | Event::Sold { agent_id, .. }
            | Event::Bonded { agent_id, .. }
            | Event::Unbonded { agent_id, .. }
            | Event::UnbondReleased { agent_id, .. }
            | Event::LiquidityAdded { agent_id, .. }
            | Event::LiquidityRemoved { agent_id, .. }
            | Event::CouponsPurchased { agent_id, .. }
            | Event::CouponsRedeemed { agent_id, .. }
            | Event::AgentIdle { agent_id, .. }
            | Event::ActionSkipped { agent_id, .. } => Some(agent_id),
            Event::CouponsExpired { .. } => None,
        }
    }
}

/// Event log for storing and querying simulation events.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Events recorded in a given block
    pub fn events_at_block(&self, block: u64) -> Vec<&Event> {
        self.events.iter().filter(|e| e.block() == block).collect()
    }

    /// Events of a specific type
    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Events for a specific agent
    pub fn events_for_agent(&self, agent_id: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.agent_id() == Some(agent_id))
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
