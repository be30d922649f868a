//! Orchestrator - main simulation loop
//!
//! Owns the market, the protocol, the agents and the RNG, and advances
//! them one block per tick.
//!
//! # Tick Loop
//!
//! 1. Advance the block counter
//! 2. Sweep expired coupons (protocol ledgers, then agent claims)
//! 3. Release pending unbonds that have reached their epoch
//! 4. For each agent, in fixed order: list feasible actions, weigh them
//!    with the agent's strategy, draw one, size it and execute it
//!
//! Each agent observes the market and protocol exactly as the previous
//! agent left them.
//!
//! # Failures
//!
//! Contract violations and agent overdrafts abort the tick with
//! `SimulationError::ActionFailed`. A recoverable backend outage skips the
//! acting agent for this tick; its ledger is left as it was.
//!
//! # Determinism
//!
//! All randomness is via `rng_manager` with seeded xorshift64*.
//! Same seed + same config = identical results.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

use crate::core::time::BlockClock;
use crate::models::agent::Agent;
use crate::models::event::{Event, EventLog};
use crate::models::market::Market;
use crate::models::protocol::{Protocol, ProtocolParams};
use crate::models::state::SimulationState;
use crate::orchestrator::actions::{self, ActionError};
use crate::orchestrator::metrics::{MetricsRecord, MetricsSink};
use crate::policy::{choose_action, feasible_actions, Action, MarketView, Strategy, StrategyConfig};
use crate::ports::{MarketBackend, ProtocolBackend};
use crate::rng::RngManager;

// ============================================================================
// Configuration Types
// ============================================================================

fn default_faith_period() -> u64 {
    5000
}

fn default_max_commitment() -> f64 {
    0.1
}

/// Complete run configuration, fixed at construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// RNG seed for deterministic simulation
    pub rng_seed: u64,

    /// One entry per agent, in acting order
    pub agent_configs: Vec<AgentConfig>,

    #[serde(default)]
    pub protocol: ProtocolParams,

    /// Period of the sinusoidal faith signal
    #[serde(default = "default_faith_period")]
    pub faith_period_blocks: u64,

    /// Upper bound of the random fraction committed per action
    #[serde(default = "default_max_commitment")]
    pub max_commitment: f64,
}

/// Per-agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub starting_stable: f64,
    pub starting_eth: f64,
    #[serde(default)]
    pub starting_tokens: f64,
    #[serde(default)]
    pub min_faith: f64,
    #[serde(default)]
    pub max_faith: f64,
    #[serde(default)]
    pub use_faith: bool,
    #[serde(default)]
    pub strategy: StrategyConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            starting_stable: 1000.0,
            starting_eth: 1.0,
            starting_tokens: 0.0,
            min_faith: 0.5e6,
            max_faith: 1e6,
            use_faith: false,
            strategy: StrategyConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// `num_agents` identical agents with 1000 stable and 1 ETH each
    pub fn uniform(num_agents: usize, rng_seed: u64) -> Self {
        Self {
            rng_seed,
            agent_configs: vec![AgentConfig::default(); num_agents],
            protocol: ProtocolParams::default(),
            faith_period_blocks: default_faith_period(),
            max_commitment: default_max_commitment(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, SimulationError> {
        serde_json::from_str(json).map_err(|e| SimulationError::Serialization(format!("Invalid config: {}", e)))
    }

    /// Reject configurations the simulation cannot run
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.agent_configs.is_empty() {
            return Err(SimulationError::InvalidConfig(
                "at least one agent is required".to_string(),
            ));
        }
        if self.protocol.min_epoch_length == 0 {
            return Err(SimulationError::InvalidConfig(
                "min_epoch_length must be positive".to_string(),
            ));
        }
        if self.faith_period_blocks == 0 {
            return Err(SimulationError::InvalidConfig(
                "faith_period_blocks must be positive".to_string(),
            ));
        }
        let commitment_ok = self.max_commitment > 0.0 && self.max_commitment <= 1.0;
        if !commitment_ok {
            return Err(SimulationError::InvalidConfig(format!(
                "max_commitment must be in (0, 1], got {}",
                self.max_commitment
            )));
        }

        let p = &self.protocol;
        let rates = [
            ("advance_fee", p.advance_fee),
            ("advance_reward", p.advance_reward),
            ("interest_rate", p.interest_rate),
            ("max_growth_rate", p.max_growth_rate),
            ("contraction_rate", p.contraction_rate),
        ];
        for (name, value) in rates {
            if !value.is_finite() || value < 0.0 {
                return Err(SimulationError::InvalidConfig(format!(
                    "{} must be non-negative, got {}",
                    name, value
                )));
            }
        }
        if p.unbond_delay < 0 || p.expiry_delay < 0 {
            return Err(SimulationError::InvalidConfig(
                "delays must be non-negative".to_string(),
            ));
        }

        for (index, agent) in self.agent_configs.iter().enumerate() {
            let balances = [agent.starting_stable, agent.starting_eth, agent.starting_tokens];
            if balances.iter().any(|b| !b.is_finite() || *b < 0.0) {
                return Err(SimulationError::InvalidConfig(format!(
                    "agent {} has a negative or non-finite starting balance",
                    index
                )));
            }
            if agent.min_faith.is_nan() || agent.max_faith.is_nan() || agent.min_faith > agent.max_faith {
                return Err(SimulationError::InvalidConfig(format!(
                    "agent {}: min_faith {} exceeds max_faith {}",
                    index, agent.min_faith, agent.max_faith
                )));
            }
        }

        Ok(())
    }
}

/// Identifier given to the agent at `index`
pub fn agent_id(index: usize) -> String {
    format!("agent_{:02}", index)
}

// ============================================================================
// Results and Errors
// ============================================================================

/// Result of a single tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickResult {
    pub block: u64,

    /// Epoch after all agents acted
    pub epoch: i64,

    /// True if any agent had a feasible action
    pub acted: bool,

    /// Actions executed successfully
    pub actions: usize,

    /// Actions skipped after a recoverable backend failure
    pub skipped: usize,

    /// Coupon value destroyed by this tick's expiry sweep
    pub expired: f64,

    /// Unbonded tokens released to agents this tick
    pub released: f64,
}

/// Outcome of `Orchestrator::run`
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub ticks: usize,
    pub final_block: u64,
    pub final_epoch: i64,

    /// Stopped because no agent could act
    pub quiescent: bool,

    pub actions: usize,
    pub skipped: usize,
}

/// Simulation error types
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SimulationError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Agent {agent} failed to {action} with amounts {amounts:?}: {source}")]
    ActionFailed {
        agent: String,
        action: Action,
        amounts: Vec<f64>,
        source: ActionError,
    },

    #[error("Expiry sweep failed: {0}")]
    ExpiryFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Config mismatch: checkpoint hash {expected}, config hash {actual}")]
    ConfigMismatch { expected: String, actual: String },

    #[error("Metrics sink failed: {0}")]
    Metrics(String),
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Main orchestrator managing simulation state and the tick loop
pub struct Orchestrator<M = Market, P = Protocol> {
    /// Market, protocol and agents
    pub(crate) state: SimulationState<M, P>,

    pub(crate) clock: BlockClock,

    /// Deterministic RNG
    pub(crate) rng_manager: RngManager,

    /// One strategy per agent, same order as the agents
    strategies: Vec<Box<dyn Strategy>>,

    pub(crate) config: SimulationConfig,

    event_log: EventLog,
}

impl Orchestrator<Market, Protocol> {
    /// Create an orchestrator over the in-memory market and protocol
    ///
    /// # Example
    ///
    /// ```rust
    /// use rebase_simulator_core::orchestrator::{Orchestrator, SimulationConfig};
    ///
    /// let mut orchestrator = Orchestrator::new(SimulationConfig::uniform(3, 42)).unwrap();
    /// let result = orchestrator.tick().unwrap();
    /// assert_eq!(result.block, 1);
    /// assert!(result.acted);
    /// assert_eq!(result.epoch, 0);
    /// ```
    pub fn new(config: SimulationConfig) -> Result<Self, SimulationError> {
        let opening_tokens: f64 = config.agent_configs.iter().map(|ac| ac.starting_tokens).sum();
        let protocol = Protocol::new(config.protocol.clone()).with_total_supply(opening_tokens);
        Self::with_backends(config, Market::new(), protocol)
    }
}

impl<M: MarketBackend, P: ProtocolBackend> Orchestrator<M, P> {
    /// Create an orchestrator over caller-supplied backends
    pub fn with_backends(config: SimulationConfig, market: M, protocol: P) -> Result<Self, SimulationError> {
        config.validate()?;

        let agents: Vec<Agent> = config
            .agent_configs
            .iter()
            .enumerate()
            .map(|(index, ac)| {
                Agent::new(agent_id(index), ac.starting_stable, ac.starting_eth)
                    .with_tokens(ac.starting_tokens)
                    .with_faith(ac.min_faith, ac.max_faith, ac.use_faith)
            })
            .collect();

        let strategies = config.agent_configs.iter().map(|ac| ac.strategy.build()).collect();

        Ok(Self {
            state: SimulationState::new(market, protocol, agents),
            clock: BlockClock::new(),
            rng_manager: RngManager::new(config.rng_seed),
            strategies,
            config,
            event_log: EventLog::new(),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn current_block(&self) -> u64 {
        self.clock.current_block()
    }

    pub fn state(&self) -> &SimulationState<M, P> {
        &self.state
    }

    pub fn market(&self) -> &M {
        self.state.market()
    }

    pub fn protocol(&self) -> &P {
        self.state.protocol()
    }

    pub fn agents(&self) -> &[Agent] {
        self.state.agents()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn rng_state(&self) -> u64 {
        self.rng_manager.get_state()
    }

    /// Faith target of the first agent at the current block
    pub fn overall_faith(&self) -> f64 {
        self.state
            .agents()
            .first()
            .map(|a| a.faith(self.current_block(), self.config.faith_period_blocks))
            .unwrap_or(0.0)
    }

    /// Metrics for the current state
    pub fn metrics_record(&self) -> MetricsRecord {
        MetricsRecord {
            block: self.current_block(),
            epoch: self.protocol().epoch(),
            price: self.market().price(),
            total_supply: self.protocol().total_supply(),
            total_coupons: self.protocol().total_coupons(),
            faith: self.overall_faith(),
        }
    }

    // ========================================================================
    // Tick Loop
    // ========================================================================

    /// Execute one simulation tick
    pub fn tick(&mut self) -> Result<TickResult, SimulationError> {
        let block = self.clock.advance_block();

        let (reserve_token, reserve_stable) = self.market().reserves();
        info!(
            block,
            epoch = self.protocol().epoch(),
            price = self.market().price(),
            supply = self.protocol().total_supply(),
            bonded = self.protocol().bonded_supply(),
            coupons = self.protocol().total_coupons(),
            reserve_token,
            reserve_stable,
            "tick"
        );

        let expired = self.sweep_expired(block)?;
        let released = self.release_unbonds(block);

        let mut acted = false;
        let mut actions = 0;
        let mut skipped = 0;

        for index in 0..self.state.num_agents() {
            match self.act(index, block)? {
                AgentOutcome::Idle => {}
                AgentOutcome::Executed => {
                    acted = true;
                    actions += 1;
                }
                AgentOutcome::Skipped => {
                    acted = true;
                    skipped += 1;
                }
            }
        }

        Ok(TickResult {
            block,
            epoch: self.protocol().epoch(),
            acted,
            actions,
            skipped,
            expired,
            released,
        })
    }

    /// Tick until quiescence or `max_ticks`, recording metrics after each tick
    pub fn run(&mut self, max_ticks: usize, sink: &mut dyn MetricsSink) -> Result<RunSummary, SimulationError> {
        let mut summary = RunSummary {
            ticks: 0,
            final_block: self.current_block(),
            final_epoch: self.protocol().epoch(),
            quiescent: false,
            actions: 0,
            skipped: 0,
        };

        for _ in 0..max_ticks {
            let result = self.tick()?;
            sink.record(&self.metrics_record())
                .map_err(|e| SimulationError::Metrics(e.to_string()))?;

            summary.ticks += 1;
            summary.actions += result.actions;
            summary.skipped += result.skipped;

            if !result.acted {
                info!(block = result.block, "no agent can act; stopping");
                summary.quiescent = true;
                break;
            }
        }

        summary.final_block = self.current_block();
        summary.final_epoch = self.protocol().epoch();
        Ok(summary)
    }

    /// Remove expired coupons from the protocol, then from agent ledgers
    fn sweep_expired(&mut self, block: u64) -> Result<f64, SimulationError> {
        let destroyed = match self.state.protocol_mut().expire_coupons() {
            Ok(amount) => amount,
            Err(e) if e.is_recoverable() => {
                warn!(block, error = %e, "expiry sweep skipped");
                return Ok(0.0);
            }
            Err(e) => return Err(SimulationError::ExpiryFailed(e.to_string())),
        };

        let protocol = self.state.protocol();
        let expire_all = protocol.expire_all();
        let expired_epochs: Vec<i64> = self
            .state
            .agents()
            .iter()
            .flat_map(|a| a.coupon_epochs())
            .filter(|&e| protocol.is_expired(e))
            .collect();
        for agent in self.state.agents_mut() {
            agent.expire_coupons(|e| expired_epochs.contains(&e), expire_all);
        }

        if destroyed > 0.0 {
            info!(block, destroyed, "coupons expired");
            self.event_log.log(Event::CouponsExpired {
                block,
                amount: destroyed,
            });
        }
        Ok(destroyed)
    }

    fn release_unbonds(&mut self, block: u64) -> f64 {
        let epoch = self.state.protocol().epoch();
        let mut total = 0.0;
        let mut events = Vec::new();

        for agent in self.state.agents_mut() {
            let released = agent.release_unbonded(epoch);
            if released > 0.0 {
                total += released;
                events.push(Event::UnbondReleased {
                    block,
                    agent_id: agent.id().to_string(),
                    tokens: released,
                });
            }
        }

        for event in events {
            self.event_log.log(event);
        }
        total
    }

    /// Let the agent at `index` choose and execute one action
    fn act(&mut self, index: usize, block: u64) -> Result<AgentOutcome, SimulationError> {
        let faith_period = self.config.faith_period_blocks;
        let max_commitment = self.config.max_commitment;

        let Some((agent, market, protocol)) = self.state.split_mut(index) else {
            return Ok(AgentOutcome::Idle);
        };

        let feasible = feasible_actions(agent, market, protocol, block);
        if feasible.is_empty() {
            self.event_log.log(Event::AgentIdle {
                block,
                agent_id: agent.id().to_string(),
            });
            return Ok(AgentOutcome::Idle);
        }

        let view = MarketView::observe(block, market, protocol, faith_period);
        let weights = self.strategies[index].weights(agent, &view);
        let Some(action) = choose_action(&feasible, &weights, &mut self.rng_manager) else {
            return Ok(AgentOutcome::Idle);
        };
        let fraction = self.rng_manager.uniform(0.0, max_commitment);

        // Work on a copy; the agent's ledger only changes if the action completes
        let mut trial = agent.clone();
        match actions::execute(action, &mut trial, market, protocol, block, fraction) {
            Ok(events) => {
                *agent = trial;
                for event in events {
                    if let Event::EpochAdvanced { epoch, phase, price, .. } = &event {
                        info!(block, epoch, ?phase, price, agent = agent.id(), "epoch advanced");
                    }
                    self.event_log.log(event);
                }
                Ok(AgentOutcome::Executed)
            }
            Err(failure) if failure.error.is_recoverable() => {
                warn!(
                    block,
                    agent = agent.id(),
                    %action,
                    error = %failure.error,
                    "action skipped"
                );
                self.event_log.log(Event::ActionSkipped {
                    block,
                    agent_id: agent.id().to_string(),
                    action,
                    reason: failure.error.to_string(),
                });
                Ok(AgentOutcome::Skipped)
            }
            Err(failure) => Err(SimulationError::ActionFailed {
                agent: agent.id().to_string(),
                action,
                amounts: failure.amounts,
                source: failure.error,
            }),
        }
    }
}

/// What one agent did in a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgentOutcome {
    Idle,
    Executed,
    Skipped,
}

impl<M: fmt::Debug, P: fmt::Debug> fmt::Debug for Orchestrator<M, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("block", &self.clock.current_block())
            .field("rng_state", &self.rng_manager.get_state())
            .field("state", &self.state)
            .field("strategies", &self.strategies)
            .finish()
    }
}
