//! Rebase Simulator Core
//!
//! Deterministic simulation of an elastic-supply stablecoin: a
//! constant-product market, a protocol that expands or contracts supply
//! around a peg with debt and coupons, and agents acting on stochastic
//! strategies.
//!
//! # Architecture
//!
//! - **core**: Block clock
//! - **models**: Domain types (Market, Protocol, Agent, Value, events, state)
//! - **policy**: Action feasibility, strategies and weighted selection
//! - **ports**: Backend traits the orchestrator drives the market and protocol through
//! - **orchestrator**: Main simulation loop, metrics and checkpoints
//! - **rng**: Deterministic random number generation
//!
//! # Critical Invariants
//!
//! 1. All randomness is deterministic (seeded RNG)
//! 2. Agents act strictly one after another
//! 3. Contract violations abort the run; only backend outages are skipped

// Module declarations
pub mod core;
pub mod models;
pub mod orchestrator;
pub mod policy;
pub mod ports;
pub mod rng;

// Re-exports for convenience
pub use crate::core::time::BlockClock;
pub use models::{
    agent::{Agent, AgentError, Asset},
    event::{Event, EventLog},
    market::{Market, PEG_PRICE},
    protocol::{Phase, Protocol, ProtocolError, ProtocolParams},
    state::SimulationState,
    value::{Value, ValueError},
};
pub use orchestrator::{
    AgentConfig, MetricsRecord, MetricsSink, Orchestrator, RunSummary, SimulationConfig,
    SimulationError, TickResult,
};
pub use policy::{Action, Strategy, StrategyConfig};
pub use ports::{BackendError, MarketBackend, ProtocolBackend};
pub use rng::RngManager;
