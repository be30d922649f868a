//! Orchestrator - main simulation loop
//!
//! See `engine.rs` for the tick loop, `actions.rs` for how each action
//! moves balances, `metrics.rs` for per-tick output and `checkpoint.rs`
//! for save/restore.

pub mod actions;
pub mod checkpoint;
pub mod engine;
pub mod metrics;

// Re-export main types for convenience
pub use actions::{ActionError, ActionFailure};
pub use checkpoint::{compute_config_hash, StateSnapshot};
pub use engine::{
    agent_id, AgentConfig, Orchestrator, RunSummary, SimulationConfig, SimulationError, TickResult,
};
pub use metrics::{MetricsRecord, MetricsRecorder, MetricsSink, TsvMetricsWriter, TSV_HEADER};
