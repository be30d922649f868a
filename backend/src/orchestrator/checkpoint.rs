//! Checkpoint - Save/Load Simulation State
//!
//! Serializes the complete in-memory simulation so a run can be paused
//! and resumed.
//!
//! # Critical Invariants
//!
//! - **Determinism**: a restored run continues exactly like the original
//!   (the RNG state is saved, not just the seed)
//! - **Config Matching**: a snapshot only loads with the config it was
//!   taken under

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::time::BlockClock;
use crate::models::agent::Agent;
use crate::models::market::Market;
use crate::models::protocol::Protocol;
use crate::models::state::SimulationState;
use crate::orchestrator::engine::{Orchestrator, SimulationConfig, SimulationError};
use crate::rng::RngManager;

// ============================================================================
// Snapshot Structures
// ============================================================================

/// Complete orchestrator state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub block: u64,

    /// RNG state at time of snapshot (CRITICAL for determinism)
    pub rng_state: u64,

    pub market: Market,

    pub protocol: Protocol,

    /// Agents in acting order
    pub agents: Vec<Agent>,

    /// SHA256 hash of the config the run was started with
    pub config_hash: String,
}

// ============================================================================
// Config Hashing
// ============================================================================

/// Compute deterministic SHA256 hash of config
///
/// Object keys are sorted before hashing so field order never matters.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, SimulationError> {
    use serde_json::Value;
    use std::collections::BTreeMap;

    let value = serde_json::to_value(config)
        .map_err(|e| SimulationError::Serialization(format!("Config serialization failed: {}", e)))?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value))
        .map_err(|e| SimulationError::Serialization(format!("Config serialization failed: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// Save / Load
// ============================================================================

impl Orchestrator<Market, Protocol> {
    /// Capture the current state
    pub fn snapshot(&self) -> Result<StateSnapshot, SimulationError> {
        Ok(StateSnapshot {
            block: self.clock.current_block(),
            rng_state: self.rng_manager.get_state(),
            market: self.state.market().clone(),
            protocol: self.state.protocol().clone(),
            agents: self.state.agents().to_vec(),
            config_hash: compute_config_hash(&self.config)?,
        })
    }

    /// Serialize the current state to JSON
    pub fn save_state(&self) -> Result<String, SimulationError> {
        serde_json::to_string(&self.snapshot()?)
            .map_err(|e| SimulationError::Serialization(format!("Snapshot serialization failed: {}", e)))
    }

    /// Restore a run from `save_state` output
    ///
    /// Fails with `ConfigMismatch` if `config` is not the config the
    /// snapshot was taken under. The event log starts empty.
    pub fn load_state(config: SimulationConfig, json: &str) -> Result<Self, SimulationError> {
        let snapshot: StateSnapshot = serde_json::from_str(json)
            .map_err(|e| SimulationError::Serialization(format!("Snapshot deserialization failed: {}", e)))?;
        Self::from_snapshot(config, snapshot)
    }

    pub fn from_snapshot(config: SimulationConfig, snapshot: StateSnapshot) -> Result<Self, SimulationError> {
        let actual = compute_config_hash(&config)?;
        if actual != snapshot.config_hash {
            return Err(SimulationError::ConfigMismatch {
                expected: snapshot.config_hash,
                actual,
            });
        }
        if snapshot.agents.len() != config.agent_configs.len() {
            return Err(SimulationError::InvalidConfig(format!(
                "snapshot has {} agents, config has {}",
                snapshot.agents.len(),
                config.agent_configs.len()
            )));
        }

        let mut orchestrator = Self::new(config)?;
        orchestrator.state = SimulationState::new(snapshot.market, snapshot.protocol, snapshot.agents);
        orchestrator.clock = BlockClock::at_block(snapshot.block);
        orchestrator.rng_manager = RngManager::new(snapshot.rng_state);
        Ok(orchestrator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_config_hash_deterministic() {
        let config = SimulationConfig::uniform(4, 99);
        assert_eq!(
            compute_config_hash(&config).unwrap(),
            compute_config_hash(&config.clone()).unwrap()
        );
    }

    #[test]
    fn test_compute_config_hash_different_for_different_configs() {
        let a = SimulationConfig::uniform(4, 99);
        let b = SimulationConfig::uniform(4, 100);
        assert_ne!(compute_config_hash(&a).unwrap(), compute_config_hash(&b).unwrap());
    }
}
