//! Block clock for the simulation
//!
//! The simulation advances in discrete blocks. Every tick of the
//! orchestrator moves the clock forward by exactly one block; the
//! protocol measures epoch eligibility in blocks elapsed.

use serde::{Deserialize, Serialize};

/// Tracks the current block height of the simulated chain
///
/// # Example
/// ```
/// use rebase_simulator_core::BlockClock;
///
/// let mut clock = BlockClock::new();
/// assert_eq!(clock.current_block(), 0);
///
/// clock.advance_block();
/// assert_eq!(clock.current_block(), 1);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockClock {
    /// Blocks elapsed since simulation start
    current_block: u64,
}

impl BlockClock {
    /// Create a clock at block 0
    pub fn new() -> Self {
        Self { current_block: 0 }
    }

    /// Create a clock positioned at a given block (checkpoint restore)
    pub fn at_block(block: u64) -> Self {
        Self {
            current_block: block,
        }
    }

    /// Advance by one block and return the new height
    pub fn advance_block(&mut self) -> u64 {
        self.current_block += 1;
        self.current_block
    }

    /// Current block height
    pub fn current_block(&self) -> u64 {
        self.current_block
    }

    /// Blocks elapsed since `block` (zero if `block` is in the future)
    pub fn blocks_since(&self, block: u64) -> u64 {
        self.current_block.saturating_sub(block)
    }
}
