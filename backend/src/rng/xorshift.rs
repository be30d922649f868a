//! xorshift64* random number generator
//!
//! xorshift64* passes TestU01's BigCrush with 64 bits of state, which is
//! plenty for agent decision sampling.
//!
//! # Determinism
//!
//! Same seed → same sequence of draws. Replaying a run, restoring a
//! checkpoint and comparing strategies against each other all depend on it.

use serde::{Deserialize, Serialize};

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use rebase_simulator_core::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let fraction = rng.next_f64();
/// assert!((0.0..1.0).contains(&fraction));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngManager {
    state: u64,
}

impl RngManager {
    /// Create a new RNG with given seed
    ///
    /// A zero seed is replaced by 1 (xorshift has an all-zero fixed point).
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Generate next random u64 value
    pub fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Get current RNG state (for checkpointing/replay)
    ///
    /// `RngManager::new(rng.get_state())` resumes the exact same sequence.
    pub fn get_state(&self) -> u64 {
        self.state
    }

    /// Generate random f64 in range [0.0, 1.0)
    pub fn next_f64(&mut self) -> f64 {
        let value = self.next();
        (value >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Generate random f64 in range [low, high)
    pub fn uniform(&mut self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64()
    }

    /// Pick an index with probability proportional to its weight
    ///
    /// Non-positive and non-finite weights are never picked. Returns `None`
    /// when no weight is positive. Consumes exactly one draw otherwise.
    ///
    /// # Example
    /// ```
    /// use rebase_simulator_core::RngManager;
    ///
    /// let mut rng = RngManager::new(7);
    /// assert_eq!(rng.weighted_index(&[0.0, 3.0, 0.0]), Some(1));
    /// assert_eq!(rng.weighted_index(&[]), None);
    /// ```
    pub fn weighted_index(&mut self, weights: &[f64]) -> Option<usize> {
        let usable = |w: f64| if w.is_finite() && w > 0.0 { w } else { 0.0 };
        let total: f64 = weights.iter().map(|&w| usable(w)).sum();
        if total <= 0.0 {
            return None;
        }

        let mut target = self.next_f64() * total;
        let mut last_positive = None;
        for (index, &weight) in weights.iter().enumerate() {
            let weight = usable(weight);
            if weight <= 0.0 {
                continue;
            }
            if target < weight {
                return Some(index);
            }
            target -= weight;
            last_positive = Some(index);
        }
        // Rounding can leave target a hair above the final bucket
        last_positive
    }
}
