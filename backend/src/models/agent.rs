//! Agent (market participant) model
//!
//! Each agent holds:
//! - Token, stable and ETH balances (ETH pays epoch advance fees)
//! - Bonding shares and LP shares
//! - Unbonded tokens waiting to unlock, keyed by release epoch
//! - Coupon claims (underlying and premium), keyed by issue epoch
//! - A "faith" band: its belief about the fair market cap of the token
//!
//! Agent state changes only through the actions the orchestrator executes
//! on its behalf.
//!
//! CRITICAL: An agent's coupon entries never exceed the protocol's own
//! ledger for the same epoch.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;
use thiserror::Error;

use crate::models::protocol::DUST;

/// Slack allowed when debiting an amount computed from the balance itself
const DEBIT_TOLERANCE: f64 = 1e-9;

/// Balances an agent can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Asset {
    Token,
    Stable,
    Eth,
    BondingShares,
    LpShares,
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Asset::Token => "token",
            Asset::Stable => "stable",
            Asset::Eth => "eth",
            Asset::BondingShares => "bonding shares",
            Asset::LpShares => "lp shares",
        };
        f.write_str(name)
    }
}

/// Errors that can occur during agent operations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AgentError {
    #[error("Insufficient {asset}: required {required}, available {available}")]
    InsufficientBalance {
        asset: Asset,
        required: f64,
        available: f64,
    },

    #[error("Invalid {asset} amount: {amount}")]
    InvalidAmount { asset: Asset, amount: f64 },
}

/// A simulated market participant
///
/// # Example
/// ```
/// use rebase_simulator_core::{Agent, Asset};
///
/// let mut agent = Agent::new("agent_00".to_string(), 1000.0, 1.0);
/// agent.debit(Asset::Stable, 250.0).unwrap();
/// agent.credit(Asset::Token, 240.0);
/// assert_eq!(agent.balance(Asset::Stable), 750.0);
/// assert_eq!(agent.balance(Asset::Token), 240.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    id: String,

    token_balance: f64,
    stable_balance: f64,
    eth_balance: f64,
    bonding_shares: f64,
    lp_shares: f64,

    /// Unbonded tokens by release epoch
    pending_unbond: BTreeMap<i64, f64>,

    /// Underlying coupon claims by issue epoch
    underlying_coupons: BTreeMap<i64, f64>,

    /// Premium coupon claims by issue epoch
    premium_coupons: BTreeMap<i64, f64>,

    min_faith: f64,
    max_faith: f64,
    use_faith: bool,
}

impl Agent {
    /// Create an agent holding only stable and ETH, with faith disabled
    pub fn new(id: String, stable_balance: f64, eth_balance: f64) -> Self {
        Self {
            id,
            token_balance: 0.0,
            stable_balance,
            eth_balance,
            bonding_shares: 0.0,
            lp_shares: 0.0,
            pending_unbond: BTreeMap::new(),
            underlying_coupons: BTreeMap::new(),
            premium_coupons: BTreeMap::new(),
            min_faith: 0.0,
            max_faith: 0.0,
            use_faith: false,
        }
    }

    /// Set the faith band and enable faith-driven trading
    ///
    /// # Panics
    /// Panics if `min_faith > max_faith`
    pub fn with_faith(mut self, min_faith: f64, max_faith: f64, use_faith: bool) -> Self {
        assert!(min_faith <= max_faith, "min_faith must not exceed max_faith");
        self.min_faith = min_faith;
        self.max_faith = max_faith;
        self.use_faith = use_faith;
        self
    }

    /// Seed an opening token balance
    pub fn with_tokens(mut self, token_balance: f64) -> Self {
        self.token_balance = token_balance;
        self
    }

    // ========================================================================
    // Balances
    // ========================================================================

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn balance(&self, asset: Asset) -> f64 {
        match asset {
            Asset::Token => self.token_balance,
            Asset::Stable => self.stable_balance,
            Asset::Eth => self.eth_balance,
            Asset::BondingShares => self.bonding_shares,
            Asset::LpShares => self.lp_shares,
        }
    }

    fn slot(&mut self, asset: Asset) -> &mut f64 {
        match asset {
            Asset::Token => &mut self.token_balance,
            Asset::Stable => &mut self.stable_balance,
            Asset::Eth => &mut self.eth_balance,
            Asset::BondingShares => &mut self.bonding_shares,
            Asset::LpShares => &mut self.lp_shares,
        }
    }

    /// Add to a balance. Non-positive or non-finite amounts are ignored.
    pub fn credit(&mut self, asset: Asset, amount: f64) {
        if amount.is_finite() && amount > 0.0 {
            *self.slot(asset) += amount;
        }
    }

    /// Remove from a balance
    ///
    /// An overshoot within floating-point slack clamps the balance at zero.
    pub fn debit(&mut self, asset: Asset, amount: f64) -> Result<(), AgentError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(AgentError::InvalidAmount { asset, amount });
        }
        let available = self.balance(asset);
        if amount > available + DEBIT_TOLERANCE * available.max(1.0) {
            return Err(AgentError::InsufficientBalance {
                asset,
                required: amount,
                available,
            });
        }
        let slot = self.slot(asset);
        *slot = (*slot - amount).max(0.0);
        Ok(())
    }

    // ========================================================================
    // Delayed unbonding
    // ========================================================================

    pub fn pending_unbond(&self) -> &BTreeMap<i64, f64> {
        &self.pending_unbond
    }

    /// Total tokens still locked in unbonding
    pub fn pending_total(&self) -> f64 {
        self.pending_unbond.values().sum()
    }

    /// Schedule `amount` tokens to unlock at `release_epoch`
    pub fn add_pending_unbond(&mut self, release_epoch: i64, amount: f64) {
        if amount > DUST {
            *self.pending_unbond.entry(release_epoch).or_insert(0.0) += amount;
        }
    }

    /// Move every entry due at or before `current_epoch` into the token balance
    ///
    /// Returns the amount released.
    pub fn release_unbonded(&mut self, current_epoch: i64) -> f64 {
        let still_locked = self.pending_unbond.split_off(&(current_epoch + 1));
        let released: f64 = self.pending_unbond.values().sum();
        self.pending_unbond = still_locked;
        self.credit(Asset::Token, released);
        released
    }

    // ========================================================================
    // Coupons
    // ========================================================================

    pub fn underlying_coupons(&self) -> &BTreeMap<i64, f64> {
        &self.underlying_coupons
    }

    pub fn premium_coupons(&self) -> &BTreeMap<i64, f64> {
        &self.premium_coupons
    }

    /// Total coupon claims held (underlying plus premium)
    pub fn total_coupons(&self) -> f64 {
        self.underlying_coupons.values().sum::<f64>() + self.premium_coupons.values().sum::<f64>()
    }

    pub fn has_coupons(&self) -> bool {
        !self.underlying_coupons.is_empty() || !self.premium_coupons.is_empty()
    }

    /// Issue epochs with any claim, oldest first
    pub fn coupon_epochs(&self) -> Vec<i64> {
        let mut epochs: Vec<i64> = self
            .underlying_coupons
            .keys()
            .chain(self.premium_coupons.keys())
            .copied()
            .collect();
        epochs.sort_unstable();
        epochs.dedup();
        epochs
    }

    /// Claims held for one issue epoch as `(underlying, premium)`
    pub fn coupons_at(&self, epoch: i64) -> (f64, f64) {
        (
            self.underlying_coupons.get(&epoch).copied().unwrap_or(0.0),
            self.premium_coupons.get(&epoch).copied().unwrap_or(0.0),
        )
    }

    pub fn add_coupons(&mut self, epoch: i64, underlying: f64, premium: f64) {
        if underlying > DUST {
            *self.underlying_coupons.entry(epoch).or_insert(0.0) += underlying;
        }
        if premium > DUST {
            *self.premium_coupons.entry(epoch).or_insert(0.0) += premium;
        }
    }

    /// Remove redeemed claims, pruning entries that reach dust
    pub fn remove_coupons(&mut self, epoch: i64, underlying: f64, premium: f64) {
        for (ledger, amount) in [
            (&mut self.underlying_coupons, underlying),
            (&mut self.premium_coupons, premium),
        ] {
            if let Some(balance) = ledger.get_mut(&epoch) {
                *balance -= amount;
                if *balance <= DUST {
                    ledger.remove(&epoch);
                }
            }
        }
    }

    /// Drop claims the protocol has expired; returns the amount dropped
    pub fn expire_coupons<F>(&mut self, is_expired: F, expire_all: bool) -> f64
    where
        F: Fn(i64) -> bool,
    {
        let mut dropped = 0.0;
        self.premium_coupons.retain(|&epoch, amount| {
            if is_expired(epoch) {
                dropped += *amount;
                false
            } else {
                true
            }
        });
        if expire_all {
            self.underlying_coupons.retain(|&epoch, amount| {
                if is_expired(epoch) {
                    dropped += *amount;
                    false
                } else {
                    true
                }
            });
        }
        dropped
    }

    // ========================================================================
    // Faith
    // ========================================================================

    pub fn use_faith(&self) -> bool {
        self.use_faith
    }

    pub fn min_faith(&self) -> f64 {
        self.min_faith
    }

    pub fn max_faith(&self) -> f64 {
        self.max_faith
    }

    /// Market cap (in stable) this agent believes is fair at `block`
    ///
    /// Oscillates sinusoidally between `min_faith` and `max_faith` with a
    /// period of `period_blocks`.
    pub fn faith(&self, block: u64, period_blocks: u64) -> f64 {
        let center = (self.max_faith + self.min_faith) / 2.0;
        let swing = (self.max_faith - self.min_faith) / 2.0;
        let period = period_blocks.max(1) as f64;
        center + swing * (block as f64 * (2.0 * PI / period)).sin()
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Agent({}, token={:.2}, stable={:.2}, eth={}, bonded_shares={:.2}, lp={:.4}, coupons={:.2})",
            self.id,
            self.token_balance,
            self.stable_balance,
            self.eth_balance,
            self.bonding_shares,
            self.lp_shares,
            self.total_coupons()
        )
    }
}
