//! Elastic-supply protocol (the DAO)
//!
//! Tracks the bonded pool, total token supply, epoch/phase state, debt,
//! the redeemable budget and the per-epoch coupon ledgers.
//!
//! # Phases
//!
//! `advance()` is the only transition. It reads the market price:
//!
//! - **Expanding** (price ≥ peg): the bonded pool grows at a rate that
//!   compounds over the consecutive expansion epochs, capped per epoch.
//!   Growth first tops up the redeemable budget until it covers every
//!   outstanding coupon; the rest is paid to bonders. Debt resets to 0.
//! - **Contracting** (price < peg): debt accrues as a fraction of supply.
//!
//! Every advance also mints a fixed reward for the caller.
//!
//! # Coupons
//!
//! During contraction tokens can be burned for coupons: an underlying
//! claim of the same size plus a premium of `amount × debt / supply`.
//! Coupons become payable in an expansion once they are at least two
//! epochs old, limited by the redeemable budget. Coupons older than
//! `expiry_delay` lose their premium; under `expire_all` they lose the
//! underlying too.
//!
//! # Critical Invariants
//!
//! 1. `bonded_supply ≤ total_supply`
//! 2. `redeemable_budget ≥ 0`
//! 3. Coupon ledgers never hold zero entries
//! 4. Precondition violations are returned as errors, never ignored

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::market::PEG_PRICE;

/// Coupons must be at least this many epochs old to redeem
pub const COUPON_CLIFF_EPOCHS: i64 = 2;

/// Ledger entries at or below this size are pruned
pub const DUST: f64 = 1e-9;

/// Tolerance for comparing caller-supplied amounts against limits
const AMOUNT_TOLERANCE: f64 = 1e-9;

/// Contract violations raised by the protocol
///
/// These indicate a bug in the caller (the stepper or an agent), not a
/// runtime condition to recover from.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProtocolError {
    #[error("Epoch not ready: block {block}, epoch started at block {epoch_block}, minimum length {min_epoch_length}")]
    EpochNotReady {
        block: u64,
        epoch_block: u64,
        min_epoch_length: u64,
    },

    #[error("Wrong advance fee: expected {expected}, provided {provided}")]
    WrongFee { expected: f64, provided: f64 },

    #[error("Coupon amount {requested} exceeds couponable amount {couponable}")]
    ExceedsCouponable { requested: f64, couponable: f64 },

    #[error("Redemption of ({underlying}, {premium}) at epoch {issue_epoch} exceeds redeemable ({allowed_underlying}, {allowed_premium})")]
    ExceedsRedeemable {
        issue_epoch: i64,
        underlying: f64,
        premium: f64,
        allowed_underlying: f64,
        allowed_premium: f64,
    },

    #[error("Unbonding {requested} shares but only {available} are outstanding")]
    InsufficientShares { requested: f64, available: f64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),
}

/// Market phase decided at each epoch advance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Expanding,
    Contracting,
}

/// Tunable protocol parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Blocks that must elapse between epoch advances
    pub min_epoch_length: u64,

    /// Exact ETH fee an advance must be paid with
    pub advance_fee: f64,

    /// Tokens minted to whoever advances the epoch
    pub advance_reward: f64,

    /// Base per-epoch interest compounded over an expansion
    pub interest_rate: f64,

    /// Cap on the per-epoch expansion rate
    pub max_growth_rate: f64,

    /// Debt accrued per contracting epoch, as a fraction of total supply
    pub contraction_rate: f64,

    /// Epochs an unbond waits before the tokens are spendable
    pub unbond_delay: i64,

    /// Coupon age (in epochs) past which a coupon is expired
    pub expiry_delay: i64,

    /// Strict expiry: expired coupons lose the underlying as well
    pub expire_all: bool,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            min_epoch_length: 10,
            advance_fee: 0.001,
            advance_reward: 1000.0,
            interest_rate: 0.01,
            max_growth_rate: 0.03,
            contraction_rate: 0.01,
            unbond_delay: 5,
            expiry_delay: 90,
            expire_all: false,
        }
    }
}

/// Result of unbonding: tokens owed and the epoch they unlock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Unbonding {
    pub amount: f64,
    pub release_epoch: i64,
}

/// Coupons issued by a single `coupon()` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CouponIssue {
    pub epoch: i64,
    pub underlying: f64,
    pub premium: f64,
}

/// Portion of a coupon payable right now
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Redemption {
    pub underlying: f64,
    pub premium: f64,
}

impl Redemption {
    pub fn total(&self) -> f64 {
        self.underlying + self.premium
    }

    pub fn is_zero(&self) -> bool {
        self.total() <= 0.0
    }
}

/// Elastic-supply protocol state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Protocol {
    params: ProtocolParams,

    /// Tokens locked in the bonding pool
    bonded_supply: f64,

    /// All tokens in existence (bonded or not)
    total_supply: f64,

    /// Outstanding bonding shares
    bonding_shares: f64,

    /// Current epoch; -1 before the first advance
    epoch: i64,

    /// Block at which the current epoch began
    epoch_block: u64,

    phase: Phase,

    /// First epoch of the current phase
    phase_start_epoch: i64,

    debt: f64,

    /// Tokens earmarked for coupon redemption, not yet minted
    redeemable_budget: f64,

    /// Underlying coupon claims by issue epoch
    underlying_coupons: BTreeMap<i64, f64>,

    /// Premium coupon claims by issue epoch
    premium_coupons: BTreeMap<i64, f64>,

    /// Coupon value destroyed by expiry so far
    expired_total: f64,
}

fn within(amount: f64, limit: f64) -> bool {
    amount <= limit + AMOUNT_TOLERANCE * limit.abs().max(1.0)
}

fn check_amount(amount: f64) -> Result<(), ProtocolError> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(ProtocolError::InvalidAmount(amount));
    }
    Ok(())
}

/// Subtract from a ledger entry, removing it once it reaches dust
fn debit_entry(ledger: &mut BTreeMap<i64, f64>, epoch: i64, amount: f64) {
    if let Some(balance) = ledger.get_mut(&epoch) {
        *balance -= amount;
        if *balance <= DUST {
            ledger.remove(&epoch);
        }
    }
}

fn credit_entry(ledger: &mut BTreeMap<i64, f64>, epoch: i64, amount: f64) {
    if amount > DUST {
        *ledger.entry(epoch).or_insert(0.0) += amount;
    }
}

impl Protocol {
    /// Create an uninitialized protocol at epoch -1
    pub fn new(params: ProtocolParams) -> Self {
        Self {
            params,
            bonded_supply: 0.0,
            total_supply: 0.0,
            bonding_shares: 0.0,
            epoch: -1,
            epoch_block: 0,
            phase: Phase::Contracting,
            phase_start_epoch: -1,
            debt: 0.0,
            redeemable_budget: 0.0,
            underlying_coupons: BTreeMap::new(),
            premium_coupons: BTreeMap::new(),
            expired_total: 0.0,
        }
    }

    /// Count tokens already in circulation at start (agents' opening balances)
    pub fn with_total_supply(mut self, total_supply: f64) -> Self {
        self.total_supply = total_supply.max(0.0);
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    pub fn bonded_supply(&self) -> f64 {
        self.bonded_supply
    }

    pub fn total_supply(&self) -> f64 {
        self.total_supply
    }

    pub fn bonding_shares(&self) -> f64 {
        self.bonding_shares
    }

    pub fn epoch(&self) -> i64 {
        self.epoch
    }

    pub fn epoch_block(&self) -> u64 {
        self.epoch_block
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_expanding(&self) -> bool {
        self.phase == Phase::Expanding
    }

    pub fn phase_start_epoch(&self) -> i64 {
        self.phase_start_epoch
    }

    pub fn debt(&self) -> f64 {
        self.debt
    }

    pub fn redeemable_budget(&self) -> f64 {
        self.redeemable_budget
    }

    pub fn expired_total(&self) -> f64 {
        self.expired_total
    }

    pub fn underlying_coupons(&self) -> &BTreeMap<i64, f64> {
        &self.underlying_coupons
    }

    pub fn premium_coupons(&self) -> &BTreeMap<i64, f64> {
        &self.premium_coupons
    }

    /// Sum of every outstanding underlying and premium claim
    pub fn total_coupons(&self) -> f64 {
        self.underlying_coupons.values().sum::<f64>() + self.premium_coupons.values().sum::<f64>()
    }

    /// ETH fee required to advance
    pub fn fee(&self) -> f64 {
        self.params.advance_fee
    }

    /// Whether a coupon issued at `issue_epoch` is past its expiry
    pub fn is_expired(&self, issue_epoch: i64) -> bool {
        self.epoch - issue_epoch > self.params.expiry_delay
    }

    // ========================================================================
    // Epochs
    // ========================================================================

    /// True once enough blocks have passed, or before the first epoch
    pub fn can_advance(&self, block: u64) -> bool {
        self.epoch == -1 || block.saturating_sub(self.epoch_block) >= self.params.min_epoch_length
    }

    /// Per-epoch expansion rate for the current expansion
    ///
    /// Interest compounds over the consecutive expansion epochs so far,
    /// capped at `max_growth_rate`.
    pub fn growth_rate(&self) -> f64 {
        if !self.is_expanding() {
            return 0.0;
        }
        let epochs = (self.epoch - self.phase_start_epoch + 1).max(1);
        let exponent = i32::try_from(epochs).unwrap_or(i32::MAX);
        let compounded = (1.0 + self.params.interest_rate).powi(exponent) - 1.0;
        compounded.min(self.params.max_growth_rate)
    }

    /// Advance the epoch at `block`, paying `fee`, observing market `price`
    ///
    /// Returns the reward minted to the caller.
    pub fn advance(&mut self, block: u64, fee: f64, price: f64) -> Result<f64, ProtocolError> {
        if !self.can_advance(block) {
            return Err(ProtocolError::EpochNotReady {
                block,
                epoch_block: self.epoch_block,
                min_epoch_length: self.params.min_epoch_length,
            });
        }
        if (fee - self.params.advance_fee).abs() > 1e-12 {
            return Err(ProtocolError::WrongFee {
                expected: self.params.advance_fee,
                provided: fee,
            });
        }

        self.epoch += 1;
        self.epoch_block = block;

        let phase = if price >= PEG_PRICE {
            Phase::Expanding
        } else {
            Phase::Contracting
        };
        if phase != self.phase || self.phase_start_epoch < 0 {
            self.phase_start_epoch = self.epoch;
        }
        self.phase = phase;

        match phase {
            Phase::Expanding => {
                let new_tokens = self.growth_rate() * self.bonded_supply;

                // Coupon holders are paid before bonders
                let shortfall = (self.total_coupons() - self.redeemable_budget).max(0.0);
                let to_budget = shortfall.min(new_tokens);
                self.redeemable_budget += to_budget;

                let rewards = new_tokens - to_budget;
                self.bonded_supply += rewards;
                self.total_supply += rewards;
                self.debt = 0.0;
            }
            Phase::Contracting => {
                self.debt += self.total_supply * self.params.contraction_rate;
            }
        }

        let reward = self.params.advance_reward;
        self.total_supply += reward;

        Ok(reward)
    }

    // ========================================================================
    // Bonding
    // ========================================================================

    /// Bond `amount` tokens; returns the shares minted
    pub fn bond(&mut self, amount: f64) -> Result<f64, ProtocolError> {
        check_amount(amount)?;
        let new_shares = if self.bonding_shares > 0.0 && self.bonded_supply > 0.0 {
            self.bonding_shares / self.bonded_supply * amount
        } else {
            amount
        };

        self.bonded_supply += amount;
        self.bonding_shares += new_shares;

        Ok(new_shares)
    }

    /// Burn `shares`; the released tokens unlock at `epoch + unbond_delay`
    pub fn unbond(&mut self, shares: f64) -> Result<Unbonding, ProtocolError> {
        check_amount(shares)?;
        let release_epoch = self.epoch + self.params.unbond_delay;
        if self.bonding_shares <= 0.0 {
            return Ok(Unbonding {
                amount: 0.0,
                release_epoch,
            });
        }
        if !within(shares, self.bonding_shares) {
            return Err(ProtocolError::InsufficientShares {
                requested: shares,
                available: self.bonding_shares,
            });
        }

        let amount = if shares >= self.bonding_shares {
            let all = self.bonded_supply;
            self.bonded_supply = 0.0;
            self.bonding_shares = 0.0;
            all
        } else {
            let amount = self.bonded_supply * (shares / self.bonding_shares);
            self.bonding_shares = (self.bonding_shares - shares).max(0.0);
            self.bonded_supply = (self.bonded_supply - amount).max(0.0);
            amount
        };

        Ok(Unbonding {
            amount,
            release_epoch,
        })
    }

    // ========================================================================
    // Coupons
    // ========================================================================

    /// How much of `amount` may be burned for coupons right now
    pub fn couponable(&self, amount: f64) -> f64 {
        if self.is_expanding() || amount <= 0.0 {
            return 0.0;
        }
        amount.min(self.debt).max(0.0)
    }

    /// Burn `amount` tokens for coupons tagged with the current epoch
    pub fn coupon(&mut self, amount: f64) -> Result<CouponIssue, ProtocolError> {
        check_amount(amount)?;
        let couponable = self.couponable(amount);
        if !within(amount, couponable) {
            return Err(ProtocolError::ExceedsCouponable {
                requested: amount,
                couponable,
            });
        }

        let premium = if self.total_supply > 0.0 {
            amount * self.debt / self.total_supply
        } else {
            0.0
        };

        self.total_supply = (self.total_supply - amount).max(0.0);
        self.debt = (self.debt - amount).max(0.0);
        credit_entry(&mut self.underlying_coupons, self.epoch, amount);
        credit_entry(&mut self.premium_coupons, self.epoch, premium);

        Ok(CouponIssue {
            epoch: self.epoch,
            underlying: amount,
            premium,
        })
    }

    /// Portion of a holder's `(underlying, premium)` claim payable now
    ///
    /// Zero outside expansion and before the two-epoch cliff. Underlying
    /// is paid before premium, both limited by the redeemable budget.
    /// Expired premium never pays; expired underlying pays only when
    /// `expire_all` is off.
    pub fn redeemable(&self, issue_epoch: i64, underlying: f64, premium: f64) -> Redemption {
        if !self.is_expanding() || issue_epoch + COUPON_CLIFF_EPOCHS > self.epoch {
            return Redemption::default();
        }

        let (underlying, premium) = if self.is_expired(issue_epoch) {
            let underlying = if self.params.expire_all { 0.0 } else { underlying };
            (underlying, 0.0)
        } else {
            (underlying, premium)
        };

        // A holder cannot claim more than the protocol has on its books
        let underlying = underlying
            .max(0.0)
            .min(self.underlying_coupons.get(&issue_epoch).copied().unwrap_or(0.0));
        let premium = premium
            .max(0.0)
            .min(self.premium_coupons.get(&issue_epoch).copied().unwrap_or(0.0));

        let budget = self.redeemable_budget.max(0.0);
        let pay_underlying = underlying.min(budget);
        let pay_premium = premium.min(budget - pay_underlying);

        Redemption {
            underlying: pay_underlying,
            premium: pay_premium,
        }
    }

    /// Redeem coupons issued at `issue_epoch`; returns tokens minted
    ///
    /// On an expired coupon the portions that no longer pay (all premium,
    /// and the underlying under `expire_all`) are struck from the ledgers
    /// and counted in `expired_total` instead of being paid.
    pub fn redeem(&mut self, issue_epoch: i64, underlying: f64, premium: f64) -> Result<f64, ProtocolError> {
        check_amount(underlying)?;
        check_amount(premium)?;
        if underlying == 0.0 && premium == 0.0 {
            return Ok(0.0);
        }

        let expired = self.is_expired(issue_epoch);
        let burns_underlying = expired && self.params.expire_all;
        let held_underlying = self.underlying_coupons.get(&issue_epoch).copied().unwrap_or(0.0);
        let held_premium = self.premium_coupons.get(&issue_epoch).copied().unwrap_or(0.0);

        let (pay_underlying, burn_underlying) = if burns_underlying {
            (0.0, underlying)
        } else {
            (underlying, 0.0)
        };
        let (pay_premium, burn_premium) = if expired { (0.0, premium) } else { (premium, 0.0) };

        let payable = self.redeemable(issue_epoch, pay_underlying, pay_premium);
        let allowed_underlying = if burns_underlying {
            held_underlying
        } else {
            payable.underlying
        };
        let allowed_premium = if expired { held_premium } else { payable.premium };
        if !within(underlying, allowed_underlying) || !within(premium, allowed_premium) {
            return Err(ProtocolError::ExceedsRedeemable {
                issue_epoch,
                underlying,
                premium,
                allowed_underlying,
                allowed_premium,
            });
        }

        let pay_underlying = pay_underlying.min(payable.underlying);
        let pay_premium = pay_premium.min(payable.premium);
        let burn_underlying = burn_underlying.min(held_underlying);
        let burn_premium = burn_premium.min(held_premium);

        debit_entry(&mut self.underlying_coupons, issue_epoch, pay_underlying + burn_underlying);
        debit_entry(&mut self.premium_coupons, issue_epoch, pay_premium + burn_premium);
        self.expired_total += burn_underlying + burn_premium;

        let payout = pay_underlying + pay_premium;
        self.redeemable_budget = (self.redeemable_budget - payout).max(0.0);
        self.total_supply += payout;

        Ok(payout)
    }

    /// Remove expired coupon entries; returns the amount destroyed
    ///
    /// Premium entries past expiry always go. Underlying entries go too
    /// under `expire_all`.
    pub fn expire_coupons(&mut self) -> f64 {
        let expired_epochs: Vec<i64> = self
            .premium_coupons
            .keys()
            .chain(self.underlying_coupons.keys())
            .copied()
            .filter(|&e| self.is_expired(e))
            .collect();

        let mut destroyed = 0.0;
        for epoch in expired_epochs {
            if let Some(amount) = self.premium_coupons.remove(&epoch) {
                destroyed += amount;
            }
            if self.params.expire_all {
                if let Some(amount) = self.underlying_coupons.remove(&epoch) {
                    destroyed += amount;
                }
            }
        }

        self.expired_total += destroyed;
        destroyed
    }
}
