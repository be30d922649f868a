//! Backend ports for the market and the protocol
//!
//! The orchestrator drives the market and the protocol only through these
//! traits. The in-memory `Market` and `Protocol` implement them directly;
//! a chain adapter can implement the same operation set against deployed
//! contracts, handling units with `Value` at its boundary.
//!
//! # Failure contract
//!
//! - `BackendError::Contract` is a caller bug (advancing too early,
//!   coupon beyond the couponable amount, ...) and aborts the run.
//! - `BackendError::Unavailable` is a transient adapter failure. The
//!   orchestrator skips the acting agent for this tick and leaves its
//!   ledger exactly as it was before the attempt. A redeem spanning several
//!   issue epochs keeps the epochs whose calls already settled.
//!
//! The in-memory backends never return `Unavailable`.

use thiserror::Error;

use crate::models::market::Market;
use crate::models::protocol::{CouponIssue, Protocol, ProtocolError, Redemption, Unbonding};
use crate::models::value::ValueError;

/// Errors surfaced by a backend call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    #[error("Contract violation: {0}")]
    Contract(#[from] ProtocolError),

    #[error("Unit conversion failed: {0}")]
    Units(#[from] ValueError),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// True if the failed action can be skipped and the run continued
    pub fn is_recoverable(&self) -> bool {
        matches!(self, BackendError::Unavailable(_))
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Port for the constant-product market
pub trait MarketBackend {
    fn operational(&self) -> bool;

    fn price(&self) -> f64;

    /// Current `(token, stable)` reserves
    fn reserves(&self) -> (f64, f64);

    fn total_shares(&self) -> f64;

    /// Spend stable for tokens; returns tokens received
    fn buy(&mut self, stable_in: f64) -> BackendResult<f64>;

    /// Sell tokens for stable; returns stable received
    fn sell(&mut self, tokens_in: f64) -> BackendResult<f64>;

    /// Add liquidity; returns LP shares minted
    fn deposit(&mut self, token_amount: f64, stable_amount: f64) -> BackendResult<f64>;

    /// Burn LP shares; returns `(tokens, stable)`
    fn withdraw(&mut self, shares: f64) -> BackendResult<(f64, f64)>;
}

/// Port for the elastic-supply protocol
pub trait ProtocolBackend {
    fn epoch(&self) -> i64;

    fn is_expanding(&self) -> bool;

    fn total_supply(&self) -> f64;

    fn bonded_supply(&self) -> f64;

    fn debt(&self) -> f64;

    fn redeemable_budget(&self) -> f64;

    fn total_coupons(&self) -> f64;

    /// ETH fee an advance must be paid with
    fn fee(&self) -> f64;

    fn expire_all(&self) -> bool;

    fn is_expired(&self, issue_epoch: i64) -> bool;

    fn can_advance(&self, block: u64) -> bool;

    /// Advance the epoch; returns the caller's reward
    fn advance(&mut self, block: u64, fee: f64, price: f64) -> BackendResult<f64>;

    fn bond(&mut self, amount: f64) -> BackendResult<f64>;

    fn unbond(&mut self, shares: f64) -> BackendResult<Unbonding>;

    fn couponable(&self, amount: f64) -> f64;

    fn coupon(&mut self, amount: f64) -> BackendResult<CouponIssue>;

    fn redeemable(&self, issue_epoch: i64, underlying: f64, premium: f64) -> Redemption;

    /// Redeem coupons; returns tokens paid out
    fn redeem(&mut self, issue_epoch: i64, underlying: f64, premium: f64) -> BackendResult<f64>;

    /// Sweep expired coupons; returns the amount destroyed
    fn expire_coupons(&mut self) -> BackendResult<f64>;
}

impl MarketBackend for Market {
    fn operational(&self) -> bool {
        Market::operational(self)
    }

    fn price(&self) -> f64 {
        Market::price(self)
    }

    fn reserves(&self) -> (f64, f64) {
        (self.reserve_token(), self.reserve_stable())
    }

    fn total_shares(&self) -> f64 {
        Market::total_shares(self)
    }

    fn buy(&mut self, stable_in: f64) -> BackendResult<f64> {
        Ok(Market::buy(self, stable_in))
    }

    fn sell(&mut self, tokens_in: f64) -> BackendResult<f64> {
        Ok(Market::sell(self, tokens_in))
    }

    fn deposit(&mut self, token_amount: f64, stable_amount: f64) -> BackendResult<f64> {
        Ok(Market::deposit(self, token_amount, stable_amount))
    }

    fn withdraw(&mut self, shares: f64) -> BackendResult<(f64, f64)> {
        Ok(Market::withdraw(self, shares))
    }
}

impl ProtocolBackend for Protocol {
    fn epoch(&self) -> i64 {
        Protocol::epoch(self)
    }

    fn is_expanding(&self) -> bool {
        Protocol::is_expanding(self)
    }

    fn total_supply(&self) -> f64 {
        Protocol::total_supply(self)
    }

    fn bonded_supply(&self) -> f64 {
        Protocol::bonded_supply(self)
    }

    fn debt(&self) -> f64 {
        Protocol::debt(self)
    }

    fn redeemable_budget(&self) -> f64 {
        Protocol::redeemable_budget(self)
    }

    fn total_coupons(&self) -> f64 {
        Protocol::total_coupons(self)
    }

    fn fee(&self) -> f64 {
        Protocol::fee(self)
    }

    fn expire_all(&self) -> bool {
        self.params().expire_all
    }

    fn is_expired(&self, issue_epoch: i64) -> bool {
        Protocol::is_expired(self, issue_epoch)
    }

    fn can_advance(&self, block: u64) -> bool {
        Protocol::can_advance(self, block)
    }

    fn advance(&mut self, block: u64, fee: f64, price: f64) -> BackendResult<f64> {
        Ok(Protocol::advance(self, block, fee, price)?)
    }

    fn bond(&mut self, amount: f64) -> BackendResult<f64> {
        Ok(Protocol::bond(self, amount)?)
    }

    fn unbond(&mut self, shares: f64) -> BackendResult<Unbonding> {
        Ok(Protocol::unbond(self, shares)?)
    }

    fn couponable(&self, amount: f64) -> f64 {
        Protocol::couponable(self, amount)
    }

    fn coupon(&mut self, amount: f64) -> BackendResult<CouponIssue> {
        Ok(Protocol::coupon(self, amount)?)
    }

    fn redeemable(&self, issue_epoch: i64, underlying: f64, premium: f64) -> Redemption {
        Protocol::redeemable(self, issue_epoch, underlying, premium)
    }

    fn redeem(&mut self, issue_epoch: i64, underlying: f64, premium: f64) -> BackendResult<f64> {
        Ok(Protocol::redeem(self, issue_epoch, underlying, premium)?)
    }

    fn expire_coupons(&mut self) -> BackendResult<f64> {
        Ok(Protocol::expire_coupons(self))
    }
}
