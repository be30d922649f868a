//! Constant-product market (AMM pool)
//!
//! Holds a token reserve, a stable reserve and the outstanding LP shares.
//! Swaps preserve `reserve_token × reserve_stable`; only deposits and
//! withdrawals move the product. No swap fee is charged.
//!
//! The market never checks what the caller owns. Agents are responsible
//! for only spending balances they hold.
//!
//! # Critical Invariants
//!
//! 1. Reserves and total shares are never negative
//! 2. `total_shares == 0` iff both reserves are 0
//! 3. Swaps never decrease the reserve product

use serde::{Deserialize, Serialize};

/// Price reported by a pool with no liquidity
pub const PEG_PRICE: f64 = 1.0;

/// A fee-less constant-product liquidity pool
///
/// # Example
/// ```
/// use rebase_simulator_core::Market;
///
/// let mut market = Market::new();
/// let shares = market.deposit(100.0, 100.0);
/// assert_eq!(shares, 1.0);
///
/// let tokens = market.buy(50.0);
/// assert!((tokens - 33.333333).abs() < 1e-4);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Market {
    reserve_token: f64,
    reserve_stable: f64,
    total_shares: f64,
}

impl Market {
    /// Create an empty pool
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reserve_token(&self) -> f64 {
        self.reserve_token
    }

    pub fn reserve_stable(&self) -> f64 {
        self.reserve_stable
    }

    pub fn total_shares(&self) -> f64 {
        self.total_shares
    }

    /// Product of the two reserves
    pub fn product(&self) -> f64 {
        self.reserve_token * self.reserve_stable
    }

    /// True if buying and selling is possible
    pub fn operational(&self) -> bool {
        self.reserve_token > 0.0 && self.reserve_stable > 0.0
    }

    /// Token price in stable units, or the peg when the pool is empty
    pub fn price(&self) -> f64 {
        if self.operational() {
            self.reserve_stable / self.reserve_token
        } else {
            PEG_PRICE
        }
    }

    /// Spend `stable_in` to buy tokens; returns tokens received
    ///
    /// Returns 0 without touching reserves when the pool is not operational.
    pub fn buy(&mut self, stable_in: f64) -> f64 {
        if !self.operational() || stable_in <= 0.0 {
            return 0.0;
        }
        let k = self.product();
        let new_token = k / (self.reserve_stable + stable_in);
        let tokens_out = self.reserve_token - new_token;

        self.reserve_stable += stable_in;
        self.reserve_token = new_token;

        tokens_out
    }

    /// Sell `tokens_in` for stable; returns stable received
    ///
    /// Returns 0 without touching reserves when the pool is not operational.
    pub fn sell(&mut self, tokens_in: f64) -> f64 {
        if !self.operational() || tokens_in <= 0.0 {
            return 0.0;
        }
        let k = self.product();
        let new_stable = k / (self.reserve_token + tokens_in);
        let stable_out = self.reserve_stable - new_stable;

        self.reserve_token += tokens_in;
        self.reserve_stable = new_stable;

        stable_out
    }

    /// Add liquidity; returns LP shares minted
    ///
    /// Shares are minted in proportion to the value added relative to the
    /// value already held, both priced at the current pool price. The first
    /// deposit into an empty pool mints exactly one share.
    pub fn deposit(&mut self, token_amount: f64, stable_amount: f64) -> f64 {
        let price = self.price();
        let new_value = token_amount * price + stable_amount;
        let held_value = self.reserve_token * price + self.reserve_stable;

        let new_shares = if self.total_shares > 0.0 && held_value > 0.0 {
            self.total_shares / held_value * new_value
        } else {
            1.0
        };

        self.reserve_token += token_amount;
        self.reserve_stable += stable_amount;
        self.total_shares += new_shares;

        new_shares
    }

    /// Burn `shares` for a proportional slice of both reserves
    ///
    /// Returns `(tokens, stable)`. Burning every outstanding share empties
    /// the pool exactly; an empty pool returns `(0, 0)`.
    pub fn withdraw(&mut self, shares: f64) -> (f64, f64) {
        if self.total_shares <= 0.0 || shares <= 0.0 {
            return (0.0, 0.0);
        }
        if shares >= self.total_shares {
            let out = (self.reserve_token, self.reserve_stable);
            self.reserve_token = 0.0;
            self.reserve_stable = 0.0;
            self.total_shares = 0.0;
            return out;
        }

        let portion = shares / self.total_shares;
        let tokens = portion * self.reserve_token;
        let stable = portion * self.reserve_stable;

        self.total_shares = (self.total_shares - shares).max(0.0);
        self.reserve_token = (self.reserve_token - tokens).max(0.0);
        self.reserve_stable = (self.reserve_stable - stable).max(0.0);

        (tokens, stable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pool_reports_peg() {
        let market = Market::new();
        assert!(!market.operational());
        assert_eq!(market.price(), PEG_PRICE);
    }

    #[test]
    fn test_swaps_on_empty_pool_are_noops() {
        let mut market = Market::new();
        assert_eq!(market.buy(10.0), 0.0);
        assert_eq!(market.sell(10.0), 0.0);
        assert_eq!(market, Market::new());
    }

    #[test]
    fn test_withdraw_all_empties_pool() {
        let mut market = Market::new();
        market.deposit(10.0, 20.0);
        let (t, s) = market.withdraw(1.0);
        assert_eq!((t, s), (10.0, 20.0));
        assert_eq!(market.total_shares(), 0.0);
        assert!(!market.operational());
    }

    #[test]
    fn test_withdraw_from_empty_pool() {
        let mut market = Market::new();
        assert_eq!(market.withdraw(5.0), (0.0, 0.0));
    }
}
