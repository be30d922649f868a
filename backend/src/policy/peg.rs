//! Peg-following strategy
//!
//! Leans towards bonding and redeeming above peg and towards unbonding
//! and buying coupons below it. Couponing and unbonding are slow by
//! default. Agents with faith enabled also trade against the gap between
//! the market cap and what they believe it should be.

use super::{Action, ActionWeights, MarketView, Strategy};
use crate::models::agent::Agent;
use crate::models::market::PEG_PRICE;

/// Weight for coupon purchases outside contraction
const SLOW_COUPON: f64 = 0.1;

/// Baseline unbond weight; the unbond delay makes agents hesitant
const SLOW_UNBOND: f64 = 0.1;

const EXPANSION_BOND: f64 = 2.0;
const EXPANSION_REDEEM: f64 = 100.0;
const EXPANSION_UNBOND: f64 = 0.05;

const CONTRACTION_BOND: f64 = 0.5;
const CONTRACTION_UNBOND: f64 = 1.0;
const CONTRACTION_COUPON: f64 = 1.0;

/// Buy/sell weight when faith disagrees with the market cap
const FAITH_TRADE: f64 = 4.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct PegStrategy;

impl Strategy for PegStrategy {
    fn weights(&self, agent: &Agent, view: &MarketView) -> ActionWeights {
        let mut weights = ActionWeights::new();
        weights.set(Action::Coupon, SLOW_COUPON);
        weights.set(Action::Unbond, SLOW_UNBOND);

        if view.price > PEG_PRICE {
            weights.set(Action::Bond, EXPANSION_BOND);
            weights.set(Action::Redeem, EXPANSION_REDEEM);
            weights.set(Action::Unbond, EXPANSION_UNBOND);
        } else {
            weights.set(Action::Bond, CONTRACTION_BOND);
            weights.set(Action::Unbond, CONTRACTION_UNBOND);
            weights.set(Action::Coupon, CONTRACTION_COUPON);
        }

        if agent.use_faith() {
            let faith = agent.faith(view.block, view.faith_period_blocks);
            if view.market_cap() > faith {
                // Over-valued: get out
                weights.scale(Action::Unbond, 2.0);
                weights.set(Action::Sell, FAITH_TRADE);
            } else {
                weights.set(Action::Buy, FAITH_TRADE);
            }
        }

        weights
    }

    fn name(&self) -> &'static str {
        "peg"
    }
}
