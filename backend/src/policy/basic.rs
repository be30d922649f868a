//! Baseline strategy: uniform except for a preference to bond above peg

use super::{Action, ActionWeights, MarketView, Strategy};
use crate::models::agent::Agent;
use crate::models::market::PEG_PRICE;

#[derive(Debug, Clone, Copy, Default)]
pub struct BasicStrategy;

impl Strategy for BasicStrategy {
    fn weights(&self, _agent: &Agent, view: &MarketView) -> ActionWeights {
        let mut weights = ActionWeights::new();
        if view.price > PEG_PRICE {
            weights.set(Action::Bond, 2.0);
        }
        weights
    }

    fn name(&self) -> &'static str {
        "basic"
    }
}
