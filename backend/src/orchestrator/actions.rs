//! Action execution
//!
//! Each function sizes one action from the agent's balances, debits the
//! agent, calls the backend and credits the result. The orchestrator runs
//! these against a clone of the agent and only keeps the clone if the
//! whole action succeeded.

use thiserror::Error;
use tracing::{debug, warn};

use crate::models::agent::{Agent, AgentError, Asset};
use crate::models::event::Event;
use crate::models::protocol::Phase;
use crate::policy::{portion_dedusted, Action};
use crate::ports::{BackendError, MarketBackend, ProtocolBackend};

/// Why an action could not complete
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActionError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl ActionError {
    /// Only adapter outages are safe to skip
    pub fn is_recoverable(&self) -> bool {
        match self {
            ActionError::Backend(e) => e.is_recoverable(),
            ActionError::Agent(_) => false,
        }
    }
}

/// A failed action plus the amounts it was attempting
#[derive(Debug, Clone, PartialEq)]
pub struct ActionFailure {
    pub amounts: Vec<f64>,
    pub error: ActionError,
}

type ActionResult = Result<Vec<Event>, ActionFailure>;

/// Attach the attempted amounts to any error
fn attempt<T, E: Into<ActionError>>(result: Result<T, E>, amounts: &[f64]) -> Result<T, ActionFailure> {
    result.map_err(|e| ActionFailure {
        amounts: amounts.to_vec(),
        error: e.into(),
    })
}

/// Execute `action` for `agent`, committing `fraction` of the relevant balance
pub fn execute<M, P>(
    action: Action,
    agent: &mut Agent,
    market: &mut M,
    protocol: &mut P,
    block: u64,
    fraction: f64,
) -> ActionResult
where
    M: MarketBackend,
    P: ProtocolBackend,
{
    match action {
        Action::Buy => buy(agent, market, block, fraction),
        Action::Sell => sell(agent, market, block, fraction),
        Action::Advance => advance(agent, market, protocol, block),
        Action::Bond => bond(agent, protocol, block, fraction),
        Action::Unbond => unbond(agent, protocol, block, fraction),
        Action::Deposit => deposit(agent, market, block, fraction),
        Action::Withdraw => withdraw(agent, market, block, fraction),
        Action::Coupon => coupon(agent, protocol, block, fraction),
        Action::Redeem => redeem(agent, protocol, block),
    }
}

fn buy<M: MarketBackend>(agent: &mut Agent, market: &mut M, block: u64, fraction: f64) -> ActionResult {
    let stable_in = portion_dedusted(agent.balance(Asset::Stable), fraction);
    attempt(agent.debit(Asset::Stable, stable_in), &[stable_in])?;
    let tokens_out = attempt(market.buy(stable_in), &[stable_in])?;
    agent.credit(Asset::Token, tokens_out);

    debug!(agent = agent.id(), stable_in, tokens_out, "buy");
    Ok(vec![Event::Bought {
        block,
        agent_id: agent.id().to_string(),
        stable_in,
        tokens_out,
    }])
}

fn sell<M: MarketBackend>(agent: &mut Agent, market: &mut M, block: u64, fraction: f64) -> ActionResult {
    let tokens_in = portion_dedusted(agent.balance(Asset::Token), fraction);
    attempt(agent.debit(Asset::Token, tokens_in), &[tokens_in])?;
    let stable_out = attempt(market.sell(tokens_in), &[tokens_in])?;
    agent.credit(Asset::Stable, stable_out);

    debug!(agent = agent.id(), tokens_in, stable_out, "sell");
    Ok(vec![Event::Sold {
        block,
        agent_id: agent.id().to_string(),
        tokens_in,
        stable_out,
    }])
}

fn advance<M, P>(agent: &mut Agent, market: &M, protocol: &mut P, block: u64) -> ActionResult
where
    M: MarketBackend,
    P: ProtocolBackend,
{
    let fee = protocol.fee();
    let price = market.price();
    attempt(agent.debit(Asset::Eth, fee), &[fee])?;
    let reward = attempt(protocol.advance(block, fee, price), &[fee, price])?;
    agent.credit(Asset::Token, reward);

    let phase = if protocol.is_expanding() {
        Phase::Expanding
    } else {
        Phase::Contracting
    };
    debug!(agent = agent.id(), fee, reward, "advance");
    Ok(vec![Event::EpochAdvanced {
        block,
        agent_id: agent.id().to_string(),
        epoch: protocol.epoch(),
        phase,
        price,
        reward,
    }])
}

fn bond<P: ProtocolBackend>(agent: &mut Agent, protocol: &mut P, block: u64, fraction: f64) -> ActionResult {
    let tokens = portion_dedusted(agent.balance(Asset::Token), fraction);
    attempt(agent.debit(Asset::Token, tokens), &[tokens])?;
    let shares = attempt(protocol.bond(tokens), &[tokens])?;
    agent.credit(Asset::BondingShares, shares);

    debug!(agent = agent.id(), tokens, shares, "bond");
    Ok(vec![Event::Bonded {
        block,
        agent_id: agent.id().to_string(),
        tokens,
        shares,
    }])
}

fn unbond<P: ProtocolBackend>(agent: &mut Agent, protocol: &mut P, block: u64, fraction: f64) -> ActionResult {
    let shares = portion_dedusted(agent.balance(Asset::BondingShares), fraction);
    attempt(agent.debit(Asset::BondingShares, shares), &[shares])?;
    let unbonding = attempt(protocol.unbond(shares), &[shares])?;
    agent.add_pending_unbond(unbonding.release_epoch, unbonding.amount);

    debug!(
        agent = agent.id(),
        shares,
        tokens = unbonding.amount,
        release_epoch = unbonding.release_epoch,
        "unbond"
    );
    Ok(vec![Event::Unbonded {
        block,
        agent_id: agent.id().to_string(),
        shares,
        tokens: unbonding.amount,
        release_epoch: unbonding.release_epoch,
    }])
}

/// Provide liquidity sized so the scarcer side (at current price) limits it
fn deposit<M: MarketBackend>(agent: &mut Agent, market: &mut M, block: u64, fraction: f64) -> ActionResult {
    let price = market.price();
    let held_tokens = agent.balance(Asset::Token);
    let held_stable = agent.balance(Asset::Stable);

    let (tokens, stable) = if held_tokens * price < held_stable {
        let tokens = portion_dedusted(held_tokens, fraction);
        (tokens, tokens * price)
    } else {
        let stable = portion_dedusted(held_stable, fraction);
        (stable / price, stable)
    };

    let amounts = [tokens, stable];
    attempt(agent.debit(Asset::Token, tokens), &amounts)?;
    attempt(agent.debit(Asset::Stable, stable), &amounts)?;
    let shares = attempt(market.deposit(tokens, stable), &amounts)?;
    agent.credit(Asset::LpShares, shares);

    debug!(agent = agent.id(), tokens, stable, shares, "deposit");
    Ok(vec![Event::LiquidityAdded {
        block,
        agent_id: agent.id().to_string(),
        tokens,
        stable,
        shares,
    }])
}

fn withdraw<M: MarketBackend>(agent: &mut Agent, market: &mut M, block: u64, fraction: f64) -> ActionResult {
    let shares = portion_dedusted(agent.balance(Asset::LpShares), fraction);
    attempt(agent.debit(Asset::LpShares, shares), &[shares])?;
    let (tokens, stable) = attempt(market.withdraw(shares), &[shares])?;
    agent.credit(Asset::Token, tokens);
    agent.credit(Asset::Stable, stable);

    debug!(agent = agent.id(), shares, tokens, stable, "withdraw");
    Ok(vec![Event::LiquidityRemoved {
        block,
        agent_id: agent.id().to_string(),
        shares,
        tokens,
        stable,
    }])
}

fn coupon<P: ProtocolBackend>(agent: &mut Agent, protocol: &mut P, block: u64, fraction: f64) -> ActionResult {
    let amount = protocol.couponable(portion_dedusted(agent.balance(Asset::Token), fraction));
    attempt(agent.debit(Asset::Token, amount), &[amount])?;
    let issue = attempt(protocol.coupon(amount), &[amount])?;
    agent.add_coupons(issue.epoch, issue.underlying, issue.premium);

    debug!(
        agent = agent.id(),
        underlying = issue.underlying,
        premium = issue.premium,
        "coupon"
    );
    Ok(vec![Event::CouponsPurchased {
        block,
        agent_id: agent.id().to_string(),
        epoch: issue.epoch,
        underlying: issue.underlying,
        premium: issue.premium,
    }])
}

/// Redeem whatever is payable, oldest issue epoch first
///
/// Each per-epoch backend call settles on its own. If the adapter becomes
/// unavailable after some epochs were redeemed, those are kept and the
/// rest wait for a later action.
fn redeem<P: ProtocolBackend>(agent: &mut Agent, protocol: &mut P, block: u64) -> ActionResult {
    let mut events = Vec::new();

    for issue_epoch in agent.coupon_epochs() {
        let (held_underlying, held_premium) = agent.coupons_at(issue_epoch);
        let payable = protocol.redeemable(issue_epoch, held_underlying, held_premium);
        if payable.is_zero() {
            continue;
        }

        let amounts = [payable.underlying, payable.premium];
        let payout = match protocol.redeem(issue_epoch, payable.underlying, payable.premium) {
            Ok(payout) => payout,
            Err(e) if e.is_recoverable() && !events.is_empty() => {
                warn!(
                    agent = agent.id(),
                    issue_epoch,
                    redeemed = events.len(),
                    error = %e,
                    "redeem interrupted"
                );
                break;
            }
            Err(e) => return attempt(Err(e), &amounts),
        };
        agent.remove_coupons(issue_epoch, payable.underlying, payable.premium);
        agent.credit(Asset::Token, payout);

        debug!(agent = agent.id(), issue_epoch, payout, "redeem");
        events.push(Event::CouponsRedeemed {
            block,
            agent_id: agent.id().to_string(),
            issue_epoch,
            underlying: payable.underlying,
            premium: payable.premium,
            payout,
        });
    }

    Ok(events)
}
