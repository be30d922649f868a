//! Domain models for the elastic-supply simulator

pub mod agent;
pub mod event;
pub mod market;
pub mod protocol;
pub mod state;
pub mod value;

// Re-exports
pub use agent::{Agent, AgentError, Asset};
pub use event::{Event, EventLog};
pub use market::Market;
pub use protocol::{CouponIssue, Phase, Protocol, ProtocolError, ProtocolParams, Redemption, Unbonding};
pub use state::SimulationState;
pub use value::{Value, ValueError};
