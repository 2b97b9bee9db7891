//! # aura-bus
//!
//! The scoped topic bus: a wildcard-capable topic router plus agent
//! identity, channel/role membership, per-agent event filters, and
//! scope-based delivery predicates. Handlers matched by an emission run
//! concurrently; individual handler failures are logged and suppressed.

pub mod agent;
pub mod bus;
pub mod router;

pub use agent::{AgentProfile, AgentSpec};
pub use bus::{AgentBus, EmitOptions};
pub use router::{RouterMetrics, TopicRouter};
