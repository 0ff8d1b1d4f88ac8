//! Ringnet protocol core logic
//!
//! Pure state machine logic for a token-passing ring, decoupled from I/O.
//!
//! # Architecture
//!
//! The [`node::RingNode`] engine never touches a socket or a clock of its
//! own. Every entry point receives the [`env::Environment`] explicitly and
//! returns a list of [`node::RingAction`]s describing the datagrams to send
//! and the events to surface. A runtime (or a test harness) executes them.
//!
//! Production wraps the engine in a tokio runtime with a UDP socket; tests
//! drive the same engine over an in-memory ring with a manual clock and a
//! seeded RNG, which makes corruption and backoff reproducible.
//!
//! # Components
//!
//! - [`node`]: Ring engine (receiver dispatch and manager tick)
//! - [`token`]: Token controller (acceptance, duplicates, regeneration)
//! - [`queue`]: Outbound message queue with bounded retransmission
//! - [`membership`]: Nickname to endpoint table
//! - [`corruption`]: Transmission error simulation
//! - [`mod@env`]: Environment abstraction (time, RNG)
//! - [`transport`]: Datagram transport abstraction
//! - [`error`]: Transport error types

pub mod corruption;
pub mod env;
pub mod error;
pub mod membership;
pub mod node;
pub mod queue;
pub mod token;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use env::{Environment, SystemEnv};
pub use error::TransportError;
pub use membership::Membership;
pub use node::{DeliveryStatus, NodeConfig, NodeIdentity, NodeStatus, RingAction, RingNode};
pub use queue::{MessageQueue, QueueError, QueuedMessage, ResolveOutcome, Resolution};
pub use token::{TokenController, TokenStats, TokenStatus, TokenVerdict};
pub use transport::Transport;
