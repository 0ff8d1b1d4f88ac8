//! Deterministic simulation harness for ring testing.
//!
//! Two layers:
//!
//! - [`scenario`]: an in-memory ring of [`ringnet_core::RingNode`]s driven
//!   step by step on a manual clock, with fault injection and a mandatory
//!   oracle.
//! - [`SimEnv`] and [`SimTransport`]: turmoil-backed implementations of the
//!   core traits for running the real async runtime on a simulated network.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod model;
pub mod scenario;
pub mod sim_env;
pub mod sim_transport;

pub use model::{OperationResult, QueueModel, QueueOperation};
pub use scenario::{Delivery, Fault, OracleFn, RunnableScenario, Scenario, Transmission, World};
pub use sim_env::SimEnv;
pub use sim_transport::SimTransport;
