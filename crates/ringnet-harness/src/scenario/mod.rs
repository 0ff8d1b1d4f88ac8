//! Scenario testing with mandatory oracles.
//!
//! A scenario declares a ring, a script of steps, and an oracle that checks
//! the final [`World`]. There is no way to run a scenario without an oracle.

mod builder;
mod world;

pub use builder::{RunnableScenario, Scenario};
pub use world::{Delivery, Fault, Transmission, World};

/// Oracle function that verifies the final world state.
pub type OracleFn = Box<dyn Fn(&World) -> Result<(), String>>;
