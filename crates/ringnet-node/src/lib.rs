//! Ring node binary support.
//!
//! Wires the sans-IO [`ringnet_core::RingNode`] to a real UDP socket and a
//! line console:
//!
//! - [`config`]: command-line flags and the four-line configuration file
//! - [`udp`]: tokio UDP [`ringnet_core::Transport`]
//! - [`runtime`]: receiver and manager tasks around the shared node
//! - [`commands`] and [`console`]: user input and rendering

pub mod commands;
pub mod config;
pub mod console;
pub mod error;
pub mod runtime;
pub mod udp;

pub use commands::Command;
pub use config::{Args, ConfigError, FileConfig, Settings};
pub use error::NodeError;
pub use runtime::{NodeEvent, NodeHandle, Runtime, RuntimeError};
pub use udp::UdpTransport;
