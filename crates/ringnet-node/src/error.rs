//! Top-level node errors.

use std::io;

use ringnet_core::TransportError;
use thiserror::Error;

use crate::{config::ConfigError, runtime::RuntimeError};

/// Anything that stops the node binary.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Bad configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Socket setup failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Runtime stopped unexpectedly
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// Console I/O failed
    #[error("console: {0}")]
    Console(#[from] io::Error),
}
