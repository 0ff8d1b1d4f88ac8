//! Transport error types.

use std::{io, net::SocketAddr};

use thiserror::Error;

/// Failures reported by a [`crate::Transport`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// Socket could not be bound. Fatal at startup.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested local address
        addr: SocketAddr,
        /// Underlying I/O error
        source: io::Error,
    },

    /// Datagram could not be sent.
    #[error("failed to send to {to}: {source}")]
    Send {
        /// Destination endpoint
        to: SocketAddr,
        /// Underlying I/O error
        source: io::Error,
    },

    /// Receive call failed.
    #[error("failed to receive: {0}")]
    Receive(#[source] io::Error),

    /// Datagram exceeds [`ringnet_proto::MAX_DATAGRAM_SIZE`].
    #[error("datagram of {size} bytes exceeds the {max} byte limit")]
    Oversize {
        /// Encoded size
        size: usize,
        /// Limit
        max: usize,
    },
}
