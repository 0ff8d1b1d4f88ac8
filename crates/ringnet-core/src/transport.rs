//! Transport abstraction for datagram protocols.
//!
//! Production uses a tokio UDP socket, tests use turmoil's simulated UDP.
//! Each ring frame travels in exactly one datagram, so the trait has no
//! notion of streams or connections.

use std::net::SocketAddr;

use async_trait::async_trait;
use ringnet_proto::MAX_DATAGRAM_SIZE;

use crate::error::TransportError;

/// Abstract unreliable datagram transport.
///
/// Implementations must be shareable between the receiver and manager
/// tasks, so every method takes `&self`.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Address the transport is bound to.
    fn local_addr(&self) -> Result<SocketAddr, TransportError>;

    /// Send one datagram.
    ///
    /// Refuses datagrams larger than [`MAX_DATAGRAM_SIZE`] with
    /// [`TransportError::Oversize`] before touching the network.
    async fn send_to(&self, datagram: &[u8], to: SocketAddr) -> Result<(), TransportError>;

    /// Receive one datagram into `buffer`.
    ///
    /// Blocks until a datagram arrives and returns its length and source.
    async fn recv_from(&self, buffer: &mut [u8]) -> Result<(usize, SocketAddr), TransportError>;
}

/// Reject datagrams the protocol does not allow on the wire.
pub fn check_datagram_size(size: usize) -> Result<(), TransportError> {
    if size > MAX_DATAGRAM_SIZE {
        return Err(TransportError::Oversize { size, max: MAX_DATAGRAM_SIZE });
    }
    Ok(())
}
