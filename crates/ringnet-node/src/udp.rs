//! UDP transport backed by tokio.

use std::net::SocketAddr;

use async_trait::async_trait;
use ringnet_core::{Transport, TransportError, transport::check_datagram_size};
use tokio::net::UdpSocket;

/// Production transport: one bound UDP socket.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind to `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Bind`] if the socket cannot be bound.
    pub async fn bind(addr: SocketAddr) -> Result<Self, TransportError> {
        let socket =
            UdpSocket::bind(addr).await.map_err(|source| TransportError::Bind { addr, source })?;
        Ok(Self { socket })
    }
}

#[async_trait]
impl Transport for UdpTransport {
    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.socket.local_addr().map_err(TransportError::Receive)
    }

    async fn send_to(&self, datagram: &[u8], to: SocketAddr) -> Result<(), TransportError> {
        check_datagram_size(datagram.len())?;
        self.socket
            .send_to(datagram, to)
            .await
            .map(|_| ())
            .map_err(|source| TransportError::Send { to, source })
    }

    async fn recv_from(&self, buffer: &mut [u8]) -> Result<(usize, SocketAddr), TransportError> {
        self.socket.recv_from(buffer).await.map_err(TransportError::Receive)
    }
}
