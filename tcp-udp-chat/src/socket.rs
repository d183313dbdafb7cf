//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that speaks
//! text datagrams instead of raw bytes.  Sequencing, loss and replies live in
//! [`crate::udp`]; this module owns only byte I/O.

use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::error::TransportError;
use crate::transport::wildcard_for;

/// Maximum UDP payload size (theoretical limit; chat lines are far smaller).
const MAX_DATAGRAM: usize = 65_535;

/// An async, text-oriented UDP socket.
///
/// All methods are `&self` so the socket can be shared across tasks if needed.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, TransportError> {
        let inner = UdpSocket::bind(local_addr)
            .await
            .map_err(|source| TransportError::Bind {
                port: local_addr.port(),
                source,
            })?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Bind an ephemeral socket able to reach `peer`.
    pub async fn ephemeral_for(peer: SocketAddr) -> Result<Self, TransportError> {
        Self::bind(wildcard_for(peer, 0)).await
    }

    /// Send `text` as a single UDP datagram to `dest`.
    pub async fn send_to(&self, text: &str, dest: SocketAddr) -> Result<(), TransportError> {
        self.inner.send_to(text.as_bytes(), dest).await?;
        Ok(())
    }

    /// Receive the next datagram as text.
    ///
    /// Invalid UTF-8 is replaced rather than rejected; the payload is only
    /// ever shown to a human.
    pub async fn recv_from(&self) -> Result<(String, SocketAddr), TransportError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        Ok((String::from_utf8_lossy(&buf[..n]).into_owned(), addr))
    }
}
