//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that moves
//! whole datagrams.  Framing belongs to [`crate::packet`] and the tunnel;
//! this module owns only byte I/O.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::UdpSocket;

/// Largest datagram we accept; anything longer cannot carry a valid frame.
const MAX_DATAGRAM: usize = 65_535;

/// Errors that can arise from socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The OS accepted fewer bytes than the datagram held.
    #[error("short send: {sent} of {len} bytes")]
    ShortSend { sent: usize, len: usize },
}

/// An async, datagram-oriented UDP socket.
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
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Send `datagram` to `dest` in one UDP datagram.
    pub async fn send_to(&self, datagram: &[u8], dest: SocketAddr) -> Result<(), SocketError> {
        let sent = self.inner.send_to(datagram, dest).await?;
        if sent != datagram.len() {
            return Err(SocketError::ShortSend {
                sent,
                len: datagram.len(),
            });
        }
        Ok(())
    }

    /// Receive the next datagram.  Returns `(bytes, sender_address)`.
    pub async fn recv_from(&self) -> Result<(Vec<u8>, SocketAddr), SocketError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok((buf, addr))
    }
}
