//! Connected UDP transport.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use tokio::net::UdpSocket;

use super::Transport;
use crate::error::{Error, Result};
use crate::util::bind_udp_socket;

/// UDP transport bound to an ephemeral port and connected to one agent.
///
/// Connecting the socket lets the kernel drop datagrams from other
/// sources, which is the only demultiplexing a one-conversation session
/// needs.
pub struct UdpTransport {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl UdpTransport {
    /// Create a transport talking to `peer`.
    ///
    /// Binds `0.0.0.0:0` or `[::]:0` to match the peer's address family.
    pub async fn connect(peer: SocketAddr) -> Result<Self> {
        let bind_addr: SocketAddr = if peer.is_ipv6() {
            "[::]:0".parse().expect("literal address")
        } else {
            "0.0.0.0:0".parse().expect("literal address")
        };

        let socket = bind_udp_socket(bind_addr).await.map_err(|e| Error::Io {
            target: Some(peer),
            source: e,
        })?;
        socket.connect(peer).await.map_err(|e| Error::Io {
            target: Some(peer),
            source: e,
        })?;

        tracing::debug!(peer = %peer, local = ?socket.local_addr().ok(), "UDP transport connected");

        Ok(Self { socket, peer })
    }

    /// Local bind address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(|e| Error::Io {
            target: Some(self.peer),
            source: e,
        })
    }
}

impl Transport for UdpTransport {
    async fn send(&self, data: &[u8]) -> Result<()> {
        tracing::trace!(peer = %self.peer, bytes = data.len(), "UDP send");
        self.socket.send(data).await.map_err(|e| Error::Io {
            target: Some(self.peer),
            source: e,
        })?;
        Ok(())
    }

    async fn recv(&self, timeout: Duration) -> Result<Bytes> {
        let mut buf = vec![0u8; crate::message::RX_BUF_SIZE as usize];

        match tokio::time::timeout(timeout, self.socket.recv(&mut buf)).await {
            Ok(Ok(len)) => {
                tracing::trace!(peer = %self.peer, bytes = len, "UDP recv");
                buf.truncate(len);
                Ok(Bytes::from(buf))
            }
            Ok(Err(e)) => Err(Error::Io {
                target: Some(self.peer),
                source: e,
            }),
            Err(_) => Err(Error::Timeout {
                target: Some(self.peer),
                elapsed: timeout,
            }),
        }
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_and_recv_roundtrip() {
        let echo = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let echo_addr = echo.local_addr().unwrap();

        let transport = UdpTransport::connect(echo_addr).await.unwrap();
        assert_eq!(transport.peer_addr(), echo_addr);

        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (len, from) = echo.recv_from(&mut buf).await.unwrap();
            echo.send_to(&buf[..len], from).await.unwrap();
        });

        transport.send(b"ping").await.unwrap();
        let data = transport.recv(Duration::from_secs(2)).await.unwrap();
        assert_eq!(&data[..], b"ping");
    }

    #[tokio::test]
    async fn recv_times_out() {
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let transport = UdpTransport::connect(silent.local_addr().unwrap())
            .await
            .unwrap();

        let err = transport.recv(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }
}
