//! Transport abstraction.
//!
//! A [`Session`](crate::session::Session) drives exactly one conversation
//! with one agent, so the transport surface is a connected datagram pair:
//! send a marshalled message, receive the next datagram within a deadline.
//! Retransmission and response filtering live in the session, which is the
//! layer that can tell an unauthentic datagram from a real response.

mod mock;
mod udp;

pub use mock::{MockResponse, MockTransport};
pub use udp::UdpTransport;

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;

use crate::error::Result;

/// One request/response conversation with a peer.
pub trait Transport: Send + Sync {
    /// Send one marshalled message to the peer.
    fn send(&self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Receive the next datagram from the peer.
    ///
    /// Resolves to [`Error::Timeout`](crate::error::Error::Timeout) when
    /// nothing arrives within `timeout`. Callers may invoke this again
    /// with the remaining budget after discarding an unwanted datagram.
    fn recv(&self, timeout: Duration) -> impl Future<Output = Result<Bytes>> + Send;

    /// The peer address.
    fn peer_addr(&self) -> SocketAddr;
}
