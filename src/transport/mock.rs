//! Programmable in-memory transport for tests.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use super::Transport;
use crate::error::{Error, Result};

/// A scripted response.
#[derive(Clone, Debug)]
pub enum MockResponse {
    /// Deliver these bytes.
    Data(Bytes),
    /// Simulate silence until the deadline.
    Timeout,
    /// Simulate an I/O failure.
    IoError(String),
}

struct MockInner {
    peer: SocketAddr,
    responses: VecDeque<MockResponse>,
    requests: Vec<Bytes>,
}

/// Mock transport with a response queue and a request recorder.
///
/// Each `recv` pops the next scripted response; an empty queue behaves
/// like a timeout. Clones share state.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockInner>>,
}

impl MockTransport {
    /// Create a mock transport pretending to talk to `peer`.
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockInner {
                peer,
                responses: VecDeque::new(),
                requests: Vec::new(),
            })),
        }
    }

    /// Queue response bytes.
    pub fn queue_response(&self, data: impl Into<Bytes>) {
        self.inner
            .lock()
            .unwrap()
            .responses
            .push_back(MockResponse::Data(data.into()));
    }

    /// Queue a timeout.
    pub fn queue_timeout(&self) {
        self.inner
            .lock()
            .unwrap()
            .responses
            .push_back(MockResponse::Timeout);
    }

    /// Queue an I/O error.
    pub fn queue_io_error(&self, msg: impl Into<String>) {
        self.inner
            .lock()
            .unwrap()
            .responses
            .push_back(MockResponse::IoError(msg.into()));
    }

    /// All requests sent so far.
    pub fn requests(&self) -> Vec<Bytes> {
        self.inner.lock().unwrap().requests.clone()
    }

    /// Number of responses still queued.
    pub fn queued_responses(&self) -> usize {
        self.inner.lock().unwrap().responses.len()
    }
}

impl Transport for MockTransport {
    async fn send(&self, data: &[u8]) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .requests
            .push(Bytes::copy_from_slice(data));
        Ok(())
    }

    async fn recv(&self, timeout: Duration) -> Result<Bytes> {
        let (response, peer) = {
            let mut inner = self.inner.lock().unwrap();
            (inner.responses.pop_front(), inner.peer)
        };

        match response {
            Some(MockResponse::Data(data)) => Ok(data),
            Some(MockResponse::IoError(msg)) => Err(Error::Io {
                target: Some(peer),
                source: std::io::Error::other(msg),
            }),
            Some(MockResponse::Timeout) | None => Err(Error::Timeout {
                target: Some(peer),
                elapsed: timeout,
            }),
        }
    }

    fn peer_addr(&self) -> SocketAddr {
        self.inner.lock().unwrap().peer
    }
}
