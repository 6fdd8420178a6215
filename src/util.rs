//! Small shared utilities.

use std::io;
use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Create and bind a UDP socket for `addr`'s address family.
///
/// IPv6 sockets get `IPV6_V6ONLY` so they never receive IPv4-mapped
/// traffic; the caller picks the family explicitly instead.
pub(crate) async fn bind_udp_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    if addr.is_ipv6() {
        socket.set_only_v6(true)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    UdpSocket::from_std(socket.into())
}

/// Hex helpers for logging and test fixtures.
pub mod hex {
    use std::fmt;

    /// Display wrapper rendering bytes as lowercase hex.
    ///
    /// Used in tracing fields for engine IDs and key fingerprints.
    pub struct Hex<'a>(pub &'a [u8]);

    impl fmt::Display for Hex<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            for byte in self.0 {
                write!(f, "{byte:02x}")?;
            }
            Ok(())
        }
    }

    /// Encode bytes as a lowercase hex string.
    pub fn encode(bytes: &[u8]) -> String {
        Hex(bytes).to_string()
    }

    /// Decode a hex string. `None` on odd length or non-hex characters.
    pub fn decode(s: &str) -> Option<Vec<u8>> {
        if s.len() % 2 != 0 {
            return None;
        }
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let bytes = [0x00, 0x80, 0xFF, 0x12];
        let encoded = hex::encode(&bytes);
        assert_eq!(encoded, "0080ff12");
        assert_eq!(hex::decode(&encoded).unwrap(), bytes);
    }

    #[test]
    fn hex_decode_rejects_bad_input() {
        assert!(hex::decode("abc").is_none());
        assert!(hex::decode("zz").is_none());
        assert_eq!(hex::decode("").unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn bind_matches_family() {
        let v4 = bind_udp_socket("127.0.0.1:0".parse().unwrap()).await.unwrap();
        assert!(v4.local_addr().unwrap().is_ipv4());

        let v6 = bind_udp_socket("[::1]:0".parse().unwrap()).await.unwrap();
        assert!(v6.local_addr().unwrap().is_ipv6());
    }
}
