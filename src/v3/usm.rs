//! USM security parameters (RFC 3414 Section 2.4).
//!
//! On the wire the parameters are an OCTET STRING whose value is a
//! BER SEQUENCE:
//!
//! ```text
//! UsmSecurityParameters ::= SEQUENCE {
//!     msgAuthoritativeEngineID     OCTET STRING,
//!     msgAuthoritativeEngineBoots  INTEGER,
//!     msgAuthoritativeEngineTime   INTEGER,
//!     msgUserName                  OCTET STRING,
//!     msgAuthenticationParameters  OCTET STRING,
//!     msgPrivacyParameters         OCTET STRING
//! }
//! ```

use bytes::Bytes;

use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::Result;

/// Length of the truncated HMAC carried in msgAuthenticationParameters.
pub const MAC_LEN: usize = 12;

/// USM security parameters for one packet.
#[derive(Debug, Clone, Default)]
pub struct UsmSecurityParams {
    /// Authoritative engine ID (empty until discovered)
    pub engine_id: Bytes,
    /// Authoritative engine boot counter
    pub engine_boots: u32,
    /// Authoritative engine seconds since boot
    pub engine_time: u32,
    /// USM principal
    pub username: Bytes,
    /// MAC slot content (12 bytes when authenticated, else empty)
    pub auth_params: Bytes,
    /// Wire salt (8 bytes when encrypted, else empty)
    pub priv_params: Bytes,
}

impl UsmSecurityParams {
    /// Create parameters with the engine triple and user name.
    pub fn new(
        engine_id: impl Into<Bytes>,
        engine_boots: u32,
        engine_time: u32,
        username: impl Into<Bytes>,
    ) -> Self {
        Self {
            engine_id: engine_id.into(),
            engine_boots,
            engine_time,
            username: username.into(),
            auth_params: Bytes::new(),
            priv_params: Bytes::new(),
        }
    }

    /// All-empty parameters, as sent in a discovery probe.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set the MAC slot to twelve zero bytes.
    ///
    /// The HMAC is computed over the whole marshalled message with these
    /// zeros in place, then written over them.
    pub fn with_auth_placeholder(mut self) -> Self {
        self.auth_params = Bytes::from_static(&[0u8; MAC_LEN]);
        self
    }

    /// Set the wire privacy parameters (salt).
    pub fn with_priv_params(mut self, priv_params: impl Into<Bytes>) -> Self {
        self.priv_params = priv_params.into();
        self
    }

    /// Encode into `buf` (reverse order).
    pub fn encode_to_buf(&self, buf: &mut EncodeBuf) {
        buf.push_sequence(|buf| {
            buf.push_octet_string(&self.priv_params);
            buf.push_octet_string(&self.auth_params);
            buf.push_octet_string(&self.username);
            buf.push_unsigned32(tag::universal::INTEGER, self.engine_time);
            buf.push_unsigned32(tag::universal::INTEGER, self.engine_boots);
            buf.push_octet_string(&self.engine_id);
        });
    }

    /// Encode to standalone bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = EncodeBuf::new();
        self.encode_to_buf(&mut buf);
        buf.finish()
    }

    /// Decode from the content of the msgSecurityParameters OCTET STRING.
    ///
    /// Boots and time accept any unsigned INTEGER width.
    pub fn decode(data: Bytes) -> Result<Self> {
        let mut decoder = Decoder::new(data);
        let mut seq = decoder.read_sequence()?;

        let engine_id = seq.read_octet_string()?;
        let engine_boots = seq.read_unsigned32(tag::universal::INTEGER)?;
        let engine_time = seq.read_unsigned32(tag::universal::INTEGER)?;
        let username = seq.read_octet_string()?;
        let auth_params = seq.read_octet_string()?;
        let priv_params = seq.read_octet_string()?;

        Ok(Self {
            engine_id,
            engine_boots,
            engine_time,
            username,
            auth_params,
            priv_params,
        })
    }

    /// Locate the MAC slot inside a fully marshalled v3 message.
    ///
    /// Walks the fixed message shape — outer SEQUENCE, version INTEGER,
    /// msgGlobalData SEQUENCE, msgSecurityParameters OCTET STRING wrapping
    /// the USM SEQUENCE — then skips to msgAuthenticationParameters.
    /// Returns `(offset, length)` of the slot's content bytes.
    pub fn find_auth_params_offset(message: &[u8]) -> Option<(usize, usize)> {
        let mut pos = 0;

        // Outer SEQUENCE header.
        if *message.get(pos)? != tag::universal::SEQUENCE {
            return None;
        }
        pos += 1;
        let (_, consumed) = parse_length(&message[pos..])?;
        pos += consumed;

        // msgVersion INTEGER.
        pos = skip_tlv(message, pos)?;

        // msgGlobalData SEQUENCE.
        pos = skip_tlv(message, pos)?;

        // msgSecurityParameters OCTET STRING header; descend into it.
        if *message.get(pos)? != tag::universal::OCTET_STRING {
            return None;
        }
        pos += 1;
        let (_, consumed) = parse_length(&message[pos..])?;
        pos += consumed;

        // USM SEQUENCE header; descend.
        if *message.get(pos)? != tag::universal::SEQUENCE {
            return None;
        }
        pos += 1;
        let (_, consumed) = parse_length(&message[pos..])?;
        pos += consumed;

        // engineID, boots, time, username.
        pos = skip_tlv(message, pos)?;
        pos = skip_tlv(message, pos)?;
        pos = skip_tlv(message, pos)?;
        pos = skip_tlv(message, pos)?;

        // msgAuthenticationParameters.
        if *message.get(pos)? != tag::universal::OCTET_STRING {
            return None;
        }
        pos += 1;
        let (mac_len, consumed) = parse_length(&message[pos..])?;
        let start = pos + consumed;
        if start + mac_len > message.len() {
            return None;
        }

        Some((start, mac_len))
    }
}

/// Minimal BER length parse for the offset walk: `(length, consumed)`.
fn parse_length(data: &[u8]) -> Option<(usize, usize)> {
    let &first = data.first()?;
    if first < 0x80 {
        return Some((first as usize, 1));
    }
    if first == 0x80 {
        return None;
    }

    let count = (first & 0x7F) as usize;
    if count > 4 || data.len() < 1 + count {
        return None;
    }
    let mut len = 0usize;
    for &byte in &data[1..=count] {
        len = (len << 8) | byte as usize;
    }
    Some((len, 1 + count))
}

/// Skip a TLV, returning the offset just past it.
fn skip_tlv(data: &[u8], offset: usize) -> Option<usize> {
    if offset >= data.len() {
        return None;
    }
    let (len, consumed) = parse_length(&data[offset + 1..])?;
    let next = offset + 1 + consumed + len;
    if next > data.len() {
        return None;
    }
    Some(next)
}
