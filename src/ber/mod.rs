//! BER (Basic Encoding Rules) primitives.
//!
//! SNMP messages are BER TLV structures. This module provides the tag
//! constants, the length codec, and a reverse-order encoder. Decoding
//! lives in [`decode`].
//!
//! # Reverse-order encoding
//!
//! BER lengths precede their content, so a forward encoder must either
//! pre-compute every nested length or shift bytes around. [`EncodeBuf`]
//! instead writes everything back-to-front: callers push the *last* field
//! first, constructed types learn their content length for free, and
//! [`EncodeBuf::finish`] reverses the buffer once at the end.

pub mod decode;

pub use decode::Decoder;

use bytes::Bytes;

use crate::oid::Oid;

/// BER tag constants.
pub mod tag {
    /// Universal class tags.
    pub mod universal {
        pub const INTEGER: u8 = 0x02;
        pub const OCTET_STRING: u8 = 0x04;
        pub const NULL: u8 = 0x05;
        pub const OBJECT_IDENTIFIER: u8 = 0x06;
        pub const SEQUENCE: u8 = 0x30;
    }

    /// SNMP application class tags (RFC 2578).
    pub mod application {
        pub const IP_ADDRESS: u8 = 0x40;
        pub const COUNTER32: u8 = 0x41;
        pub const GAUGE32: u8 = 0x42;
        pub const TIMETICKS: u8 = 0x43;
        pub const OPAQUE: u8 = 0x44;
        pub const COUNTER64: u8 = 0x46;
    }

    /// Context class tags used for v2c/v3 varbind exceptions (RFC 3416).
    pub mod context {
        pub const NO_SUCH_OBJECT: u8 = 0x80;
        pub const NO_SUCH_INSTANCE: u8 = 0x81;
        pub const END_OF_MIB_VIEW: u8 = 0x82;
    }
}

/// Maximum BER length accepted when decoding.
///
/// 2 MB is far beyond any legitimate SNMP message and bounds allocations
/// driven by attacker-controlled length fields.
pub const MAX_LENGTH: usize = 0x20_0000;

/// Encode a BER length (X.690 Section 8.1.3).
///
/// Returns the encoding *in reverse byte order* together with its size, so
/// it can be appended to an [`EncodeBuf`] that is being built back-to-front.
pub fn encode_length(len: usize) -> ([u8; 5], usize) {
    let mut buf = [0u8; 5];

    if len <= 127 {
        buf[0] = len as u8;
        (buf, 1)
    } else if len <= 0xFF {
        buf[0] = len as u8;
        buf[1] = 0x81;
        (buf, 2)
    } else if len <= 0xFFFF {
        buf[0] = len as u8;
        buf[1] = (len >> 8) as u8;
        buf[2] = 0x82;
        (buf, 3)
    } else if len <= 0xFF_FFFF {
        buf[0] = len as u8;
        buf[1] = (len >> 8) as u8;
        buf[2] = (len >> 16) as u8;
        buf[3] = 0x83;
        (buf, 4)
    } else {
        buf[0] = len as u8;
        buf[1] = (len >> 8) as u8;
        buf[2] = (len >> 16) as u8;
        buf[3] = (len >> 24) as u8;
        buf[4] = 0x84;
        (buf, 5)
    }
}

/// Reverse-order BER encoder.
///
/// Fields must be pushed in reverse: the last field of a SEQUENCE first.
/// [`finish`](Self::finish) reverses the accumulated bytes into wire order.
///
/// ```
/// use snmp_usm::ber::EncodeBuf;
///
/// let mut buf = EncodeBuf::new();
/// buf.push_sequence(|buf| {
///     buf.push_integer(2); // second field, pushed first
///     buf.push_integer(1);
/// });
/// assert_eq!(&buf.finish()[..], &[0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02]);
/// ```
#[derive(Default)]
pub struct EncodeBuf {
    // Stored reversed; `finish` flips it.
    buf: Vec<u8>,
}

impl EncodeBuf {
    /// Create an empty encoder.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Create an encoder with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Push a single tag byte.
    pub fn push_tag(&mut self, tag: u8) {
        self.buf.push(tag);
    }

    /// Push a length field.
    pub fn push_length(&mut self, len: usize) {
        let (bytes, n) = encode_length(len);
        self.buf.extend_from_slice(&bytes[..n]);
    }

    /// Push raw content bytes.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend(bytes.iter().rev());
    }

    /// Push an OCTET STRING.
    pub fn push_octet_string(&mut self, data: &[u8]) {
        self.push_bytes(data);
        self.push_length(data.len());
        self.push_tag(tag::universal::OCTET_STRING);
    }

    /// Push a NULL.
    pub fn push_null(&mut self) {
        self.push_length(0);
        self.push_tag(tag::universal::NULL);
    }

    /// Push an INTEGER in minimum two's-complement form.
    pub fn push_integer(&mut self, value: i32) {
        let be = value.to_be_bytes();
        // Strip redundant leading bytes while the sign is preserved.
        let mut start = 0;
        while start < 3 {
            let redundant = (be[start] == 0x00 && be[start + 1] & 0x80 == 0)
                || (be[start] == 0xFF && be[start + 1] & 0x80 != 0);
            if !redundant {
                break;
            }
            start += 1;
        }
        self.push_bytes(&be[start..]);
        self.push_length(4 - start);
        self.push_tag(tag::universal::INTEGER);
    }

    /// Push an unsigned 32-bit value in minimum-byte form under `tag`.
    ///
    /// A leading zero byte is added when the top bit of the first content
    /// byte is set, keeping the encoding non-negative.
    pub fn push_unsigned32(&mut self, tag: u8, value: u32) {
        let be = value.to_be_bytes();
        let first = be.iter().position(|&b| b != 0).unwrap_or(3);

        let mut content = [0u8; 5];
        let mut n = 0;
        if be[first] & 0x80 != 0 {
            content[n] = 0x00;
            n += 1;
        }
        content[n..n + 4 - first].copy_from_slice(&be[first..]);
        n += 4 - first;

        self.push_bytes(&content[..n]);
        self.push_length(n);
        self.push_tag(tag);
    }

    /// Push an unsigned 64-bit value in minimum-byte form under `tag`.
    pub fn push_unsigned64(&mut self, tag: u8, value: u64) {
        let be = value.to_be_bytes();
        let first = be.iter().position(|&b| b != 0).unwrap_or(7);

        let mut content = [0u8; 9];
        let mut n = 0;
        if be[first] & 0x80 != 0 {
            content[n] = 0x00;
            n += 1;
        }
        content[n..n + 8 - first].copy_from_slice(&be[first..]);
        n += 8 - first;

        self.push_bytes(&content[..n]);
        self.push_length(n);
        self.push_tag(tag);
    }

    /// Push an INTEGER as exactly four big-endian bytes, regardless of value.
    ///
    /// The v3 msgID field is emitted in this fixed-width form rather than
    /// the minimum-byte form used everywhere else.
    pub fn push_integer_fixed4(&mut self, value: u32) {
        self.push_bytes(&value.to_be_bytes());
        self.push_length(4);
        self.push_tag(tag::universal::INTEGER);
    }

    /// Push an OBJECT IDENTIFIER.
    pub fn push_oid(&mut self, oid: &Oid) {
        let ber = oid.to_ber();
        self.push_bytes(&ber);
        self.push_length(ber.len());
        self.push_tag(tag::universal::OBJECT_IDENTIFIER);
    }

    /// Push a SEQUENCE whose content is produced by `f`.
    pub fn push_sequence(&mut self, f: impl FnOnce(&mut Self)) {
        self.push_constructed(tag::universal::SEQUENCE, f);
    }

    /// Push a constructed TLV with an arbitrary tag.
    pub fn push_constructed(&mut self, tag: u8, f: impl FnOnce(&mut Self)) {
        let before = self.buf.len();
        f(self);
        let content_len = self.buf.len() - before;
        self.push_length(content_len);
        self.push_tag(tag);
    }

    /// Reverse the buffer into wire order and return it.
    pub fn finish(mut self) -> Bytes {
        self.buf.reverse();
        Bytes::from(self.buf)
    }
}
