//! BER decoding.
//!
//! [`Decoder`] is a zero-copy cursor over [`Bytes`]. Constructed types hand
//! out sub-decoders over their content slice, so a field can never read
//! past its enclosing TLV.
//!
//! Decoding is permissive where deployed agents are known to be sloppy:
//! non-minimal INTEGER and length encodings are accepted, and INTEGERs
//! longer than four bytes are truncated with a warning rather than
//! rejected. Indefinite-form lengths are rejected outright.

use bytes::Bytes;

use super::{MAX_LENGTH, tag};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::oid::Oid;

/// Decode a BER length, returning `(length, bytes_consumed)`.
///
/// `base_offset` is the absolute position of the length field, used for
/// error reporting.
pub fn decode_length(data: &[u8], base_offset: usize) -> Result<(usize, usize)> {
    let Some(&first) = data.first() else {
        return Err(Error::decode(base_offset, DecodeErrorKind::TruncatedData));
    };

    if first == 0x80 {
        return Err(Error::decode(
            base_offset,
            DecodeErrorKind::IndefiniteLength,
        ));
    }

    if first & 0x80 == 0 {
        return Ok((first as usize, 1));
    }

    let num_octets = (first & 0x7F) as usize;
    if num_octets > 4 {
        return Err(Error::decode(
            base_offset,
            DecodeErrorKind::LengthTooLong { octets: num_octets },
        ));
    }
    if data.len() < 1 + num_octets {
        return Err(Error::decode(base_offset, DecodeErrorKind::TruncatedData));
    }

    let mut len = 0usize;
    for &byte in &data[1..=num_octets] {
        len = (len << 8) | byte as usize;
    }

    if len > MAX_LENGTH {
        return Err(Error::decode(
            base_offset,
            DecodeErrorKind::LengthExceedsMax {
                length: len,
                max: MAX_LENGTH,
            },
        ));
    }

    Ok((len, 1 + num_octets))
}

/// BER decoder over a byte buffer.
pub struct Decoder {
    data: Bytes,
    offset: usize,
}

impl Decoder {
    /// Create a decoder over `data`.
    pub fn new(data: Bytes) -> Self {
        Self { data, offset: 0 }
    }

    /// Create a decoder over a copied slice.
    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }

    /// Current absolute offset.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    /// Whether the cursor is at the end.
    pub fn is_empty(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// Peek the next tag byte without consuming it.
    pub fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.offset).copied()
    }

    /// Read one byte.
    pub fn read_byte(&mut self) -> Result<u8> {
        let Some(&byte) = self.data.get(self.offset) else {
            return Err(Error::decode(self.offset, DecodeErrorKind::TruncatedData));
        };
        self.offset += 1;
        Ok(byte)
    }

    /// Read a tag byte.
    pub fn read_tag(&mut self) -> Result<u8> {
        self.read_byte()
    }

    /// Read a length field.
    pub fn read_length(&mut self) -> Result<usize> {
        let (len, consumed) = decode_length(&self.data[self.offset..], self.offset)?;
        self.offset += consumed;
        Ok(len)
    }

    /// Read `len` raw bytes without copying.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        if self.offset.saturating_add(len) > self.data.len() {
            return Err(Error::decode(
                self.offset,
                DecodeErrorKind::InsufficientData {
                    needed: len,
                    available: self.remaining(),
                },
            ));
        }
        let bytes = self.data.slice(self.offset..self.offset + len);
        self.offset += len;
        Ok(bytes)
    }

    /// Read a tag, failing unless it matches; returns the content length.
    pub fn expect_tag(&mut self, expected: u8) -> Result<usize> {
        let at = self.offset;
        let actual = self.read_tag()?;
        if actual != expected {
            return Err(Error::decode(
                at,
                DecodeErrorKind::UnexpectedTag { expected, actual },
            ));
        }
        self.read_length()
    }

    /// Read a signed INTEGER.
    pub fn read_integer(&mut self) -> Result<i32> {
        let len = self.expect_tag(tag::universal::INTEGER)?;
        self.read_integer_value(len)
    }

    /// Read a signed integer value whose length is already known.
    pub fn read_integer_value(&mut self, len: usize) -> Result<i32> {
        if len == 0 {
            return Err(Error::decode(
                self.offset,
                DecodeErrorKind::ZeroLengthInteger,
            ));
        }
        if len > 4 {
            // Tolerated: truncate to the first four bytes like net-snmp.
            tracing::warn!(
                offset = self.offset,
                length = len,
                "integer too long, truncating"
            );
        }

        let bytes = self.read_bytes(len)?;
        let mut value: i32 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
        for &byte in bytes.iter().take(4) {
            value = (value << 8) | byte as i32;
        }
        Ok(value)
    }

    /// Read an unsigned 32-bit value under `expected_tag`.
    ///
    /// Accepts any length up to five bytes (a leading zero plus four value
    /// bytes); longer encodings are truncated with a warning.
    pub fn read_unsigned32(&mut self, expected_tag: u8) -> Result<u32> {
        let len = self.expect_tag(expected_tag)?;
        self.read_unsigned32_value(len)
    }

    /// Read an unsigned 32-bit value whose length is already known.
    pub fn read_unsigned32_value(&mut self, len: usize) -> Result<u32> {
        if len == 0 {
            return Err(Error::decode(
                self.offset,
                DecodeErrorKind::ZeroLengthInteger,
            ));
        }
        if len > 5 {
            tracing::warn!(
                offset = self.offset,
                length = len,
                "unsigned integer too long, truncating"
            );
        }

        let bytes = self.read_bytes(len)?;
        let mut value: u32 = 0;
        for &byte in bytes.iter().take(5) {
            value = (value << 8) | byte as u32;
        }
        Ok(value)
    }

    /// Read an unsigned 64-bit value under `expected_tag` (Counter64).
    pub fn read_unsigned64(&mut self, expected_tag: u8) -> Result<u64> {
        let len = self.expect_tag(expected_tag)?;
        if len == 0 {
            return Err(Error::decode(
                self.offset,
                DecodeErrorKind::ZeroLengthInteger,
            ));
        }
        if len > 9 {
            return Err(Error::decode(
                self.offset,
                DecodeErrorKind::IntegerTooLong { length: len },
            ));
        }

        let bytes = self.read_bytes(len)?;
        let mut value: u64 = 0;
        for &byte in bytes.iter() {
            value = (value << 8) | byte as u64;
        }
        Ok(value)
    }

    /// Read an OCTET STRING.
    pub fn read_octet_string(&mut self) -> Result<Bytes> {
        let len = self.expect_tag(tag::universal::OCTET_STRING)?;
        self.read_bytes(len)
    }

    /// Read a NULL.
    pub fn read_null(&mut self) -> Result<()> {
        let len = self.expect_tag(tag::universal::NULL)?;
        if len != 0 {
            return Err(Error::decode(self.offset, DecodeErrorKind::InvalidNull));
        }
        Ok(())
    }

    /// Read an OBJECT IDENTIFIER.
    pub fn read_oid(&mut self) -> Result<Oid> {
        let len = self.expect_tag(tag::universal::OBJECT_IDENTIFIER)?;
        let at = self.offset;
        let bytes = self.read_bytes(len)?;
        Oid::from_ber(&bytes).map_err(|_| Error::decode(at, DecodeErrorKind::InvalidOidEncoding))
    }

    /// Read a SEQUENCE, returning a decoder over its content.
    pub fn read_sequence(&mut self) -> Result<Decoder> {
        self.read_constructed(tag::universal::SEQUENCE)
    }

    /// Read a constructed TLV with the given tag, returning a decoder over
    /// its content.
    pub fn read_constructed(&mut self, expected_tag: u8) -> Result<Decoder> {
        let len = self.expect_tag(expected_tag)?;
        let content = self.read_bytes(len)?;
        Ok(Decoder::new(content))
    }

    /// Create a sub-decoder over the next `len` bytes.
    pub fn sub_decoder(&mut self, len: usize) -> Result<Decoder> {
        let content = self.read_bytes(len)?;
        Ok(Decoder::new(content))
    }

    /// Skip one TLV without interpreting it.
    pub fn skip_tlv(&mut self) -> Result<()> {
        let _ = self.read_tag()?;
        let len = self.read_length()?;
        let new_offset = self.offset.saturating_add(len);
        if new_offset > self.data.len() {
            return Err(Error::decode(self.offset, DecodeErrorKind::TlvOverflow));
        }
        self.offset = new_offset;
        Ok(())
    }

    /// Remaining data as a slice.
    pub fn remaining_slice(&self) -> &[u8] {
        &self.data[self.offset..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_integers() {
        let mut dec = Decoder::from_slice(&[0x02, 0x01, 0x00]);
        assert_eq!(dec.read_integer().unwrap(), 0);

        let mut dec = Decoder::from_slice(&[0x02, 0x02, 0x00, 0x80]);
        assert_eq!(dec.read_integer().unwrap(), 128);

        let mut dec = Decoder::from_slice(&[0x02, 0x01, 0xFF]);
        assert_eq!(dec.read_integer().unwrap(), -1);
    }

    #[test]
    fn decode_accepts_non_minimal_integer() {
        let mut dec = Decoder::from_slice(&[0x02, 0x03, 0x00, 0x00, 0x7F]);
        assert_eq!(dec.read_integer().unwrap(), 127);
    }

    #[test]
    fn decode_truncates_oversized_integer() {
        let mut dec = Decoder::from_slice(&[0x02, 0x05, 0x01, 0x02, 0x03, 0x04, 0x05]);
        assert_eq!(dec.read_integer().unwrap(), 0x0102_0304);
    }

    #[test]
    fn decode_unsigned32_with_sign_guard_byte() {
        // 65507 encoded with a leading zero to keep it non-negative.
        let mut dec = Decoder::from_slice(&[0x02, 0x03, 0x00, 0xFF, 0xE3]);
        assert_eq!(dec.read_unsigned32(0x02).unwrap(), 65507);
    }

    #[test]
    fn decode_octet_string_and_null() {
        let mut dec = Decoder::from_slice(&[0x04, 0x02, b'o', b'k', 0x05, 0x00]);
        assert_eq!(&dec.read_octet_string().unwrap()[..], b"ok");
        dec.read_null().unwrap();
        assert!(dec.is_empty());
    }

    #[test]
    fn decode_sequence_bounds_content() {
        let mut dec = Decoder::from_slice(&[0x30, 0x03, 0x02, 0x01, 0x07, 0xAA]);
        let mut seq = dec.read_sequence().unwrap();
        assert_eq!(seq.read_integer().unwrap(), 7);
        assert!(seq.is_empty());
        // The trailing byte is outside the sequence.
        assert_eq!(dec.remaining(), 1);
    }

    #[test]
    fn rejects_indefinite_length() {
        let mut dec = Decoder::from_slice(&[0x30, 0x80, 0x00, 0x00]);
        assert!(dec.read_sequence().is_err());
    }

    #[test]
    fn rejects_truncated_content() {
        let mut dec = Decoder::from_slice(&[0x04, 0x10, 0x01]);
        assert!(dec.read_octet_string().is_err());
    }

    #[test]
    fn rejects_length_beyond_cap() {
        // 0x84 followed by 4 bytes encoding 16 MB.
        let mut dec = Decoder::from_slice(&[0x04, 0x84, 0x01, 0x00, 0x00, 0x00]);
        let err = dec.read_octet_string().unwrap_err();
        assert!(matches!(
            err,
            Error::Decode {
                kind: DecodeErrorKind::LengthExceedsMax { .. },
                ..
            }
        ));
    }

    #[test]
    fn skip_tlv_checks_bounds() {
        let mut dec = Decoder::from_slice(&[0x04, 0x05, 0x01, 0x02]);
        assert!(dec.skip_tlv().is_err());

        let mut dec = Decoder::from_slice(&[0x04, 0x02, 0x01, 0x02, 0x05, 0x00]);
        dec.skip_tlv().unwrap();
        dec.read_null().unwrap();
    }
}
