//! SNMP value types.

use bytes::Bytes;

use crate::ber::{Decoder, EncodeBuf, tag};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::oid::Oid;

/// An SNMP variable value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// INTEGER
    Integer(i32),
    /// OCTET STRING
    OctetString(Bytes),
    /// NULL (used as the placeholder value in requests)
    Null,
    /// OBJECT IDENTIFIER
    ObjectIdentifier(Oid),
    /// IpAddress (APPLICATION 0)
    IpAddress([u8; 4]),
    /// Counter32 (APPLICATION 1)
    Counter32(u32),
    /// Gauge32 / Unsigned32 (APPLICATION 2)
    Gauge32(u32),
    /// TimeTicks (APPLICATION 3)
    TimeTicks(u32),
    /// Opaque (APPLICATION 4)
    Opaque(Bytes),
    /// Counter64 (APPLICATION 6)
    Counter64(u64),
    /// noSuchObject exception (v2c/v3)
    NoSuchObject,
    /// noSuchInstance exception (v2c/v3)
    NoSuchInstance,
    /// endOfMibView exception (v2c/v3)
    EndOfMibView,
}

impl Value {
    /// Encode into `buf` (reverse order, like all encoders in this crate).
    pub fn encode(&self, buf: &mut EncodeBuf) {
        match self {
            Self::Integer(v) => buf.push_integer(*v),
            Self::OctetString(v) => buf.push_octet_string(v),
            Self::Null => buf.push_null(),
            Self::ObjectIdentifier(v) => buf.push_oid(v),
            Self::IpAddress(v) => {
                buf.push_bytes(v);
                buf.push_length(4);
                buf.push_tag(tag::application::IP_ADDRESS);
            }
            Self::Counter32(v) => buf.push_unsigned32(tag::application::COUNTER32, *v),
            Self::Gauge32(v) => buf.push_unsigned32(tag::application::GAUGE32, *v),
            Self::TimeTicks(v) => buf.push_unsigned32(tag::application::TIMETICKS, *v),
            Self::Opaque(v) => {
                buf.push_bytes(v);
                buf.push_length(v.len());
                buf.push_tag(tag::application::OPAQUE);
            }
            Self::Counter64(v) => buf.push_unsigned64(tag::application::COUNTER64, *v),
            Self::NoSuchObject => {
                buf.push_length(0);
                buf.push_tag(tag::context::NO_SUCH_OBJECT);
            }
            Self::NoSuchInstance => {
                buf.push_length(0);
                buf.push_tag(tag::context::NO_SUCH_INSTANCE);
            }
            Self::EndOfMibView => {
                buf.push_length(0);
                buf.push_tag(tag::context::END_OF_MIB_VIEW);
            }
        }
    }

    /// Decode a value based on its leading tag.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let at = decoder.offset();
        let Some(t) = decoder.peek_tag() else {
            return Err(Error::decode(at, DecodeErrorKind::TruncatedData));
        };

        match t {
            tag::universal::INTEGER => Ok(Self::Integer(decoder.read_integer()?)),
            tag::universal::OCTET_STRING => Ok(Self::OctetString(decoder.read_octet_string()?)),
            tag::universal::NULL => {
                decoder.read_null()?;
                Ok(Self::Null)
            }
            tag::universal::OBJECT_IDENTIFIER => Ok(Self::ObjectIdentifier(decoder.read_oid()?)),
            tag::application::IP_ADDRESS => {
                let len = decoder.expect_tag(t)?;
                if len != 4 {
                    return Err(Error::decode(
                        at,
                        DecodeErrorKind::InsufficientData {
                            needed: 4,
                            available: len,
                        },
                    ));
                }
                let bytes = decoder.read_bytes(4)?;
                Ok(Self::IpAddress([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            tag::application::COUNTER32 => Ok(Self::Counter32(decoder.read_unsigned32(t)?)),
            tag::application::GAUGE32 => Ok(Self::Gauge32(decoder.read_unsigned32(t)?)),
            tag::application::TIMETICKS => Ok(Self::TimeTicks(decoder.read_unsigned32(t)?)),
            tag::application::OPAQUE => {
                let len = decoder.expect_tag(t)?;
                Ok(Self::Opaque(decoder.read_bytes(len)?))
            }
            tag::application::COUNTER64 => Ok(Self::Counter64(decoder.read_unsigned64(t)?)),
            tag::context::NO_SUCH_OBJECT => {
                decoder.skip_tlv()?;
                Ok(Self::NoSuchObject)
            }
            tag::context::NO_SUCH_INSTANCE => {
                decoder.skip_tlv()?;
                Ok(Self::NoSuchInstance)
            }
            tag::context::END_OF_MIB_VIEW => {
                decoder.skip_tlv()?;
                Ok(Self::EndOfMibView)
            }
            other => Err(Error::decode(at, DecodeErrorKind::UnknownValueTag(other))),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::OctetString(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: Value) -> Value {
        let mut buf = EncodeBuf::new();
        value.encode(&mut buf);
        let encoded = buf.finish();
        let mut dec = Decoder::new(encoded);
        Value::decode(&mut dec).unwrap()
    }

    #[test]
    fn roundtrip_scalars() {
        assert_eq!(roundtrip(Value::Integer(-42)), Value::Integer(-42));
        assert_eq!(roundtrip(Value::Null), Value::Null);
        assert_eq!(
            roundtrip(Value::Counter32(u32::MAX)),
            Value::Counter32(u32::MAX)
        );
        assert_eq!(roundtrip(Value::Gauge32(0)), Value::Gauge32(0));
        assert_eq!(roundtrip(Value::TimeTicks(12345)), Value::TimeTicks(12345));
        assert_eq!(
            roundtrip(Value::Counter64(u64::MAX)),
            Value::Counter64(u64::MAX)
        );
        assert_eq!(
            roundtrip(Value::IpAddress([192, 0, 2, 1])),
            Value::IpAddress([192, 0, 2, 1])
        );
    }

    #[test]
    fn roundtrip_strings_and_oids() {
        assert_eq!(roundtrip(Value::from("hello")), Value::from("hello"));
        let oid = crate::oid!(1, 3, 6, 1, 6, 3, 15, 1, 1, 4, 0);
        assert_eq!(
            roundtrip(Value::ObjectIdentifier(oid.clone())),
            Value::ObjectIdentifier(oid)
        );
    }

    #[test]
    fn roundtrip_exceptions() {
        assert_eq!(roundtrip(Value::NoSuchObject), Value::NoSuchObject);
        assert_eq!(roundtrip(Value::NoSuchInstance), Value::NoSuchInstance);
        assert_eq!(roundtrip(Value::EndOfMibView), Value::EndOfMibView);
    }

    #[test]
    fn counter32_wire_form() {
        let mut buf = EncodeBuf::new();
        Value::Counter32(1).encode(&mut buf);
        assert_eq!(&buf.finish()[..], &[0x41, 0x01, 0x01]);
    }

    #[test]
    fn unknown_tag_is_a_value_error() {
        // 0x47 is not a value tag in any SNMP version.
        let mut dec = Decoder::from_slice(&[0x47, 0x01, 0x00]);
        assert!(matches!(
            Value::decode(&mut dec),
            Err(Error::Decode {
                kind: DecodeErrorKind::UnknownValueTag(0x47),
                ..
            })
        ));
    }
}
