//! SNMP Protocol Data Units.

use crate::ber::{Decoder, EncodeBuf};
use crate::error::{DecodeErrorKind, Error, ErrorStatus, Result};
use crate::oid::Oid;
use crate::varbind::{VarBind, decode_varbind_list, encode_varbind_list};

/// PDU type tag (context-constructed class).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PduType {
    GetRequest = 0xA0,
    GetNextRequest = 0xA1,
    Response = 0xA2,
    SetRequest = 0xA3,
    Report = 0xA8,
}

impl PduType {
    /// Create from a tag byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0xA0 => Some(Self::GetRequest),
            0xA1 => Some(Self::GetNextRequest),
            0xA2 => Some(Self::Response),
            0xA3 => Some(Self::SetRequest),
            0xA8 => Some(Self::Report),
            _ => None,
        }
    }

    /// The tag byte.
    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for PduType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GetRequest => write!(f, "GetRequest"),
            Self::GetNextRequest => write!(f, "GetNextRequest"),
            Self::Response => write!(f, "Response"),
            Self::SetRequest => write!(f, "SetRequest"),
            Self::Report => write!(f, "Report"),
        }
    }
}

/// Request/response PDU.
#[derive(Debug, Clone)]
pub struct Pdu {
    /// PDU type
    pub pdu_type: PduType,
    /// Request ID for request/response correlation
    pub request_id: u32,
    /// Error status (0 in requests)
    pub error_status: i32,
    /// 1-based index of the varbind that caused an error
    pub error_index: i32,
    /// Variable bindings
    pub varbinds: Vec<VarBind>,
}

impl Pdu {
    /// Create a GET request.
    pub fn get_request(request_id: u32, oids: &[Oid]) -> Self {
        Self {
            pdu_type: PduType::GetRequest,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds: oids.iter().map(|oid| VarBind::null(oid.clone())).collect(),
        }
    }

    /// Create a GETNEXT request.
    pub fn get_next_request(request_id: u32, oids: &[Oid]) -> Self {
        Self {
            pdu_type: PduType::GetNextRequest,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds: oids.iter().map(|oid| VarBind::null(oid.clone())).collect(),
        }
    }

    /// Create a SET request.
    pub fn set_request(request_id: u32, varbinds: Vec<VarBind>) -> Self {
        Self {
            pdu_type: PduType::SetRequest,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds,
        }
    }

    /// Encode into `buf`.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_constructed(self.pdu_type.tag(), |buf| {
            encode_varbind_list(buf, &self.varbinds);
            buf.push_integer(self.error_index);
            buf.push_integer(self.error_status);
            buf.push_integer(self.request_id as i32);
        });
    }

    /// Decode one PDU.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let at = decoder.offset();
        let tag = decoder.read_tag()?;
        let pdu_type = PduType::from_tag(tag)
            .ok_or_else(|| Error::decode(at, DecodeErrorKind::UnknownPduType(tag)))?;

        let len = decoder.read_length()?;
        let mut body = decoder.sub_decoder(len)?;

        let request_id = body.read_integer()? as u32;
        let error_status = body.read_integer()?;
        let error_index = body.read_integer()?;
        let varbinds = decode_varbind_list(&mut body)?;

        Ok(Self {
            pdu_type,
            request_id,
            error_status,
            error_index,
            varbinds,
        })
    }

    /// Whether the agent flagged an error.
    pub fn is_error(&self) -> bool {
        self.error_status != 0
    }

    /// The error status as an enum.
    pub fn error_status_enum(&self) -> ErrorStatus {
        ErrorStatus::from_i32(self.error_status)
    }

    /// Whether this is a Report PDU (USM error signalling).
    pub fn is_report(&self) -> bool {
        self.pdu_type == PduType::Report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn get_request_roundtrip() {
        let pdu = Pdu::get_request(12345, &[crate::oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]);

        let mut buf = EncodeBuf::new();
        pdu.encode(&mut buf);
        let bytes = buf.finish();
        assert_eq!(bytes[0], 0xA0);

        let mut decoder = Decoder::new(bytes);
        let decoded = Pdu::decode(&mut decoder).unwrap();
        assert_eq!(decoded.pdu_type, PduType::GetRequest);
        assert_eq!(decoded.request_id, 12345);
        assert_eq!(decoded.varbinds.len(), 1);
        assert_eq!(decoded.varbinds[0].value, Value::Null);
    }

    #[test]
    fn set_request_roundtrip() {
        let pdu = Pdu::set_request(
            7,
            vec![VarBind::new(
                crate::oid!(1, 3, 6, 1, 2, 1, 1, 4, 0),
                Value::from("admin"),
            )],
        );

        let mut buf = EncodeBuf::new();
        pdu.encode(&mut buf);
        let mut decoder = Decoder::new(buf.finish());
        let decoded = Pdu::decode(&mut decoder).unwrap();
        assert_eq!(decoded.pdu_type, PduType::SetRequest);
        assert_eq!(decoded.varbinds[0].value, Value::from("admin"));
    }

    #[test]
    fn report_pdu_decodes() {
        let pdu = Pdu {
            pdu_type: PduType::Report,
            request_id: 1,
            error_status: 0,
            error_index: 0,
            varbinds: vec![VarBind::new(
                crate::oid!(1, 3, 6, 1, 6, 3, 15, 1, 1, 4, 0),
                Value::Counter32(3),
            )],
        };

        let mut buf = EncodeBuf::new();
        pdu.encode(&mut buf);
        let mut decoder = Decoder::new(buf.finish());
        let decoded = Pdu::decode(&mut decoder).unwrap();
        assert!(decoded.is_report());
        assert_eq!(decoded.varbinds[0].value, Value::Counter32(3));
    }

    #[test]
    fn error_status_surfaced() {
        let pdu = Pdu {
            pdu_type: PduType::Response,
            request_id: 9,
            error_status: 2,
            error_index: 1,
            varbinds: vec![],
        };
        assert!(pdu.is_error());
        assert_eq!(pdu.error_status_enum(), ErrorStatus::NoSuchName);
    }

    #[test]
    fn unknown_pdu_tag_rejected() {
        let mut decoder = Decoder::from_slice(&[0xA5, 0x00]);
        assert!(matches!(
            Pdu::decode(&mut decoder),
            Err(Error::Decode {
                kind: DecodeErrorKind::UnknownPduType(0xA5),
                ..
            })
        ));
    }
}
