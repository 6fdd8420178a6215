//! SNMPv3 message format (RFC 3412 Section 6).
//!
//! ```text
//! SNMPv3Message ::= SEQUENCE {
//!     msgVersion             INTEGER (3),
//!     msgGlobalData          SEQUENCE {
//!         msgID              INTEGER,   -- emitted as 4 fixed bytes
//!         msgMaxSize         INTEGER,
//!         msgFlags           OCTET STRING (SIZE(1)),
//!         msgSecurityModel   INTEGER
//!     },
//!     msgSecurityParameters  OCTET STRING,  -- model-specific, USM here
//!     msgData                CHOICE {
//!         plaintext          ScopedPDU,            -- SEQUENCE
//!         encryptedPDU       OCTET STRING          -- ciphertext
//!     }
//! }
//! ```
//!
//! For authenticated messages the MAC covers the entire marshalled
//! message including the encoding of its own (zeroed) slot, so the
//! marshaller reports the slot's byte offset for the HMAC pass.

use bytes::Bytes;

use crate::ber::{self, Decoder, EncodeBuf, tag};
use crate::error::{DecodeErrorKind, Error, Result};
use crate::pdu::Pdu;
use crate::v3::UsmSecurityParams;
use crate::v3::usm::MAC_LEN;

/// Largest UDP payload this side can receive (65535 - 20 IP - 8 UDP),
/// advertised as msgMaxSize.
pub const RX_BUF_SIZE: u32 = 65507;

/// msgSecurityModel values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SecurityModel {
    /// User-based Security Model (RFC 3414)
    Usm = 3,
}

impl SecurityModel {
    /// Create from the wire value.
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            3 => Some(Self::Usm),
            _ => None,
        }
    }

    /// The wire value.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Security level, ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SecurityLevel {
    /// No authentication, no privacy
    NoAuthNoPriv,
    /// Authentication only
    AuthNoPriv,
    /// Authentication and privacy
    AuthPriv,
}

impl SecurityLevel {
    /// Decode from the low bits of msgFlags. `None` for the invalid
    /// priv-without-auth combination.
    pub fn from_flags(flags: u8) -> Option<Self> {
        match (flags & 0x01 != 0, flags & 0x02 != 0) {
            (false, false) => Some(Self::NoAuthNoPriv),
            (true, false) => Some(Self::AuthNoPriv),
            (true, true) => Some(Self::AuthPriv),
            (false, true) => None,
        }
    }

    /// Encode to the low bits of msgFlags.
    pub fn to_flags(self) -> u8 {
        match self {
            Self::NoAuthNoPriv => 0x00,
            Self::AuthNoPriv => 0x01,
            Self::AuthPriv => 0x03,
        }
    }

    /// Whether the auth bit is set.
    pub fn requires_auth(self) -> bool {
        matches!(self, Self::AuthNoPriv | Self::AuthPriv)
    }

    /// Whether the priv bit is set.
    pub fn requires_priv(self) -> bool {
        matches!(self, Self::AuthPriv)
    }
}

/// msgFlags: security level plus the reportable bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MsgFlags {
    /// Security level
    pub security_level: SecurityLevel,
    /// Whether the peer may answer errors with a Report PDU
    pub reportable: bool,
}

impl MsgFlags {
    /// Create flags.
    pub fn new(security_level: SecurityLevel, reportable: bool) -> Self {
        Self {
            security_level,
            reportable,
        }
    }

    /// Decode from the flags byte.
    pub fn from_byte(byte: u8) -> Result<Self> {
        let security_level = SecurityLevel::from_flags(byte)
            .ok_or(Error::decode(0, DecodeErrorKind::InvalidMsgFlags))?;
        Ok(Self {
            security_level,
            reportable: byte & 0x04 != 0,
        })
    }

    /// Encode to the flags byte.
    pub fn to_byte(self) -> u8 {
        let mut flags = self.security_level.to_flags();
        if self.reportable {
            flags |= 0x04;
        }
        flags
    }
}

/// msgGlobalData header.
#[derive(Debug, Clone)]
pub struct MsgGlobalData {
    /// Message ID for request/response correlation
    pub msg_id: u32,
    /// Largest message the sender can accept
    pub msg_max_size: u32,
    /// Flags byte content
    pub msg_flags: MsgFlags,
    /// Security model in use
    pub msg_security_model: SecurityModel,
}

impl MsgGlobalData {
    /// Create global data under USM.
    pub fn new(msg_id: u32, msg_max_size: u32, msg_flags: MsgFlags) -> Self {
        Self {
            msg_id,
            msg_max_size,
            msg_flags,
            msg_security_model: SecurityModel::Usm,
        }
    }

    /// Encode into `buf` (reverse order).
    ///
    /// msgID is a fixed 4-byte INTEGER; msgMaxSize uses the usual
    /// minimum-byte unsigned form.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_sequence(|buf| {
            buf.push_integer(self.msg_security_model.as_i32());
            buf.push_octet_string(&[self.msg_flags.to_byte()]);
            buf.push_unsigned32(tag::universal::INTEGER, self.msg_max_size);
            buf.push_integer_fixed4(self.msg_id);
        });
    }

    /// Decode from `decoder`.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let mut seq = decoder.read_sequence()?;

        let msg_id = seq.read_unsigned32(tag::universal::INTEGER)?;
        let msg_max_size = seq.read_unsigned32(tag::universal::INTEGER)?;

        let flags_at = seq.offset();
        let flags_bytes = seq.read_octet_string()?;
        if flags_bytes.len() != 1 {
            return Err(Error::decode(
                flags_at,
                DecodeErrorKind::InvalidMsgFlagsLength {
                    length: flags_bytes.len(),
                },
            ));
        }
        let msg_flags = MsgFlags::from_byte(flags_bytes[0])?;

        let model_at = seq.offset();
        let raw_model = seq.read_integer()?;
        let msg_security_model = SecurityModel::from_i32(raw_model).ok_or(Error::decode(
            model_at,
            DecodeErrorKind::UnknownSecurityModel(raw_model),
        ))?;

        Ok(Self {
            msg_id,
            msg_max_size,
            msg_flags,
            msg_security_model,
        })
    }
}

/// Model-specific security parameters.
///
/// A closed tagged variant rather than a trait object: USM is the only
/// model today, and decode sites match on the variant instead of
/// downcasting.
#[derive(Debug, Clone)]
pub enum SecurityParams {
    /// User-based Security Model parameters
    Usm(UsmSecurityParams),
}

impl SecurityParams {
    /// Encode the model-specific content (the bytes inside the wrapping
    /// OCTET STRING).
    pub fn encode(&self) -> Bytes {
        match self {
            Self::Usm(usm) => usm.encode(),
        }
    }

    /// Decode content bytes for the given model.
    pub fn decode(model: SecurityModel, data: Bytes) -> Result<Self> {
        match model {
            SecurityModel::Usm => Ok(Self::Usm(UsmSecurityParams::decode(data)?)),
        }
    }

    /// The USM parameters.
    pub fn as_usm(&self) -> &UsmSecurityParams {
        match self {
            Self::Usm(usm) => usm,
        }
    }
}

/// Scoped PDU: context plus the PDU body.
#[derive(Debug, Clone)]
pub struct ScopedPdu {
    /// Context engine ID (defaults to the authoritative engine ID)
    pub context_engine_id: Bytes,
    /// Context name (usually empty)
    pub context_name: Bytes,
    /// The PDU body
    pub pdu: Pdu,
}

impl ScopedPdu {
    /// Create a scoped PDU.
    pub fn new(context_engine_id: impl Into<Bytes>, context_name: impl Into<Bytes>, pdu: Pdu) -> Self {
        Self {
            context_engine_id: context_engine_id.into(),
            context_name: context_name.into(),
            pdu,
        }
    }

    /// Create with empty context fields.
    pub fn with_empty_context(pdu: Pdu) -> Self {
        Self::new(Bytes::new(), Bytes::new(), pdu)
    }

    /// Encode into `buf` (reverse order).
    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_sequence(|buf| {
            self.pdu.encode(buf);
            buf.push_octet_string(&self.context_name);
            buf.push_octet_string(&self.context_engine_id);
        });
    }

    /// Encode to standalone bytes (the privacy layer encrypts this form).
    pub fn encode_to_bytes(&self) -> Bytes {
        let mut buf = EncodeBuf::new();
        self.encode(&mut buf);
        buf.finish()
    }

    /// Decode one scoped PDU.
    ///
    /// Trailing bytes after the SEQUENCE (DES decryption padding) are
    /// ignored by construction: the sequence decoder is bounded by the
    /// declared length.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let mut seq = decoder.read_sequence()?;
        let context_engine_id = seq.read_octet_string()?;
        let context_name = seq.read_octet_string()?;
        let pdu = Pdu::decode(&mut seq)?;
        Ok(Self {
            context_engine_id,
            context_name,
            pdu,
        })
    }
}

/// msgData: plaintext or encrypted Scoped PDU.
#[derive(Debug, Clone)]
pub enum V3MessageData {
    /// Plaintext scoped PDU (noAuthNoPriv, authNoPriv)
    Plaintext(ScopedPdu),
    /// Ciphertext of a scoped PDU (authPriv)
    Encrypted(Bytes),
}

/// A complete SNMPv3 message.
#[derive(Debug, Clone)]
pub struct V3Message {
    /// Header
    pub global_data: MsgGlobalData,
    /// Model-specific security parameters
    pub security_params: SecurityParams,
    /// Scoped PDU, possibly encrypted
    pub data: V3MessageData,
}

impl V3Message {
    /// Create a message with a plaintext scoped PDU.
    pub fn new(global_data: MsgGlobalData, security_params: SecurityParams, scoped: ScopedPdu) -> Self {
        Self {
            global_data,
            security_params,
            data: V3MessageData::Plaintext(scoped),
        }
    }

    /// Create a message with an encrypted scoped PDU.
    pub fn new_encrypted(
        global_data: MsgGlobalData,
        security_params: SecurityParams,
        ciphertext: Bytes,
    ) -> Self {
        Self {
            global_data,
            security_params,
            data: V3MessageData::Encrypted(ciphertext),
        }
    }

    /// The message ID.
    pub fn msg_id(&self) -> u32 {
        self.global_data.msg_id
    }

    /// The security level from the flags byte.
    pub fn security_level(&self) -> SecurityLevel {
        self.global_data.msg_flags.security_level
    }

    /// The scoped PDU, when plaintext.
    pub fn scoped_pdu(&self) -> Option<&ScopedPdu> {
        match &self.data {
            V3MessageData::Plaintext(scoped) => Some(scoped),
            V3MessageData::Encrypted(_) => None,
        }
    }

    /// Marshal to wire bytes.
    ///
    /// When the auth flag is set the MAC slot is emitted as twelve zero
    /// bytes; [`encode_with_auth_offset`](Self::encode_with_auth_offset)
    /// additionally reports where that slot landed.
    pub fn encode(&self) -> Bytes {
        let mut buf = EncodeBuf::with_capacity(256);
        buf.push_sequence(|buf| {
            match &self.data {
                V3MessageData::Plaintext(scoped) => scoped.encode(buf),
                V3MessageData::Encrypted(ciphertext) => buf.push_octet_string(ciphertext),
            }
            buf.push_octet_string(&self.security_params.encode());
            self.global_data.encode(buf);
            buf.push_integer(3);
        });
        buf.finish()
    }

    /// Marshal and report the MAC-slot offset.
    ///
    /// Returns the wire bytes and, when the auth flag is set, the byte
    /// offset of the 12-byte MAC slot. The offset is validated here —
    /// in range and pointing at twelve zero bytes — so the HMAC pass can
    /// never index out of bounds.
    pub fn encode_with_auth_offset(&self) -> Result<(Vec<u8>, Option<usize>)> {
        let bytes = self.encode().to_vec();

        if bytes.len() > ber::MAX_LENGTH {
            return Err(Error::MessageTooLarge {
                size: bytes.len(),
                max: ber::MAX_LENGTH,
            });
        }

        if !self.security_level().requires_auth() {
            return Ok((bytes, None));
        }

        let (offset, len) = UsmSecurityParams::find_auth_params_offset(&bytes)
            .ok_or(Error::encode(crate::error::EncodeErrorKind::MissingAuthParams))?;
        let slot_ok = len == MAC_LEN
            && offset + MAC_LEN <= bytes.len()
            && bytes[offset..offset + MAC_LEN].iter().all(|&b| b == 0);
        if !slot_ok {
            return Err(Error::encode(
                crate::error::EncodeErrorKind::MissingAuthParams,
            ));
        }

        Ok((bytes, Some(offset)))
    }

    /// Unmarshal from wire bytes.
    ///
    /// Encrypted msgData is returned as raw ciphertext; the privacy layer
    /// decrypts it with the boots/time/salt carried in the USM parameters.
    pub fn decode(data: Bytes) -> Result<Self> {
        let mut decoder = Decoder::new(data);
        let mut seq = decoder.read_sequence()?;

        let version_at = seq.offset();
        let version = seq.read_integer()?;
        if version != 3 {
            return Err(Error::decode(
                version_at,
                DecodeErrorKind::UnknownVersion(version),
            ));
        }

        let global_data = MsgGlobalData::decode(&mut seq)?;

        let raw_params = seq.read_octet_string()?;
        let security_params = SecurityParams::decode(global_data.msg_security_model, raw_params)?;

        let data = if global_data.msg_flags.security_level.requires_priv() {
            V3MessageData::Encrypted(seq.read_octet_string()?)
        } else {
            V3MessageData::Plaintext(ScopedPdu::decode(&mut seq)?)
        };

        Ok(Self {
            global_data,
            security_params,
            data,
        })
    }

    /// Build the engine-discovery probe: reportable noAuthNoPriv, empty
    /// USM parameters, GetRequest with no varbinds.
    pub fn discovery_request(msg_id: u32) -> Self {
        let global_data = MsgGlobalData::new(
            msg_id,
            RX_BUF_SIZE,
            MsgFlags::new(SecurityLevel::NoAuthNoPriv, true),
        );
        let scoped = ScopedPdu::with_empty_context(Pdu::get_request(0, &[]));
        Self::new(
            global_data,
            SecurityParams::Usm(UsmSecurityParams::empty()),
            scoped,
        )
    }
}
