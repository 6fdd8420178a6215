//! Error types.
//!
//! All fallible operations in this crate return [`Result`]. The [`Error`]
//! enum is `#[non_exhaustive]`; kind sub-enums carry the detail for the
//! codec and security layers.

use std::net::SocketAddr;
use std::time::Duration;

/// Result type alias using the library's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Authentication failure detail (USM).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// No authentication key available for the operation.
    NoAuthKey,
    /// HMAC verification failed.
    HmacMismatch,
    /// msgAuthenticationParameters had the wrong length.
    WrongMacLength { expected: usize, actual: usize },
    /// The MAC slot could not be located in the marshalled message.
    AuthParamsNotFound,
}

impl std::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAuthKey => write!(f, "no authentication key available"),
            Self::HmacMismatch => write!(f, "HMAC verification failed"),
            Self::WrongMacLength { expected, actual } => {
                write!(f, "wrong MAC length: expected {expected}, got {actual}")
            }
            Self::AuthParamsNotFound => write!(f, "MAC slot not found in message"),
        }
    }
}

/// Encryption/decryption failure detail (USM privacy).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoErrorKind {
    /// No privacy key available for the operation.
    NoPrivKey,
    /// The localized key is too short for the cipher.
    InvalidKeyLength,
    /// The cipher rejected its inputs.
    CipherError,
    /// msgPrivacyParameters had the wrong length.
    InvalidPrivParamsLength { expected: usize, actual: usize },
    /// Ciphertext length is not a multiple of the cipher block size.
    InvalidCiphertextLength { length: usize, block_size: usize },
}

impl std::fmt::Display for CryptoErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoPrivKey => write!(f, "no privacy key available"),
            Self::InvalidKeyLength => write!(f, "invalid key length"),
            Self::CipherError => write!(f, "cipher operation failed"),
            Self::InvalidPrivParamsLength { expected, actual } => {
                write!(
                    f,
                    "invalid privParameters length: expected {expected}, got {actual}"
                )
            }
            Self::InvalidCiphertextLength { length, block_size } => {
                write!(
                    f,
                    "ciphertext length {length} not a multiple of block size {block_size}"
                )
            }
        }
    }
}

/// BER decode failure detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// Expected a different tag.
    UnexpectedTag { expected: u8, actual: u8 },
    /// Data ended unexpectedly.
    TruncatedData,
    /// Indefinite-form length (not used by SNMP).
    IndefiniteLength,
    /// Zero-length INTEGER.
    ZeroLengthInteger,
    /// INTEGER too long to represent.
    IntegerTooLong { length: usize },
    /// Invalid OID subidentifier encoding.
    InvalidOidEncoding,
    /// NULL with non-zero length.
    InvalidNull,
    /// Length field uses too many octets.
    LengthTooLong { octets: usize },
    /// Length exceeds the sanity cap.
    LengthExceedsMax { length: usize, max: usize },
    /// TLV extends past the end of its buffer.
    TlvOverflow,
    /// A read needs more bytes than remain.
    InsufficientData { needed: usize, available: usize },
    /// Unknown SNMP version field.
    UnknownVersion(i32),
    /// Unknown PDU type tag.
    UnknownPduType(u8),
    /// Unknown tag in a varbind value position.
    UnknownValueTag(u8),
    /// msgFlags with the priv bit but not the auth bit.
    InvalidMsgFlags,
    /// msgFlags OCTET STRING is not exactly one byte.
    InvalidMsgFlagsLength { length: usize },
    /// Unknown msgSecurityModel value.
    UnknownSecurityModel(i32),
}

impl std::fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnexpectedTag { expected, actual } => {
                write!(f, "expected tag 0x{expected:02X}, got 0x{actual:02X}")
            }
            Self::TruncatedData => write!(f, "unexpected end of data"),
            Self::IndefiniteLength => write!(f, "indefinite length not supported"),
            Self::ZeroLengthInteger => write!(f, "zero-length integer"),
            Self::IntegerTooLong { length } => write!(f, "integer too long: {length} bytes"),
            Self::InvalidOidEncoding => write!(f, "invalid OID encoding"),
            Self::InvalidNull => write!(f, "NULL with non-zero length"),
            Self::LengthTooLong { octets } => {
                write!(f, "length encoding too long ({octets} octets)")
            }
            Self::LengthExceedsMax { length, max } => {
                write!(f, "length {length} exceeds maximum {max}")
            }
            Self::TlvOverflow => write!(f, "TLV extends past end of data"),
            Self::InsufficientData { needed, available } => {
                write!(f, "need {needed} bytes but only {available} remain")
            }
            Self::UnknownVersion(v) => write!(f, "unknown SNMP version: {v}"),
            Self::UnknownPduType(t) => write!(f, "unknown PDU type: 0x{t:02X}"),
            Self::UnknownValueTag(t) => write!(f, "unknown value tag: 0x{t:02X}"),
            Self::InvalidMsgFlags => write!(f, "invalid msgFlags: privacy without authentication"),
            Self::InvalidMsgFlagsLength { length } => {
                write!(f, "msgFlags must be one byte, got {length}")
            }
            Self::UnknownSecurityModel(m) => write!(f, "unknown security model: {m}"),
        }
    }
}

/// Marshalling failure detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeErrorKind {
    /// Engine not discovered before an authenticated send.
    EngineNotDiscovered,
    /// Authentication required but no auth key configured.
    MissingAuthKey,
    /// Privacy required but no privacy key configured.
    NoPrivKey,
    /// The marshalled message has no 12-byte zeroed MAC slot.
    MissingAuthParams,
}

impl std::fmt::Display for EncodeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EngineNotDiscovered => write!(f, "engine not discovered"),
            Self::MissingAuthKey => write!(f, "auth key not available"),
            Self::NoPrivKey => write!(f, "privacy key not available"),
            Self::MissingAuthParams => {
                write!(f, "no zeroed MAC slot in marshalled message")
            }
        }
    }
}

/// OID construction failure detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OidErrorKind {
    /// An arc could not be parsed.
    InvalidArc,
    /// More arcs than RFC 2578 permits.
    TooManyArcs { count: usize, max: usize },
    /// A subidentifier overflowed `u32`.
    SubidentifierOverflow,
}

impl std::fmt::Display for OidErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidArc => write!(f, "invalid arc value"),
            Self::TooManyArcs { count, max } => {
                write!(f, "OID has {count} arcs, exceeds maximum {max}")
            }
            Self::SubidentifierOverflow => write!(f, "subidentifier overflow"),
        }
    }
}

/// SNMP protocol error status codes (RFC 3416 Section 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorStatus {
    NoError,
    TooBig,
    NoSuchName,
    BadValue,
    ReadOnly,
    GenErr,
    NoAccess,
    WrongType,
    WrongLength,
    WrongEncoding,
    WrongValue,
    NoCreation,
    InconsistentValue,
    ResourceUnavailable,
    CommitFailed,
    UndoFailed,
    AuthorizationError,
    NotWritable,
    InconsistentName,
    /// Unknown or future status code.
    Unknown(i32),
}

impl ErrorStatus {
    /// Create from a raw status code.
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::NoError,
            1 => Self::TooBig,
            2 => Self::NoSuchName,
            3 => Self::BadValue,
            4 => Self::ReadOnly,
            5 => Self::GenErr,
            6 => Self::NoAccess,
            7 => Self::WrongType,
            8 => Self::WrongLength,
            9 => Self::WrongEncoding,
            10 => Self::WrongValue,
            11 => Self::NoCreation,
            12 => Self::InconsistentValue,
            13 => Self::ResourceUnavailable,
            14 => Self::CommitFailed,
            15 => Self::UndoFailed,
            16 => Self::AuthorizationError,
            17 => Self::NotWritable,
            18 => Self::InconsistentName,
            other => Self::Unknown(other),
        }
    }

    /// Convert to the raw status code.
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::NoError => 0,
            Self::TooBig => 1,
            Self::NoSuchName => 2,
            Self::BadValue => 3,
            Self::ReadOnly => 4,
            Self::GenErr => 5,
            Self::NoAccess => 6,
            Self::WrongType => 7,
            Self::WrongLength => 8,
            Self::WrongEncoding => 9,
            Self::WrongValue => 10,
            Self::NoCreation => 11,
            Self::InconsistentValue => 12,
            Self::ResourceUnavailable => 13,
            Self::CommitFailed => 14,
            Self::UndoFailed => 15,
            Self::AuthorizationError => 16,
            Self::NotWritable => 17,
            Self::InconsistentName => 18,
            Self::Unknown(code) => *code,
        }
    }
}

impl std::fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoError => write!(f, "noError"),
            Self::TooBig => write!(f, "tooBig"),
            Self::NoSuchName => write!(f, "noSuchName"),
            Self::BadValue => write!(f, "badValue"),
            Self::ReadOnly => write!(f, "readOnly"),
            Self::GenErr => write!(f, "genErr"),
            Self::NoAccess => write!(f, "noAccess"),
            Self::WrongType => write!(f, "wrongType"),
            Self::WrongLength => write!(f, "wrongLength"),
            Self::WrongEncoding => write!(f, "wrongEncoding"),
            Self::WrongValue => write!(f, "wrongValue"),
            Self::NoCreation => write!(f, "noCreation"),
            Self::InconsistentValue => write!(f, "inconsistentValue"),
            Self::ResourceUnavailable => write!(f, "resourceUnavailable"),
            Self::CommitFailed => write!(f, "commitFailed"),
            Self::UndoFailed => write!(f, "undoFailed"),
            Self::AuthorizationError => write!(f, "authorizationError"),
            Self::NotWritable => write!(f, "notWritable"),
            Self::InconsistentName => write!(f, "inconsistentName"),
            Self::Unknown(code) => write!(f, "unknown({code})"),
        }
    }
}

/// The main error type.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// I/O error during network communication.
    #[error("I/O error{}: {source}", target.map(|t| format!(" communicating with {t}")).unwrap_or_default())]
    Io {
        target: Option<SocketAddr>,
        #[source]
        source: std::io::Error,
    },

    /// No (acceptable) response arrived before the deadline.
    #[error("timeout after {elapsed:?}{}", target.map(|t| format!(" waiting for {t}")).unwrap_or_default())]
    Timeout {
        target: Option<SocketAddr>,
        elapsed: Duration,
    },

    /// SNMP error status returned by the agent.
    #[error("SNMP error{}: {status} at index {index}", target.map(|t| format!(" from {t}")).unwrap_or_default())]
    Snmp {
        target: Option<SocketAddr>,
        status: ErrorStatus,
        index: u32,
        oid: Option<crate::oid::Oid>,
    },

    /// Invalid OID.
    #[error("invalid OID: {kind}")]
    InvalidOid { kind: OidErrorKind },

    /// BER decoding failed.
    #[error("decode error at offset {offset}: {kind}")]
    Decode {
        offset: usize,
        kind: DecodeErrorKind,
    },

    /// Marshalling failed.
    #[error("encode error: {kind}")]
    Encode { kind: EncodeErrorKind },

    /// Marshalled message exceeds the maximum size.
    #[error("message too large: {size} bytes exceeds maximum {max}")]
    MessageTooLarge { size: usize, max: usize },

    /// Engine discovery round-trip failed.
    #[error("engine discovery failed{}", target.map(|t| format!(" for {t}")).unwrap_or_default())]
    Discovery { target: Option<SocketAddr> },

    /// Agent reported usmStatsUnknownEngineIDs after discovery.
    #[error("unknown engine ID")]
    UnknownEngineId { target: Option<SocketAddr> },

    /// Agent reported usmStatsNotInTimeWindows even after a resync.
    #[error("message not in time window")]
    NotInTimeWindow { target: Option<SocketAddr> },

    /// Authentication failed (USM).
    #[error("authentication failed: {kind}")]
    AuthenticationFailed {
        target: Option<SocketAddr>,
        kind: AuthErrorKind,
    },

    /// Decryption failed (USM privacy).
    #[error("decryption failed: {kind}")]
    DecryptionFailed {
        target: Option<SocketAddr>,
        kind: CryptoErrorKind,
    },

    /// Encryption failed (USM privacy).
    #[error("encryption failed: {kind}")]
    EncryptionFailed {
        target: Option<SocketAddr>,
        kind: CryptoErrorKind,
    },

    /// Session configuration rejected before any I/O.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a decode error.
    pub fn decode(offset: usize, kind: DecodeErrorKind) -> Self {
        Self::Decode { offset, kind }
    }

    /// Create an encode error.
    pub fn encode(kind: EncodeErrorKind) -> Self {
        Self::Encode { kind }
    }

    /// Create an authentication error.
    pub fn auth(target: Option<SocketAddr>, kind: AuthErrorKind) -> Self {
        Self::AuthenticationFailed { target, kind }
    }

    /// Create a decryption error.
    pub fn decrypt(target: Option<SocketAddr>, kind: CryptoErrorKind) -> Self {
        Self::DecryptionFailed { target, kind }
    }

    /// Create an encryption error.
    pub fn encrypt(target: Option<SocketAddr>, kind: CryptoErrorKind) -> Self {
        Self::EncryptionFailed { target, kind }
    }

    /// Create an invalid-OID error.
    pub fn invalid_oid(kind: OidErrorKind) -> Self {
        Self::InvalidOid { kind }
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// The target address, for errors that carry one.
    pub fn target(&self) -> Option<SocketAddr> {
        match self {
            Self::Io { target, .. }
            | Self::Timeout { target, .. }
            | Self::Snmp { target, .. }
            | Self::Discovery { target }
            | Self::UnknownEngineId { target }
            | Self::NotInTimeWindow { target }
            | Self::AuthenticationFailed { target, .. }
            | Self::DecryptionFailed { target, .. }
            | Self::EncryptionFailed { target, .. } => *target,
            _ => None,
        }
    }
}
