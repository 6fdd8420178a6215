//! SNMPv3 User-based Security Model (RFC 3414).
//!
//! This module implements:
//!
//! - USM security parameters encoding/decoding
//! - Key localization (password-to-key derivation)
//! - Authentication (HMAC-MD5-96, HMAC-SHA-96)
//! - Privacy (DES-CBC, AES-128-CFB)
//! - Engine discovery state and USM Report classification

pub mod auth;
pub mod engine;
pub mod privacy;
pub mod usm;

pub use auth::{LocalizedKey, authenticate_message, derive_key, verify_message};
pub use engine::EngineState;
pub use privacy::{PrivKey, SaltCounters};
pub use usm::{MAC_LEN, UsmSecurityParams};

/// Error returned when parsing a protocol name fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseProtocolError {
    input: String,
    kind: ProtocolKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProtocolKind {
    Auth,
    Priv,
}

impl std::fmt::Display for ParseProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ProtocolKind::Auth => write!(
                f,
                "unknown authentication protocol '{}'; expected MD5 or SHA",
                self.input
            ),
            ProtocolKind::Priv => write!(
                f,
                "unknown privacy protocol '{}'; expected DES or AES",
                self.input
            ),
        }
    }
}

impl std::error::Error for ParseProtocolError {}

/// Authentication protocol identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthProtocol {
    /// HMAC-MD5-96 (RFC 3414)
    Md5,
    /// HMAC-SHA-96 (RFC 3414)
    Sha1,
}

impl AuthProtocol {
    /// Digest output length in bytes.
    ///
    /// This is also the localized key length, which the privacy layer
    /// slices its cipher key from.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Md5 => 16,
            Self::Sha1 => 20,
        }
    }

    /// Truncated MAC length for msgAuthenticationParameters.
    pub fn mac_len(self) -> usize {
        // HMAC-96 for both protocols
        12
    }
}

impl std::fmt::Display for AuthProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5 => write!(f, "MD5"),
            Self::Sha1 => write!(f, "SHA"),
        }
    }
}

impl std::str::FromStr for AuthProtocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MD5" => Ok(Self::Md5),
            "SHA" | "SHA1" | "SHA-1" => Ok(Self::Sha1),
            _ => Err(ParseProtocolError {
                input: s.to_string(),
                kind: ProtocolKind::Auth,
            }),
        }
    }
}

/// Privacy protocol identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivProtocol {
    /// DES-CBC (RFC 3414 Section 8)
    Des,
    /// AES-128-CFB (RFC 3826)
    Aes128,
}

impl PrivProtocol {
    /// Localized key material needed, in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Self::Des => 16, // 8 key + 8 pre-IV
            Self::Aes128 => 16,
        }
    }

    /// Wire msgPrivacyParameters length in bytes.
    pub fn salt_len(self) -> usize {
        8
    }
}

impl std::fmt::Display for PrivProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Des => write!(f, "DES"),
            Self::Aes128 => write!(f, "AES"),
        }
    }
}

impl std::str::FromStr for PrivProtocol {
    type Err = ParseProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DES" => Ok(Self::Des),
            "AES" | "AES128" | "AES-128" => Ok(Self::Aes128),
            _ => Err(ParseProtocolError {
                input: s.to_string(),
                kind: ProtocolKind::Priv,
            }),
        }
    }
}
