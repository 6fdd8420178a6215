//! Key derivation and message authentication (RFC 3414 Sections 6, 7, A.2).
//!
//! Key localization expands the passphrase to 1 MiB by repetition, hashes
//! it, then binds the result to the authoritative engine:
//! `Kul = H(Ku || engineID || Ku)`.
//!
//! The message MAC is the HMAC of the fully marshalled message, computed
//! while the 12-byte msgAuthenticationParameters slot holds zeros, then
//! written into that slot in place.

use digest::{Digest, KeyInit, Mac};
use hmac::Hmac;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::AuthProtocol;
use crate::v3::usm::MAC_LEN;

/// Minimum passphrase length required by RFC 3414 Section 11.2.
pub const MIN_PASSPHRASE_LEN: usize = 8;

const EXPANSION_SIZE: usize = 1_048_576;

/// Derive a localized secret key from a passphrase and engine ID.
///
/// Output length is the digest length of `protocol` (16 for MD5, 20 for
/// SHA-1). Pure function of its inputs; the same routine produces both the
/// authentication key and, fed the privacy passphrase, the privacy key.
pub fn derive_key(protocol: AuthProtocol, passphrase: &[u8], engine_id: &[u8]) -> Vec<u8> {
    match protocol {
        AuthProtocol::Md5 => derive_key_impl::<md5::Md5>(passphrase, engine_id),
        AuthProtocol::Sha1 => derive_key_impl::<sha1::Sha1>(passphrase, engine_id),
    }
}

fn derive_key_impl<D: Digest>(passphrase: &[u8], engine_id: &[u8]) -> Vec<u8> {
    let master = password_to_key_impl::<D>(passphrase);

    let mut hasher = D::new();
    hasher.update(&master);
    hasher.update(engine_id);
    hasher.update(&master);
    hasher.finalize().to_vec()
}

/// RFC 3414 A.2: cycle the passphrase out to 1 MiB and hash it.
///
/// The stream is fed in 64-byte chunks so the megabyte is never
/// materialized.
fn password_to_key_impl<D: Digest>(passphrase: &[u8]) -> Vec<u8> {
    if passphrase.is_empty() {
        return vec![0u8; <D as Digest>::output_size()];
    }

    let mut hasher = D::new();
    let mut chunk = [0u8; 64];
    let mut index = 0usize;
    let mut fed = 0usize;

    while fed < EXPANSION_SIZE {
        for byte in &mut chunk {
            *byte = passphrase[index % passphrase.len()];
            index += 1;
        }
        hasher.update(chunk);
        fed += chunk.len();
    }

    hasher.finalize().to_vec()
}

/// A localized authentication key bound to one engine ID.
///
/// Key material is zeroed on drop and redacted from `Debug` output.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct LocalizedKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: AuthProtocol,
}

impl LocalizedKey {
    /// Derive a localized key from a passphrase and engine ID.
    pub fn from_passphrase(protocol: AuthProtocol, passphrase: &[u8], engine_id: &[u8]) -> Self {
        if passphrase.len() < MIN_PASSPHRASE_LEN {
            tracing::warn!(
                passphrase_len = passphrase.len(),
                min_len = MIN_PASSPHRASE_LEN,
                "passphrase shorter than the RFC 3414 minimum"
            );
        }
        Self {
            key: derive_key(protocol, passphrase, engine_id),
            protocol,
        }
    }

    /// Wrap an already-localized key.
    pub fn from_bytes(protocol: AuthProtocol, key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            protocol,
        }
    }

    /// The protocol this key is for.
    pub fn protocol(&self) -> AuthProtocol {
        self.protocol
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Compute the truncated 12-byte HMAC over `data`.
    pub fn compute_mac(&self, data: &[u8]) -> [u8; MAC_LEN] {
        let mut out = [0u8; MAC_LEN];
        match self.protocol {
            AuthProtocol::Md5 => {
                let mut mac = <Hmac<md5::Md5> as KeyInit>::new_from_slice(&self.key)
                    .expect("HMAC accepts any key length");
                Mac::update(&mut mac, data);
                out.copy_from_slice(&mac.finalize().into_bytes()[..MAC_LEN]);
            }
            AuthProtocol::Sha1 => {
                let mut mac = <Hmac<sha1::Sha1> as KeyInit>::new_from_slice(&self.key)
                    .expect("HMAC accepts any key length");
                Mac::update(&mut mac, data);
                out.copy_from_slice(&mac.finalize().into_bytes()[..MAC_LEN]);
            }
        }
        out
    }

    /// Verify a truncated MAC in constant time.
    pub fn verify_mac(&self, data: &[u8], expected: &[u8]) -> bool {
        if expected.len() != MAC_LEN {
            return false;
        }
        let computed = self.compute_mac(data);
        let mut diff = 0u8;
        for (a, b) in computed.iter().zip(expected.iter()) {
            diff |= a ^ b;
        }
        diff == 0
    }
}

impl std::fmt::Debug for LocalizedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalizedKey")
            .field("protocol", &self.protocol)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Authenticate an outgoing marshalled message in place.
///
/// `mac_offset` must point at the 12-byte zeroed MAC slot; the marshaller
/// validates this before handing the offset out, so the slice below cannot
/// go out of bounds.
pub fn authenticate_message(key: &LocalizedKey, message: &mut [u8], mac_offset: usize) {
    debug_assert!(mac_offset + MAC_LEN <= message.len());
    debug_assert!(message[mac_offset..mac_offset + MAC_LEN].iter().all(|&b| b == 0));

    let mac = key.compute_mac(message);
    message[mac_offset..mac_offset + MAC_LEN].copy_from_slice(&mac);
}

/// Verify an incoming marshalled message.
///
/// Copies the message, zeroes the MAC slot in the copy so the layout
/// matches what the sender signed, and compares in constant time.
/// Returns `false` (never panics) when the offset is out of range.
pub fn verify_message(key: &LocalizedKey, message: &[u8], mac_offset: usize) -> bool {
    let Some(end) = mac_offset.checked_add(MAC_LEN) else {
        return false;
    };
    if end > message.len() {
        return false;
    }

    let mut received = [0u8; MAC_LEN];
    received.copy_from_slice(&message[mac_offset..end]);

    let mut scratch = message.to_vec();
    scratch[mac_offset..end].fill(0);

    key.verify_mac(&scratch, &received)
}
