//! Privacy (encryption) for the Scoped PDU (RFC 3414 Section 8, RFC 3826).
//!
//! # Salt and IV construction
//!
//! ## DES-CBC
//! - msgPrivacyParameters: `engineBoots (4, BE) || desSalt (4, BE)`
//! - IV: pre-IV XOR privParameters, where pre-IV is bytes 8..16 of the
//!   16-byte localized privacy key
//!
//! ## AES-128-CFB
//! - msgPrivacyParameters: `aesSalt (8, BE)`
//! - IV: `engineBoots (4, BE) || engineTime (4, BE) || privParameters`
//!   (concatenation, not XOR)
//!
//! The salt counters advance on every transmitted packet, making the IV
//! unique within an (engineBoots, engineTime) window.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{AuthProtocol, PrivProtocol, auth};
use crate::error::{CryptoErrorKind, Error, Result};

const DES_BLOCK: usize = 8;

/// Per-session salt counters, one per privacy protocol family.
///
/// Both counters are seeded from the OS cryptographic random source and
/// incremented atomically, so sessions sharing a counter pair never reuse
/// a salt value.
pub struct SaltCounters {
    des: AtomicU32,
    aes: AtomicU64,
}

impl SaltCounters {
    /// Create counters seeded from `getrandom`.
    pub fn new() -> Self {
        let mut seed = [0u8; 12];
        getrandom::fill(&mut seed).expect("OS random source unavailable");
        Self {
            des: AtomicU32::new(u32::from_be_bytes(seed[..4].try_into().unwrap())),
            aes: AtomicU64::new(u64::from_be_bytes(seed[4..].try_into().unwrap())),
        }
    }

    /// Create counters with fixed start values, for reproducible output.
    pub fn from_values(des: u32, aes: u64) -> Self {
        Self {
            des: AtomicU32::new(des),
            aes: AtomicU64::new(aes),
        }
    }

    /// Atomically advance the DES counter and return the new value.
    pub fn next_des(&self) -> u32 {
        self.des.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    /// Atomically advance the AES counter and return the new value.
    pub fn next_aes(&self) -> u64 {
        self.aes.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }
}

impl Default for SaltCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SaltCounters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaltCounters").finish_non_exhaustive()
    }
}

/// A localized privacy key.
///
/// Derived from the privacy passphrase with the **authentication**
/// protocol's hash (RFC 3414 Section 8.2 — deliberate, and required for
/// interoperability). Key material zeroes on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivKey {
    key: Vec<u8>,
    #[zeroize(skip)]
    protocol: PrivProtocol,
}

impl PrivKey {
    /// Derive a privacy key from a passphrase and engine ID.
    pub fn from_passphrase(
        auth_protocol: AuthProtocol,
        priv_protocol: PrivProtocol,
        passphrase: &[u8],
        engine_id: &[u8],
    ) -> Self {
        Self {
            key: auth::derive_key(auth_protocol, passphrase, engine_id),
            protocol: priv_protocol,
        }
    }

    /// Wrap an already-localized key.
    pub fn from_bytes(protocol: PrivProtocol, key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            protocol,
        }
    }

    /// The privacy protocol.
    pub fn protocol(&self) -> PrivProtocol {
        self.protocol
    }

    /// Allocate a fresh salt and build the wire msgPrivacyParameters.
    ///
    /// Advances the protocol's counter; every transmitted packet must call
    /// this exactly once.
    pub fn allocate_salt(&self, counters: &SaltCounters, engine_boots: u32) -> [u8; 8] {
        let mut params = [0u8; 8];
        match self.protocol {
            PrivProtocol::Des => {
                params[..4].copy_from_slice(&engine_boots.to_be_bytes());
                params[4..].copy_from_slice(&counters.next_des().to_be_bytes());
            }
            PrivProtocol::Aes128 => {
                params.copy_from_slice(&counters.next_aes().to_be_bytes());
            }
        }
        params
    }

    fn check_key_len(&self, decrypting: bool) -> Result<()> {
        if self.key.len() >= self.protocol.key_len() {
            return Ok(());
        }
        let kind = CryptoErrorKind::InvalidKeyLength;
        Err(if decrypting {
            Error::decrypt(None, kind)
        } else {
            Error::encrypt(None, kind)
        })
    }

    /// Encrypt a plaintext Scoped PDU.
    ///
    /// `priv_params` must be the 8 bytes produced by
    /// [`allocate_salt`](Self::allocate_salt) for this packet.
    pub fn encrypt(
        &self,
        plaintext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        priv_params: &[u8; 8],
    ) -> Result<Vec<u8>> {
        self.check_key_len(false)?;
        match self.protocol {
            PrivProtocol::Des => self.encrypt_des(plaintext, priv_params),
            PrivProtocol::Aes128 => {
                self.aes_apply(plaintext, engine_boots, engine_time, priv_params, false)
            }
        }
    }

    /// Decrypt an encrypted Scoped PDU.
    ///
    /// The IV is rebuilt from the peer's engine boots/time and the
    /// msgPrivacyParameters carried on the wire.
    pub fn decrypt(
        &self,
        ciphertext: &[u8],
        engine_boots: u32,
        engine_time: u32,
        priv_params: &[u8],
    ) -> Result<Vec<u8>> {
        self.check_key_len(true)?;
        let priv_params: &[u8; 8] = priv_params.try_into().map_err(|_| {
            Error::decrypt(
                None,
                CryptoErrorKind::InvalidPrivParamsLength {
                    expected: 8,
                    actual: priv_params.len(),
                },
            )
        })?;

        match self.protocol {
            PrivProtocol::Des => self.decrypt_des(ciphertext, priv_params),
            PrivProtocol::Aes128 => {
                self.aes_apply(ciphertext, engine_boots, engine_time, priv_params, true)
            }
        }
    }

    /// DES-CBC encryption (RFC 3414 Section 8.1.1.1).
    fn encrypt_des(&self, plaintext: &[u8], priv_params: &[u8; 8]) -> Result<Vec<u8>> {
        use cbc::cipher::{BlockEncryptMut, KeyIvInit};
        type DesCbcEnc = cbc::Encryptor<des::Des>;

        let key = &self.key[..8];
        let iv = des_iv(&self.key[8..16], priv_params);

        // Zero-pad to the block size. A full block is appended when the
        // plaintext is already aligned, matching deployed encryptors; the
        // decryptor truncates to the inner SEQUENCE length.
        let pad = DES_BLOCK - plaintext.len() % DES_BLOCK;
        let padded_len = plaintext.len() + pad;
        let mut buffer = vec![0u8; padded_len];
        buffer[..plaintext.len()].copy_from_slice(plaintext);

        let cipher = DesCbcEnc::new_from_slices(key, &iv)
            .map_err(|_| Error::encrypt(None, CryptoErrorKind::InvalidKeyLength))?;
        cipher
            .encrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buffer, padded_len)
            .map_err(|_| Error::encrypt(None, CryptoErrorKind::CipherError))?;

        Ok(buffer)
    }

    /// DES-CBC decryption (RFC 3414 Section 8.1.1.3).
    fn decrypt_des(&self, ciphertext: &[u8], priv_params: &[u8; 8]) -> Result<Vec<u8>> {
        use cbc::cipher::{BlockDecryptMut, KeyIvInit};
        type DesCbcDec = cbc::Decryptor<des::Des>;

        if ciphertext.len() % DES_BLOCK != 0 {
            return Err(Error::decrypt(
                None,
                CryptoErrorKind::InvalidCiphertextLength {
                    length: ciphertext.len(),
                    block_size: DES_BLOCK,
                },
            ));
        }

        let key = &self.key[..8];
        let iv = des_iv(&self.key[8..16], priv_params);

        let cipher = DesCbcDec::new_from_slices(key, &iv)
            .map_err(|_| Error::decrypt(None, CryptoErrorKind::InvalidKeyLength))?;

        let mut buffer = ciphertext.to_vec();
        cipher
            .decrypt_padded_mut::<cbc::cipher::block_padding::NoPadding>(&mut buffer)
            .map_err(|_| Error::decrypt(None, CryptoErrorKind::CipherError))?;

        Ok(buffer)
    }

    /// AES-128-CFB with a full-block segment (RFC 3826 Section 3.1).
    ///
    /// CFB is a stream mode, so encrypt and decrypt share the IV
    /// construction and the output length equals the input length.
    fn aes_apply(
        &self,
        data: &[u8],
        engine_boots: u32,
        engine_time: u32,
        priv_params: &[u8; 8],
        decrypting: bool,
    ) -> Result<Vec<u8>> {
        use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
        type Aes128CfbEnc = cfb_mode::Encryptor<aes::Aes128>;
        type Aes128CfbDec = cfb_mode::Decryptor<aes::Aes128>;

        let key = &self.key[..16];
        let iv = aes_iv(engine_boots, engine_time, priv_params);

        let mut buffer = data.to_vec();
        if decrypting {
            let cipher = Aes128CfbDec::new_from_slices(key, &iv)
                .map_err(|_| Error::decrypt(None, CryptoErrorKind::InvalidKeyLength))?;
            cipher.decrypt(&mut buffer);
        } else {
            let cipher = Aes128CfbEnc::new_from_slices(key, &iv)
                .map_err(|_| Error::encrypt(None, CryptoErrorKind::InvalidKeyLength))?;
            cipher.encrypt(&mut buffer);
        }
        Ok(buffer)
    }
}

impl std::fmt::Debug for PrivKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivKey")
            .field("protocol", &self.protocol)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// DES IV: pre-IV XOR msgPrivacyParameters.
fn des_iv(pre_iv: &[u8], priv_params: &[u8; 8]) -> [u8; 8] {
    let mut iv = [0u8; 8];
    for (i, byte) in iv.iter_mut().enumerate() {
        *byte = pre_iv[i] ^ priv_params[i];
    }
    iv
}

/// AES IV: engineBoots || engineTime || msgPrivacyParameters.
fn aes_iv(engine_boots: u32, engine_time: u32, priv_params: &[u8; 8]) -> [u8; 16] {
    let mut iv = [0u8; 16];
    iv[..4].copy_from_slice(&engine_boots.to_be_bytes());
    iv[4..8].copy_from_slice(&engine_time.to_be_bytes());
    iv[8..].copy_from_slice(priv_params);
    iv
}
