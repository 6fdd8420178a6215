//! Known-answer tests for key derivation and authentication.
//!
//! Vectors come from RFC 3414 Appendix A (password-to-key and key
//! localization for MD5 and SHA-1).

use snmp_usm::util::hex;
use snmp_usm::v3::derive_key;
use snmp_usm::{AuthProtocol, LocalizedKey};

fn rfc_engine_id() -> Vec<u8> {
    hex::decode("000000000000000000000002").unwrap()
}

/// RFC 3414 A.3.1: "maplesyrup" localized with MD5.
#[test]
fn rfc3414_a3_1_md5_localized_key() {
    let key = derive_key(AuthProtocol::Md5, b"maplesyrup", &rfc_engine_id());
    assert_eq!(key.len(), 16);
    assert_eq!(hex::encode(&key), "526f5eed9fcce26f8964c2930787d82b");
}

/// RFC 3414 A.3.2: "maplesyrup" localized with SHA-1.
#[test]
fn rfc3414_a3_2_sha1_localized_key() {
    let key = derive_key(AuthProtocol::Sha1, b"maplesyrup", &rfc_engine_id());
    assert_eq!(key.len(), 20);
    assert_eq!(
        hex::encode(&key),
        "6695febc9288e36282235fc7151f128497b38f3f"
    );
}

/// RFC 3414 A.5.1: the "newsyrup" key-change vector's new key, MD5.
#[test]
fn rfc3414_a5_1_md5_new_key() {
    let key = derive_key(AuthProtocol::Md5, b"newsyrup", &rfc_engine_id());
    assert_eq!(hex::encode(&key), "87021d7bd9d101ba05ea6e3bf9d9bd4a");
}

/// RFC 3414 A.5.2: the "newsyrup" key-change vector's new key, SHA-1.
#[test]
fn rfc3414_a5_2_sha1_new_key() {
    let key = derive_key(AuthProtocol::Sha1, b"newsyrup", &rfc_engine_id());
    assert_eq!(
        hex::encode(&key),
        "78e2dcce79d59403b58c1bbaa5bff46391f1cd25"
    );
}

/// Different engine IDs localize the same passphrase to different keys.
#[test]
fn localization_binds_to_engine_id() {
    let a = derive_key(AuthProtocol::Sha1, b"maplesyrup", &rfc_engine_id());
    let b = derive_key(
        AuthProtocol::Sha1,
        b"maplesyrup",
        &hex::decode("000000000000000000000003").unwrap(),
    );
    assert_ne!(a, b);
}

/// The truncated HMAC is 12 bytes and verifies only over intact input.
#[test]
fn hmac96_roundtrip() {
    for protocol in [AuthProtocol::Md5, AuthProtocol::Sha1] {
        let key = LocalizedKey::from_passphrase(protocol, b"maplesyrup", &rfc_engine_id());
        let message = b"marshalled snmp message with a zeroed mac slot";

        let mac = key.compute_mac(message);
        assert_eq!(mac.len(), 12);
        assert!(key.verify_mac(message, &mac));

        for bit in 0..8 {
            let mut flipped = mac;
            flipped[11] ^= 1 << bit;
            assert!(!key.verify_mac(message, &flipped), "{protocol}: bit {bit}");
        }
    }
}

/// A wrong-length expected MAC never verifies.
#[test]
fn hmac96_rejects_wrong_length() {
    let key = LocalizedKey::from_passphrase(AuthProtocol::Md5, b"maplesyrup", &rfc_engine_id());
    let mac = key.compute_mac(b"data");
    assert!(!key.verify_mac(b"data", &mac[..11]));
    assert!(!key.verify_mac(b"data", &[]));
}
