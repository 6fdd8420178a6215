// Allow large error types - the Error enum carries OIDs inline for
// diagnostics, and boxing them is not worth the extra allocations.
#![allow(clippy::result_large_err)]

//! # snmp-usm
//!
//! Async SNMPv3 client built around the User-based Security Model
//! (RFC 3412, RFC 3414, RFC 3826): byte-exact v3 message marshalling,
//! HMAC-MD5-96 / HMAC-SHA-96 authentication, DES-CBC and AES-128-CFB
//! privacy, engine discovery, and a per-agent session that drives it all.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use snmp_usm::{AuthProtocol, PrivProtocol, SecurityConfig, Session, UdpTransport, oid};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), snmp_usm::Error> {
//!     let transport = UdpTransport::connect("192.0.2.1:161".parse().unwrap()).await?;
//!     let session = Session::new(
//!         transport,
//!         SecurityConfig::new("admin")
//!             .auth(AuthProtocol::Sha1, "authpassword")
//!             .privacy(PrivProtocol::Aes128, "privpassword"),
//!     )?;
//!
//!     // Engine discovery runs automatically before the first request.
//!     let response = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await?;
//!     println!("sysDescr: {:?}", response.varbinds[0].value);
//!     Ok(())
//! }
//! ```
//!
//! ## Security levels
//!
//! | Level | Credentials |
//! |-------|-------------|
//! | noAuthNoPriv | user name only |
//! | authNoPriv | + MD5 or SHA-1 passphrase |
//! | authPriv | + DES or AES-128 passphrase |
//!
//! Passphrases are localized to the discovered engine ID per RFC 3414
//! Appendix A.2 and never leave the session.

pub mod ber;
pub mod error;
pub mod message;
pub mod oid;
pub mod pdu;
pub mod session;
pub mod transport;
pub mod util;
pub mod v3;
pub mod value;
pub mod varbind;

pub use error::{
    AuthErrorKind, CryptoErrorKind, DecodeErrorKind, EncodeErrorKind, Error, ErrorStatus,
    OidErrorKind, Result,
};
pub use message::{MsgFlags, ScopedPdu, SecurityLevel, SecurityModel, V3Message};
pub use oid::Oid;
pub use pdu::{Pdu, PduType};
pub use session::{SecurityConfig, Session};
pub use transport::{MockTransport, Transport, UdpTransport};
pub use v3::{
    AuthProtocol, EngineState, LocalizedKey, ParseProtocolError, PrivKey, PrivProtocol,
    SaltCounters, UsmSecurityParams,
};
pub use value::Value;
pub use varbind::VarBind;
