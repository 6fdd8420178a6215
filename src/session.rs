//! USM session configuration and orchestration.
//!
//! A [`Session`] owns one conversation with one agent: the discovered
//! engine state, the localized key cache, the salt counters, and the
//! request pipeline. Outbound packets go through discovery (when the
//! engine is still unknown), parameter refresh, salt allocation,
//! marshalling, and in-place HMAC insertion; inbound datagrams are
//! verified, decrypted, and classified before the PDU is delivered.
//!
//! Unauthentic datagrams are dropped silently — the caller observes a
//! timeout, as SNMP practice dictates — and a usmStatsNotInTimeWindows
//! report triggers exactly one engine-time resync and reissue.
//!
//! All operations are plain async functions; cancelling them mid-flight
//! leaves at most a partially updated engine cache, which the next
//! attempt reuses or overwrites.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::ber::Decoder;
use crate::error::{
    AuthErrorKind, CryptoErrorKind, EncodeErrorKind, Error, ErrorStatus, Result,
};
use crate::message::{
    MsgFlags, MsgGlobalData, RX_BUF_SIZE, ScopedPdu, SecurityLevel, SecurityModel, SecurityParams,
    V3Message, V3MessageData,
};
use crate::oid::Oid;
use crate::pdu::Pdu;
use crate::transport::Transport;
use crate::util::hex::{self, Hex};
use crate::v3::usm::MAC_LEN;
use crate::v3::{
    EngineState, LocalizedKey, PrivKey, SaltCounters, UsmSecurityParams, authenticate_message,
    engine, verify_message,
};
use crate::v3::{AuthProtocol, PrivProtocol};
use crate::varbind::VarBind;

/// Default response timeout per attempt.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of retransmissions after the first attempt.
pub const DEFAULT_RETRIES: u32 = 1;

/// USM credentials and context for a session.
#[derive(Clone)]
pub struct SecurityConfig {
    /// USM principal (≤32 bytes, never empty)
    pub username: Bytes,
    /// Authentication protocol and passphrase
    pub auth: Option<(AuthProtocol, Vec<u8>)>,
    /// Privacy protocol and passphrase
    pub privacy: Option<(PrivProtocol, Vec<u8>)>,
    /// Context engine ID; defaults to the discovered engine ID
    pub context_engine_id: Option<Bytes>,
    /// Context name; defaults to empty
    pub context_name: Bytes,
    /// Security model; USM is the only member of the closed set
    pub security_model: SecurityModel,
}

impl SecurityConfig {
    /// Create a noAuthNoPriv configuration for `username`.
    pub fn new(username: impl Into<Bytes>) -> Self {
        Self {
            username: username.into(),
            auth: None,
            privacy: None,
            context_engine_id: None,
            context_name: Bytes::new(),
            security_model: SecurityModel::Usm,
        }
    }

    /// Add authentication (authNoPriv, or authPriv with
    /// [`privacy`](Self::privacy)).
    pub fn auth(mut self, protocol: AuthProtocol, passphrase: impl Into<Vec<u8>>) -> Self {
        self.auth = Some((protocol, passphrase.into()));
        self
    }

    /// Add privacy (authPriv; requires authentication too).
    pub fn privacy(mut self, protocol: PrivProtocol, passphrase: impl Into<Vec<u8>>) -> Self {
        self.privacy = Some((protocol, passphrase.into()));
        self
    }

    /// Pin the context engine ID instead of defaulting it from discovery.
    pub fn context_engine_id(mut self, id: impl Into<Bytes>) -> Self {
        self.context_engine_id = Some(id.into());
        self
    }

    /// Set the context name.
    pub fn context_name(mut self, name: impl Into<Bytes>) -> Self {
        self.context_name = name.into();
        self
    }

    /// The security level implied by the configured credentials.
    pub fn level(&self) -> SecurityLevel {
        match (&self.auth, &self.privacy) {
            (None, _) => SecurityLevel::NoAuthNoPriv,
            (Some(_), None) => SecurityLevel::AuthNoPriv,
            (Some(_), Some(_)) => SecurityLevel::AuthPriv,
        }
    }

    /// Validate the configuration. Runs before any I/O.
    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty() {
            return Err(Error::config("user name is required"));
        }
        if self.username.len() > 32 {
            return Err(Error::config("user name exceeds 32 bytes"));
        }
        if self.privacy.is_some() && self.auth.is_none() {
            return Err(Error::config("privacy requires authentication"));
        }
        if let Some((_, passphrase)) = &self.auth
            && passphrase.len() < crate::v3::auth::MIN_PASSPHRASE_LEN
        {
            return Err(Error::config("authentication passphrase shorter than 8 bytes"));
        }
        if let Some((_, passphrase)) = &self.privacy
            && passphrase.len() < crate::v3::auth::MIN_PASSPHRASE_LEN
        {
            return Err(Error::config("privacy passphrase shorter than 8 bytes"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("username", &String::from_utf8_lossy(&self.username))
            .field("auth", &self.auth.as_ref().map(|(p, _)| p))
            .field("privacy", &self.privacy.as_ref().map(|(p, _)| p))
            .field(
                "context_engine_id",
                &self.context_engine_id.as_deref().map(hex::encode),
            )
            .finish_non_exhaustive()
    }
}

/// Localized keys for the currently known engine ID.
struct SessionKeys {
    auth: Option<LocalizedKey>,
    privacy: Option<PrivKey>,
}

/// What [`Session::process_response`] decided about one datagram.
enum Outcome {
    /// A valid response PDU for the outstanding request.
    Deliver(Pdu),
    /// Not ours, or not authentic: keep waiting.
    Discard,
    /// Peer reported out-of-time-window; engine state was refreshed,
    /// reissue the request.
    Resync,
}

/// One USM conversation with one agent.
pub struct Session<T: Transport> {
    transport: T,
    security: SecurityConfig,
    timeout: Duration,
    retries: u32,
    engine: RwLock<Option<EngineState>>,
    keys: RwLock<Option<SessionKeys>>,
    salts: SaltCounters,
    next_request_id: AtomicU32,
}

impl<T: Transport> Session<T> {
    /// Create a session over `transport`.
    ///
    /// Fails with [`Error::Config`] when the security configuration is
    /// invalid; no I/O happens here.
    pub fn new(transport: T, security: SecurityConfig) -> Result<Self> {
        security.validate()?;

        let mut seed = [0u8; 4];
        getrandom::fill(&mut seed).expect("OS random source unavailable");

        Ok(Self {
            transport,
            security,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            engine: RwLock::new(None),
            keys: RwLock::new(None),
            salts: SaltCounters::new(),
            next_request_id: AtomicU32::new(u32::from_be_bytes(seed) & 0x7FFF_FFFF),
        })
    }

    /// Set the per-attempt response timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how many times a timed-out request is retransmitted.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Replace the randomly seeded request-id counter.
    ///
    /// Makes message ids predictable; meant for reproducing wire captures
    /// and for tests.
    pub fn with_initial_request_id(self, id: u32) -> Self {
        self.next_request_id.store(id & 0x7FFF_FFFF, Ordering::SeqCst);
        self
    }

    /// Replace the randomly seeded salt counters.
    ///
    /// Meant for reproducing wire captures and for tests; production
    /// sessions should keep the random seed.
    pub fn with_salt_counters(mut self, salts: SaltCounters) -> Self {
        self.salts = salts;
        self
    }

    /// The transport's peer address.
    pub fn peer_addr(&self) -> std::net::SocketAddr {
        self.transport.peer_addr()
    }

    /// The discovered engine state, if any.
    pub fn engine_state(&self) -> Option<EngineState> {
        self.engine.read().unwrap().clone()
    }

    /// The context engine ID packets will carry: the configured one, or
    /// the discovered engine ID.
    pub fn context_engine_id(&self) -> Option<Bytes> {
        self.security.context_engine_id.clone().or_else(|| {
            self.engine
                .read()
                .unwrap()
                .as_ref()
                .map(|e| e.engine_id.clone())
        })
    }

    fn next_request_id(&self) -> u32 {
        self.next_request_id.fetch_add(1, Ordering::SeqCst) & 0x7FFF_FFFF
    }

    fn derive_keys_for(&self, engine_id: &[u8]) -> SessionKeys {
        tracing::trace!(engine_id = %Hex(engine_id), "deriving localized keys");
        let auth = self
            .security
            .auth
            .as_ref()
            .map(|(protocol, passphrase)| {
                LocalizedKey::from_passphrase(*protocol, passphrase, engine_id)
            });
        let privacy = match (&self.security.auth, &self.security.privacy) {
            (Some((auth_protocol, _)), Some((priv_protocol, passphrase))) => {
                Some(PrivKey::from_passphrase(
                    *auth_protocol,
                    *priv_protocol,
                    passphrase,
                    engine_id,
                ))
            }
            _ => None,
        };
        SessionKeys { auth, privacy }
    }

    /// Store engine id/boots/time from a response and invalidate the key
    /// cache when the engine ID changed.
    fn store_engine_params(&self, usm: &UsmSecurityParams) {
        let mut engine = self.engine.write().unwrap();
        let state = engine.get_or_insert_with(EngineState::default);
        if state.refresh_from(usm) {
            tracing::debug!(
                engine_id = %Hex(&state.engine_id),
                "engine ID changed, rederiving localized keys"
            );
            let keys = self.derive_keys_for(&state.engine_id);
            *self.keys.write().unwrap() = Some(keys);
        }
    }

    /// Run the engine-discovery handshake if the engine is still unknown.
    ///
    /// Sends a reportable noAuthNoPriv probe with empty USM parameters and
    /// stores the engine id/boots/time from the Report answer. A timed-out
    /// probe surfaces as [`Error::Discovery`].
    pub async fn discover_engine(&self) -> Result<()> {
        if self.engine.read().unwrap().is_some() {
            return Ok(());
        }

        let target = Some(self.transport.peer_addr());
        tracing::debug!("performing engine discovery");

        let probe = V3Message::discovery_request(self.next_request_id());
        let probe_bytes = probe.encode();

        let mut response = None;
        for attempt in 0..=self.retries {
            if attempt > 0 {
                tracing::debug!(attempt, "retrying engine discovery");
            }
            self.transport.send(&probe_bytes).await?;
            match self.transport.recv(self.timeout).await {
                Ok(data) => {
                    response = Some(data);
                    break;
                }
                Err(Error::Timeout { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        let Some(data) = response else {
            return Err(Error::Discovery { target });
        };

        let message = V3Message::decode(data).map_err(|e| {
            tracing::debug!(error = %e, "undecodable discovery response");
            Error::Discovery { target }
        })?;
        let usm = message.security_params.as_usm();
        let state = engine::parse_discovery_response(usm)
            .map_err(|_| Error::Discovery { target })?;

        tracing::debug!(
            engine_id = %Hex(&state.engine_id),
            engine_boots = state.engine_boots,
            engine_time = state.engine_time,
            "discovered engine"
        );

        *self.keys.write().unwrap() = Some(self.derive_keys_for(&state.engine_id));
        *self.engine.write().unwrap() = Some(state);
        Ok(())
    }

    /// Marshal `pdu` into a ready-to-send datagram.
    ///
    /// Refreshes the packet's USM parameters from the session, allocates a
    /// fresh salt and encrypts when the level requires privacy, and writes
    /// the HMAC into the validated MAC slot when it requires auth.
    fn build_message(&self, pdu: &Pdu) -> Result<(Vec<u8>, u32)> {
        let engine = self.engine.read().unwrap();
        let engine = engine
            .as_ref()
            .ok_or(Error::encode(EncodeErrorKind::EngineNotDiscovered))?;

        let level = self.security.level();
        let msg_id = pdu.request_id;

        let context_engine_id = self
            .security
            .context_engine_id
            .clone()
            .unwrap_or_else(|| engine.engine_id.clone());
        let scoped = ScopedPdu::new(
            context_engine_id,
            self.security.context_name.clone(),
            pdu.clone(),
        );

        let mut usm = UsmSecurityParams::new(
            engine.engine_id.clone(),
            engine.engine_boots,
            engine.engine_time,
            self.security.username.clone(),
        );

        let data = if level.requires_priv() {
            let keys = self.keys.read().unwrap();
            let priv_key = keys
                .as_ref()
                .and_then(|k| k.privacy.as_ref())
                .ok_or(Error::encode(EncodeErrorKind::NoPrivKey))?;

            let salt = priv_key.allocate_salt(&self.salts, engine.engine_boots);
            usm = usm.with_priv_params(salt.to_vec());

            let plaintext = scoped.encode_to_bytes();
            let ciphertext =
                priv_key.encrypt(&plaintext, engine.engine_boots, engine.engine_time, &salt)?;
            tracing::trace!(
                plaintext_len = plaintext.len(),
                ciphertext_len = ciphertext.len(),
                "encrypted scoped PDU"
            );
            V3MessageData::Encrypted(Bytes::from(ciphertext))
        } else {
            V3MessageData::Plaintext(scoped)
        };

        if level.requires_auth() {
            usm = usm.with_auth_placeholder();
        }

        let message = V3Message {
            global_data: MsgGlobalData::new(msg_id, RX_BUF_SIZE, MsgFlags::new(level, true)),
            security_params: SecurityParams::Usm(usm),
            data,
        };

        let (mut bytes, mac_offset) = message.encode_with_auth_offset()?;
        if let Some(offset) = mac_offset {
            let keys = self.keys.read().unwrap();
            let auth_key = keys
                .as_ref()
                .and_then(|k| k.auth.as_ref())
                .ok_or(Error::encode(EncodeErrorKind::MissingAuthKey))?;
            authenticate_message(auth_key, &mut bytes, offset);
            tracing::trace!(mac_offset = offset, "applied message HMAC");
        }

        Ok((bytes, msg_id))
    }

    /// Classify one inbound datagram for the outstanding request.
    fn process_response(&self, request: &Pdu, msg_id: u32, data: Bytes) -> Result<Outcome> {
        let target = Some(self.transport.peer_addr());
        let level = self.security.level();

        if level.requires_auth() {
            let keys = self.keys.read().unwrap();
            let auth_key = keys
                .as_ref()
                .and_then(|k| k.auth.as_ref())
                .ok_or(Error::auth(target, AuthErrorKind::NoAuthKey))?;

            let Some((offset, len)) = UsmSecurityParams::find_auth_params_offset(&data) else {
                tracing::debug!("discarding datagram without locatable MAC slot");
                return Ok(Outcome::Discard);
            };
            if len != MAC_LEN || !verify_message(auth_key, &data, offset) {
                tracing::debug!("discarding unauthentic datagram");
                return Ok(Outcome::Discard);
            }
        }

        let message = match V3Message::decode(data) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "discarding undecodable datagram");
                return Ok(Outcome::Discard);
            }
        };

        if message.msg_id() != msg_id {
            tracing::debug!(
                expected = msg_id,
                actual = message.msg_id(),
                "discarding datagram with foreign msgID"
            );
            return Ok(Outcome::Discard);
        }

        let usm = message.security_params.as_usm().clone();

        let scoped = match message.data {
            V3MessageData::Plaintext(scoped) => scoped,
            V3MessageData::Encrypted(ciphertext) => {
                let plaintext = {
                    let keys = self.keys.read().unwrap();
                    let priv_key = keys
                        .as_ref()
                        .and_then(|k| k.privacy.as_ref())
                        .ok_or(Error::decrypt(target, CryptoErrorKind::NoPrivKey))?;
                    priv_key.decrypt(
                        &ciphertext,
                        usm.engine_boots,
                        usm.engine_time,
                        &usm.priv_params,
                    )?
                };
                let mut decoder = Decoder::new(Bytes::from(plaintext));
                ScopedPdu::decode(&mut decoder)?
            }
        };

        // Engine id/boots/time are stored from every verified response.
        self.store_engine_params(&usm);

        if scoped.pdu.is_report() {
            if engine::is_not_in_time_window_report(&scoped.pdu) {
                tracing::debug!(
                    engine_boots = usm.engine_boots,
                    engine_time = usm.engine_time,
                    "peer reports out-of-time-window, resyncing"
                );
                return Ok(Outcome::Resync);
            }
            if engine::is_unknown_engine_id_report(&scoped.pdu) {
                return Err(Error::UnknownEngineId { target });
            }
            if engine::is_wrong_digest_report(&scoped.pdu) {
                return Err(Error::auth(target, AuthErrorKind::HmacMismatch));
            }
            if engine::is_decryption_error_report(&scoped.pdu) {
                return Err(Error::decrypt(target, CryptoErrorKind::CipherError));
            }
            return Err(Error::Snmp {
                target,
                status: ErrorStatus::GenErr,
                index: 0,
                oid: scoped.pdu.varbinds.first().map(|vb| vb.oid.clone()),
            });
        }

        if scoped.pdu.request_id != request.request_id {
            tracing::debug!(
                expected = request.request_id,
                actual = scoped.pdu.request_id,
                "discarding response with foreign request id"
            );
            return Ok(Outcome::Discard);
        }

        Ok(Outcome::Deliver(scoped.pdu))
    }

    /// Send `pdu` and await its response.
    ///
    /// Runs discovery first when needed. Returns the response PDU as-is,
    /// including agent error statuses; the convenience wrappers turn those
    /// into [`Error::Snmp`].
    pub async fn send(&self, pdu: Pdu) -> Result<Pdu> {
        self.discover_engine().await?;

        let target = Some(self.transport.peer_addr());
        let mut attempts_left = self.retries + 1;
        let mut resynced = false;

        while attempts_left > 0 {
            attempts_left -= 1;

            let (bytes, msg_id) = self.build_message(&pdu)?;
            tracing::debug!(
                pdu_type = %pdu.pdu_type,
                msg_id,
                bytes = bytes.len(),
                "sending request"
            );
            self.transport.send(&bytes).await?;

            let deadline = Instant::now() + self.timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break;
                }

                let data = match self.transport.recv(remaining).await {
                    Ok(data) => data,
                    Err(Error::Timeout { .. }) => break,
                    Err(e) => return Err(e),
                };

                match self.process_response(&pdu, msg_id, data)? {
                    Outcome::Deliver(response) => return Ok(response),
                    Outcome::Discard => continue,
                    Outcome::Resync => {
                        if resynced {
                            return Err(Error::NotInTimeWindow { target });
                        }
                        resynced = true;
                        // The reissue does not consume a retry.
                        attempts_left += 1;
                        break;
                    }
                }
            }
        }

        Err(Error::Timeout {
            target,
            elapsed: self.timeout,
        })
    }

    async fn request(&self, pdu: Pdu) -> Result<Pdu> {
        let response = self.send(pdu).await?;
        if response.is_error() {
            let status = response.error_status_enum();
            let oid = (response.error_index as usize)
                .checked_sub(1)
                .and_then(|index| response.varbinds.get(index))
                .map(|vb| vb.oid.clone());
            return Err(Error::Snmp {
                target: Some(self.transport.peer_addr()),
                status,
                index: response.error_index.max(0) as u32,
                oid,
            });
        }
        Ok(response)
    }

    /// GET the given OIDs.
    pub async fn get(&self, oids: &[Oid]) -> Result<Pdu> {
        // Discovery runs before the request id is minted, so the probe
        // carries the earlier message id.
        self.discover_engine().await?;
        self.request(Pdu::get_request(self.next_request_id(), oids))
            .await
    }

    /// GETNEXT the given OIDs.
    pub async fn get_next(&self, oids: &[Oid]) -> Result<Pdu> {
        self.discover_engine().await?;
        self.request(Pdu::get_next_request(self.next_request_id(), oids))
            .await
    }

    /// SET the given varbinds.
    pub async fn set(&self, varbinds: Vec<VarBind>) -> Result<Pdu> {
        self.discover_engine().await?;
        self.request(Pdu::set_request(self.next_request_id(), varbinds))
            .await
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("peer", &self.transport.peer_addr())
            .field("security", &self.security)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}
