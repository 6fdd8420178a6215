//! Session orchestration scenarios over the mock transport.
//!
//! The "agent" side of each exchange is produced with the crate's own
//! codec primitives: responses are marshalled, encrypted, and
//! authenticated exactly the way a real agent would emit them.

use bytes::Bytes;
use snmp_usm::message::{MsgFlags, MsgGlobalData, RX_BUF_SIZE, SecurityParams, V3MessageData};
use snmp_usm::v3::engine::report_oids;
use snmp_usm::v3::{authenticate_message, engine};
use snmp_usm::{
    AuthProtocol, Error, LocalizedKey, MockTransport, Pdu, PduType, PrivKey, PrivProtocol,
    SaltCounters, ScopedPdu, SecurityConfig, SecurityLevel, Session, UsmSecurityParams, V3Message,
    Value, VarBind, oid,
};

const ENGINE_ID: &[u8] = &[0x80, 0x00, 0x00, 0x00, 0x01];
const AUTH_PASS: &[u8] = b"authpassword";
const PRIV_PASS: &[u8] = b"privpassword";

fn mock() -> MockTransport {
    MockTransport::new("127.0.0.1:161".parse().unwrap())
}

fn finish(msg: V3Message, key: Option<&LocalizedKey>) -> Bytes {
    let (mut bytes, offset) = msg.encode_with_auth_offset().unwrap();
    if let Some(offset) = offset {
        authenticate_message(key.expect("auth key for authenticated message"), &mut bytes, offset);
    }
    Bytes::from(bytes)
}

/// A noAuthNoPriv Report answering a discovery probe.
fn discovery_report(engine_id: &[u8], boots: u32, time: u32) -> Bytes {
    let usm = UsmSecurityParams::new(Bytes::copy_from_slice(engine_id), boots, time, Bytes::new());
    let pdu = Pdu {
        pdu_type: PduType::Report,
        request_id: 0,
        error_status: 0,
        error_index: 0,
        varbinds: vec![VarBind::new(
            report_oids::unknown_engine_ids(),
            Value::Counter32(1),
        )],
    };
    V3Message::new(
        MsgGlobalData::new(0, RX_BUF_SIZE, MsgFlags::new(SecurityLevel::NoAuthNoPriv, false)),
        SecurityParams::Usm(usm),
        ScopedPdu::new(Bytes::copy_from_slice(engine_id), Bytes::new(), pdu),
    )
    .encode()
}

fn usm_params(boots: u32, time: u32, username: &[u8]) -> UsmSecurityParams {
    UsmSecurityParams::new(
        Bytes::copy_from_slice(ENGINE_ID),
        boots,
        time,
        Bytes::copy_from_slice(username),
    )
}

/// An authNoPriv message carrying `pdu`, authenticated with `key`.
fn auth_message(
    key: &LocalizedKey,
    msg_id: u32,
    boots: u32,
    time: u32,
    username: &[u8],
    pdu: Pdu,
) -> Bytes {
    let msg = V3Message::new(
        MsgGlobalData::new(msg_id, RX_BUF_SIZE, MsgFlags::new(SecurityLevel::AuthNoPriv, false)),
        SecurityParams::Usm(usm_params(boots, time, username).with_auth_placeholder()),
        ScopedPdu::new(Bytes::copy_from_slice(ENGINE_ID), Bytes::new(), pdu),
    );
    finish(msg, Some(key))
}

/// An authPriv message carrying `pdu`, encrypted then authenticated.
fn authpriv_message(
    auth_key: &LocalizedKey,
    priv_key: &PrivKey,
    salt: [u8; 8],
    msg_id: u32,
    boots: u32,
    time: u32,
    username: &[u8],
    pdu: Pdu,
) -> Bytes {
    let scoped = ScopedPdu::new(Bytes::copy_from_slice(ENGINE_ID), Bytes::new(), pdu);
    let ciphertext = priv_key
        .encrypt(&scoped.encode_to_bytes(), boots, time, &salt)
        .unwrap();
    let msg = V3Message::new_encrypted(
        MsgGlobalData::new(msg_id, RX_BUF_SIZE, MsgFlags::new(SecurityLevel::AuthPriv, false)),
        SecurityParams::Usm(
            usm_params(boots, time, username)
                .with_auth_placeholder()
                .with_priv_params(salt.to_vec()),
        ),
        Bytes::from(ciphertext),
    );
    finish(msg, Some(auth_key))
}

fn response_pdu(request_id: u32) -> Pdu {
    Pdu {
        pdu_type: PduType::Response,
        request_id,
        error_status: 0,
        error_index: 0,
        varbinds: vec![VarBind::new(
            oid!(1, 3, 6, 1, 2, 1, 1, 1, 0),
            Value::from("test agent"),
        )],
    }
}

/// Engine discovery populates the session's engine state and defaults the
/// context engine ID to the discovered ID.
#[tokio::test]
async fn discovery_populates_engine_state() {
    let transport = mock();
    transport.queue_response(discovery_report(ENGINE_ID, 3, 1234));

    let auth_key = LocalizedKey::from_passphrase(AuthProtocol::Sha1, AUTH_PASS, ENGINE_ID);
    // Request ids: 100 for the probe, 101 for the GET.
    transport.queue_response(auth_message(
        &auth_key,
        101,
        3,
        1234,
        b"authuser",
        response_pdu(101),
    ));

    let session = Session::new(
        transport.clone(),
        SecurityConfig::new("authuser").auth(AuthProtocol::Sha1, AUTH_PASS),
    )
    .unwrap()
    .with_initial_request_id(100);

    let response = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await.unwrap();
    assert_eq!(response.varbinds[0].value, Value::from("test agent"));

    let engine = session.engine_state().unwrap();
    assert_eq!(engine.engine_id.as_ref(), ENGINE_ID);
    assert_eq!(engine.engine_boots, 3);
    assert_eq!(engine.engine_time, 1234);
    assert_eq!(session.context_engine_id().unwrap().as_ref(), ENGINE_ID);

    // Probe first, then the authenticated request; the probe takes the
    // earlier message id.
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    let probe = V3Message::decode(requests[0].clone()).unwrap();
    assert!(probe.security_params.as_usm().engine_id.is_empty());
    assert_eq!(probe.msg_id(), 100);
    let get = V3Message::decode(requests[1].clone()).unwrap();
    assert_eq!(get.msg_id(), 101);
    assert_eq!(get.security_params.as_usm().username.as_ref(), b"authuser");
    assert_eq!(get.security_params.as_usm().engine_boots, 3);
}

/// A response whose MAC does not verify is silently discarded; the caller
/// observes a timeout.
#[tokio::test]
async fn unauthentic_response_is_discarded() {
    let transport = mock();
    transport.queue_response(discovery_report(ENGINE_ID, 1, 100));

    let auth_key = LocalizedKey::from_passphrase(AuthProtocol::Sha1, AUTH_PASS, ENGINE_ID);
    let mut forged = auth_message(&auth_key, 101, 1, 100, b"authuser", response_pdu(101)).to_vec();
    let last = forged.len() - 1;
    forged[last] ^= 0x01;
    transport.queue_response(forged);

    let session = Session::new(
        transport.clone(),
        SecurityConfig::new("authuser").auth(AuthProtocol::Sha1, AUTH_PASS),
    )
    .unwrap()
    .with_initial_request_id(100)
    .with_retries(0);

    let err = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await.unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }), "{err}");
}

/// usmStatsNotInTimeWindows refreshes boots/time and the request is
/// reissued exactly once with the new values.
#[tokio::test]
async fn not_in_time_window_resyncs_and_reissues() {
    let transport = mock();
    transport.queue_response(discovery_report(ENGINE_ID, 1, 100));

    let auth_key = LocalizedKey::from_passphrase(AuthProtocol::Md5, AUTH_PASS, ENGINE_ID);

    let nitw = Pdu {
        pdu_type: PduType::Report,
        request_id: 101,
        error_status: 0,
        error_index: 0,
        varbinds: vec![VarBind::new(
            report_oids::not_in_time_windows(),
            Value::Counter32(1),
        )],
    };
    transport.queue_response(auth_message(&auth_key, 101, 7, 5000, b"authuser", nitw));
    transport.queue_response(auth_message(
        &auth_key,
        101,
        7,
        5001,
        b"authuser",
        response_pdu(101),
    ));

    let session = Session::new(
        transport.clone(),
        SecurityConfig::new("authuser").auth(AuthProtocol::Md5, AUTH_PASS),
    )
    .unwrap()
    .with_initial_request_id(100);

    session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await.unwrap();

    // Probe, first attempt, reissue.
    let requests = transport.requests();
    assert_eq!(requests.len(), 3);

    // The reissue carries the boots/time learned from the report.
    let reissue = V3Message::decode(requests[2].clone()).unwrap();
    assert_eq!(reissue.security_params.as_usm().engine_boots, 7);
    assert_eq!(reissue.security_params.as_usm().engine_time, 5000);

    // And the session kept the values from the final response.
    let engine = session.engine_state().unwrap();
    assert_eq!(engine.engine_boots, 7);
    assert_eq!(engine.engine_time, 5001);
}

/// A second out-of-time-window report surfaces as an error instead of
/// looping.
#[tokio::test]
async fn repeated_time_window_report_is_an_error() {
    let transport = mock();
    transport.queue_response(discovery_report(ENGINE_ID, 1, 100));

    let auth_key = LocalizedKey::from_passphrase(AuthProtocol::Md5, AUTH_PASS, ENGINE_ID);
    let nitw = || Pdu {
        pdu_type: PduType::Report,
        request_id: 101,
        error_status: 0,
        error_index: 0,
        varbinds: vec![VarBind::new(
            report_oids::not_in_time_windows(),
            Value::Counter32(1),
        )],
    };
    transport.queue_response(auth_message(&auth_key, 101, 2, 200, b"authuser", nitw()));
    transport.queue_response(auth_message(&auth_key, 101, 2, 201, b"authuser", nitw()));

    let session = Session::new(
        transport.clone(),
        SecurityConfig::new("authuser").auth(AuthProtocol::Md5, AUTH_PASS),
    )
    .unwrap()
    .with_initial_request_id(100);

    let err = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await.unwrap_err();
    assert!(matches!(err, Error::NotInTimeWindow { .. }), "{err}");
}

/// Full authPriv DES exchange: outbound salt layout, in-place decryption
/// of our own request, and decryption of the agent's response.
#[tokio::test]
async fn authpriv_des_roundtrip() {
    let transport = mock();
    transport.queue_response(discovery_report(ENGINE_ID, 1, 100));

    let auth_key = LocalizedKey::from_passphrase(AuthProtocol::Md5, AUTH_PASS, ENGINE_ID);
    let priv_key =
        PrivKey::from_passphrase(AuthProtocol::Md5, PrivProtocol::Des, PRIV_PASS, ENGINE_ID);

    let response_salt = [0, 0, 0, 1, 0, 0, 0, 99];
    transport.queue_response(authpriv_message(
        &auth_key,
        &priv_key,
        response_salt,
        101,
        1,
        100,
        b"privuser",
        response_pdu(101),
    ));

    let session = Session::new(
        transport.clone(),
        SecurityConfig::new("privuser")
            .auth(AuthProtocol::Md5, AUTH_PASS)
            .privacy(PrivProtocol::Des, PRIV_PASS),
    )
    .unwrap()
    .with_initial_request_id(100)
    .with_salt_counters(SaltCounters::from_values(0, 0));

    let response = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await.unwrap();
    assert_eq!(response.varbinds[0].value, Value::from("test agent"));

    // Inspect our own outbound request.
    let request = V3Message::decode(transport.requests()[1].clone()).unwrap();
    let usm = request.security_params.as_usm();

    // DES privacy parameters: boots=1, first counter value 1.
    assert_eq!(usm.priv_params.as_ref(), &[0, 0, 0, 1, 0, 0, 0, 1]);

    // The ciphertext decrypts back to our GetRequest with the context
    // engine ID defaulted from discovery.
    let V3MessageData::Encrypted(ciphertext) = &request.data else {
        panic!("expected encrypted request");
    };
    let plaintext = priv_key
        .decrypt(ciphertext, usm.engine_boots, usm.engine_time, &usm.priv_params)
        .unwrap();
    let mut decoder = snmp_usm::ber::Decoder::new(Bytes::from(plaintext));
    let scoped = ScopedPdu::decode(&mut decoder).unwrap();
    assert_eq!(scoped.context_engine_id.as_ref(), ENGINE_ID);
    assert_eq!(scoped.pdu.pdu_type, PduType::GetRequest);
    assert_eq!(scoped.pdu.request_id, 101);
}

/// Full authPriv AES exchange with the 64-bit salt counter.
#[tokio::test]
async fn authpriv_aes_roundtrip() {
    let transport = mock();
    transport.queue_response(discovery_report(ENGINE_ID, 5, 7777));

    let auth_key = LocalizedKey::from_passphrase(AuthProtocol::Sha1, AUTH_PASS, ENGINE_ID);
    let priv_key =
        PrivKey::from_passphrase(AuthProtocol::Sha1, PrivProtocol::Aes128, PRIV_PASS, ENGINE_ID);

    transport.queue_response(authpriv_message(
        &auth_key,
        &priv_key,
        7u64.to_be_bytes(),
        101,
        5,
        7777,
        b"privuser",
        response_pdu(101),
    ));

    let session = Session::new(
        transport.clone(),
        SecurityConfig::new("privuser")
            .auth(AuthProtocol::Sha1, AUTH_PASS)
            .privacy(PrivProtocol::Aes128, PRIV_PASS),
    )
    .unwrap()
    .with_initial_request_id(100)
    .with_salt_counters(SaltCounters::from_values(0, 41));

    let response = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await.unwrap();
    assert_eq!(response.varbinds.len(), 1);

    let request = V3Message::decode(transport.requests()[1].clone()).unwrap();
    let usm = request.security_params.as_usm();

    // AES privacy parameters: the bare counter, 41 + 1 = 42.
    assert_eq!(usm.priv_params.as_ref(), &42u64.to_be_bytes());

    let V3MessageData::Encrypted(ciphertext) = &request.data else {
        panic!("expected encrypted request");
    };
    // AES-CFB preserves length: ciphertext is exactly the scoped PDU size.
    let plaintext = priv_key
        .decrypt(ciphertext, usm.engine_boots, usm.engine_time, &usm.priv_params)
        .unwrap();
    assert_eq!(plaintext.len(), ciphertext.len());
    let mut decoder = snmp_usm::ber::Decoder::new(Bytes::from(plaintext));
    assert_eq!(
        ScopedPdu::decode(&mut decoder).unwrap().pdu.request_id,
        101
    );
}

/// Two sessions with pinned counters marshal byte-identical requests.
#[tokio::test]
async fn pinned_sessions_are_wire_reproducible() {
    let run = || async {
        let transport = mock();
        transport.queue_response(discovery_report(ENGINE_ID, 2, 300));
        // No response for the GET: it times out, but the request bytes
        // are recorded first.
        let session = Session::new(
            transport.clone(),
            SecurityConfig::new("privuser")
                .auth(AuthProtocol::Sha1, AUTH_PASS)
                .privacy(PrivProtocol::Aes128, PRIV_PASS),
        )
        .unwrap()
        .with_initial_request_id(500)
        .with_retries(0)
        .with_salt_counters(SaltCounters::from_values(0, 10));

        let _ = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await;
        transport.requests()[1].clone()
    };

    assert_eq!(run().await, run().await);
}

/// An agent replying usmStatsWrongDigests means our credentials were
/// rejected.
#[tokio::test]
async fn wrong_digest_report_is_auth_error() {
    let transport = mock();
    transport.queue_response(discovery_report(ENGINE_ID, 1, 100));

    let auth_key = LocalizedKey::from_passphrase(AuthProtocol::Sha1, AUTH_PASS, ENGINE_ID);
    let report = Pdu {
        pdu_type: PduType::Report,
        request_id: 101,
        error_status: 0,
        error_index: 0,
        varbinds: vec![VarBind::new(report_oids::wrong_digests(), Value::Counter32(1))],
    };
    transport.queue_response(auth_message(&auth_key, 101, 1, 100, b"authuser", report));

    let session = Session::new(
        transport,
        SecurityConfig::new("authuser").auth(AuthProtocol::Sha1, AUTH_PASS),
    )
    .unwrap()
    .with_initial_request_id(100);

    let err = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await.unwrap_err();
    assert!(matches!(err, Error::AuthenticationFailed { .. }), "{err}");
}

/// A silent agent fails discovery with a dedicated error.
#[tokio::test]
async fn discovery_timeout_surfaces() {
    let session = Session::new(mock(), SecurityConfig::new("user"))
        .unwrap()
        .with_timeout(std::time::Duration::from_millis(10))
        .with_retries(0);

    let err = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await.unwrap_err();
    assert!(matches!(err, Error::Discovery { .. }), "{err}");
}

/// Agent error statuses become `Error::Snmp` in the convenience calls.
#[tokio::test]
async fn agent_error_status_is_surfaced() {
    let transport = mock();
    transport.queue_response(discovery_report(ENGINE_ID, 1, 100));

    let auth_key = LocalizedKey::from_passphrase(AuthProtocol::Sha1, AUTH_PASS, ENGINE_ID);
    let mut pdu = response_pdu(101);
    pdu.error_status = 2; // noSuchName
    pdu.error_index = 1;
    transport.queue_response(auth_message(&auth_key, 101, 1, 100, b"authuser", pdu));

    let session = Session::new(
        transport,
        SecurityConfig::new("authuser").auth(AuthProtocol::Sha1, AUTH_PASS),
    )
    .unwrap()
    .with_initial_request_id(100);

    let err = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await.unwrap_err();
    match err {
        Error::Snmp { status, index, oid, .. } => {
            assert_eq!(status, snmp_usm::ErrorStatus::NoSuchName);
            assert_eq!(index, 1);
            assert!(oid.is_some());
        }
        other => panic!("expected Snmp error, got {other}"),
    }
}

/// Responses for a different msgID are ignored, not delivered.
#[tokio::test]
async fn foreign_msg_id_is_discarded() {
    let transport = mock();
    transport.queue_response(discovery_report(ENGINE_ID, 1, 100));

    let auth_key = LocalizedKey::from_passphrase(AuthProtocol::Sha1, AUTH_PASS, ENGINE_ID);
    // Valid MAC, wrong msgID.
    transport.queue_response(auth_message(
        &auth_key,
        999,
        1,
        100,
        b"authuser",
        response_pdu(999),
    ));

    let session = Session::new(
        transport,
        SecurityConfig::new("authuser").auth(AuthProtocol::Sha1, AUTH_PASS),
    )
    .unwrap()
    .with_initial_request_id(100)
    .with_retries(0);

    let err = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await.unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }), "{err}");
}

/// Engine boots/time from every verified response are stored back into
/// the session.
#[tokio::test]
async fn responses_refresh_engine_time() {
    let transport = mock();
    transport.queue_response(discovery_report(ENGINE_ID, 1, 100));

    let auth_key = LocalizedKey::from_passphrase(AuthProtocol::Sha1, AUTH_PASS, ENGINE_ID);
    transport.queue_response(auth_message(
        &auth_key,
        101,
        1,
        2500,
        b"authuser",
        response_pdu(101),
    ));

    let session = Session::new(
        transport,
        SecurityConfig::new("authuser").auth(AuthProtocol::Sha1, AUTH_PASS),
    )
    .unwrap()
    .with_initial_request_id(100);

    session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await.unwrap();

    let engine = session.engine_state().unwrap();
    assert_eq!(engine.engine_time, 2500);
}

/// Sanity: the engine module classifiers drive the session's report
/// handling.
#[test]
fn report_classifiers_match_session_expectations() {
    let pdu = Pdu {
        pdu_type: PduType::Report,
        request_id: 0,
        error_status: 0,
        error_index: 0,
        varbinds: vec![VarBind::new(
            report_oids::not_in_time_windows(),
            Value::Counter32(1),
        )],
    };
    assert!(engine::is_not_in_time_window_report(&pdu));
    assert!(!engine::is_unknown_engine_id_report(&pdu));
}
