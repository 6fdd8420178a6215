//! Authoritative engine state and USM Report classification (RFC 3414
//! Sections 4 and 2.4).
//!
//! Before any authenticated exchange, a session must learn the
//! authoritative engine's ID, boot counter, and time. The values arrive in
//! the USM parameters of a Report PDU answering a noAuthNoPriv probe, and
//! are refreshed from every subsequent response. Clock-skew recovery is
//! passive: a usmStatsNotInTimeWindows report carries the agent's current
//! boots/time, which the session stores before reissuing the request.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::oid::Oid;
use crate::pdu::Pdu;
use crate::v3::UsmSecurityParams;

/// Authoritative engine state learned through discovery.
#[derive(Debug, Clone, Default)]
pub struct EngineState {
    /// Engine ID (5-32 opaque bytes)
    pub engine_id: Bytes,
    /// Boot counter
    pub engine_boots: u32,
    /// Seconds since last boot, as of the last response
    pub engine_time: u32,
}

impl EngineState {
    /// Create engine state from a discovered triple.
    pub fn new(engine_id: Bytes, engine_boots: u32, engine_time: u32) -> Self {
        Self {
            engine_id,
            engine_boots,
            engine_time,
        }
    }

    /// Refresh the triple from a response's USM parameters.
    ///
    /// Returns `true` when the engine ID changed, which invalidates any
    /// localized keys derived for the previous ID.
    pub fn refresh_from(&mut self, usm: &UsmSecurityParams) -> bool {
        let id_changed = !usm.engine_id.is_empty() && usm.engine_id != self.engine_id;
        if id_changed {
            self.engine_id = usm.engine_id.clone();
        }
        self.engine_boots = usm.engine_boots;
        self.engine_time = usm.engine_time;
        id_changed
    }
}

/// Build engine state from a discovery response's USM parameters.
///
/// Fails when the peer did not report an engine ID.
pub fn parse_discovery_response(usm: &UsmSecurityParams) -> Result<EngineState> {
    if usm.engine_id.is_empty() {
        tracing::debug!("discovery response carried an empty engine ID");
        return Err(Error::Discovery { target: None });
    }
    Ok(EngineState::new(
        usm.engine_id.clone(),
        usm.engine_boots,
        usm.engine_time,
    ))
}

/// usmStats OIDs carried by Report PDUs (RFC 3414 Section 2.4, the
/// 1.3.6.1.6.3.15.1.1 subtree).
pub mod report_oids {
    use crate::oid::Oid;

    /// usmStatsNotInTimeWindows.0
    pub fn not_in_time_windows() -> Oid {
        crate::oid!(1, 3, 6, 1, 6, 3, 15, 1, 1, 2, 0)
    }

    /// usmStatsUnknownEngineIDs.0
    pub fn unknown_engine_ids() -> Oid {
        crate::oid!(1, 3, 6, 1, 6, 3, 15, 1, 1, 4, 0)
    }

    /// usmStatsWrongDigests.0
    pub fn wrong_digests() -> Oid {
        crate::oid!(1, 3, 6, 1, 6, 3, 15, 1, 1, 5, 0)
    }

    /// usmStatsDecryptionErrors.0
    pub fn decryption_errors() -> Oid {
        crate::oid!(1, 3, 6, 1, 6, 3, 15, 1, 1, 6, 0)
    }
}

fn report_contains(pdu: &Pdu, oid: &Oid) -> bool {
    pdu.is_report() && pdu.varbinds.iter().any(|vb| &vb.oid == oid)
}

/// Whether a Report PDU signals "unknown engine ID" (the discovery answer).
pub fn is_unknown_engine_id_report(pdu: &Pdu) -> bool {
    report_contains(pdu, &report_oids::unknown_engine_ids())
}

/// Whether a Report PDU signals "not in time window".
pub fn is_not_in_time_window_report(pdu: &Pdu) -> bool {
    report_contains(pdu, &report_oids::not_in_time_windows())
}

/// Whether a Report PDU signals "wrong digest" (our credentials rejected).
pub fn is_wrong_digest_report(pdu: &Pdu) -> bool {
    report_contains(pdu, &report_oids::wrong_digests())
}

/// Whether a Report PDU signals a decryption error on our request.
pub fn is_decryption_error_report(pdu: &Pdu) -> bool {
    report_contains(pdu, &report_oids::decryption_errors())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::PduType;
    use crate::value::Value;
    use crate::varbind::VarBind;

    fn report_with(oid: Oid) -> Pdu {
        Pdu {
            pdu_type: PduType::Report,
            request_id: 1,
            error_status: 0,
            error_index: 0,
            varbinds: vec![VarBind::new(oid, Value::Counter32(1))],
        }
    }

    #[test]
    fn refresh_tracks_engine_id_changes() {
        let mut state = EngineState::new(Bytes::from_static(b"engine-a"), 1, 100);

        let same = UsmSecurityParams::new(b"engine-a".as_slice(), 2, 200, b"".as_slice());
        assert!(!state.refresh_from(&same));
        assert_eq!(state.engine_boots, 2);
        assert_eq!(state.engine_time, 200);

        let other = UsmSecurityParams::new(b"engine-b".as_slice(), 3, 300, b"".as_slice());
        assert!(state.refresh_from(&other));
        assert_eq!(state.engine_id.as_ref(), b"engine-b");
    }

    #[test]
    fn refresh_ignores_empty_engine_id() {
        let mut state = EngineState::new(Bytes::from_static(b"engine-a"), 1, 100);
        let usm = UsmSecurityParams::new(b"".as_slice(), 5, 500, b"".as_slice());
        assert!(!state.refresh_from(&usm));
        assert_eq!(state.engine_id.as_ref(), b"engine-a");
        assert_eq!(state.engine_boots, 5);
    }

    #[test]
    fn discovery_response_requires_engine_id() {
        let usm = UsmSecurityParams::new(b"test-engine".as_slice(), 42, 12345, b"".as_slice());
        let state = parse_discovery_response(&usm).unwrap();
        assert_eq!(state.engine_id.as_ref(), b"test-engine");
        assert_eq!(state.engine_boots, 42);
        assert_eq!(state.engine_time, 12345);

        let empty = UsmSecurityParams::empty();
        assert!(matches!(
            parse_discovery_response(&empty),
            Err(Error::Discovery { .. })
        ));
    }

    #[test]
    fn report_classification() {
        let pdu = report_with(report_oids::unknown_engine_ids());
        assert!(is_unknown_engine_id_report(&pdu));
        assert!(!is_not_in_time_window_report(&pdu));

        let pdu = report_with(report_oids::not_in_time_windows());
        assert!(is_not_in_time_window_report(&pdu));

        let pdu = report_with(report_oids::wrong_digests());
        assert!(is_wrong_digest_report(&pdu));

        let pdu = report_with(report_oids::decryption_errors());
        assert!(is_decryption_error_report(&pdu));
    }

    #[test]
    fn non_report_pdus_never_classify() {
        let mut pdu = report_with(report_oids::unknown_engine_ids());
        pdu.pdu_type = PduType::Response;
        assert!(!is_unknown_engine_id_report(&pdu));
    }
}
