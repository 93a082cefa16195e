//! Advertisement classification and scan-session bookkeeping.
//!
//! The ring may advertise without its service UUID, so manufacturer data is
//! the primary signal. Rules run in fixed priority order and short-circuit:
//!
//! 1. manufacturer identifier `0xFF00..=0xFF0F` (payload ≥ 8 bytes),
//! 2. service UUID with the private `BAE8` prefix,
//! 3. local-name keyword.
//!
//! Anything matching no rule is filtered out and never surfaced.

use std::collections::HashSet;

use tokio::sync::mpsc;
use tracing::{debug, info, trace};
use uuid::Uuid;

use crate::models::{MatchReason, RingDevice};

/// Reserved manufacturer identifier range for the ring family.
pub const MANUFACTURER_ID_MIN: u16 = 0xFF00;
pub const MANUFACTURER_ID_MAX: u16 = 0xFF0F;

/// Private UUID base `BAE8xxxx-4F05-4503-8E65-3AF1F7329D1F`, compared
/// case-insensitively against the canonical string form.
pub const RING_UUID_PREFIX: &str = "bae8";

/// Local-name keywords that mark a ring when no stronger rule fires.
pub const RING_NAME_KEYWORDS: &[&str] = &["ring", "指环", "smart", "bcl", "ysh"];

/// Placeholder some platforms report instead of a real local name.
const UNKNOWN_NAME_PLACEHOLDER: &str = "unknown";

/// One BLE advertisement as delivered by the platform scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    /// Opaque platform identifier for the peripheral.
    pub id: String,
    pub local_name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: i16,
    pub service_uuids: Vec<Uuid>,
    pub manufacturer_data: Option<Vec<u8>>,
}

/// Classify one advertisement. Pure and deterministic; returns the first
/// matching rule's reason, or `None` for non-ring devices.
pub fn classify(adv: &Advertisement) -> Option<MatchReason> {
    // Rule 1: manufacturer data — 6 MAC-like bytes, then a little-endian
    // identifier in the last two bytes.
    if let Some(data) = adv.manufacturer_data.as_deref() {
        if data.len() >= 8 {
            let mac = data[..6]
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect::<Vec<_>>()
                .join(":");
            let identifier = u16::from_le_bytes([data[data.len() - 2], data[data.len() - 1]]);
            trace!(%mac, identifier = format!("0x{identifier:04X}"), "manufacturer data");

            if (MANUFACTURER_ID_MIN..=MANUFACTURER_ID_MAX).contains(&identifier) {
                return Some(MatchReason::ManufacturerId(identifier));
            }
        }
    }

    // Rule 2: a service UUID under the private base.
    for uuid in &adv.service_uuids {
        let canonical = uuid.to_string().to_lowercase();
        if canonical.starts_with(RING_UUID_PREFIX) {
            return Some(MatchReason::ServiceUuidPrefix(canonical));
        }
    }

    // Rule 3: local-name keyword, only for a real advertised name.
    if let Some(name) = adv.local_name.as_deref() {
        let lowered = name.to_lowercase();
        if !lowered.is_empty() && lowered != UNKNOWN_NAME_PLACEHOLDER {
            for keyword in RING_NAME_KEYWORDS {
                if lowered.contains(keyword) {
                    return Some(MatchReason::NameKeyword((*keyword).to_string()));
                }
            }
        }
    }

    None
}

/// Deduplicating discovery stream for one scan session.
///
/// A device already reported by identifier is not reported again until the
/// session is reset.
#[derive(Debug, Default)]
pub struct ScanSession {
    seen: HashSet<String>,
}

impl ScanSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the classifier over one advertisement. Returns a device for the
    /// first sighting of each ring, `None` for repeats and non-rings.
    pub fn observe(&mut self, adv: &Advertisement) -> Option<RingDevice> {
        let reason = classify(adv)?;
        if !self.seen.insert(adv.id.clone()) {
            return None;
        }

        debug!(id = %adv.id, ?reason, rssi = adv.rssi, "ring candidate discovered");
        Some(RingDevice {
            id: adv.id.clone(),
            name: adv.local_name.clone(),
            rssi: adv.rssi,
            match_reason: reason,
        })
    }

    /// Forget every reported device, starting a fresh scan session.
    pub fn reset(&mut self) {
        self.seen.clear();
    }
}

/// Pump a platform advertisement stream into discovered-ring events.
///
/// Runs until the advertisement stream ends or every receiver of `found`
/// is gone.
pub async fn run_discovery(
    adverts: &mut mpsc::UnboundedReceiver<Advertisement>,
    found: &mpsc::UnboundedSender<RingDevice>,
) {
    let mut session = ScanSession::new();
    info!("ring discovery started");

    while let Some(adv) = adverts.recv().await {
        if let Some(device) = session.observe(&adv) {
            if found.send(device).is_err() {
                break;
            }
        }
    }

    info!("ring discovery stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adv(id: &str) -> Advertisement {
        Advertisement {
            id: id.to_string(),
            local_name: None,
            rssi: -60,
            service_uuids: Vec::new(),
            manufacturer_data: None,
        }
    }

    fn manufacturer_payload(identifier: u16) -> Vec<u8> {
        let mut data = vec![0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
        data.extend_from_slice(&identifier.to_le_bytes());
        data
    }

    #[test]
    fn manufacturer_identifier_bounds() {
        for (identifier, expected) in [
            (0xFEFF, None),
            (0xFF00, Some(MatchReason::ManufacturerId(0xFF00))),
            (0xFF0F, Some(MatchReason::ManufacturerId(0xFF0F))),
            (0xFF10, None),
        ] {
            let mut a = adv("d1");
            a.manufacturer_data = Some(manufacturer_payload(identifier));
            assert_eq!(classify(&a), expected, "identifier 0x{identifier:04X}");
        }
    }

    #[test]
    fn short_manufacturer_payload_never_matches() {
        let mut a = adv("d1");
        // 7 bytes ending in a would-be matching identifier.
        a.manufacturer_data = Some(vec![0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0xFF]);
        assert_eq!(classify(&a), None);
    }

    #[test]
    fn manufacturer_rule_beats_name_and_uuid() {
        let mut a = adv("d1");
        a.manufacturer_data = Some(manufacturer_payload(0xFF05));
        a.local_name = Some("Smart Ring R02".to_string());
        a.service_uuids = vec![crate::config::RING_SERVICE_UUID];
        assert_eq!(classify(&a), Some(MatchReason::ManufacturerId(0xFF05)));
    }

    #[test]
    fn service_uuid_prefix_matches_case_insensitively() {
        let mut a = adv("d1");
        a.service_uuids = vec![
            Uuid::parse_str("0000180d-0000-1000-8000-00805f9b34fb").unwrap(),
            Uuid::parse_str("BAE80001-4F05-4503-8E65-3AF1F7329D1F").unwrap(),
        ];
        match classify(&a) {
            Some(MatchReason::ServiceUuidPrefix(uuid)) => {
                assert!(uuid.starts_with("bae80001"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn name_keyword_matches_case_insensitively() {
        let mut a = adv("d1");
        a.local_name = Some("YSH-R02 Band".to_string());
        assert_eq!(
            classify(&a),
            Some(MatchReason::NameKeyword("ysh".to_string()))
        );
    }

    #[test]
    fn placeholder_or_missing_name_never_matches() {
        let mut a = adv("d1");
        assert_eq!(classify(&a), None);

        // "Unknown" placeholder must not trip the keyword rule even though
        // it is a real string.
        a.local_name = Some("Unknown".to_string());
        assert_eq!(classify(&a), None);

        a.local_name = Some("JBL Speaker".to_string());
        assert_eq!(classify(&a), None);
    }

    #[test]
    fn scan_session_deduplicates_by_identifier() {
        let mut session = ScanSession::new();
        let mut a = adv("ring-1");
        a.manufacturer_data = Some(manufacturer_payload(0xFF00));

        assert!(session.observe(&a).is_some());
        assert!(session.observe(&a).is_none(), "repeat must be suppressed");

        session.reset();
        assert!(session.observe(&a).is_some(), "reset starts a new session");
    }

    #[test]
    fn scan_session_filters_non_rings() {
        let mut session = ScanSession::new();
        let mut a = adv("speaker-1");
        a.local_name = Some("JBL Speaker".to_string());
        assert!(session.observe(&a).is_none());
    }

    #[tokio::test]
    async fn discovery_pump_emits_deduplicated_devices() {
        let (adv_tx, mut adv_rx) = mpsc::unbounded_channel();
        let (found_tx, mut found_rx) = mpsc::unbounded_channel();

        let mut ring = adv("ring-1");
        ring.manufacturer_data = Some(manufacturer_payload(0xFF02));
        adv_tx.send(ring.clone()).unwrap();
        adv_tx.send(ring).unwrap();
        adv_tx.send(adv("not-a-ring")).unwrap();
        drop(adv_tx);

        run_discovery(&mut adv_rx, &found_tx).await;

        let device = found_rx.recv().await.unwrap();
        assert_eq!(device.id, "ring-1");
        assert_eq!(device.match_reason, MatchReason::ManufacturerId(0xFF02));
        assert!(found_rx.try_recv().is_err(), "exactly one device expected");
    }
}
