//! Frame dispatch: `(command, subcommand)` to typed protocol events.
//!
//! Parsing is deliberately forgiving, matching the firmware's behaviour:
//! trailing optional fields default instead of failing, RR short reads keep
//! the intervals that did arrive, and out-of-range progress values are
//! clamped. A malformed or unrecognised frame yields a diagnostic event and
//! never aborts anything.

use tracing::{debug, warn};

use crate::ble::codec::{
    Frame, CMD_HEART_RATE, CMD_SPO2, SUB_MEASURE, SUB_PROGRESS, SUB_PUSH, SUB_RR_INTERVAL,
    SUB_WAVEFORM,
};
use crate::models::{HeartRateResult, RRIntervalData, WaveformData, WearingStatus};

/// Semantic meaning of one decoded frame. Exactly one event per frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    HeartRate(HeartRateResult),
    /// Device-initiated push: same payload as a result, plus a mandatory
    /// acknowledgment referencing the push's frame id.
    HeartRatePush {
        result: HeartRateResult,
        frame_id: u8,
    },
    Waveform(WaveformData),
    RrIntervals {
        data: RRIntervalData,
        /// True when fewer intervals arrived than the frame declared.
        truncated: bool,
    },
    /// Measurement progress, 0–100.
    Progress(u8),
    /// Structurally valid frame with an unrecognised command/subcommand.
    Unknown {
        command: u8,
        subcommand: Option<u8>,
    },
    /// Frame too short for its command's minimum payload, or missing the
    /// subcommand byte entirely.
    Malformed {
        command: u8,
        payload_len: usize,
    },
}

/// Route one decoded frame to its typed event.
pub fn dispatch(frame: &Frame) -> ProtocolEvent {
    let Some(subcommand) = frame.subcommand else {
        warn!(
            command = format!("0x{:02x}", frame.command),
            "frame missing subcommand byte"
        );
        return ProtocolEvent::Malformed {
            command: frame.command,
            payload_len: frame.payload.len(),
        };
    };

    let payload = frame.payload.as_slice();
    match (frame.command, subcommand) {
        (CMD_HEART_RATE, SUB_MEASURE) => match parse_heart_rate(payload) {
            Some(result) => ProtocolEvent::HeartRate(result),
            None => malformed(frame),
        },
        (CMD_HEART_RATE, SUB_WAVEFORM) => match parse_waveform(payload) {
            Some(data) => ProtocolEvent::Waveform(data),
            None => malformed(frame),
        },
        (CMD_HEART_RATE, SUB_RR_INTERVAL) => match parse_rr_intervals(payload) {
            Some((data, truncated)) => {
                if truncated {
                    warn!(
                        declared = data.declared_count,
                        parsed = data.intervals.len(),
                        "RR interval short read"
                    );
                }
                ProtocolEvent::RrIntervals { data, truncated }
            }
            None => malformed(frame),
        },
        (CMD_HEART_RATE, SUB_PUSH) => match parse_heart_rate(payload) {
            Some(result) => ProtocolEvent::HeartRatePush {
                result,
                frame_id: frame.frame_id,
            },
            None => malformed(frame),
        },
        (CMD_HEART_RATE | CMD_SPO2, SUB_PROGRESS) => match payload.first() {
            Some(&raw) => ProtocolEvent::Progress(raw.min(100)),
            None => malformed(frame),
        },
        (command, subcommand) => {
            debug!(
                command = format!("0x{command:02x}"),
                subcommand = format!("0x{subcommand:02x}"),
                "unknown frame"
            );
            ProtocolEvent::Unknown {
                command,
                subcommand: Some(subcommand),
            }
        }
    }
}

fn malformed(frame: &Frame) -> ProtocolEvent {
    warn!(
        command = format!("0x{:02x}", frame.command),
        payload_len = frame.payload.len(),
        "payload below command minimum"
    );
    ProtocolEvent::Malformed {
        command: frame.command,
        payload_len: frame.payload.len(),
    }
}

/// Heart-rate payload: `[wearing][bpm][hrv][stress][temp_lo][temp_hi]`,
/// everything past `bpm` optional.
fn parse_heart_rate(payload: &[u8]) -> Option<HeartRateResult> {
    if payload.len() < 2 {
        return None;
    }

    let temperature = if payload.len() >= 6 {
        let raw = i16::from_le_bytes([payload[4], payload[5]]);
        Some(f32::from(raw) / 100.0)
    } else {
        None
    };

    Some(HeartRateResult {
        wearing: WearingStatus::from_raw(payload[0]),
        heart_rate: payload[1],
        hrv: payload.get(2).copied().unwrap_or(0),
        stress: payload.get(3).copied().unwrap_or(0),
        temperature,
    })
}

/// Waveform payload: `[seq][count][samples…]`; samples kept raw.
fn parse_waveform(payload: &[u8]) -> Option<WaveformData> {
    if payload.len() < 2 {
        return None;
    }
    Some(WaveformData {
        seq: payload[0],
        declared_count: payload[1],
        samples: payload[2..].to_vec(),
    })
}

/// RR payload: `[seq][count]` then `count` little-endian u16 milliseconds.
/// A short read keeps whatever full intervals arrived.
fn parse_rr_intervals(payload: &[u8]) -> Option<(RRIntervalData, bool)> {
    if payload.len() < 2 {
        return None;
    }

    let seq = payload[0];
    let declared_count = payload[1];
    let mut intervals = Vec::with_capacity(usize::from(declared_count));

    let mut offset = 2;
    for _ in 0..declared_count {
        match payload.get(offset..offset + 2) {
            Some(pair) => {
                intervals.push(u16::from_le_bytes([pair[0], pair[1]]));
                offset += 2;
            }
            None => break,
        }
    }

    let truncated = intervals.len() < usize::from(declared_count);
    Some((
        RRIntervalData {
            seq,
            declared_count,
            intervals,
        },
        truncated,
    ))
}
