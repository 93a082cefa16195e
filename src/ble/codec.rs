//! Ring frame codec.
//!
//! Wire unit shared by every command and notification:
//!
//! ```text
//! [0] frame_type   0x00 (single frame) in the current protocol
//! [1] frame_id     opaque correlation tag; pushes echo it back
//! [2] command      e.g. 0x31 heart rate
//! [3] subcommand   present on every command frame (0x00 = none)
//! [4..] payload
//! ```
//!
//! Reference start frame: `00 09 31 00 1e 32 01 01 01` — measure for 30 s
//! at 50 Hz with waveform, progress, and RR uploads enabled.

use rand::Rng;

use crate::error::CodecError;

/// Heart-rate measurement command family.
pub const CMD_HEART_RATE: u8 = 0x31;
/// SpO2 command family (only its progress notifications are consumed).
pub const CMD_SPO2: u8 = 0x32;

/// Start a measurement (outbound) / result notification (inbound).
pub const SUB_MEASURE: u8 = 0x00;
/// Waveform chunk notification.
pub const SUB_WAVEFORM: u8 = 0x01;
/// RR-interval chunk notification.
pub const SUB_RR_INTERVAL: u8 = 0x02;
/// Device-initiated push; must be acknowledged within 2 seconds.
pub const SUB_PUSH: u8 = 0x03;
/// Progress percentage notification.
pub const SUB_PROGRESS: u8 = 0xFF;

/// Single-frame marker; the only frame type the current firmware emits.
pub const FRAME_TYPE_SINGLE: u8 = 0x00;

/// A decoded protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: u8,
    pub frame_id: u8,
    pub command: u8,
    /// `None` only for bare 3-byte frames; every command frame carries one.
    pub subcommand: Option<u8>,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Build an outbound command frame with a fresh random frame id.
    pub fn command(command: u8, subcommand: u8, payload: Vec<u8>) -> Self {
        Self {
            frame_type: FRAME_TYPE_SINGLE,
            frame_id: random_frame_id(),
            command,
            subcommand: Some(subcommand),
            payload,
        }
    }

    /// Build the acknowledgment for a device push: header only, frame id
    /// echoed from the triggering push frame.
    pub fn ack(frame_id: u8) -> Self {
        Self {
            frame_type: FRAME_TYPE_SINGLE,
            frame_id,
            command: CMD_HEART_RATE,
            subcommand: Some(SUB_PUSH),
            payload: Vec::new(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(4 + self.payload.len());
        bytes.push(self.frame_type);
        bytes.push(self.frame_id);
        bytes.push(self.command);
        if let Some(sub) = self.subcommand {
            bytes.push(sub);
        }
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < 3 {
            return Err(CodecError::TooShort { len: bytes.len() });
        }

        Ok(Self {
            frame_type: bytes[0],
            frame_id: bytes[1],
            command: bytes[2],
            subcommand: bytes.get(3).copied(),
            payload: bytes.get(4..).unwrap_or_default().to_vec(),
        })
    }
}

/// Uniformly random non-zero frame id for an outbound command.
///
/// The protocol defines no collision handling for two in-flight frames
/// sharing an id; push correlation relies solely on echoing the id the
/// device sent. Accepted limitation, preserved from the firmware protocol.
pub fn random_frame_id() -> u8 {
    rand::thread_rng().gen_range(1..=255)
}
