//! Error types for the ring protocol engine.
//!
//! Expected per-frame conditions (unknown commands, short reads, missed ack
//! deadlines) are *not* errors — they surface as diagnostic events and never
//! abort a session. The enums here cover the conditions that do fail a
//! decode, a write, or a measurement request.

use thiserror::Error;
use uuid::Uuid;

/// Frame decode failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Fewer than the three mandatory header bytes were supplied.
    #[error("frame too short: {len} bytes (need at least 3)")]
    TooShort { len: usize },
}

/// Failures talking to the underlying BLE transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("ring service {0} not found")]
    ServiceNotFound(Uuid),

    #[error("characteristic {0} not found")]
    CharacteristicNotFound(Uuid),

    /// The write characteristic has not been discovered yet.
    #[error("GATT session not ready")]
    NotReady,

    /// The session was closed; no further traffic is possible.
    #[error("GATT session closed")]
    SessionClosed,

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("notification subscribe failed: {0}")]
    SubscribeFailed(String),
}

/// Errors surfaced when starting or driving a measurement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeasurementError {
    /// The GATT session was not ready when the measurement was requested.
    /// No state change happened; the caller may retry after reconnecting.
    #[error("device not ready for measurement")]
    DeviceNotReady,

    /// A measurement is already running on this session.
    #[error("a measurement is already in progress")]
    SessionBusy,

    #[error(transparent)]
    Transport(#[from] TransportError),
}
