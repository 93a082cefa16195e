//! Domain models for ring discovery and measurement results.

use serde::{Deserialize, Serialize};

/// The first classifier rule that recognised an advertisement as a ring.
///
/// Rule priority is fixed: manufacturer identifier, then service UUID
/// prefix, then name keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchReason {
    /// Manufacturer identifier in the reserved ring range (0xFF00..=0xFF0F).
    ManufacturerId(u16),
    /// An advertised service UUID starts with the ring's private UUID base.
    ServiceUuidPrefix(String),
    /// The advertised local name contains a known ring keyword.
    NameKeyword(String),
}

/// A discovered ring candidate.
///
/// Created per advertisement, deduplicated by identifier within one scan
/// session. Advertisements matching no classifier rule never produce one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingDevice {
    /// Opaque platform identifier for the peripheral.
    pub id: String,
    /// Advertised local name, when one was present.
    pub name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: i16,
    /// Why the classifier accepted this device.
    pub match_reason: MatchReason,
}

/// Wearing status byte carried in heart-rate frames.
///
/// Values beyond the ones the firmware documents are preserved as
/// [`WearingStatus::Unknown`] rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WearingStatus {
    OffWrist,
    OnWrist,
    Charging,
    Acquiring,
    Busy,
    Unknown(u8),
}

impl WearingStatus {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::OffWrist,
            1 => Self::OnWrist,
            2 => Self::Charging,
            3 => Self::Acquiring,
            4 => Self::Busy,
            other => Self::Unknown(other),
        }
    }

    /// True when a reading taken in this state is physiologically meaningful.
    pub fn is_worn(&self) -> bool {
        matches!(self, Self::OnWrist | Self::Acquiring)
    }
}

/// One heart-rate reading.
///
/// HRV, stress, and temperature are trailing optional fields on the wire;
/// absent fields decode to `0` / `None`, never to an error.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartRateResult {
    pub wearing: WearingStatus,
    /// Beats per minute. `0` means no valid reading.
    pub heart_rate: u8,
    /// Heart-rate variability in milliseconds. `0` means not reported.
    pub hrv: u8,
    /// Stress index. `0` means not reported.
    pub stress: u8,
    /// Skin temperature in °C (wire format: little-endian i16, 1/100 °C).
    pub temperature: Option<f32>,
}

/// One waveform notification chunk. Sample interpretation past the declared
/// count is a transport detail; the raw bytes are kept as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveformData {
    pub seq: u8,
    pub declared_count: u8,
    pub samples: Vec<u8>,
}

/// One RR-interval notification chunk (millisecond intervals).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RRIntervalData {
    pub seq: u8,
    pub declared_count: u8,
    pub intervals: Vec<u16>,
}

/// Frozen output of a measurement session.
///
/// `complete` is false for data salvaged from an errored or cancelled
/// session — partial data is exposed but never presented as a finished
/// reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementOutcome {
    pub heart_rate: Option<u8>,
    pub hrv: Option<u8>,
    pub stress: Option<u8>,
    pub temperature: Option<f32>,
    pub waveform: Vec<u8>,
    pub rr_intervals: Vec<u16>,
    pub complete: bool,
}
