//! Protocol engine for BAE8-family BLE smart rings.
//!
//! The crate turns raw BLE advertisements and GATT notifications into typed
//! ring events, and drives physiological measurements against the vendor
//! frame protocol. The platform BLE stack stays outside: callers implement
//! [`transport::Transport`] over whatever OS API they have, and everything
//! in here works against that seam.
//!
//! The pieces, bottom up:
//!
//! - [`ble::classifier`] decides whether an advertisement is a supported
//!   ring, with per-scan dedup.
//! - [`ble::codec`] encodes and decodes the vendor frame format.
//! - [`ble::session`] binds the ring's GATT service and exposes a frame
//!   channel in each direction.
//! - [`ble::dispatcher`] routes decoded frames to typed protocol events.
//! - [`measurement`] runs one measurement end to end: start command,
//!   accumulation, push acknowledgments, acquisition timer, frozen result.
//! - [`config`] and [`logging`] carry the on-disk settings and the tracing
//!   setup shared by embedding applications.

pub mod ble;
pub mod config;
pub mod error;
pub mod logging;
pub mod measurement;
pub mod models;
pub mod transport;

pub use ble::{
    classify, dispatch, Advertisement, Frame, FrameSender, GattEvent, GattSession, GattState,
    ProtocolEvent, ScanSession,
};
pub use config::{GattConfig, MeasurementConfig, Settings, SettingsService};
pub use error::{CodecError, MeasurementError, TransportError};
pub use measurement::{
    run_measurement, spawn_measurement, MeasurementCommand, MeasurementEvent, MeasurementSession,
    MeasurementState,
};
pub use models::{
    HeartRateResult, MatchReason, MeasurementOutcome, RingDevice, WearingStatus,
};
pub use transport::{CharacteristicHandle, ServiceHandle, Transport};
