//! BLE protocol engine for the ring.
//!
//! ## Architecture
//!
//! ```text
//! advertisements ──▶ classifier ──▶ RingDevice (user selects one)
//!                                        │
//!                                        ▼
//!                    ┌─────────────────────────────────────┐
//!                    │             GattSession             │
//!                    │  discover service + characteristics │
//!                    │  send(Frame) / decoded frame stream │
//!                    └──────┬──────────────────────▲───────┘
//!                           │ notifications        │ commands, acks
//!                           ▼                      │
//!                ────▶ codec ──▶ dispatcher ──▶ MeasurementSession
//! ```
//!
//! ## Modules
//!
//! - [`classifier`] - advertisement scoring, scan-session dedup, discovery pump
//! - [`codec`] - `Frame` encode/decode and protocol constants
//! - [`dispatcher`] - `(command, subcommand)` routing to typed events
//! - [`session`] - GATT session state machine and frame transport glue

pub mod classifier;
pub mod codec;
pub mod dispatcher;
pub mod session;

pub use classifier::{classify, Advertisement, ScanSession};
pub use codec::Frame;
pub use dispatcher::{dispatch, ProtocolEvent};
pub use session::{FrameSender, GattEvent, GattSession, GattState};
