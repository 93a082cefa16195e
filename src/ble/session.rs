//! GATT session: one connected peripheral, one vendor service, two
//! characteristics.
//!
//! The session owns the platform connection handle (via the injected
//! [`Transport`]) and the notification stream. Measurement code never talks
//! to the transport directly; it gets a clonable [`FrameSender`] capability
//! and a stream of decoded frames.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::ble::codec::Frame;
use crate::config::GattConfig;
use crate::error::TransportError;
use crate::transport::{CharacteristicHandle, Transport};

/// Session lifecycle. `Closed` is terminal.
///
/// A write in flight is not a distinct state: `Ready` covers both idle and
/// sending, and concurrent sends are serialized by the platform stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GattState {
    Unbound,
    DiscoveringServices,
    DiscoveringCharacteristics,
    Ready,
    Closed,
}

/// One item from the decoded notification stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GattEvent {
    Frame(Frame),
    /// Raw bytes that did not decode; surfaced, never silently dropped.
    DecodeFailure { len: usize },
}

struct SharedLink {
    transport: Arc<dyn Transport>,
    write_char: RwLock<Option<CharacteristicHandle>>,
    closed: AtomicBool,
}

/// Stateful wrapper around one connected peripheral.
pub struct GattSession {
    link: Arc<SharedLink>,
    config: GattConfig,
    notify_char: Option<CharacteristicHandle>,
    state: GattState,
}

impl GattSession {
    /// Wrap a connected peripheral. The session starts `Unbound`; call
    /// [`bind`](Self::bind) to discover the vendor service.
    pub fn new(transport: Arc<dyn Transport>, config: GattConfig) -> Self {
        Self {
            link: Arc::new(SharedLink {
                transport,
                write_char: RwLock::new(None),
                closed: AtomicBool::new(false),
            }),
            config,
            notify_char: None,
            state: GattState::Unbound,
        }
    }

    pub fn state(&self) -> GattState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == GattState::Ready
    }

    /// Discover the vendor service and its write/notify characteristics.
    ///
    /// Binding proceeds opportunistically even if the transport-level
    /// connection is still settling; a discovery failure resets the session
    /// to `Unbound` so the caller can retry.
    pub async fn bind(&mut self) -> Result<(), TransportError> {
        if self.state == GattState::Closed {
            return Err(TransportError::SessionClosed);
        }

        self.state = GattState::DiscoveringServices;
        let service = match self
            .link
            .transport
            .discover_service(self.config.service_uuid)
            .await
        {
            Ok(service) => service,
            Err(e) => {
                self.state = GattState::Unbound;
                return Err(e);
            }
        };

        self.state = GattState::DiscoveringCharacteristics;
        let wanted = [self.config.write_char_uuid, self.config.notify_char_uuid];
        let characteristics = match self
            .link
            .transport
            .discover_characteristics(&service, &wanted)
            .await
        {
            Ok(characteristics) => characteristics,
            Err(e) => {
                self.state = GattState::Unbound;
                return Err(e);
            }
        };

        let find = |uuid| {
            characteristics
                .iter()
                .find(|c| c.0 == uuid)
                .cloned()
                .ok_or(TransportError::CharacteristicNotFound(uuid))
        };
        let write_char = find(self.config.write_char_uuid);
        let notify_char = find(self.config.notify_char_uuid);
        let (write_char, notify_char) = match (write_char, notify_char) {
            (Ok(w), Ok(n)) => (w, n),
            (Err(e), _) | (_, Err(e)) => {
                self.state = GattState::Unbound;
                return Err(e);
            }
        };

        *self
            .link
            .write_char
            .write()
            .map_err(|_| TransportError::WriteFailed("characteristic lock poisoned".into()))? =
            Some(write_char);
        self.notify_char = Some(notify_char);
        self.state = GattState::Ready;

        info!(service = %self.config.service_uuid, "GATT session ready");
        Ok(())
    }

    /// Encode and write one frame, requesting delivery confirmation.
    /// Fails fast if the write characteristic is not yet discovered.
    pub async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        self.sender().send(frame).await
    }

    /// Clonable send capability for a measurement session. Valid for the
    /// session's lifetime; sends fail once the session closes.
    pub fn sender(&self) -> FrameSender {
        FrameSender {
            link: self.link.clone(),
        }
    }

    /// Subscribe to the notify characteristic and yield decoded frames.
    ///
    /// Raw bytes are decoded before delivery; a decode failure becomes a
    /// [`GattEvent::DecodeFailure`] rather than a crash or silent drop.
    pub async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<GattEvent>, TransportError> {
        if self.state == GattState::Closed {
            return Err(TransportError::SessionClosed);
        }
        let notify_char = self.notify_char.clone().ok_or(TransportError::NotReady)?;

        let mut raw = self.link.transport.subscribe(&notify_char).await?;
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(bytes) = raw.recv().await {
                let event = match Frame::decode(&bytes) {
                    Ok(frame) => GattEvent::Frame(frame),
                    Err(e) => {
                        warn!(len = bytes.len(), error = %e, "undecodable notification");
                        GattEvent::DecodeFailure { len: bytes.len() }
                    }
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    /// Close the session. Terminal: every later `send` fails with
    /// [`TransportError::SessionClosed`].
    pub fn close(&mut self) {
        if self.state == GattState::Closed {
            return;
        }
        self.link.closed.store(true, Ordering::SeqCst);
        self.state = GattState::Closed;
        info!("GATT session closed");
    }
}

/// Non-owning handle to a session's send path.
#[derive(Clone)]
pub struct FrameSender {
    link: Arc<SharedLink>,
}

impl FrameSender {
    /// True once the write characteristic is discovered and the session is
    /// still open.
    pub fn is_ready(&self) -> bool {
        !self.link.closed.load(Ordering::SeqCst)
            && self
                .link
                .write_char
                .read()
                .map(|c| c.is_some())
                .unwrap_or(false)
    }

    pub async fn send(&self, frame: &Frame) -> Result<(), TransportError> {
        if self.link.closed.load(Ordering::SeqCst) {
            return Err(TransportError::SessionClosed);
        }

        let characteristic = self
            .link
            .write_char
            .read()
            .map_err(|_| TransportError::WriteFailed("characteristic lock poisoned".into()))?
            .clone()
            .ok_or(TransportError::NotReady)?;

        let bytes = frame.encode();
        self.link
            .transport
            .write(&characteristic, &bytes, true)
            .await
    }
}
