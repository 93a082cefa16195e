//! In-memory ring double for integration tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use smartring::{CharacteristicHandle, ServiceHandle, Transport, TransportError};

/// Fake peripheral: discovery always succeeds, writes are recorded, and the
/// test feeds notification bytes in by hand.
#[derive(Default)]
pub struct FakeRing {
    writes: Mutex<Vec<Vec<u8>>>,
    fail_writes: AtomicBool,
    notify_tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
}

impl FakeRing {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written_frames(&self) -> Vec<Vec<u8>> {
        self.writes.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Deliver raw notification bytes to the current subscriber.
    pub fn notify(&self, bytes: Vec<u8>) {
        if let Some(tx) = self.notify_tx.lock().unwrap().as_ref() {
            let _ = tx.send(bytes);
        }
    }
}

#[async_trait]
impl Transport for FakeRing {
    async fn discover_service(&self, service: Uuid) -> Result<ServiceHandle, TransportError> {
        Ok(ServiceHandle(service))
    }

    async fn discover_characteristics(
        &self,
        _service: &ServiceHandle,
        uuids: &[Uuid],
    ) -> Result<Vec<CharacteristicHandle>, TransportError> {
        Ok(uuids.iter().copied().map(CharacteristicHandle).collect())
    }

    async fn write(
        &self,
        _characteristic: &CharacteristicHandle,
        bytes: &[u8],
        _confirm: bool,
    ) -> Result<(), TransportError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::WriteFailed("simulated failure".into()));
        }
        self.writes.lock().unwrap().push(bytes.to_vec());
        Ok(())
    }

    async fn subscribe(
        &self,
        _characteristic: &CharacteristicHandle,
    ) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, TransportError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.notify_tx.lock().unwrap() = Some(tx);
        Ok(rx)
    }
}
