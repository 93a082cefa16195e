//! Injected platform BLE boundary.
//!
//! The engine never links a platform Bluetooth stack. Whatever provides the
//! connected peripheral (CoreBluetooth, BlueZ, btleplug, the vendor SDK, or
//! a test double) implements [`Transport`], and [`GattSession`] drives it.
//!
//! [`GattSession`]: crate::ble::session::GattSession

use async_trait::async_trait;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::TransportError;

/// Handle to a discovered GATT service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandle(pub Uuid);

/// Handle to a discovered GATT characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicHandle(pub Uuid);

/// Platform BLE primitives the engine depends on.
///
/// All operations target one already-connected peripheral; connection
/// management stays on the platform side.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Discover the given service on the peripheral.
    async fn discover_service(&self, service: Uuid) -> Result<ServiceHandle, TransportError>;

    /// Discover specific characteristics within a discovered service.
    async fn discover_characteristics(
        &self,
        service: &ServiceHandle,
        uuids: &[Uuid],
    ) -> Result<Vec<CharacteristicHandle>, TransportError>;

    /// Write raw bytes to a characteristic, optionally requesting a
    /// transport-level delivery confirmation.
    async fn write(
        &self,
        characteristic: &CharacteristicHandle,
        bytes: &[u8],
        confirm: bool,
    ) -> Result<(), TransportError>;

    /// Subscribe to notifications on a characteristic. Raw values arrive on
    /// the returned channel in delivery order.
    async fn subscribe(
        &self,
        characteristic: &CharacteristicHandle,
    ) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, TransportError>;
}
