//! Platform BLE transport seam.
//!
//! The [`Transport`] trait is the only place the engine touches a Bluetooth
//! stack. [`BtleplugTransport`](crate::btle::BtleplugTransport) drives real
//! hardware; [`MockTransport`](crate::mock::MockTransport) simulates devices
//! for tests and demos.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Power state of the Bluetooth radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RadioState {
    /// The radio is on and usable.
    PoweredOn,
    /// The radio is off.
    PoweredOff,
    /// The state has not been reported yet.
    #[default]
    Unknown,
}

/// One advertisement packet seen during a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct Advertisement {
    /// Platform-stable device identifier.
    pub device_id: String,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
    /// Advertised service UUIDs.
    pub services: Vec<Uuid>,
}

/// A GATT service and its characteristic UUIDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    /// Service UUID.
    pub uuid: Uuid,
    /// Characteristics in this service.
    pub characteristics: Vec<Uuid>,
}

impl GattService {
    /// Create a service description.
    pub fn new(uuid: Uuid, characteristics: impl Into<Vec<Uuid>>) -> Self {
        Self {
            uuid,
            characteristics: characteristics.into(),
        }
    }
}

/// Asynchronous events reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The radio changed power state.
    RadioStateChanged(RadioState),
    /// The platform dropped a connection without being asked to.
    Disconnected {
        /// The device whose link was lost.
        device_id: String,
    },
}

/// Stream of advertisements for a running scan.
pub type AdvertisementStream = Pin<Box<dyn Stream<Item = Advertisement> + Send>>;

/// Stream of raw notification payloads for one characteristic.
pub type NotificationStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// Stream of platform events.
pub type TransportEventStream = Pin<Box<dyn Stream<Item = TransportEvent> + Send>>;

/// Operations the engine needs from a BLE central.
///
/// Device ids are the strings reported in [`Advertisement::device_id`].
/// Implementations map platform failures onto [`crate::Error`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Current radio power state.
    async fn radio_state(&self) -> Result<RadioState>;

    /// Subscribe to radio and link events.
    async fn events(&self) -> Result<TransportEventStream>;

    /// Start scanning. An empty filter scans for every device.
    async fn start_scan(&self, services: &[Uuid]) -> Result<AdvertisementStream>;

    /// Stop a running scan. Stopping while idle is not an error.
    async fn stop_scan(&self) -> Result<()>;

    /// Establish a link to the device.
    async fn connect(&self, device_id: &str) -> Result<()>;

    /// Abandon a pending connection attempt.
    async fn cancel_connection(&self, device_id: &str) -> Result<()>;

    /// Tear down the link to the device.
    async fn disconnect(&self, device_id: &str) -> Result<()>;

    /// Discover the device's GATT services.
    async fn discover_services(&self, device_id: &str) -> Result<Vec<GattService>>;

    /// Read a characteristic value.
    async fn read(&self, device_id: &str, characteristic: Uuid) -> Result<Vec<u8>>;

    /// Write a characteristic value (with response).
    async fn write(&self, device_id: &str, characteristic: Uuid, data: &[u8]) -> Result<()>;

    /// Enable notifications or indications on a characteristic.
    async fn subscribe(&self, device_id: &str, characteristic: Uuid) -> Result<NotificationStream>;

    /// Disable notifications or indications on a characteristic.
    async fn unsubscribe(&self, device_id: &str, characteristic: Uuid) -> Result<()>;
}
