//! Manager event stream.
//!
//! Every observable change in the connection manager is published as a
//! [`ManagerEvent`] on a broadcast channel. Each subscriber has its own
//! queue: a slow subscriber lags (and skips ahead) without blocking the
//! others, and events sent before subscribing are not replayed.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use medlink_types::{ConnectionState, Device, DeviceInfo, Measurement};

use crate::adapter::AdapterProfile;
use crate::error::{Error, ErrorKind};
use crate::validation::ValidationResult;

/// Default event channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 128;

/// Events published by the connection manager.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ManagerEvent {
    /// A device changed connection state.
    StateChanged {
        device_id: String,
        state: ConnectionState,
    },
    /// A device was seen for the first time during a scan.
    DeviceDiscovered { device: Device },
    /// A device connected and its services were discovered.
    DeviceConnected {
        device_id: String,
        info: Option<DeviceInfo>,
    },
    /// A device disconnected.
    DeviceDisconnected {
        device_id: String,
        reason: DisconnectReason,
    },
    /// Measurement notifications are active.
    DeviceReady {
        device_id: String,
        profile: AdapterProfile,
        battery_level: Option<u8>,
    },
    /// A measurement was decoded and validated.
    MeasurementReceived {
        device_id: String,
        measurement: Measurement,
        validation: ValidationResult,
    },
    /// A scan finished.
    ScanComplete { count: usize },
    /// Something failed outside a caller's direct request.
    Error {
        device_id: Option<String>,
        kind: ErrorKind,
        message: String,
    },
}

impl ManagerEvent {
    /// Build an error event from an [`Error`].
    pub fn error(device_id: Option<&str>, error: &Error) -> Self {
        Self::Error {
            device_id: device_id.map(str::to_string),
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    /// The device this event concerns, if any.
    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::StateChanged { device_id, .. }
            | Self::DeviceConnected { device_id, .. }
            | Self::DeviceDisconnected { device_id, .. }
            | Self::DeviceReady { device_id, .. }
            | Self::MeasurementReceived { device_id, .. } => Some(device_id),
            Self::DeviceDiscovered { device } => Some(&device.id),
            Self::Error { device_id, .. } => device_id.as_deref(),
            Self::ScanComplete { .. } => None,
        }
    }
}

/// Why a device disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DisconnectReason {
    /// `disconnect` or `forget_device` was called.
    UserRequested,
    /// The platform reported the link as lost.
    ConnectionLost,
    /// The Bluetooth radio was turned off.
    BluetoothPoweredOff,
    /// The manager is shutting down.
    Shutdown,
}

/// Receiver for manager events.
pub type EventReceiver = broadcast::Receiver<ManagerEvent>;

/// Broadcasts events to every subscriber.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: broadcast::Sender<ManagerEvent>,
}

impl EventDispatcher {
    /// Create a dispatcher whose subscribers buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events sent from now on.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event. Having no subscribers is not an error.
    pub fn send(&self, event: ManagerEvent) {
        let _ = self.sender.send(event);
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
