//! Error types for medlink-core.
//!
//! Every failure the engine can report maps onto one [`Error`] variant. The
//! event stream carries the lightweight, serializable [`ErrorKind`] instead
//! of the error itself.
//!
//! | Error | Raised by | Recovery |
//! |-------|-----------|----------|
//! | [`Error::ScanInProgress`] | `scan` | Wait for the running scan or stop it |
//! | [`Error::BluetoothPoweredOff`] | `scan` | Turn the radio on; auto-reconnect follows |
//! | [`Error::DeviceNotFound`] | `connect` | Scan again |
//! | [`Error::ConnectionTimeout`] | `connect` | Retry closer to the device |
//! | [`Error::AlreadyConnecting`] | `connect` | Wait for the running attempt |
//! | [`Error::Decode`] | notifications | None, the payload is logged with the error |
//! | [`Error::Persistence`] | pairing store | None, retried on the next mutation |

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use medlink_types::{DecodeError, StoreError};

/// Errors that can occur while talking to medical devices.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A scan is already running.
    #[error("Scan already in progress")]
    ScanInProgress,

    /// The Bluetooth radio is off or unavailable.
    #[error("Bluetooth is powered off")]
    BluetoothPoweredOff,

    /// The device is not in the discovered set.
    #[error("Device not found: {device_id}")]
    DeviceNotFound {
        /// The requested device.
        device_id: String,
    },

    /// The platform connection attempt failed.
    #[error("Connection to {device_id} failed: {reason}")]
    ConnectionFailed {
        /// The device that failed to connect.
        device_id: String,
        /// Platform-reported reason.
        reason: String,
    },

    /// The connection attempt did not finish in time.
    #[error("Connection to {device_id} timed out after {duration:?}")]
    ConnectionTimeout {
        /// The device that failed to connect.
        device_id: String,
        /// The timeout that expired.
        duration: Duration,
    },

    /// A GATT read, write or notification wait did not finish in time.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout that expired.
        duration: Duration,
    },

    /// A required GATT service is missing.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The missing service UUID.
        uuid: String,
    },

    /// A required GATT characteristic is missing.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The missing characteristic UUID.
        uuid: String,
    },

    /// Enabling notifications failed.
    #[error("Failed to subscribe to {uuid}: {reason}")]
    NotificationFailed {
        /// The characteristic UUID.
        uuid: String,
        /// Platform-reported reason.
        reason: String,
    },

    /// A measurement payload could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The adapter profile does not support this operation.
    #[error("Operation '{operation}' is not supported by {profile}")]
    UnsupportedOperation {
        /// The rejected operation.
        operation: &'static str,
        /// The adapter profile that rejected it.
        profile: String,
    },

    /// No adapter exists for the device.
    #[error("Unsupported device type for {device_id}")]
    UnsupportedDeviceType {
        /// The device that could not be matched.
        device_id: String,
    },

    /// A connection attempt for this device is already running.
    #[error("Already connecting to {device_id}")]
    AlreadyConnecting {
        /// The device being connected.
        device_id: String,
    },

    /// The operation needs a ready connection.
    #[error("Device not connected: {device_id}")]
    DeviceNotConnected {
        /// The device that is not connected.
        device_id: String,
    },

    /// The pairing store could not be persisted.
    #[error("Persistence failed: {0}")]
    Persistence(#[from] StoreError),

    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Serializable classification of an [`Error`], carried by error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorKind {
    ScanInProgress,
    BluetoothPoweredOff,
    DeviceNotFound,
    ConnectionFailed,
    ConnectionTimeout,
    Timeout,
    ServiceNotFound,
    CharacteristicNotFound,
    NotificationFailed,
    Decode,
    UnsupportedOperation,
    UnsupportedDeviceType,
    AlreadyConnecting,
    DeviceNotConnected,
    Persistence,
    Bluetooth,
    InvalidConfig,
}

impl Error {
    /// Create a device not found error.
    pub fn device_not_found(device_id: impl Into<String>) -> Self {
        Self::DeviceNotFound {
            device_id: device_id.into(),
        }
    }

    /// Create a device not connected error.
    pub fn not_connected(device_id: impl Into<String>) -> Self {
        Self::DeviceNotConnected {
            device_id: device_id.into(),
        }
    }

    /// Create a connection failure with a reason.
    pub fn connection_failed(device_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            device_id: device_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a connection timeout error.
    pub fn connection_timeout(device_id: impl Into<String>, duration: Duration) -> Self {
        Self::ConnectionTimeout {
            device_id: device_id.into(),
            duration,
        }
    }

    /// Create an operation timeout error.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl ToString) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.to_string(),
        }
    }

    /// Create a notification failure.
    pub fn notification_failed(uuid: impl ToString, reason: impl Into<String>) -> Self {
        Self::NotificationFailed {
            uuid: uuid.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(operation: &'static str, profile: impl ToString) -> Self {
        Self::UnsupportedOperation {
            operation,
            profile: profile.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Classify this error for the event stream.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ScanInProgress => ErrorKind::ScanInProgress,
            Error::BluetoothPoweredOff => ErrorKind::BluetoothPoweredOff,
            Error::DeviceNotFound { .. } => ErrorKind::DeviceNotFound,
            Error::ConnectionFailed { .. } => ErrorKind::ConnectionFailed,
            Error::ConnectionTimeout { .. } => ErrorKind::ConnectionTimeout,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::ServiceNotFound { .. } => ErrorKind::ServiceNotFound,
            Error::CharacteristicNotFound { .. } => ErrorKind::CharacteristicNotFound,
            Error::NotificationFailed { .. } => ErrorKind::NotificationFailed,
            Error::Decode(_) => ErrorKind::Decode,
            Error::UnsupportedOperation { .. } => ErrorKind::UnsupportedOperation,
            Error::UnsupportedDeviceType { .. } => ErrorKind::UnsupportedDeviceType,
            Error::AlreadyConnecting { .. } => ErrorKind::AlreadyConnecting,
            Error::DeviceNotConnected { .. } => ErrorKind::DeviceNotConnected,
            Error::Persistence(_) => ErrorKind::Persistence,
            Error::Bluetooth(_) => ErrorKind::Bluetooth,
            Error::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }
}

/// Result type alias using medlink-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
