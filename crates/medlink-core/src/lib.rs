//! Core BLE engine for medical devices.
//!
//! This crate discovers nearby health devices, connects to them under
//! timeout, decodes and validates their measurements, and remembers paired
//! devices across restarts so they can be reconnected automatically.
//!
//! # Features
//!
//! - **Device discovery**: Scan for blood pressure monitors, glucose meters,
//!   pulse oximeters and scales
//! - **Manufacturer variants**: Omron, Withings, Accu-Chek, OneTouch and
//!   FreeStyle quirks handled by [`AdapterProfile`]
//! - **Validation**: Clinical range checks on every reading
//! - **Pairing**: Durable records with per-device auto-connect
//! - **Auto-reconnect**: Paired devices return when Bluetooth powers on
//!
//! # Platform Differences
//!
//! Device identifiers come from the platform:
//!
//! - **macOS**: a CoreBluetooth UUID, stable per device and per Mac.
//! - **Linux/Windows**: the Bluetooth MAC address (e.g. `AA:BB:CC:DD:EE:FF`).
//!
//! Pairing records are keyed by this identifier, so a record made on one Mac
//! does not match the same device seen from another.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use medlink_core::{BtleplugTransport, ConnectionManager, ManagerConfig, ManagerEvent, PairingStore};
//! use medlink_types::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(BtleplugTransport::new().await?);
//!     let pairing = PairingStore::load(Arc::new(MemoryStore::new())).await;
//!     let manager = Arc::new(ConnectionManager::new(transport, pairing, ManagerConfig::default())?);
//!
//!     let devices = manager.scan(None).await?;
//!     println!("Found {} devices", devices.len());
//!
//!     let mut events = manager.subscribe();
//!     if let Some(device) = devices.first() {
//!         manager.connect(&device.id).await?;
//!     }
//!     while let Ok(event) = events.recv().await {
//!         if let ManagerEvent::MeasurementReceived { measurement, .. } = event {
//!             println!("{}", measurement);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod btle;
pub mod config;
pub mod error;
pub mod events;
pub mod factory;
pub mod manager;
pub mod mock;
pub mod pairing;
pub mod transport;
pub mod util;
pub mod validation;

pub use adapter::{
    AdapterProfile, ConnectionConfig, DeviceAdapter, GattAdapter, MeasurementCallback,
    Subscription,
};
pub use btle::BtleplugTransport;
pub use config::ManagerConfig;
pub use error::{Error, ErrorKind, Result};
pub use events::{DisconnectReason, EventDispatcher, EventReceiver, ManagerEvent};
pub use factory::AdapterFactory;
pub use manager::ConnectionManager;
pub use mock::{MockPeripheral, MockTransport};
pub use pairing::PairingStore;
pub use transport::{Advertisement, GattService, RadioState, Transport, TransportEvent};
pub use util::{create_identifier, format_peripheral_id};
pub use validation::{ValidationIssue, ValidationResult, validate};

// Re-export from medlink-types
pub use medlink_types::uuid as uuids;
pub use medlink_types::{
    ConnectionState, Device, DeviceInfo, DeviceKind, Manufacturer, Measurement, PairedDevice,
};
