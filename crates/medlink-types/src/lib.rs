//! Platform-agnostic types for BLE medical devices.
//!
//! This crate holds everything about the health-device domain that does not
//! need a Bluetooth stack: the device and measurement data model, the
//! Bluetooth SIG UUIDs used by the supported profiles, the SFLOAT codec, the
//! GATT measurement decoders and the key-value persistence seam used by the
//! pairing store.
//!
//! # Supported profiles
//!
//! | Profile | Service | Measurement characteristic |
//! |---------|---------|----------------------------|
//! | Blood Pressure | `0x1810` | `0x2A35` |
//! | Glucose | `0x1808` | `0x2A18` |
//! | Pulse Oximeter | `0x1822` | `0x2A5E` |
//! | Weight Scale | `0x181D` | `0x2A9D` |
//!
//! # Example
//!
//! ```
//! use medlink_types::decode::{DecodeContext, decode_blood_pressure};
//!
//! let bytes = [0x04, 0xB0, 0x04, 0x20, 0x03, 0xA5, 0x03, 0xD0, 0x02];
//! let ctx = DecodeContext::new("AA:BB:CC:DD:EE:FF");
//! let reading = decode_blood_pressure(&bytes, &ctx).unwrap();
//! assert_eq!(reading.systolic, 120.0);
//! assert_eq!(reading.diastolic, 80.0);
//! assert_eq!(reading.pulse, Some(72.0));
//! ```

pub mod decode;
pub mod error;
pub mod measurement;
pub mod sfloat;
pub mod store;
pub mod types;
pub mod uuid;

pub use decode::{DecodeContext, PressureScale};
pub use error::{DecodeError, DecodeErrorKind, StoreError};
pub use measurement::{
    BloodPressureReading, GlucoseReading, MealContext, Measurement, PulseOximetryReading,
    WeightReading,
};
pub use sfloat::SfloatSpecial;
pub use store::{KeyValueStore, MemoryStore};
pub use types::{ConnectionState, Device, DeviceInfo, DeviceKind, Manufacturer, PairedDevice};
