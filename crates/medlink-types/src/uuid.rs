//! Bluetooth SIG UUIDs for the supported health profiles.
//!
//! All of these are 16-bit assigned numbers expanded onto the Bluetooth base
//! UUID `0000xxxx-0000-1000-8000-00805f9b34fb`.

use uuid::{Uuid, uuid};

// --- Health Services ---

/// Blood Pressure service.
pub const BLOOD_PRESSURE_SERVICE: Uuid = uuid!("00001810-0000-1000-8000-00805f9b34fb");

/// Glucose service.
pub const GLUCOSE_SERVICE: Uuid = uuid!("00001808-0000-1000-8000-00805f9b34fb");

/// Pulse Oximeter service.
pub const PULSE_OXIMETER_SERVICE: Uuid = uuid!("00001822-0000-1000-8000-00805f9b34fb");

/// Weight Scale service.
pub const WEIGHT_SCALE_SERVICE: Uuid = uuid!("0000181d-0000-1000-8000-00805f9b34fb");

// --- Measurement Characteristics ---

/// Blood Pressure Measurement (indicate).
pub const BLOOD_PRESSURE_MEASUREMENT: Uuid = uuid!("00002a35-0000-1000-8000-00805f9b34fb");

/// Intermediate Cuff Pressure (notify).
pub const INTERMEDIATE_CUFF_PRESSURE: Uuid = uuid!("00002a36-0000-1000-8000-00805f9b34fb");

/// Glucose Measurement (notify).
pub const GLUCOSE_MEASUREMENT: Uuid = uuid!("00002a18-0000-1000-8000-00805f9b34fb");

/// Record Access Control Point (write + indicate).
pub const RECORD_ACCESS_CONTROL_POINT: Uuid = uuid!("00002a52-0000-1000-8000-00805f9b34fb");

/// PLX Spot-Check Measurement (indicate).
pub const PLX_SPOT_CHECK_MEASUREMENT: Uuid = uuid!("00002a5e-0000-1000-8000-00805f9b34fb");

/// Weight Measurement (indicate).
pub const WEIGHT_MEASUREMENT: Uuid = uuid!("00002a9d-0000-1000-8000-00805f9b34fb");

// --- Standard BLE Service UUIDs ---

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = uuid!("0000180a-0000-1000-8000-00805f9b34fb");

/// Battery service.
pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");

// --- Device Information Characteristic UUIDs ---

/// Model number string characteristic.
pub const MODEL_NUMBER: Uuid = uuid!("00002a24-0000-1000-8000-00805f9b34fb");

/// Serial number string characteristic.
pub const SERIAL_NUMBER: Uuid = uuid!("00002a25-0000-1000-8000-00805f9b34fb");

/// Firmware revision string characteristic.
pub const FIRMWARE_REVISION: Uuid = uuid!("00002a26-0000-1000-8000-00805f9b34fb");

/// Hardware revision string characteristic.
pub const HARDWARE_REVISION: Uuid = uuid!("00002a27-0000-1000-8000-00805f9b34fb");

/// Manufacturer name string characteristic.
pub const MANUFACTURER_NAME: Uuid = uuid!("00002a29-0000-1000-8000-00805f9b34fb");

// --- Battery Characteristic UUIDs ---

/// Battery level characteristic.
pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");

/// Services the scanner filters on.
pub const HEALTH_SERVICES: [Uuid; 4] = [
    BLOOD_PRESSURE_SERVICE,
    GLUCOSE_SERVICE,
    PULSE_OXIMETER_SERVICE,
    WEIGHT_SCALE_SERVICE,
];

/// Extract the 16-bit assigned number from a SIG base UUID, if it is one.
///
/// ```
/// use medlink_types::uuid::{GLUCOSE_MEASUREMENT, short_id};
///
/// assert_eq!(short_id(&GLUCOSE_MEASUREMENT), Some(0x2A18));
/// ```
pub fn short_id(uuid: &Uuid) -> Option<u16> {
    let (d1, d2, d3, d4) = uuid.as_fields();
    let base = BLOOD_PRESSURE_SERVICE.as_fields();
    if d1 <= 0xFFFF && d2 == base.1 && d3 == base.2 && d4 == base.3 {
        Some(d1 as u16)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measurement_characteristics() {
        assert_eq!(short_id(&BLOOD_PRESSURE_MEASUREMENT), Some(0x2A35));
        assert_eq!(short_id(&GLUCOSE_MEASUREMENT), Some(0x2A18));
        assert_eq!(short_id(&PLX_SPOT_CHECK_MEASUREMENT), Some(0x2A5E));
        assert_eq!(short_id(&WEIGHT_MEASUREMENT), Some(0x2A9D));
        assert_eq!(short_id(&RECORD_ACCESS_CONTROL_POINT), Some(0x2A52));
    }

    #[test]
    fn test_services() {
        assert_eq!(short_id(&BLOOD_PRESSURE_SERVICE), Some(0x1810));
        assert_eq!(short_id(&GLUCOSE_SERVICE), Some(0x1808));
        assert_eq!(short_id(&WEIGHT_SCALE_SERVICE), Some(0x181D));
        assert_eq!(short_id(&BATTERY_SERVICE), Some(0x180F));
    }

    #[test]
    fn test_short_id_rejects_vendor_uuid() {
        let vendor = uuid!("f0cd1400-95da-4f4b-9ac8-aa55d312af0c");
        assert_eq!(short_id(&vendor), None);
    }
}
