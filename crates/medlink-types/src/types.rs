//! Core device types.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::uuid as uuids;

/// Kind of health device, one per supported GATT profile.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new device kinds
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum DeviceKind {
    /// Blood pressure monitor (service `0x1810`).
    BloodPressure,
    /// Glucose meter (service `0x1808`).
    Glucose,
    /// Pulse oximeter (service `0x1822`).
    PulseOximeter,
    /// Weight scale (service `0x181D`).
    Scale,
}

impl DeviceKind {
    /// All supported device kinds.
    pub const ALL: [DeviceKind; 4] = [
        DeviceKind::BloodPressure,
        DeviceKind::Glucose,
        DeviceKind::PulseOximeter,
        DeviceKind::Scale,
    ];

    /// The primary GATT service advertised by this kind of device.
    #[must_use]
    pub fn service_uuid(&self) -> Uuid {
        match self {
            DeviceKind::BloodPressure => uuids::BLOOD_PRESSURE_SERVICE,
            DeviceKind::Glucose => uuids::GLUCOSE_SERVICE,
            DeviceKind::PulseOximeter => uuids::PULSE_OXIMETER_SERVICE,
            DeviceKind::Scale => uuids::WEIGHT_SCALE_SERVICE,
        }
    }

    /// Detect the device kind from a single service UUID.
    #[must_use]
    pub fn from_service(service: &Uuid) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.service_uuid() == *service)
    }

    /// Detect the device kind from an advertised service list.
    #[must_use]
    pub fn from_services(services: &[Uuid]) -> Option<Self> {
        services.iter().find_map(Self::from_service)
    }

    /// Detect the device kind from an advertised name (case-insensitive).
    ///
    /// # Examples
    ///
    /// ```
    /// use medlink_types::DeviceKind;
    ///
    /// assert_eq!(DeviceKind::from_name("OMRON BP7450"), Some(DeviceKind::BloodPressure));
    /// assert_eq!(DeviceKind::from_name("Accu-Chek Guide"), Some(DeviceKind::Glucose));
    /// assert_eq!(DeviceKind::from_name("Headphones"), None);
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        const BLOOD_PRESSURE: &[&str] = &["blood pressure", "bpm", "bp", "omron"];
        const GLUCOSE: &[&str] = &[
            "glucose", "accu", "chek", "onetouch", "freestyle", "libre", "contour",
        ];
        const PULSE_OXIMETER: &[&str] = &["oximeter", "spo2", "pulse ox"];
        const SCALE: &[&str] = &["scale", "weight", "body"];

        let name = name.to_lowercase();
        let matches = |keywords: &[&str]| keywords.iter().any(|k| name.contains(k));

        if matches(GLUCOSE) {
            Some(DeviceKind::Glucose)
        } else if matches(PULSE_OXIMETER) {
            Some(DeviceKind::PulseOximeter)
        } else if matches(SCALE) {
            Some(DeviceKind::Scale)
        } else if matches(BLOOD_PRESSURE) {
            Some(DeviceKind::BloodPressure)
        } else {
            None
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::BloodPressure => write!(f, "blood_pressure"),
            DeviceKind::Glucose => write!(f, "glucose"),
            DeviceKind::PulseOximeter => write!(f, "pulse_oximeter"),
            DeviceKind::Scale => write!(f, "scale"),
        }
    }
}

/// Device manufacturer, inferred from the advertised name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum Manufacturer {
    /// Omron Healthcare.
    Omron,
    /// Withings (formerly Nokia Health).
    Withings,
    /// Roche (Accu-Chek).
    Roche,
    /// LifeScan (OneTouch).
    LifeScan,
    /// Abbott (FreeStyle, Libre).
    Abbott,
    /// Not recognized.
    #[default]
    Unknown,
}

impl Manufacturer {
    /// Infer the manufacturer from a device name (case-insensitive substring match).
    ///
    /// # Examples
    ///
    /// ```
    /// use medlink_types::Manufacturer;
    ///
    /// assert_eq!(Manufacturer::from_name("Nokia BPM+"), Manufacturer::Withings);
    /// assert_eq!(Manufacturer::from_name("meter"), Manufacturer::Unknown);
    /// ```
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let name = name.to_lowercase();
        if name.contains("omron") {
            Manufacturer::Omron
        } else if name.contains("withings") || name.contains("nokia") {
            Manufacturer::Withings
        } else if name.contains("accu") || name.contains("chek") {
            Manufacturer::Roche
        } else if name.contains("onetouch") {
            Manufacturer::LifeScan
        } else if name.contains("freestyle") || name.contains("libre") {
            Manufacturer::Abbott
        } else {
            Manufacturer::Unknown
        }
    }
}

impl fmt::Display for Manufacturer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Manufacturer::Omron => write!(f, "Omron"),
            Manufacturer::Withings => write!(f, "Withings"),
            Manufacturer::Roche => write!(f, "Roche"),
            Manufacturer::LifeScan => write!(f, "LifeScan"),
            Manufacturer::Abbott => write!(f, "Abbott"),
            Manufacturer::Unknown => write!(f, "unknown"),
        }
    }
}

/// Connection lifecycle state of a device.
///
/// `Disconnected → Connecting → Connected → Ready`, and
/// `Ready/Connecting → Disconnecting → Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ConnectionState {
    /// No platform connection.
    #[default]
    Disconnected,
    /// Platform connection and service discovery in progress.
    Connecting,
    /// Connected and services discovered; notifications not yet active.
    Connected,
    /// Measurement notifications are active.
    Ready,
    /// Teardown in progress.
    Disconnecting,
}

impl ConnectionState {
    /// Whether the device holds (or is acquiring) a platform connection.
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Ready => "ready",
            ConnectionState::Disconnecting => "disconnecting",
        };
        f.write_str(s)
    }
}

/// A device seen during a scan.
///
/// Ephemeral: the discovered set is rebuilt on every scan.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Device {
    /// Platform-stable identifier (MAC address, or peripheral UUID on macOS).
    pub id: String,
    /// Advertised name.
    pub name: String,
    /// Device kind, if it could be inferred.
    pub kind: Option<DeviceKind>,
    /// Manufacturer inferred from the name.
    #[cfg_attr(feature = "serde", serde(default))]
    pub manufacturer: Manufacturer,
    /// Last seen signal strength in dBm.
    #[cfg_attr(feature = "serde", serde(default))]
    pub rssi: Option<i16>,
    /// Current connection state (never persisted).
    #[cfg_attr(feature = "serde", serde(skip))]
    pub connection_state: ConnectionState,
    /// Whether a pairing record exists for this device.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub paired: bool,
    /// Advertised service UUIDs.
    #[cfg_attr(feature = "serde", serde(default))]
    pub services: Vec<Uuid>,
}

impl Device {
    /// Build a device from advertisement data, inferring kind and manufacturer.
    ///
    /// Advertised services take precedence over name keywords when inferring
    /// the kind.
    pub fn new(id: impl Into<String>, name: impl Into<String>, services: Vec<Uuid>) -> Self {
        let name = name.into();
        let kind = DeviceKind::from_services(&services).or_else(|| DeviceKind::from_name(&name));
        Self {
            id: id.into(),
            manufacturer: Manufacturer::from_name(&name),
            name,
            kind,
            rssi: None,
            connection_state: ConnectionState::Disconnected,
            paired: false,
            services,
        }
    }

    /// Set the signal strength.
    #[must_use]
    pub fn with_rssi(mut self, rssi: Option<i16>) -> Self {
        self.rssi = rssi;
        self
    }
}

/// Information read from the Device Information service (`0x180A`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeviceInfo {
    /// Manufacturer name string.
    pub manufacturer: String,
    /// Model number string.
    pub model: String,
    /// Serial number string.
    pub serial: String,
    /// Firmware revision string.
    pub firmware: String,
    /// Hardware revision string.
    pub hardware: String,
}

impl DeviceInfo {
    /// Whether every field is empty (nothing could be read).
    pub fn is_empty(&self) -> bool {
        self.manufacturer.is_empty()
            && self.model.is_empty()
            && self.serial.is_empty()
            && self.firmware.is_empty()
            && self.hardware.is_empty()
    }
}

/// A device with a durable pairing record.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PairedDevice {
    /// The device as last seen.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub device: Device,
    /// When the first successful connection happened.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub paired_at: OffsetDateTime,
    /// When the most recent successful connection happened.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub last_connected_at: OffsetDateTime,
    /// Number of successful connections.
    pub connection_count: u32,
    /// Whether this device participates in auto-reconnect.
    pub auto_connect: bool,
    /// Last device information read on connect.
    #[cfg_attr(feature = "serde", serde(default))]
    pub device_info: Option<DeviceInfo>,
    /// Last battery level read on connect.
    #[cfg_attr(feature = "serde", serde(default))]
    pub battery_level: Option<u8>,
}

impl PairedDevice {
    /// Create a pairing record for a first successful connection.
    pub fn new(mut device: Device, now: OffsetDateTime) -> Self {
        device.paired = true;
        Self {
            device,
            paired_at: now,
            last_connected_at: now,
            connection_count: 1,
            auto_connect: true,
            device_info: None,
            battery_level: None,
        }
    }

    /// Record another successful connection.
    pub fn record_connection(&mut self, device: &Device, now: OffsetDateTime) {
        self.device.name.clone_from(&device.name);
        if device.kind.is_some() {
            self.device.kind = device.kind;
        }
        if device.manufacturer != Manufacturer::Unknown {
            self.device.manufacturer = device.manufacturer;
        }
        if !device.services.is_empty() {
            self.device.services.clone_from(&device.services);
        }
        self.device.rssi = device.rssi.or(self.device.rssi);
        self.connection_count = self.connection_count.saturating_add(1);
        self.last_connected_at = now;
    }

    /// The device identifier.
    pub fn id(&self) -> &str {
        &self.device.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_services_wins_over_name() {
        let device = Device::new("id", "Scale-ish", vec![uuids::BLOOD_PRESSURE_SERVICE]);
        assert_eq!(device.kind, Some(DeviceKind::BloodPressure));
    }

    #[test]
    fn test_kind_from_name_fallback() {
        assert_eq!(DeviceKind::from_name("FreeStyle Libre"), Some(DeviceKind::Glucose));
        assert_eq!(DeviceKind::from_name("Nonin SpO2"), Some(DeviceKind::PulseOximeter));
        assert_eq!(DeviceKind::from_name("Withings Body+"), Some(DeviceKind::Scale));
        assert_eq!(DeviceKind::from_name("Withings BPM Connect"), Some(DeviceKind::BloodPressure));
        assert_eq!(DeviceKind::from_name("Speaker"), None);
    }

    #[test]
    fn test_manufacturer_from_name() {
        assert_eq!(Manufacturer::from_name("OMRON M7"), Manufacturer::Omron);
        assert_eq!(Manufacturer::from_name("Withings BPM"), Manufacturer::Withings);
        assert_eq!(Manufacturer::from_name("Accu-Chek Instant"), Manufacturer::Roche);
        assert_eq!(Manufacturer::from_name("OneTouch Verio"), Manufacturer::LifeScan);
        assert_eq!(Manufacturer::from_name("FreeStyle Optium"), Manufacturer::Abbott);
        assert_eq!(Manufacturer::from_name("Generic Meter"), Manufacturer::Unknown);
    }

    #[test]
    fn test_paired_device_record_connection() {
        let now = OffsetDateTime::UNIX_EPOCH;
        let device = Device::new("id-1", "OMRON M7", vec![]);
        let mut paired = PairedDevice::new(device.clone(), now);
        assert!(paired.device.paired);
        assert_eq!(paired.connection_count, 1);

        let later = now + time::Duration::hours(1);
        paired.record_connection(&device.with_rssi(Some(-60)), later);
        assert_eq!(paired.connection_count, 2);
        assert_eq!(paired.last_connected_at, later);
        assert_eq!(paired.paired_at, now);
        assert_eq!(paired.device.rssi, Some(-60));
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Ready.to_string(), "ready");
        assert!(!ConnectionState::Disconnected.is_active());
        assert!(ConnectionState::Connecting.is_active());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_paired_device_serde_skips_connection_state() {
        let mut device = Device::new("id-2", "Accu-Chek Guide", vec![uuids::GLUCOSE_SERVICE]);
        device.connection_state = ConnectionState::Ready;
        let paired = PairedDevice::new(device, OffsetDateTime::UNIX_EPOCH);

        let json = serde_json::to_string(&paired).unwrap();
        assert!(!json.contains("connection_state"));

        let back: PairedDevice = serde_json::from_str(&json).unwrap();
        assert_eq!(back.device.connection_state, ConnectionState::Disconnected);
        assert_eq!(back.device.kind, Some(DeviceKind::Glucose));
        assert_eq!(back.paired_at, OffsetDateTime::UNIX_EPOCH);
    }
}
