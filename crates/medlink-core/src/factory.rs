//! Adapter selection.

use std::sync::Arc;

use medlink_types::{Device, DeviceKind, Manufacturer};
use tracing::debug;

use crate::adapter::{AdapterProfile, ConnectionConfig, DeviceAdapter, GattAdapter};
use crate::error::{Error, Result};
use crate::transport::Transport;

/// Picks the adapter profile for a discovered device.
///
/// The device kind comes from its advertised services (or name keywords);
/// the manufacturer from a case-insensitive match on its name. A
/// manufacturer keyword only selects a variant within the matching kind, so
/// an "Omron" scale still gets the standard scale profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdapterFactory;

impl AdapterFactory {
    /// Select the profile for `device`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedDeviceType`] if the device kind is unknown.
    ///
    /// ```
    /// use medlink_core::{AdapterFactory, AdapterProfile};
    /// use medlink_types::Device;
    /// use medlink_types::uuid::GLUCOSE_SERVICE;
    ///
    /// let device = Device::new("id", "OneTouch Verio", vec![GLUCOSE_SERVICE]);
    /// assert_eq!(AdapterFactory::select(&device).unwrap(), AdapterProfile::OneTouchGlucose);
    /// ```
    pub fn select(device: &Device) -> Result<AdapterProfile> {
        let unsupported = || Error::UnsupportedDeviceType {
            device_id: device.id.clone(),
        };
        let kind: DeviceKind = device.kind.ok_or_else(unsupported)?;
        let manufacturer = Manufacturer::from_name(&device.name);
        let profile = AdapterProfile::for_device(kind, manufacturer).ok_or_else(unsupported)?;
        debug!(
            "Selected {} for {} ({}, {})",
            profile, device.id, kind, manufacturer
        );
        Ok(profile)
    }

    /// Build an adapter for `device` over `transport`.
    pub fn create(
        device: &Device,
        transport: Arc<dyn Transport>,
        config: &ConnectionConfig,
    ) -> Result<Arc<dyn DeviceAdapter>> {
        let profile = Self::select(device)?;
        Ok(Arc::new(GattAdapter::new(
            device.id.clone(),
            profile,
            transport,
            *config,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medlink_types::uuid as uuids;

    use crate::mock::MockTransport;

    fn select(name: &str, services: Vec<uuid::Uuid>) -> Result<AdapterProfile> {
        AdapterFactory::select(&Device::new("AA:BB", name, services))
    }

    #[test]
    fn test_blood_pressure_variants() {
        let bp = vec![uuids::BLOOD_PRESSURE_SERVICE];
        assert_eq!(
            select("OMRON BP7450", bp.clone()).unwrap(),
            AdapterProfile::OmronBloodPressure
        );
        assert_eq!(
            select("Withings BPM Connect", bp.clone()).unwrap(),
            AdapterProfile::WithingsBloodPressure
        );
        assert_eq!(
            select("Nokia BPM+", bp.clone()).unwrap(),
            AdapterProfile::WithingsBloodPressure
        );
        assert_eq!(
            select("A&D UA-651", bp).unwrap(),
            AdapterProfile::StandardBloodPressure
        );
    }

    #[test]
    fn test_glucose_variants() {
        let glucose = vec![uuids::GLUCOSE_SERVICE];
        assert_eq!(
            select("Accu-Chek Guide", glucose.clone()).unwrap(),
            AdapterProfile::AccuChekGlucose
        );
        assert_eq!(
            select("onetouch verio", glucose.clone()).unwrap(),
            AdapterProfile::OneTouchGlucose
        );
        assert_eq!(
            select("FreeStyle Libre 2", glucose.clone()).unwrap(),
            AdapterProfile::FreeStyleGlucose
        );
        assert_eq!(
            select("Contour Next One", glucose).unwrap(),
            AdapterProfile::StandardGlucose
        );
    }

    #[test]
    fn test_manufacturer_keyword_stays_within_kind() {
        assert_eq!(
            select("OMRON Scale", vec![uuids::WEIGHT_SCALE_SERVICE]).unwrap(),
            AdapterProfile::StandardScale
        );
        assert_eq!(
            select("Accu-Chek", vec![uuids::BLOOD_PRESSURE_SERVICE]).unwrap(),
            AdapterProfile::StandardBloodPressure
        );
    }

    #[test]
    fn test_kind_from_name_only() {
        assert_eq!(
            select("Omron EVOLV", vec![]).unwrap(),
            AdapterProfile::OmronBloodPressure
        );
        assert_eq!(
            select("Nonin SpO2", vec![]).unwrap(),
            AdapterProfile::StandardPulseOximeter
        );
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = select("Headphones", vec![]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedDeviceType { ref device_id } if device_id == "AA:BB"));
    }

    #[test]
    fn test_create_builds_unready_adapter() {
        let device = Device::new("AA:BB", "Accu-Chek", vec![uuids::GLUCOSE_SERVICE]);
        let adapter = AdapterFactory::create(
            &device,
            Arc::new(MockTransport::new()),
            &ConnectionConfig::default(),
        )
        .unwrap();
        assert_eq!(adapter.device_id(), "AA:BB");
        assert_eq!(adapter.profile(), AdapterProfile::AccuChekGlucose);
        assert!(!adapter.is_ready());
    }
}
