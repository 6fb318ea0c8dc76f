//! Device adapters.
//!
//! A [`DeviceAdapter`] owns the platform connection to one device and knows
//! how to talk to its GATT profile. Manufacturer differences are captured by
//! [`AdapterProfile`]; a single [`GattAdapter`] implements the trait for every
//! profile.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use medlink_types::decode::{
    DecodeContext, PressureScale, decode_blood_pressure, decode_glucose, decode_pulse_oximetry,
    decode_weight,
};
use medlink_types::uuid as uuids;
use medlink_types::{DecodeError, DeviceInfo, DeviceKind, Manufacturer, Measurement};

use crate::error::{Error, Result};
use crate::transport::Transport;

/// RACP request: opcode "report stored records", operator "last record".
pub const REPORT_LAST_RECORD: [u8; 2] = [0x01, 0x06];

/// RACP response opcode; the payload is `[0x06, 0x00, request, code]`.
const RACP_RESPONSE: u8 = 0x06;

/// RACP response code for a request that succeeded.
const RACP_SUCCESS: u8 = 0x01;

/// Default timeout for characteristic reads and notification waits.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for characteristic writes.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for service discovery.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeouts for GATT operations on a connected device.
///
/// ```
/// use std::time::Duration;
/// use medlink_core::ConnectionConfig;
///
/// let config = ConnectionConfig::default().read_timeout(Duration::from_secs(2));
/// assert_eq!(config.read_timeout, Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Timeout for reads and for waiting on a requested measurement.
    pub read_timeout: Duration,
    /// Timeout for writes.
    pub write_timeout: Duration,
    /// Timeout for service discovery.
    pub discovery_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the write timeout.
    #[must_use]
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }
}

/// Manufacturer variant of a health-device GATT profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterProfile {
    /// Bluetooth SIG Blood Pressure profile.
    StandardBloodPressure,
    /// Omron monitors; they scale kPa values by a factor of ten.
    OmronBloodPressure,
    /// Withings (Nokia) monitors.
    WithingsBloodPressure,
    /// Bluetooth SIG Glucose profile.
    StandardGlucose,
    /// Roche Accu-Chek meters.
    AccuChekGlucose,
    /// LifeScan OneTouch meters.
    OneTouchGlucose,
    /// Abbott FreeStyle meters; they push readings and expose no RACP.
    FreeStyleGlucose,
    /// Bluetooth SIG Pulse Oximeter profile (spot-check).
    StandardPulseOximeter,
    /// Bluetooth SIG Weight Scale profile.
    StandardScale,
}

impl AdapterProfile {
    /// Every profile.
    pub const ALL: [AdapterProfile; 9] = [
        AdapterProfile::StandardBloodPressure,
        AdapterProfile::OmronBloodPressure,
        AdapterProfile::WithingsBloodPressure,
        AdapterProfile::StandardGlucose,
        AdapterProfile::AccuChekGlucose,
        AdapterProfile::OneTouchGlucose,
        AdapterProfile::FreeStyleGlucose,
        AdapterProfile::StandardPulseOximeter,
        AdapterProfile::StandardScale,
    ];

    /// The standard profile for a device kind.
    pub fn standard(kind: DeviceKind) -> Option<Self> {
        match kind {
            DeviceKind::BloodPressure => Some(Self::StandardBloodPressure),
            DeviceKind::Glucose => Some(Self::StandardGlucose),
            DeviceKind::PulseOximeter => Some(Self::StandardPulseOximeter),
            DeviceKind::Scale => Some(Self::StandardScale),
            _ => None,
        }
    }

    /// The manufacturer-specific profile for a device kind, falling back to
    /// the standard profile when the manufacturer has no variant of that kind.
    pub fn for_device(kind: DeviceKind, manufacturer: Manufacturer) -> Option<Self> {
        let specific = match (kind, manufacturer) {
            (DeviceKind::BloodPressure, Manufacturer::Omron) => Some(Self::OmronBloodPressure),
            (DeviceKind::BloodPressure, Manufacturer::Withings) => {
                Some(Self::WithingsBloodPressure)
            }
            (DeviceKind::Glucose, Manufacturer::Roche) => Some(Self::AccuChekGlucose),
            (DeviceKind::Glucose, Manufacturer::LifeScan) => Some(Self::OneTouchGlucose),
            (DeviceKind::Glucose, Manufacturer::Abbott) => Some(Self::FreeStyleGlucose),
            _ => None,
        };
        specific.or_else(|| Self::standard(kind))
    }

    /// The device kind this profile talks to.
    pub fn kind(&self) -> DeviceKind {
        match self {
            Self::StandardBloodPressure | Self::OmronBloodPressure | Self::WithingsBloodPressure => {
                DeviceKind::BloodPressure
            }
            Self::StandardGlucose
            | Self::AccuChekGlucose
            | Self::OneTouchGlucose
            | Self::FreeStyleGlucose => DeviceKind::Glucose,
            Self::StandardPulseOximeter => DeviceKind::PulseOximeter,
            Self::StandardScale => DeviceKind::Scale,
        }
    }

    /// Primary service UUID.
    pub fn service_uuid(&self) -> Uuid {
        self.kind().service_uuid()
    }

    /// Characteristic that carries measurements.
    pub fn measurement_characteristic(&self) -> Uuid {
        match self.kind() {
            DeviceKind::BloodPressure => uuids::BLOOD_PRESSURE_MEASUREMENT,
            DeviceKind::Glucose => uuids::GLUCOSE_MEASUREMENT,
            DeviceKind::PulseOximeter => uuids::PLX_SPOT_CHECK_MEASUREMENT,
            _ => uuids::WEIGHT_MEASUREMENT,
        }
    }

    /// Record Access Control Point, if the profile can be asked for records.
    pub fn control_point(&self) -> Option<Uuid> {
        match self {
            Self::StandardGlucose | Self::AccuChekGlucose | Self::OneTouchGlucose => {
                Some(uuids::RECORD_ACCESS_CONTROL_POINT)
            }
            _ => None,
        }
    }

    /// Pressure scaling applied when decoding blood pressure payloads.
    pub fn pressure_scale(&self) -> PressureScale {
        match self {
            Self::OmronBloodPressure => PressureScale::OMRON,
            _ => PressureScale::STANDARD,
        }
    }

    /// Whether the device only pushes readings and cannot be triggered.
    pub fn is_push_only(&self) -> bool {
        self.control_point().is_none()
    }

    /// Decode a measurement payload with this profile's scaling.
    pub fn decode(
        &self,
        bytes: &[u8],
        ctx: &DecodeContext<'_>,
    ) -> std::result::Result<Measurement, DecodeError> {
        let ctx = ctx.with_pressure_scale(self.pressure_scale());
        match self.kind() {
            DeviceKind::BloodPressure => {
                decode_blood_pressure(bytes, &ctx).map(Measurement::BloodPressure)
            }
            DeviceKind::Glucose => decode_glucose(bytes, &ctx).map(Measurement::Glucose),
            DeviceKind::PulseOximeter => {
                decode_pulse_oximetry(bytes, &ctx).map(Measurement::PulseOximetry)
            }
            _ => decode_weight(bytes, &ctx).map(Measurement::Weight),
        }
    }

    /// Stable snake_case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StandardBloodPressure => "standard_blood_pressure",
            Self::OmronBloodPressure => "omron_blood_pressure",
            Self::WithingsBloodPressure => "withings_blood_pressure",
            Self::StandardGlucose => "standard_glucose",
            Self::AccuChekGlucose => "accu_chek_glucose",
            Self::OneTouchGlucose => "one_touch_glucose",
            Self::FreeStyleGlucose => "free_style_glucose",
            Self::StandardPulseOximeter => "standard_pulse_oximeter",
            Self::StandardScale => "standard_scale",
        }
    }
}

impl fmt::Display for AdapterProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AdapterProfile {
    type Err = Error;

    /// Parse a profile name, accepting `-` in place of `_`.
    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|profile| profile.as_str() == normalized)
            .ok_or_else(|| Error::invalid_config(format!("unknown adapter profile '{}'", s)))
    }
}

/// Callback invoked for every measurement notification.
///
/// Malformed payloads arrive as `Err` and do not end the subscription.
pub type MeasurementCallback =
    Arc<dyn Fn(std::result::Result<Measurement, DecodeError>) + Send + Sync>;

/// Handle to an active measurement subscription.
///
/// Dropping the handle stops delivery; [`Subscription::unsubscribe`] also
/// disables notifications on the device.
pub struct Subscription {
    device_id: String,
    characteristic: Uuid,
    transport: Arc<dyn Transport>,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
    active: Arc<AtomicBool>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("device_id", &self.device_id)
            .field("characteristic", &self.characteristic)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

impl Subscription {
    /// The characteristic this subscription listens on.
    pub fn characteristic(&self) -> Uuid {
        self.characteristic
    }

    /// Whether notifications are still being delivered.
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop delivery, then disable notifications on the device.
    ///
    /// No callback runs after this returns.
    pub async fn unsubscribe(mut self) -> Result<()> {
        self.token.cancel();
        self.active.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!("Notification task for {} failed: {}", self.device_id, e);
        }
        self.transport
            .unsubscribe(&self.device_id, self.characteristic)
            .await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Operations on one connected health device.
#[async_trait]
pub trait DeviceAdapter: Send + Sync {
    /// The device this adapter talks to.
    fn device_id(&self) -> &str;

    /// The profile driving this adapter.
    fn profile(&self) -> AdapterProfile;

    /// Whether the device is connected and its services are discovered.
    fn is_ready(&self) -> bool;

    /// Connect and discover services.
    async fn connect(&self) -> Result<()>;

    /// Ask the device to send a measurement.
    async fn trigger_measurement(&self) -> Result<()>;

    /// Wait for the next measurement, requesting one first if the profile
    /// supports it.
    async fn read_measurement(&self) -> Result<Measurement>;

    /// Deliver every measurement notification to `callback`.
    async fn subscribe_to_measurements(&self, callback: MeasurementCallback)
    -> Result<Subscription>;

    /// Battery level in percent, if the device exposes one.
    async fn get_battery_level(&self) -> Result<Option<u8>>;

    /// Read the Device Information service.
    async fn read_device_info(&self) -> Result<DeviceInfo>;

    /// Tear down the connection.
    async fn disconnect(&self) -> Result<()>;
}

/// [`DeviceAdapter`] driven by an [`AdapterProfile`].
pub struct GattAdapter {
    device_id: String,
    profile: AdapterProfile,
    transport: Arc<dyn Transport>,
    config: ConnectionConfig,
    ready: AtomicBool,
    subscribed: Arc<AtomicBool>,
    characteristics: RwLock<HashSet<Uuid>>,
    // RACP indications, enabled on the first request and held until disconnect.
    control_point: Mutex<Option<Subscription>>,
}

impl fmt::Debug for GattAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GattAdapter")
            .field("device_id", &self.device_id)
            .field("profile", &self.profile)
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

impl GattAdapter {
    /// Create an adapter. Nothing is sent to the device until
    /// [`DeviceAdapter::connect`].
    pub fn new(
        device_id: impl Into<String>,
        profile: AdapterProfile,
        transport: Arc<dyn Transport>,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            profile,
            transport,
            config,
            ready: AtomicBool::new(false),
            subscribed: Arc::new(AtomicBool::new(false)),
            characteristics: RwLock::new(HashSet::new()),
            control_point: Mutex::new(None),
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(Error::not_connected(&self.device_id))
        }
    }

    async fn has_characteristic(&self, uuid: Uuid) -> bool {
        self.characteristics.read().await.contains(&uuid)
    }

    async fn require_characteristic(&self, uuid: Uuid) -> Result<()> {
        if self.has_characteristic(uuid).await {
            Ok(())
        } else {
            Err(Error::characteristic_not_found(uuid))
        }
    }

    async fn discover(&self) -> Result<HashSet<Uuid>> {
        let services = timeout(
            self.config.discovery_timeout,
            self.transport.discover_services(&self.device_id),
        )
        .await
        .map_err(|_| Error::timeout("discover services", self.config.discovery_timeout))??;

        let service_uuid = self.profile.service_uuid();
        let service = services
            .iter()
            .find(|s| s.uuid == service_uuid)
            .ok_or_else(|| Error::ServiceNotFound {
                uuid: service_uuid.to_string(),
            })?;

        let measurement = self.profile.measurement_characteristic();
        if !service.characteristics.contains(&measurement) {
            return Err(Error::characteristic_not_found(measurement));
        }

        let characteristics: HashSet<Uuid> = services
            .iter()
            .flat_map(|s| s.characteristics.iter().copied())
            .collect();
        debug!(
            "Discovered {} services, {} characteristics on {}",
            services.len(),
            characteristics.len(),
            self.device_id
        );
        Ok(characteristics)
    }

    async fn read_characteristic(&self, uuid: Uuid) -> Result<Vec<u8>> {
        timeout(
            self.config.read_timeout,
            self.transport.read(&self.device_id, uuid),
        )
        .await
        .map_err(|_| Error::timeout(format!("read characteristic {}", uuid), self.config.read_timeout))?
    }

    async fn read_string(&self, uuid: Uuid) -> String {
        if !self.has_characteristic(uuid).await {
            return String::new();
        }
        match self.read_characteristic(uuid).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes)
                .trim_end_matches('\0')
                .trim()
                .to_string(),
            Err(e) => {
                debug!("Failed to read {} on {}: {}", uuid, self.device_id, e);
                String::new()
            }
        }
    }

    /// Enable indications on the control point. Devices reject RACP requests
    /// until the client has done so.
    async fn ensure_control_point_indications(&self, control_point: Uuid) -> Result<()> {
        let mut slot = self.control_point.lock().await;
        if slot.as_ref().is_some_and(Subscription::is_active) {
            return Ok(());
        }

        let mut stream = self
            .transport
            .subscribe(&self.device_id, control_point)
            .await?;
        let token = CancellationToken::new();
        let task_token = token.clone();
        let device_id = self.device_id.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    payload = stream.next() => {
                        let Some(payload) = payload else { break };
                        match payload.as_slice() {
                            [RACP_RESPONSE, _, request, code] if *code != RACP_SUCCESS => {
                                warn!(
                                    "{} rejected RACP request {:#04x} with code {:#04x}",
                                    device_id, request, code
                                );
                            }
                            _ => debug!("RACP indication from {}: {:02x?}", device_id, payload),
                        }
                    }
                }
            }
        });

        debug!("Enabled RACP indications on {}", self.device_id);
        *slot = Some(Subscription {
            device_id: self.device_id.clone(),
            characteristic: control_point,
            transport: Arc::clone(&self.transport),
            token,
            task: Some(task),
            active: Arc::new(AtomicBool::new(true)),
        });
        Ok(())
    }

    async fn request_last_record(&self) -> Result<()> {
        let control_point = self
            .profile
            .control_point()
            .ok_or_else(|| Error::unsupported("trigger_measurement", self.profile))?;
        self.require_characteristic(control_point).await?;
        self.ensure_control_point_indications(control_point).await?;

        timeout(
            self.config.write_timeout,
            self.transport
                .write(&self.device_id, control_point, &REPORT_LAST_RECORD),
        )
        .await
        .map_err(|_| Error::timeout("write record access control point", self.config.write_timeout))?
    }
}

#[async_trait]
impl DeviceAdapter for GattAdapter {
    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn profile(&self) -> AdapterProfile {
        self.profile
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    #[tracing::instrument(level = "info", skip(self), fields(device_id = %self.device_id, profile = %self.profile))]
    async fn connect(&self) -> Result<()> {
        if self.is_ready() {
            return Ok(());
        }

        self.transport.connect(&self.device_id).await?;
        info!("Link established, discovering services");

        match self.discover().await {
            Ok(characteristics) => {
                *self.characteristics.write().await = characteristics;
                self.ready.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                // Do not leave a half-initialised link behind.
                if let Err(disconnect_err) = self.transport.disconnect(&self.device_id).await {
                    debug!("Disconnect after failed discovery: {}", disconnect_err);
                }
                Err(e)
            }
        }
    }

    async fn trigger_measurement(&self) -> Result<()> {
        self.ensure_ready()?;
        self.request_last_record().await?;
        debug!("Requested last record from {}", self.device_id);
        Ok(())
    }

    async fn read_measurement(&self) -> Result<Measurement> {
        self.ensure_ready()?;
        let characteristic = self.profile.measurement_characteristic();
        let mut stream = self
            .transport
            .subscribe(&self.device_id, characteristic)
            .await?;

        let outcome: Result<Measurement> = async {
            if !self.profile.is_push_only() {
                self.request_last_record().await?;
            }
            let payload = timeout(self.config.read_timeout, stream.next())
                .await
                .map_err(|_| Error::timeout("wait for measurement", self.config.read_timeout))?
                .ok_or_else(|| Error::not_connected(&self.device_id))?;
            let ctx = DecodeContext::new(&self.device_id);
            Ok(self.profile.decode(&payload, &ctx)?)
        }
        .await;

        drop(stream);
        if !self.subscribed.load(Ordering::SeqCst)
            && let Err(e) = self
                .transport
                .unsubscribe(&self.device_id, characteristic)
                .await
        {
            debug!("Unsubscribe after read on {}: {}", self.device_id, e);
        }
        outcome
    }

    async fn subscribe_to_measurements(
        &self,
        callback: MeasurementCallback,
    ) -> Result<Subscription> {
        self.ensure_ready()?;
        let characteristic = self.profile.measurement_characteristic();
        let mut stream = self
            .transport
            .subscribe(&self.device_id, characteristic)
            .await?;
        self.subscribed.store(true, Ordering::SeqCst);

        let token = CancellationToken::new();
        let task_token = token.clone();
        let device_id = self.device_id.clone();
        let profile = self.profile;

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    payload = stream.next() => {
                        let Some(payload) = payload else {
                            debug!("Notification stream for {} ended", device_id);
                            break;
                        };
                        let ctx = DecodeContext::new(&device_id);
                        let result = profile.decode(&payload, &ctx);
                        if let Err(e) = &result {
                            debug!("Undecodable notification from {}: {}", device_id, e);
                        }
                        callback(result);
                    }
                }
            }
        });

        info!("Subscribed to {} on {}", characteristic, self.device_id);
        Ok(Subscription {
            device_id: self.device_id.clone(),
            characteristic,
            transport: Arc::clone(&self.transport),
            token,
            task: Some(task),
            active: Arc::clone(&self.subscribed),
        })
    }

    async fn get_battery_level(&self) -> Result<Option<u8>> {
        self.ensure_ready()?;
        if !self.has_characteristic(uuids::BATTERY_LEVEL).await {
            return Ok(None);
        }
        let data = self.read_characteristic(uuids::BATTERY_LEVEL).await?;
        Ok(data.first().copied().filter(|level| *level <= 100))
    }

    async fn read_device_info(&self) -> Result<DeviceInfo> {
        self.ensure_ready()?;
        let (manufacturer, model, serial, firmware, hardware) = tokio::join!(
            self.read_string(uuids::MANUFACTURER_NAME),
            self.read_string(uuids::MODEL_NUMBER),
            self.read_string(uuids::SERIAL_NUMBER),
            self.read_string(uuids::FIRMWARE_REVISION),
            self.read_string(uuids::HARDWARE_REVISION),
        );
        Ok(DeviceInfo {
            manufacturer,
            model,
            serial,
            firmware,
            hardware,
        })
    }

    #[tracing::instrument(level = "info", skip(self), fields(device_id = %self.device_id))]
    async fn disconnect(&self) -> Result<()> {
        if !self.ready.swap(false, Ordering::SeqCst) {
            return Err(Error::not_connected(&self.device_id));
        }
        if let Some(indications) = self.control_point.lock().await.take()
            && let Err(e) = indications.unsubscribe().await
        {
            debug!("Disabling RACP indications on {}: {}", self.device_id, e);
        }
        self.characteristics.write().await.clear();
        self.transport.disconnect(&self.device_id).await
    }
}
