//! Mock transport for testing without Bluetooth hardware.
//!
//! [`MockTransport`] implements [`Transport`] over a set of simulated
//! peripherals. Tests drive it from the outside: push notifications, drop
//! links, toggle the radio, and inject latency or failures.
//!
//! # Features
//!
//! - **Failure injection**: make connects or subscriptions fail per device
//! - **Latency simulation**: delay connects and subscriptions to exercise
//!   timeouts and overlapping calls
//! - **Concurrency tracking**: record the peak number of in-flight connects
//! - **Glucose record replay**: answer RACP "report last record" requests,
//!   rejecting them unless indications are enabled on the control point

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedSender};
use uuid::Uuid;

use medlink_types::uuid as uuids;
use medlink_types::DeviceKind;

use crate::adapter::REPORT_LAST_RECORD;
use crate::error::{Error, Result};
use crate::transport::{
    Advertisement, AdvertisementStream, GattService, NotificationStream, RadioState, Transport,
    TransportEvent, TransportEventStream,
};
use crate::util::lock;

/// A simulated peripheral.
#[derive(Debug, Clone)]
pub struct MockPeripheral {
    advertisement: Advertisement,
    services: Vec<GattService>,
    values: HashMap<Uuid, Vec<u8>>,
    stored_record: Option<Vec<u8>>,
}

impl MockPeripheral {
    /// A standards-compliant device of the given kind with device information
    /// and a battery service.
    pub fn new(device_id: &str, name: &str, kind: DeviceKind) -> Self {
        let measurement = match kind {
            DeviceKind::BloodPressure => vec![
                uuids::BLOOD_PRESSURE_MEASUREMENT,
                uuids::INTERMEDIATE_CUFF_PRESSURE,
            ],
            DeviceKind::Glucose => vec![
                uuids::GLUCOSE_MEASUREMENT,
                uuids::RECORD_ACCESS_CONTROL_POINT,
            ],
            DeviceKind::PulseOximeter => vec![uuids::PLX_SPOT_CHECK_MEASUREMENT],
            _ => vec![uuids::WEIGHT_MEASUREMENT],
        };

        let services = vec![
            GattService::new(kind.service_uuid(), measurement),
            GattService::new(
                uuids::DEVICE_INFO_SERVICE,
                [
                    uuids::MANUFACTURER_NAME,
                    uuids::MODEL_NUMBER,
                    uuids::SERIAL_NUMBER,
                    uuids::FIRMWARE_REVISION,
                    uuids::HARDWARE_REVISION,
                ],
            ),
            GattService::new(uuids::BATTERY_SERVICE, [uuids::BATTERY_LEVEL]),
        ];

        let mut values = HashMap::new();
        values.insert(uuids::MANUFACTURER_NAME, b"Mock Medical".to_vec());
        values.insert(uuids::MODEL_NUMBER, format!("{}-MOCK", kind).into_bytes());
        values.insert(uuids::SERIAL_NUMBER, format!("SN-{}", device_id).into_bytes());
        values.insert(uuids::FIRMWARE_REVISION, b"1.0.0\0".to_vec());
        values.insert(uuids::HARDWARE_REVISION, b"A".to_vec());
        values.insert(uuids::BATTERY_LEVEL, vec![90]);

        Self {
            advertisement: Advertisement {
                device_id: device_id.to_string(),
                name: Some(name.to_string()),
                rssi: Some(-55),
                services: vec![kind.service_uuid()],
            },
            services,
            values,
            stored_record: None,
        }
    }

    /// Set the battery level.
    #[must_use]
    pub fn with_battery(mut self, level: u8) -> Self {
        self.values.insert(uuids::BATTERY_LEVEL, vec![level]);
        self
    }

    /// Set the advertised signal strength.
    #[must_use]
    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.advertisement.rssi = Some(rssi);
        self
    }

    /// Advertise no services, leaving kind detection to the name.
    #[must_use]
    pub fn without_advertised_services(mut self) -> Self {
        self.advertisement.services.clear();
        self
    }

    /// Replace the GATT table.
    #[must_use]
    pub fn with_services(mut self, services: Vec<GattService>) -> Self {
        self.services = services;
        self
    }

    /// Payload sent on the glucose measurement characteristic when a
    /// "report last record" request is written to the RACP.
    #[must_use]
    pub fn with_stored_record(mut self, payload: Vec<u8>) -> Self {
        self.stored_record = Some(payload);
        self
    }

    /// The device identifier.
    pub fn device_id(&self) -> &str {
        &self.advertisement.device_id
    }
}

type SubscriptionKey = (String, Uuid);

/// Decrements the in-flight connect counter even when the connect future
/// is dropped by a timeout.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory [`Transport`] for tests and demos.
pub struct MockTransport {
    radio: Mutex<RadioState>,
    peripherals: Mutex<HashMap<String, MockPeripheral>>,
    connected: Mutex<HashSet<String>>,
    event_senders: Mutex<Vec<UnboundedSender<TransportEvent>>>,
    scan_sender: Mutex<Option<UnboundedSender<Advertisement>>>,
    subscriptions: Mutex<HashMap<SubscriptionKey, Vec<UnboundedSender<Vec<u8>>>>>,
    writes: Mutex<Vec<(String, Uuid, Vec<u8>)>>,
    cancelled: Mutex<Vec<String>>,
    failing_connects: Mutex<HashSet<String>>,
    failing_subscriptions: Mutex<HashSet<String>>,
    scanning: AtomicBool,
    connect_latency_ms: AtomicU64,
    subscribe_latency_ms: AtomicU64,
    connect_calls: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("radio", &*lock(&self.radio))
            .field("peripherals", &lock(&self.peripherals).len())
            .field("connected", &*lock(&self.connected))
            .finish()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a transport with the radio powered on and no peripherals.
    pub fn new() -> Self {
        Self {
            radio: Mutex::new(RadioState::PoweredOn),
            peripherals: Mutex::new(HashMap::new()),
            connected: Mutex::new(HashSet::new()),
            event_senders: Mutex::new(Vec::new()),
            scan_sender: Mutex::new(None),
            subscriptions: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            failing_connects: Mutex::new(HashSet::new()),
            failing_subscriptions: Mutex::new(HashSet::new()),
            scanning: AtomicBool::new(false),
            connect_latency_ms: AtomicU64::new(0),
            subscribe_latency_ms: AtomicU64::new(0),
            connect_calls: AtomicU32::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Add (or replace) a peripheral. It is advertised immediately if a scan
    /// is running.
    pub fn add_peripheral(&self, peripheral: MockPeripheral) {
        if let Some(sender) = lock(&self.scan_sender).as_ref() {
            let _ = sender.unbounded_send(peripheral.advertisement.clone());
        }
        lock(&self.peripherals).insert(peripheral.device_id().to_string(), peripheral);
    }

    /// Change the radio state and report it on the event stream.
    pub fn set_radio_state(&self, state: RadioState) {
        *lock(&self.radio) = state;
        if state != RadioState::PoweredOn {
            lock(&self.connected).clear();
        }
        self.emit(TransportEvent::RadioStateChanged(state));
    }

    /// Simulate a link loss initiated by the device or the platform.
    pub fn drop_link(&self, device_id: &str) {
        lock(&self.connected).remove(device_id);
        self.emit(TransportEvent::Disconnected {
            device_id: device_id.to_string(),
        });
    }

    /// Deliver a notification payload. Returns `false` if nobody is
    /// subscribed to the characteristic.
    pub fn notify(&self, device_id: &str, characteristic: Uuid, payload: &[u8]) -> bool {
        let mut subscriptions = lock(&self.subscriptions);
        let Some(senders) = subscriptions.get_mut(&(device_id.to_string(), characteristic)) else {
            return false;
        };
        senders.retain(|s| s.unbounded_send(payload.to_vec()).is_ok());
        !senders.is_empty()
    }

    /// Delay every connect by `latency`.
    pub fn set_connect_latency(&self, latency: Duration) {
        self.connect_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Delay every subscribe by `latency`.
    pub fn set_subscribe_latency(&self, latency: Duration) {
        self.subscribe_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make connects to `device_id` fail (or succeed again).
    pub fn set_connect_failure(&self, device_id: &str, fail: bool) {
        let mut failing = lock(&self.failing_connects);
        if fail {
            failing.insert(device_id.to_string());
        } else {
            failing.remove(device_id);
        }
    }

    /// Make subscriptions on `device_id` fail (or succeed again).
    pub fn set_subscribe_failure(&self, device_id: &str, fail: bool) {
        let mut failing = lock(&self.failing_subscriptions);
        if fail {
            failing.insert(device_id.to_string());
        } else {
            failing.remove(device_id);
        }
    }

    /// Whether the device currently holds a link.
    pub fn is_connected(&self, device_id: &str) -> bool {
        lock(&self.connected).contains(device_id)
    }

    /// Whether a scan is running.
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions on a characteristic.
    pub fn subscriber_count(&self, device_id: &str, characteristic: Uuid) -> usize {
        lock(&self.subscriptions)
            .get(&(device_id.to_string(), characteristic))
            .map_or(0, |senders| senders.iter().filter(|s| !s.is_closed()).count())
    }

    /// Every write performed so far.
    pub fn writes(&self) -> Vec<(String, Uuid, Vec<u8>)> {
        lock(&self.writes).clone()
    }

    /// Devices whose pending connection was cancelled.
    pub fn cancelled_connections(&self) -> Vec<String> {
        lock(&self.cancelled).clone()
    }

    /// Total number of connect calls.
    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Peak number of simultaneous connect calls.
    pub fn max_concurrent_connects(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn emit(&self, event: TransportEvent) {
        lock(&self.event_senders).retain(|s| s.unbounded_send(event.clone()).is_ok());
    }

    fn check_linked(&self, device_id: &str) -> Result<()> {
        if self.is_connected(device_id) {
            Ok(())
        } else {
            Err(Error::not_connected(device_id))
        }
    }

    fn characteristic_exists(&self, device_id: &str, characteristic: Uuid) -> Result<()> {
        let peripherals = lock(&self.peripherals);
        let peripheral = peripherals
            .get(device_id)
            .ok_or_else(|| Error::device_not_found(device_id))?;
        if peripheral
            .services
            .iter()
            .any(|s| s.characteristics.contains(&characteristic))
        {
            Ok(())
        } else {
            Err(Error::characteristic_not_found(characteristic))
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn radio_state(&self) -> Result<RadioState> {
        Ok(*lock(&self.radio))
    }

    async fn events(&self) -> Result<TransportEventStream> {
        let (tx, rx) = mpsc::unbounded();
        lock(&self.event_senders).push(tx);
        Ok(Box::pin(rx))
    }

    async fn start_scan(&self, _services: &[Uuid]) -> Result<AdvertisementStream> {
        if *lock(&self.radio) != RadioState::PoweredOn {
            return Err(Error::BluetoothPoweredOff);
        }
        let (tx, rx) = mpsc::unbounded();
        for peripheral in lock(&self.peripherals).values() {
            let _ = tx.unbounded_send(peripheral.advertisement.clone());
        }
        *lock(&self.scan_sender) = Some(tx);
        self.scanning.store(true, Ordering::SeqCst);
        Ok(Box::pin(rx))
    }

    async fn stop_scan(&self) -> Result<()> {
        lock(&self.scan_sender).take();
        self.scanning.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn connect(&self, device_id: &str) -> Result<()> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !lock(&self.peripherals).contains_key(device_id) {
            return Err(Error::device_not_found(device_id));
        }

        let latency = self.connect_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if *lock(&self.radio) != RadioState::PoweredOn {
            return Err(Error::connection_failed(device_id, "radio powered off"));
        }
        if lock(&self.failing_connects).contains(device_id) {
            return Err(Error::connection_failed(device_id, "mock connect failure"));
        }

        lock(&self.connected).insert(device_id.to_string());
        Ok(())
    }

    async fn cancel_connection(&self, device_id: &str) -> Result<()> {
        lock(&self.cancelled).push(device_id.to_string());
        lock(&self.connected).remove(device_id);
        Ok(())
    }

    async fn disconnect(&self, device_id: &str) -> Result<()> {
        lock(&self.subscriptions).retain(|(id, _), _| id != device_id);
        if lock(&self.connected).remove(device_id) {
            Ok(())
        } else {
            Err(Error::not_connected(device_id))
        }
    }

    async fn discover_services(&self, device_id: &str) -> Result<Vec<GattService>> {
        self.check_linked(device_id)?;
        lock(&self.peripherals)
            .get(device_id)
            .map(|p| p.services.clone())
            .ok_or_else(|| Error::device_not_found(device_id))
    }

    async fn read(&self, device_id: &str, characteristic: Uuid) -> Result<Vec<u8>> {
        self.check_linked(device_id)?;
        self.characteristic_exists(device_id, characteristic)?;
        lock(&self.peripherals)
            .get(device_id)
            .and_then(|p| p.values.get(&characteristic).cloned())
            .ok_or_else(|| Error::characteristic_not_found(characteristic))
    }

    async fn write(&self, device_id: &str, characteristic: Uuid, data: &[u8]) -> Result<()> {
        self.check_linked(device_id)?;
        self.characteristic_exists(device_id, characteristic)?;
        let control_point = characteristic == uuids::RECORD_ACCESS_CONTROL_POINT;
        if control_point && self.subscriber_count(device_id, characteristic) == 0 {
            // ATT error 0xFD: client characteristic configuration improperly configured.
            return Err(Error::Bluetooth(btleplug::Error::Other(
                "RACP write without indications enabled".into(),
            )));
        }
        lock(&self.writes).push((device_id.to_string(), characteristic, data.to_vec()));

        if control_point && data == REPORT_LAST_RECORD {
            let record = lock(&self.peripherals)
                .get(device_id)
                .and_then(|p| p.stored_record.clone());
            // Response code 0x01 on success, 0x06 when no records are stored.
            let code = match record {
                Some(record) => {
                    self.notify(device_id, uuids::GLUCOSE_MEASUREMENT, &record);
                    0x01
                }
                None => 0x06,
            };
            self.notify(device_id, characteristic, &[0x06, 0x00, data[0], code]);
        }
        Ok(())
    }

    async fn subscribe(&self, device_id: &str, characteristic: Uuid) -> Result<NotificationStream> {
        self.check_linked(device_id)?;
        self.characteristic_exists(device_id, characteristic)?;
        if lock(&self.failing_subscriptions).contains(device_id) {
            return Err(Error::notification_failed(
                characteristic,
                "mock subscribe failure",
            ));
        }

        let latency = self.subscribe_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let (tx, rx) = mpsc::unbounded();
        lock(&self.subscriptions)
            .entry((device_id.to_string(), characteristic))
            .or_default()
            .push(tx);
        Ok(Box::pin(rx))
    }

    async fn unsubscribe(&self, device_id: &str, characteristic: Uuid) -> Result<()> {
        lock(&self.subscriptions).remove(&(device_id.to_string(), characteristic));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    const BP: &str = "AA:00:00:00:00:01";
    const GLUCOSE: &str = "AA:00:00:00:00:02";

    fn transport() -> MockTransport {
        let transport = MockTransport::new();
        transport.add_peripheral(MockPeripheral::new(BP, "OMRON M7", DeviceKind::BloodPressure));
        transport
    }

    #[tokio::test]
    async fn test_scan_reports_peripherals() {
        let transport = transport();
        let mut stream = transport.start_scan(&[]).await.unwrap();
        let ad = stream.next().await.unwrap();
        assert_eq!(ad.device_id, BP);
        assert_eq!(ad.services, vec![uuids::BLOOD_PRESSURE_SERVICE]);
        assert!(transport.is_scanning());

        transport.stop_scan().await.unwrap();
        assert!(!transport.is_scanning());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_scan_requires_radio() {
        let transport = transport();
        transport.set_radio_state(RadioState::PoweredOff);
        assert!(matches!(
            transport.start_scan(&[]).await,
            Err(Error::BluetoothPoweredOff)
        ));
    }

    #[tokio::test]
    async fn test_connect_read_and_notify() {
        let transport = transport();
        transport.connect(BP).await.unwrap();
        assert!(transport.is_connected(BP));

        let battery = transport.read(BP, uuids::BATTERY_LEVEL).await.unwrap();
        assert_eq!(battery, vec![90]);

        let mut stream = transport
            .subscribe(BP, uuids::BLOOD_PRESSURE_MEASUREMENT)
            .await
            .unwrap();
        assert!(transport.notify(BP, uuids::BLOOD_PRESSURE_MEASUREMENT, &[1, 2, 3]));
        assert_eq!(stream.next().await.unwrap(), vec![1, 2, 3]);

        transport
            .unsubscribe(BP, uuids::BLOOD_PRESSURE_MEASUREMENT)
            .await
            .unwrap();
        assert!(!transport.notify(BP, uuids::BLOOD_PRESSURE_MEASUREMENT, &[1]));
    }

    #[tokio::test]
    async fn test_connect_failure_injection() {
        let transport = transport();
        transport.set_connect_failure(BP, true);
        assert!(matches!(
            transport.connect(BP).await,
            Err(Error::ConnectionFailed { .. })
        ));
        assert!(!transport.is_connected(BP));
    }

    #[tokio::test]
    async fn test_unknown_characteristic() {
        let transport = transport();
        transport.connect(BP).await.unwrap();
        assert!(matches!(
            transport.read(BP, uuids::GLUCOSE_MEASUREMENT).await,
            Err(Error::CharacteristicNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_drop_link_emits_event() {
        let transport = transport();
        let mut events = transport.events().await.unwrap();
        transport.connect(BP).await.unwrap();
        transport.drop_link(BP);
        assert_eq!(
            events.next().await.unwrap(),
            TransportEvent::Disconnected {
                device_id: BP.to_string()
            }
        );
        assert!(!transport.is_connected(BP));
    }

    #[tokio::test]
    async fn test_control_point_write_needs_indications() {
        let transport = MockTransport::new();
        transport.add_peripheral(
            MockPeripheral::new(GLUCOSE, "Contour", DeviceKind::Glucose)
                .with_stored_record(vec![0x00, 0x01, 0x00]),
        );
        transport.connect(GLUCOSE).await.unwrap();

        let refused = transport
            .write(GLUCOSE, uuids::RECORD_ACCESS_CONTROL_POINT, &REPORT_LAST_RECORD)
            .await;
        assert!(matches!(refused, Err(Error::Bluetooth(_))));
        assert!(transport.writes().is_empty());

        let mut indications = transport
            .subscribe(GLUCOSE, uuids::RECORD_ACCESS_CONTROL_POINT)
            .await
            .unwrap();
        let mut records = transport
            .subscribe(GLUCOSE, uuids::GLUCOSE_MEASUREMENT)
            .await
            .unwrap();
        transport
            .write(GLUCOSE, uuids::RECORD_ACCESS_CONTROL_POINT, &REPORT_LAST_RECORD)
            .await
            .unwrap();
        assert_eq!(records.next().await.unwrap(), vec![0x00, 0x01, 0x00]);
        assert_eq!(indications.next().await.unwrap(), vec![0x06, 0x00, 0x01, 0x01]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_latency() {
        let transport = transport();
        transport.connect(BP).await.unwrap();
        transport.set_subscribe_latency(Duration::from_secs(2));
        let start = tokio::time::Instant::now();
        transport
            .subscribe(BP, uuids::BLOOD_PRESSURE_MEASUREMENT)
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_counter_survives_cancellation() {
        let transport = transport();
        transport.set_connect_latency(Duration::from_secs(5));
        let attempt = tokio::time::timeout(Duration::from_secs(1), transport.connect(BP)).await;
        assert!(attempt.is_err());
        assert_eq!(transport.max_concurrent_connects(), 1);
        assert_eq!(transport.in_flight.load(Ordering::SeqCst), 0);
    }
}
