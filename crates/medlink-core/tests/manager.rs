//! Connection manager tests against the mock transport.

use std::sync::Arc;
use std::time::Duration;

use time::macros::datetime;
use tokio::sync::broadcast::error::TryRecvError;

use medlink_core::uuids;
use medlink_core::{
    AdapterProfile, ConnectionManager, ConnectionState, DeviceKind, DisconnectReason, Error,
    ErrorKind, EventReceiver, ManagerConfig, ManagerEvent, Measurement, MockPeripheral,
    MockTransport, PairingStore, RadioState,
};
use medlink_types::{Device, KeyValueStore, MemoryStore, StoreError};

const BP: &str = "AA:00:00:00:00:01";
const GLUCOSE: &str = "AA:00:00:00:00:02";

const BP_PAYLOAD: [u8; 9] = [0x04, 0xB0, 0x04, 0x20, 0x03, 0xA5, 0x03, 0xD0, 0x02];

// Seq 7, 2024-03-15 08:30:00, 0.0050 mol/L.
const GLUCOSE_PAYLOAD: [u8; 12] = [
    0x04, 0x07, 0x00, 0xE8, 0x07, 0x03, 0x0F, 0x08, 0x1E, 0x00, 0xF4, 0xB1,
];

const SCAN: Option<Duration> = Some(Duration::from_millis(100));

struct Fixture {
    transport: Arc<MockTransport>,
    backend: Arc<MemoryStore>,
    manager: Arc<ConnectionManager>,
}

async fn fixture_with(config: ManagerConfig) -> Fixture {
    let transport = Arc::new(MockTransport::new());
    transport.add_peripheral(MockPeripheral::new(BP, "OMRON M7", DeviceKind::BloodPressure));
    transport.add_peripheral(
        MockPeripheral::new(GLUCOSE, "Accu-Chek Guide", DeviceKind::Glucose)
            .with_battery(40)
            .with_stored_record(GLUCOSE_PAYLOAD.to_vec()),
    );
    let backend = Arc::new(MemoryStore::new());
    let manager = restart(&transport, &backend, config).await;
    Fixture {
        transport,
        backend,
        manager,
    }
}

async fn fixture() -> Fixture {
    fixture_with(ManagerConfig::default()).await
}

async fn restart(
    transport: &Arc<MockTransport>,
    backend: &Arc<MemoryStore>,
    config: ManagerConfig,
) -> Arc<ConnectionManager> {
    let pairing = PairingStore::load(backend.clone()).await;
    Arc::new(ConnectionManager::new(transport.clone(), pairing, config).unwrap())
}

async fn wait_for(
    events: &mut EventReceiver,
    matches: impl Fn(&ManagerEvent) -> bool,
) -> ManagerEvent {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            let event = events.recv().await.expect("event channel closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("expected event was not sent")
}

fn drain(events: &mut EventReceiver) -> Vec<ManagerEvent> {
    let mut drained = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => drained.push(event),
            Err(TryRecvError::Empty) => return drained,
            Err(e) => panic!("unexpected receive error: {}", e),
        }
    }
}

async fn wait_for_state(manager: &ConnectionManager, device_id: &str, state: ConnectionState) {
    for _ in 0..1000 {
        if manager.connection_state(device_id) == state {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("{} never reached {:?}", device_id, state);
}

// --- Scanning ---

#[tokio::test(start_paused = true)]
async fn scan_discovers_devices_and_reports_completion() {
    let f = fixture().await;
    let mut events = f.manager.subscribe();

    let devices = f.manager.scan(SCAN).await.unwrap();
    assert_eq!(devices.len(), 2);
    assert!(!f.manager.is_scanning());
    assert!(!f.transport.is_scanning());

    let bp = devices.iter().find(|d| d.id == BP).unwrap();
    assert_eq!(bp.kind, Some(DeviceKind::BloodPressure));
    assert!(!bp.paired);

    let emitted = drain(&mut events);
    let discovered = emitted
        .iter()
        .filter(|e| matches!(e, ManagerEvent::DeviceDiscovered { .. }))
        .count();
    assert_eq!(discovered, 2);
    assert!(matches!(
        emitted.last(),
        Some(ManagerEvent::ScanComplete { count: 2 })
    ));
}

#[tokio::test(start_paused = true)]
async fn repeated_advertisements_refresh_rssi_silently() {
    let f = fixture().await;
    let mut events = f.manager.subscribe();

    let manager = Arc::clone(&f.manager);
    let scan = tokio::spawn(async move { manager.scan(Some(Duration::from_secs(5))).await });
    while !f.transport.is_scanning() {
        tokio::task::yield_now().await;
    }
    f.transport
        .add_peripheral(MockPeripheral::new(BP, "OMRON M7", DeviceKind::BloodPressure).with_rssi(-40));

    let devices = scan.await.unwrap().unwrap();
    let bp = devices.iter().find(|d| d.id == BP).unwrap();
    assert_eq!(bp.rssi, Some(-40));
    assert_eq!(devices[0].id, BP);

    let discovered = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, ManagerEvent::DeviceDiscovered { .. }))
        .count();
    assert_eq!(discovered, 2);
}

#[tokio::test(start_paused = true)]
async fn concurrent_scan_rejected_and_stop_is_idempotent() {
    let f = fixture().await;
    f.manager.stop_scan();

    let manager = Arc::clone(&f.manager);
    let first = tokio::spawn(async move { manager.scan(Some(Duration::from_secs(60))).await });
    while !f.manager.is_scanning() {
        tokio::task::yield_now().await;
    }

    assert!(matches!(
        f.manager.scan(SCAN).await,
        Err(Error::ScanInProgress)
    ));

    f.manager.stop_scan();
    f.manager.stop_scan();
    let devices = first.await.unwrap().unwrap();
    assert_eq!(devices.len(), 2);
    assert!(!f.manager.is_scanning());
}

#[tokio::test]
async fn scan_requires_powered_radio() {
    let f = fixture().await;
    f.transport.set_radio_state(RadioState::PoweredOff);
    assert!(matches!(
        f.manager.scan(SCAN).await,
        Err(Error::BluetoothPoweredOff)
    ));
    assert!(!f.manager.is_scanning());
}

// --- Connecting ---

#[tokio::test]
async fn connect_unknown_device_leaves_no_session() {
    let f = fixture().await;
    let mut events = f.manager.subscribe();

    let err = f.manager.connect(BP).await.unwrap_err();
    assert!(matches!(err, Error::DeviceNotFound { .. }));
    assert_eq!(f.manager.connection_state(BP), ConnectionState::Disconnected);
    assert!(f.manager.connected_devices().is_empty());
    assert_eq!(f.transport.connect_calls(), 0);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn blood_pressure_end_to_end() {
    let f = fixture().await;
    f.manager.scan(SCAN).await.unwrap();
    let mut events = f.manager.subscribe();

    f.manager.connect(BP).await.unwrap();
    assert_eq!(f.manager.connection_state(BP), ConnectionState::Ready);

    let states: Vec<ConnectionState> = drain(&mut events)
        .into_iter()
        .filter_map(|e| match e {
            ManagerEvent::StateChanged { state, .. } => Some(state),
            ManagerEvent::DeviceReady {
                profile,
                battery_level,
                ..
            } => {
                assert_eq!(profile, AdapterProfile::OmronBloodPressure);
                assert_eq!(battery_level, Some(90));
                None
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Ready
        ]
    );

    assert!(f
        .transport
        .notify(BP, uuids::BLOOD_PRESSURE_MEASUREMENT, &BP_PAYLOAD));
    let event = wait_for(&mut events, |e| {
        matches!(e, ManagerEvent::MeasurementReceived { .. })
    })
    .await;
    let ManagerEvent::MeasurementReceived {
        device_id,
        measurement: Measurement::BloodPressure(reading),
        validation,
    } = event
    else {
        panic!("expected a blood pressure measurement");
    };
    assert_eq!(device_id, BP);
    assert_eq!(reading.systolic, 120.0);
    assert_eq!(reading.diastolic, 80.0);
    assert_eq!(reading.pulse, Some(72.0));
    assert!(validation.is_valid);

    let paired = f.manager.paired_devices().await;
    assert_eq!(paired.len(), 1);
    assert_eq!(paired[0].connection_count, 1);
    assert_eq!(paired[0].battery_level, Some(90));
    assert_eq!(
        paired[0].device_info.as_ref().map(|i| i.manufacturer.as_str()),
        Some("Mock Medical")
    );
    assert_eq!(paired[0].device.connection_state, ConnectionState::Ready);
}

#[tokio::test(start_paused = true)]
async fn glucose_trigger_delivers_last_record() {
    let f = fixture().await;
    f.manager.scan(SCAN).await.unwrap();
    f.manager.connect(GLUCOSE).await.unwrap();
    let mut events = f.manager.subscribe();

    f.manager.trigger_measurement(GLUCOSE).await.unwrap();
    let event = wait_for(&mut events, |e| {
        matches!(e, ManagerEvent::MeasurementReceived { .. })
    })
    .await;
    let ManagerEvent::MeasurementReceived {
        measurement: Measurement::Glucose(reading),
        ..
    } = event
    else {
        panic!("expected a glucose measurement");
    };
    assert_eq!(reading.value, 90.0);
    assert_eq!(reading.sequence_number, 7);
    assert_eq!(reading.timestamp, datetime!(2024-03-15 08:30 UTC));

    assert_eq!(f.manager.battery_level(GLUCOSE).await.unwrap(), Some(40));
}

#[tokio::test(start_paused = true)]
async fn glucose_control_point_indications_follow_the_session() {
    let f = fixture().await;
    f.manager.scan(SCAN).await.unwrap();
    f.manager.connect(GLUCOSE).await.unwrap();
    f.manager.trigger_measurement(GLUCOSE).await.unwrap();
    assert_eq!(
        f.transport
            .subscriber_count(GLUCOSE, uuids::RECORD_ACCESS_CONTROL_POINT),
        1
    );

    f.manager.disconnect(GLUCOSE).await.unwrap();
    assert_eq!(
        f.transport
            .subscriber_count(GLUCOSE, uuids::RECORD_ACCESS_CONTROL_POINT),
        0
    );
    assert_eq!(
        f.transport
            .subscriber_count(GLUCOSE, uuids::GLUCOSE_MEASUREMENT),
        0
    );
}

#[tokio::test(start_paused = true)]
async fn push_only_device_rejects_trigger() {
    let f = fixture().await;
    f.manager.scan(SCAN).await.unwrap();
    f.manager.connect(BP).await.unwrap();
    assert!(matches!(
        f.manager.trigger_measurement(BP).await,
        Err(Error::UnsupportedOperation { .. })
    ));
    assert!(matches!(
        f.manager.trigger_measurement(GLUCOSE).await,
        Err(Error::DeviceNotConnected { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn malformed_notification_reported_and_subscription_survives() {
    let f = fixture().await;
    f.manager.scan(SCAN).await.unwrap();
    f.manager.connect(BP).await.unwrap();
    let mut events = f.manager.subscribe();

    f.transport
        .notify(BP, uuids::BLOOD_PRESSURE_MEASUREMENT, &[0x04, 0xB0, 0x04]);
    let event = wait_for(&mut events, |e| matches!(e, ManagerEvent::Error { .. })).await;
    let ManagerEvent::Error {
        device_id, kind, ..
    } = event
    else {
        unreachable!();
    };
    assert_eq!(device_id.as_deref(), Some(BP));
    assert_eq!(kind, ErrorKind::Decode);

    f.transport
        .notify(BP, uuids::BLOOD_PRESSURE_MEASUREMENT, &BP_PAYLOAD);
    wait_for(&mut events, |e| {
        matches!(e, ManagerEvent::MeasurementReceived { .. })
    })
    .await;
    assert_eq!(f.manager.connection_state(BP), ConnectionState::Ready);
}

#[tokio::test(start_paused = true)]
async fn concurrent_connect_for_same_device_rejected() {
    let f = fixture().await;
    f.manager.scan(SCAN).await.unwrap();
    f.transport.set_connect_latency(Duration::from_secs(1));

    let manager = Arc::clone(&f.manager);
    let first = tokio::spawn(async move { manager.connect(BP).await });
    wait_for_state(&f.manager, BP, ConnectionState::Connecting).await;

    assert!(matches!(
        f.manager.connect(BP).await,
        Err(Error::AlreadyConnecting { .. })
    ));

    first.await.unwrap().unwrap();
    assert_eq!(f.manager.connection_state(BP), ConnectionState::Ready);
    assert_eq!(f.transport.connect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn connect_rejected_while_first_attempt_enables_notifications() {
    let f = fixture().await;
    f.manager.scan(SCAN).await.unwrap();
    f.transport.set_subscribe_latency(Duration::from_secs(1));

    let manager = Arc::clone(&f.manager);
    let first = tokio::spawn(async move { manager.connect(BP).await });
    wait_for_state(&f.manager, BP, ConnectionState::Connected).await;

    assert!(matches!(
        f.manager.connect(BP).await,
        Err(Error::AlreadyConnecting { .. })
    ));

    first.await.unwrap().unwrap();
    assert_eq!(f.manager.connection_state(BP), ConnectionState::Ready);
    assert_eq!(f.transport.connect_calls(), 1);

    // Once the first attempt settles the device can be connected again.
    f.manager.connect(BP).await.unwrap();
    assert_eq!(f.transport.connect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn connecting_a_ready_device_is_a_noop() {
    let f = fixture().await;
    f.manager.scan(SCAN).await.unwrap();
    f.manager.connect(BP).await.unwrap();
    let mut events = f.manager.subscribe();

    f.manager.connect(BP).await.unwrap();
    assert_eq!(f.transport.connect_calls(), 1);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn timeout_cancels_platform_attempt() {
    let f = fixture().await;
    f.manager.scan(SCAN).await.unwrap();
    f.transport.set_connect_latency(Duration::from_secs(30));

    let err = f
        .manager
        .connect_with_timeout(BP, Duration::from_secs(2))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::ConnectionTimeout { ref device_id, duration }
            if device_id == BP && duration == Duration::from_secs(2)
    ));
    assert_eq!(f.transport.cancelled_connections(), vec![BP.to_string()]);
    assert_eq!(f.manager.connection_state(BP), ConnectionState::Disconnected);
    assert!(!f.manager.pairing().contains(BP).await);
}

#[tokio::test(start_paused = true)]
async fn platform_failure_reverts_state() {
    let f = fixture().await;
    f.manager.scan(SCAN).await.unwrap();
    f.transport.set_connect_failure(BP, true);

    assert!(matches!(
        f.manager.connect(BP).await,
        Err(Error::ConnectionFailed { .. })
    ));
    assert_eq!(f.manager.connection_state(BP), ConnectionState::Disconnected);
    assert!(f.transport.cancelled_connections().is_empty());
}

#[tokio::test(start_paused = true)]
async fn notification_failure_disconnects() {
    let f = fixture().await;
    f.manager.scan(SCAN).await.unwrap();
    f.transport.set_subscribe_failure(BP, true);

    assert!(matches!(
        f.manager.connect(BP).await,
        Err(Error::NotificationFailed { .. })
    ));
    assert_eq!(f.manager.connection_state(BP), ConnectionState::Disconnected);
    assert!(!f.transport.is_connected(BP));
}

#[tokio::test(start_paused = true)]
async fn unsupported_device_rejected_before_connecting() {
    let f = fixture().await;
    f.transport.add_peripheral(
        MockPeripheral::new("AA:00:00:00:00:09", "Gadget", DeviceKind::Scale)
            .without_advertised_services(),
    );
    f.manager.scan(SCAN).await.unwrap();

    assert!(matches!(
        f.manager.connect("AA:00:00:00:00:09").await,
        Err(Error::UnsupportedDeviceType { .. })
    ));
    assert_eq!(f.transport.connect_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn persistence_failure_does_not_block_connection() {
    let f = fixture().await;
    f.manager.scan(SCAN).await.unwrap();
    let mut events = f.manager.subscribe();
    f.backend.set_fail_writes(true);

    f.manager.connect(BP).await.unwrap();
    assert_eq!(f.manager.connection_state(BP), ConnectionState::Ready);

    let event = wait_for(&mut events, |e| matches!(e, ManagerEvent::Error { .. })).await;
    assert!(matches!(
        event,
        ManagerEvent::Error {
            kind: ErrorKind::Persistence,
            ..
        }
    ));
    assert!(f.manager.pairing().is_dirty().await);
}

/// Backend whose writes block until released.
#[derive(Debug, Default)]
struct GatedStore {
    inner: MemoryStore,
    open: std::sync::Mutex<bool>,
    opened: std::sync::Condvar,
}

impl GatedStore {
    fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }
}

impl KeyValueStore for GatedStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.opened.wait(open).unwrap();
        }
        drop(open);
        self.inner.set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key)
    }
}

#[tokio::test]
async fn slow_pairing_store_does_not_delay_readiness() {
    let transport = Arc::new(MockTransport::new());
    transport.add_peripheral(MockPeripheral::new(BP, "OMRON M7", DeviceKind::BloodPressure));
    let backend = Arc::new(GatedStore::default());
    let pairing = PairingStore::load(backend.clone()).await;
    let manager =
        ConnectionManager::new(transport.clone(), pairing, ManagerConfig::default()).unwrap();
    manager.scan(SCAN).await.unwrap();
    let mut events = manager.subscribe();

    manager.connect(BP).await.unwrap();
    assert!(drain(&mut events)
        .iter()
        .any(|e| matches!(e, ManagerEvent::DeviceReady { .. })));
    assert_eq!(manager.pairing().get(BP).await.unwrap().connection_count, 1);
    assert!(manager.pairing().is_dirty().await);
    assert!(backend.inner.is_empty());

    backend.release();
    manager.pairing().flush().await.unwrap();
    assert!(!manager.pairing().is_dirty().await);
    let reloaded = PairingStore::load(backend.clone()).await;
    assert!(reloaded.get(BP).await.is_some());
}

// --- Disconnecting and forgetting ---

#[tokio::test(start_paused = true)]
async fn disconnect_is_idempotent() {
    let f = fixture().await;
    f.manager.scan(SCAN).await.unwrap();
    f.manager.connect(BP).await.unwrap();
    let mut events = f.manager.subscribe();

    f.manager.disconnect(BP).await.unwrap();
    assert_eq!(f.manager.connection_state(BP), ConnectionState::Disconnected);
    assert!(!f.transport.is_connected(BP));
    assert_eq!(
        f.transport
            .subscriber_count(BP, uuids::BLOOD_PRESSURE_MEASUREMENT),
        0
    );

    let emitted = drain(&mut events);
    assert!(emitted.iter().any(|e| matches!(
        e,
        ManagerEvent::DeviceDisconnected {
            reason: DisconnectReason::UserRequested,
            ..
        }
    )));

    f.manager.disconnect(BP).await.unwrap();
    f.manager.disconnect("never-seen").await.unwrap();
    assert!(drain(&mut events).is_empty());

    let paired = f.manager.pairing().get(BP).await.unwrap();
    assert_eq!(paired.device.connection_state, ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_in_flight_connect() {
    let f = fixture().await;
    f.manager.scan(SCAN).await.unwrap();
    f.transport.set_connect_latency(Duration::from_secs(5));

    let manager = Arc::clone(&f.manager);
    let connecting = tokio::spawn(async move { manager.connect(BP).await });
    wait_for_state(&f.manager, BP, ConnectionState::Connecting).await;

    f.manager.disconnect(BP).await.unwrap();
    assert!(connecting.await.unwrap().is_err());
    assert_eq!(f.manager.connection_state(BP), ConnectionState::Disconnected);
    assert_eq!(f.transport.cancelled_connections(), vec![BP.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn forget_survives_restart() {
    let f = fixture().await;
    f.manager.scan(SCAN).await.unwrap();
    f.manager.connect(BP).await.unwrap();
    f.manager.connect(GLUCOSE).await.unwrap();

    f.manager.forget_device(BP).await.unwrap();
    assert_eq!(f.manager.connection_state(BP), ConnectionState::Disconnected);
    assert!(!f.manager.pairing().contains(BP).await);

    let restarted = restart(&f.transport, &f.backend, ManagerConfig::default()).await;
    let ids: Vec<String> = restarted
        .paired_devices()
        .await
        .into_iter()
        .map(|p| p.device.id)
        .collect();
    assert_eq!(ids, vec![GLUCOSE.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn forget_with_failing_store_reports_error() {
    let f = fixture().await;
    f.manager.scan(SCAN).await.unwrap();
    f.manager.connect(BP).await.unwrap();
    let mut events = f.manager.subscribe();

    f.backend.set_fail_writes(true);
    f.manager.forget_device(BP).await.unwrap();
    assert!(!f.manager.pairing().contains(BP).await);

    let event = wait_for(&mut events, |e| matches!(e, ManagerEvent::Error { .. })).await;
    assert!(matches!(
        event,
        ManagerEvent::Error {
            kind: ErrorKind::Persistence,
            ..
        }
    ));
}

// --- Auto-reconnect ---

async fn paired_fixture(count: usize, config: ManagerConfig) -> Fixture {
    let transport = Arc::new(MockTransport::new());
    let backend = Arc::new(MemoryStore::new());
    let pairing = PairingStore::load(backend.clone()).await;
    for i in 0..count {
        let id = format!("BB:00:00:00:00:{:02X}", i);
        transport.add_peripheral(MockPeripheral::new(&id, "BP Monitor", DeviceKind::BloodPressure));
        let device = Device::new(id, "BP Monitor", vec![uuids::BLOOD_PRESSURE_SERVICE]);
        let connected_at = datetime!(2024-01-01 00:00 UTC) + time::Duration::days(i as i64);
        pairing.record_connection(&device, connected_at).await.unwrap();
    }
    drop(pairing);
    let manager = restart(&transport, &backend, config).await;
    Fixture {
        transport,
        backend,
        manager,
    }
}

#[tokio::test(start_paused = true)]
async fn auto_reconnect_never_exceeds_three_attempts() {
    let f = paired_fixture(6, ManagerConfig::default()).await;
    f.transport.set_connect_latency(Duration::from_secs(1));

    let results = f.manager.auto_reconnect().await;
    assert_eq!(f.transport.connect_calls(), 3);
    assert_eq!(f.transport.max_concurrent_connects(), 3);
    assert!(results.values().all(|r| r.is_ok()));

    // Most recently connected first.
    let mut selected: Vec<&str> = results.keys().map(String::as_str).collect();
    selected.sort_unstable();
    assert_eq!(
        selected,
        ["BB:00:00:00:00:03", "BB:00:00:00:00:04", "BB:00:00:00:00:05"]
    );
    assert_eq!(f.manager.connected_devices().len(), 3);
    assert_eq!(
        f.manager.connection_state("BB:00:00:00:00:00"),
        ConnectionState::Disconnected
    );
}

#[tokio::test(start_paused = true)]
async fn auto_reconnect_picks_up_remaining_devices_on_next_call() {
    let f = paired_fixture(5, ManagerConfig::default()).await;
    assert_eq!(f.manager.auto_reconnect().await.len(), 3);

    let second = f.manager.auto_reconnect().await;
    let mut selected: Vec<&str> = second.keys().map(String::as_str).collect();
    selected.sort_unstable();
    assert_eq!(selected, ["BB:00:00:00:00:00", "BB:00:00:00:00:01"]);
    assert_eq!(f.manager.connected_devices().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn auto_reconnect_limit_can_be_lowered() {
    let f = paired_fixture(3, ManagerConfig::default().max_concurrent_reconnects(1)).await;
    f.transport.set_connect_latency(Duration::from_secs(1));

    f.manager.auto_reconnect().await;
    assert_eq!(f.transport.max_concurrent_connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn auto_reconnect_tolerates_partial_failure() {
    let f = paired_fixture(3, ManagerConfig::default()).await;
    f.transport.set_connect_failure("BB:00:00:00:00:01", true);
    f.manager
        .set_device_auto_connect("BB:00:00:00:00:02", false)
        .await
        .unwrap();

    let results = f.manager.auto_reconnect().await;
    assert_eq!(results.len(), 2);
    assert!(results["BB:00:00:00:00:00"].is_ok());
    assert!(matches!(
        results["BB:00:00:00:00:01"],
        Err(Error::ConnectionFailed { .. })
    ));
    assert_eq!(
        f.manager.connection_state("BB:00:00:00:00:02"),
        ConnectionState::Disconnected
    );
}

#[tokio::test(start_paused = true)]
async fn auto_reconnect_respects_global_flag() {
    let f = paired_fixture(2, ManagerConfig::default()).await;
    f.manager.set_auto_connect(false).await.unwrap();

    assert!(f.manager.auto_reconnect().await.is_empty());
    assert_eq!(f.transport.connect_calls(), 0);

    let restarted = restart(&f.transport, &f.backend, ManagerConfig::default()).await;
    assert!(restarted.auto_reconnect().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn auto_reconnect_skips_connected_devices() {
    let f = paired_fixture(2, ManagerConfig::default()).await;
    f.manager.auto_reconnect().await;
    assert_eq!(f.transport.connect_calls(), 2);

    assert!(f.manager.auto_reconnect().await.is_empty());
    assert_eq!(f.transport.connect_calls(), 2);
}

// --- Platform events ---

#[tokio::test(start_paused = true)]
async fn power_on_triggers_auto_reconnect() {
    let f = paired_fixture(2, ManagerConfig::default()).await;
    f.manager.start().await.unwrap();
    let mut events = f.manager.subscribe();

    f.transport.set_radio_state(RadioState::PoweredOn);
    for _ in 0..2 {
        wait_for(&mut events, |e| matches!(e, ManagerEvent::DeviceReady { .. })).await;
    }
    assert_eq!(f.manager.connected_devices().len(), 2);
    f.manager.shutdown().await;
    assert!(f.manager.connected_devices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn link_loss_tears_down_session() {
    let f = fixture().await;
    f.manager.start().await.unwrap();
    f.manager.scan(SCAN).await.unwrap();
    f.manager.connect(BP).await.unwrap();
    let mut events = f.manager.subscribe();

    f.transport.drop_link(BP);
    let event = wait_for(&mut events, |e| {
        matches!(e, ManagerEvent::DeviceDisconnected { .. })
    })
    .await;
    assert!(matches!(
        event,
        ManagerEvent::DeviceDisconnected {
            reason: DisconnectReason::ConnectionLost,
            ..
        }
    ));
    assert_eq!(f.manager.connection_state(BP), ConnectionState::Disconnected);

    f.manager.connect(BP).await.unwrap();
    assert_eq!(f.manager.connection_state(BP), ConnectionState::Ready);
}

#[tokio::test(start_paused = true)]
async fn radio_off_drops_every_session() {
    let f = fixture().await;
    f.manager.start().await.unwrap();
    f.manager.scan(SCAN).await.unwrap();
    f.manager.connect(BP).await.unwrap();
    f.manager.connect(GLUCOSE).await.unwrap();
    let mut events = f.manager.subscribe();

    f.transport.set_radio_state(RadioState::PoweredOff);
    for _ in 0..2 {
        let event = wait_for(&mut events, |e| {
            matches!(e, ManagerEvent::DeviceDisconnected { .. })
        })
        .await;
        assert!(matches!(
            event,
            ManagerEvent::DeviceDisconnected {
                reason: DisconnectReason::BluetoothPoweredOff,
                ..
            }
        ));
    }
    assert!(f.manager.connected_devices().is_empty());
}
