//! Connection manager for multiple health devices.
//!
//! [`ConnectionManager`] owns the discovered set, one session per connected
//! device, and the pairing store. Transitions for one device are serialized
//! by a per-device lock; different devices progress concurrently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use futures::future::join_all;
use time::OffsetDateTime;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use medlink_types::uuid::HEALTH_SERVICES;
use medlink_types::{ConnectionState, Device, Measurement, PairedDevice};

use crate::adapter::{DeviceAdapter, MeasurementCallback, Subscription};
use crate::config::{MAX_CONCURRENT_RECONNECTS, ManagerConfig};
use crate::error::{Error, Result};
use crate::events::{DisconnectReason, EventDispatcher, EventReceiver, ManagerEvent};
use crate::factory::AdapterFactory;
use crate::pairing::PairingStore;
use crate::transport::{Advertisement, RadioState, Transport, TransportEvent};
use crate::util::lock;
use crate::validation::validate;

/// An established connection: the adapter and its notification handles.
struct Session {
    adapter: Arc<dyn DeviceAdapter>,
    subscriptions: Vec<Subscription>,
}

/// Per-device bookkeeping.
#[derive(Default)]
struct DeviceEntry {
    session: tokio::sync::Mutex<Option<Session>>,
    state: Mutex<ConnectionState>,
    connect_cancel: Mutex<Option<CancellationToken>>,
    connecting: AtomicBool,
}

impl DeviceEntry {
    fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    /// Claim the connect slot, or `None` if a connect is already running.
    fn begin_connect(&self) -> Option<ConnectClaim<'_>> {
        (!self.connecting.swap(true, Ordering::AcqRel)).then_some(ConnectClaim(self))
    }
}

/// Held for the whole of one connect attempt.
struct ConnectClaim<'a>(&'a DeviceEntry);

impl Drop for ConnectClaim<'_> {
    fn drop(&mut self) {
        self.0.connecting.store(false, Ordering::Release);
    }
}

/// Releases the scan slot when a scan ends, however it ends.
struct ScanSlot<'a>(&'a Mutex<Option<CancellationToken>>);

impl Drop for ScanSlot<'_> {
    fn drop(&mut self) {
        lock(self.0).take();
    }
}

/// Discovers, connects and supervises BLE health devices.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use medlink_core::{BtleplugTransport, ConnectionManager, ManagerConfig, PairingStore};
/// use medlink_types::MemoryStore;
///
/// # async fn example() -> medlink_core::Result<()> {
/// let transport = Arc::new(BtleplugTransport::new().await?);
/// let pairing = PairingStore::load(Arc::new(MemoryStore::new())).await;
/// let manager = Arc::new(ConnectionManager::new(transport, pairing, ManagerConfig::default())?);
/// manager.start().await?;
///
/// let mut events = manager.subscribe();
/// for device in manager.scan(None).await? {
///     manager.connect(&device.id).await?;
/// }
/// while let Ok(event) = events.recv().await {
///     println!("{:?}", event);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    pairing: Arc<PairingStore>,
    config: ManagerConfig,
    events: EventDispatcher,
    discovered: RwLock<HashMap<String, Device>>,
    entries: Mutex<HashMap<String, Arc<DeviceEntry>>>,
    scan: Mutex<Option<CancellationToken>>,
    reconnect_limit: Semaphore,
    shutdown: CancellationToken,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("config", &self.config)
            .field("devices", &lock(&self.entries).len())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a manager.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `config` does not validate.
    pub fn new(
        transport: Arc<dyn Transport>,
        pairing: PairingStore,
        config: ManagerConfig,
    ) -> Result<Self> {
        config.validate()?;
        let permits = config.max_concurrent_reconnects.min(MAX_CONCURRENT_RECONNECTS);
        Ok(Self {
            transport,
            pairing: Arc::new(pairing),
            events: EventDispatcher::new(config.event_capacity),
            config,
            discovered: RwLock::new(HashMap::new()),
            entries: Mutex::new(HashMap::new()),
            scan: Mutex::new(None),
            reconnect_limit: Semaphore::new(permits),
            shutdown: CancellationToken::new(),
            event_loop: Mutex::new(None),
        })
    }

    /// Subscribe to manager events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// The manager configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// The pairing store.
    pub fn pairing(&self) -> &PairingStore {
        &self.pairing
    }

    /// Start following radio and link events from the transport.
    ///
    /// Calling this more than once has no effect.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if lock(&self.event_loop).is_some() {
            return Ok(());
        }
        let mut events = self.transport.events().await?;
        let manager = Arc::clone(self);
        let shutdown = self.shutdown.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = events.next() => match event {
                        Some(event) => manager.handle_transport_event(event).await,
                        None => {
                            warn!("Transport event stream ended");
                            break;
                        }
                    }
                }
            }
            debug!("Transport event loop stopped");
        });

        *lock(&self.event_loop) = Some(handle);
        info!("Connection manager started");
        Ok(())
    }

    /// Stop the event loop, any running scan, and every connection.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.stop_scan();
        let handle = lock(&self.event_loop).take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!("Transport event loop failed: {}", e);
        }
        self.teardown_all(DisconnectReason::Shutdown).await;
        if let Err(e) = self.pairing.flush().await {
            warn!("Pairing store not flushed on shutdown: {}", e);
        }
        info!("Connection manager stopped");
    }

    async fn handle_transport_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::RadioStateChanged(RadioState::PoweredOn) => {
                info!("Bluetooth powered on");
                if self.config.auto_reconnect_on_power_on && self.pairing.auto_connect().await {
                    let manager = Arc::clone(self);
                    tokio::spawn(async move {
                        manager.auto_reconnect().await;
                    });
                }
            }
            TransportEvent::RadioStateChanged(RadioState::PoweredOff) => {
                warn!("Bluetooth powered off, dropping all connections");
                self.stop_scan();
                self.teardown_all(DisconnectReason::BluetoothPoweredOff).await;
            }
            TransportEvent::RadioStateChanged(state) => {
                debug!("Radio state changed to {:?}", state);
            }
            TransportEvent::Disconnected { device_id } => {
                if self.teardown(&device_id, DisconnectReason::ConnectionLost).await {
                    warn!("Lost connection to {}", device_id);
                }
            }
        }
    }

    // --- Scanning ---

    /// Scan for devices until `duration` (or the configured scan timeout)
    /// elapses or [`stop_scan`](Self::stop_scan) is called.
    ///
    /// The discovered set is rebuilt from scratch. Returns the devices seen,
    /// strongest signal first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ScanInProgress`] if another scan is running and
    /// [`Error::BluetoothPoweredOff`] if the radio is off.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn scan(&self, duration: Option<Duration>) -> Result<Vec<Device>> {
        let token = {
            let mut scan = lock(&self.scan);
            if scan.is_some() {
                return Err(Error::ScanInProgress);
            }
            let token = CancellationToken::new();
            *scan = Some(token.clone());
            token
        };
        let _slot = ScanSlot(&self.scan);

        if self.transport.radio_state().await? != RadioState::PoweredOn {
            return Err(Error::BluetoothPoweredOff);
        }

        self.discovered.write().await.clear();
        let filter = if self.config.service_filter {
            HEALTH_SERVICES.to_vec()
        } else {
            Vec::new()
        };
        let mut advertisements = self.transport.start_scan(&filter).await?;

        let deadline = tokio::time::sleep(duration.unwrap_or_else(|| self.config.scan_timeout()));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Scan stopped");
                    break;
                }
                _ = &mut deadline => break,
                advertisement = advertisements.next() => match advertisement {
                    Some(advertisement) => self.on_advertisement(advertisement).await,
                    None => break,
                }
            }
        }
        drop(advertisements);

        if let Err(e) = self.transport.stop_scan().await {
            warn!("Failed to stop scan: {}", e);
        }

        let mut devices: Vec<Device> = self.discovered.read().await.values().cloned().collect();
        devices.sort_by(|a, b| b.rssi.cmp(&a.rssi).then_with(|| a.id.cmp(&b.id)));
        info!("Scan complete, found {} devices", devices.len());
        self.events.send(ManagerEvent::ScanComplete {
            count: devices.len(),
        });
        Ok(devices)
    }

    /// Stop a running scan. Does nothing when no scan is running.
    pub fn stop_scan(&self) {
        if let Some(token) = lock(&self.scan).as_ref() {
            token.cancel();
        }
    }

    /// Whether a scan is running.
    pub fn is_scanning(&self) -> bool {
        lock(&self.scan).is_some()
    }

    async fn on_advertisement(&self, advertisement: Advertisement) {
        let mut discovered = self.discovered.write().await;
        if let Some(device) = discovered.get_mut(&advertisement.device_id) {
            if advertisement.rssi.is_some() {
                device.rssi = advertisement.rssi;
            }
            if device.name.is_empty()
                && let Some(name) = advertisement.name
            {
                device.name = name;
            }
            return;
        }

        let mut device = Device::new(
            advertisement.device_id.clone(),
            advertisement.name.unwrap_or_default(),
            advertisement.services,
        )
        .with_rssi(advertisement.rssi);
        device.paired = self.pairing.contains(&device.id).await;
        device.connection_state = self.connection_state(&device.id);

        debug!(
            "Discovered {} ({}) kind={:?} rssi={:?}",
            device.name, device.id, device.kind, device.rssi
        );
        discovered.insert(device.id.clone(), device.clone());
        self.events.send(ManagerEvent::DeviceDiscovered { device });
    }

    // --- Connection lifecycle ---

    /// Connect to a discovered device using the configured connect timeout.
    pub async fn connect(&self, device_id: &str) -> Result<()> {
        self.connect_with_timeout(device_id, self.config.connect_timeout())
            .await
    }

    /// Connect to a discovered device and start measurement notifications.
    ///
    /// Already ready devices are left alone.
    ///
    /// # Errors
    ///
    /// - [`Error::DeviceNotFound`] if the device was not seen by the last scan
    /// - [`Error::AlreadyConnecting`] if a connect for the device is running
    /// - [`Error::UnsupportedDeviceType`] if no adapter fits the device
    /// - [`Error::ConnectionTimeout`] if the link is not up within `timeout`
    /// - [`Error::NotificationFailed`] if notifications cannot be enabled
    pub async fn connect_with_timeout(&self, device_id: &str, timeout: Duration) -> Result<()> {
        let device = self
            .discovered
            .read()
            .await
            .get(device_id)
            .cloned()
            .ok_or_else(|| Error::device_not_found(device_id))?;
        self.connect_device(device, timeout).await
    }

    #[tracing::instrument(level = "info", skip(self, device), fields(device_id = %device.id))]
    async fn connect_device(&self, device: Device, timeout: Duration) -> Result<()> {
        let device_id = device.id.clone();
        let entry = self.entry(&device_id);

        let Some(_claim) = entry.begin_connect() else {
            return Err(Error::AlreadyConnecting { device_id });
        };
        // A disconnect in progress holds the session; wait for it.
        let mut slot = entry.session.lock().await;

        if slot.as_ref().is_some_and(|s| s.adapter.is_ready()) {
            debug!("{} is already connected", device_id);
            return Ok(());
        }

        let adapter = AdapterFactory::create(
            &device,
            Arc::clone(&self.transport),
            &self.config.connection_config(),
        )?;

        let cancel = CancellationToken::new();
        *lock(&entry.connect_cancel) = Some(cancel.clone());
        self.set_state(&entry, &device_id, ConnectionState::Connecting)
            .await;
        info!("Connecting to {} as {}", device_id, adapter.profile());

        let attempt = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                Err(Error::connection_failed(&device_id, "connection attempt cancelled"))
            }
            result = tokio::time::timeout(timeout, adapter.connect()) => {
                result.unwrap_or_else(|_| Err(Error::connection_timeout(&device_id, timeout)))
            }
        };
        lock(&entry.connect_cancel).take();

        if let Err(e) = attempt {
            if cancel.is_cancelled() || matches!(e, Error::ConnectionTimeout { .. }) {
                if let Err(cancel_err) = self.transport.cancel_connection(&device_id).await {
                    warn!("Failed to cancel connection to {}: {}", device_id, cancel_err);
                }
            }
            warn!("Connection to {} failed: {}", device_id, e);
            self.set_state(&entry, &device_id, ConnectionState::Disconnected)
                .await;
            return Err(e);
        }

        let info = match adapter.read_device_info().await {
            Ok(info) if !info.is_empty() => Some(info),
            Ok(_) => None,
            Err(e) => {
                debug!("Device info unavailable for {}: {}", device_id, e);
                None
            }
        };
        let battery_level = adapter.get_battery_level().await.unwrap_or_else(|e| {
            debug!("Battery level unavailable for {}: {}", device_id, e);
            None
        });

        self.set_state(&entry, &device_id, ConnectionState::Connected)
            .await;
        self.events.send(ManagerEvent::DeviceConnected {
            device_id: device_id.clone(),
            info: info.clone(),
        });

        self.record_pairing(&device, info, battery_level).await;

        let callback = self.measurement_callback(&device_id);
        let subscription = match adapter.subscribe_to_measurements(callback).await {
            Ok(subscription) => subscription,
            Err(e) => {
                if let Err(disconnect_err) = adapter.disconnect().await {
                    debug!("Disconnect after failed subscribe: {}", disconnect_err);
                }
                self.set_state(&entry, &device_id, ConnectionState::Disconnected)
                    .await;
                let e = match e {
                    Error::NotificationFailed { .. } => e,
                    other => Error::notification_failed(
                        adapter.profile().measurement_characteristic(),
                        other.to_string(),
                    ),
                };
                warn!("Failed to enable notifications on {}: {}", device_id, e);
                return Err(e);
            }
        };

        let profile = adapter.profile();
        *slot = Some(Session {
            adapter,
            subscriptions: vec![subscription],
        });
        self.set_state(&entry, &device_id, ConnectionState::Ready)
            .await;
        self.events.send(ManagerEvent::DeviceReady {
            device_id: device_id.clone(),
            profile,
            battery_level,
        });
        info!("{} is ready", device_id);
        Ok(())
    }

    /// Update the pairing record in memory and write it in the background,
    /// so a slow store never delays readiness.
    async fn record_pairing(
        &self,
        device: &Device,
        info: Option<medlink_types::DeviceInfo>,
        battery_level: Option<u8>,
    ) {
        self.pairing
            .note_connection(device, OffsetDateTime::now_utc(), info, battery_level)
            .await;

        let pairing = Arc::clone(&self.pairing);
        let events = self.events.clone();
        let device_id = device.id.clone();
        tokio::spawn(async move {
            if let Err(e) = pairing.flush().await {
                events.send(ManagerEvent::error(Some(device_id.as_str()), &e));
            }
        });

        if let Some(discovered) = self.discovered.write().await.get_mut(&device.id) {
            discovered.paired = true;
        }
    }

    fn measurement_callback(&self, device_id: &str) -> MeasurementCallback {
        let events = self.events.clone();
        let device_id = device_id.to_string();
        Arc::new(move |result| match result {
            Ok(measurement) => {
                let validation = validate(&measurement);
                if !validation.is_valid {
                    debug!(
                        "Reading from {} failed validation: {:?}",
                        device_id, validation.errors
                    );
                }
                events.send(ManagerEvent::MeasurementReceived {
                    device_id: device_id.clone(),
                    measurement,
                    validation,
                });
            }
            Err(e) => {
                warn!("Dropping undecodable payload from {}: {}", device_id, e);
                events.send(ManagerEvent::error(Some(device_id.as_str()), &Error::Decode(e)));
            }
        })
    }

    /// Disconnect from a device.
    ///
    /// Cancels a running connect for the device. Disconnecting a device that
    /// is not connected does nothing and emits no event. Platform errors are
    /// logged, never returned.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn disconnect(&self, device_id: &str) -> Result<()> {
        self.teardown(device_id, DisconnectReason::UserRequested)
            .await;
        Ok(())
    }

    /// Disconnect (if needed) and delete the device's pairing record.
    ///
    /// A persistence failure is reported on the event stream; the record is
    /// still gone for this session.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn forget_device(&self, device_id: &str) -> Result<()> {
        self.teardown(device_id, DisconnectReason::UserRequested)
            .await;
        match self.pairing.remove(device_id).await {
            Ok(Some(_)) => info!("Forgot {}", device_id),
            Ok(None) => debug!("{} was not paired", device_id),
            Err(e) => {
                warn!("Forgot {} but could not persist: {}", device_id, e);
                self.events.send(ManagerEvent::error(Some(device_id), &e));
            }
        }
        if let Some(device) = self.discovered.write().await.get_mut(device_id) {
            device.paired = false;
        }
        Ok(())
    }

    /// Tear down a session. Returns whether there was one.
    async fn teardown(&self, device_id: &str, reason: DisconnectReason) -> bool {
        let Some(entry) = lock(&self.entries).get(device_id).cloned() else {
            return false;
        };
        if let Some(cancel) = lock(&entry.connect_cancel).as_ref() {
            cancel.cancel();
        }

        let mut slot = entry.session.lock().await;
        let Some(session) = slot.take() else {
            return false;
        };

        self.set_state(&entry, device_id, ConnectionState::Disconnecting)
            .await;
        for subscription in session.subscriptions {
            if let Err(e) = subscription.unsubscribe().await {
                debug!("Unsubscribe on {} failed: {}", device_id, e);
            }
        }
        if let Err(e) = session.adapter.disconnect().await {
            debug!("Platform disconnect of {} failed: {}", device_id, e);
        }
        self.set_state(&entry, device_id, ConnectionState::Disconnected)
            .await;
        self.events.send(ManagerEvent::DeviceDisconnected {
            device_id: device_id.to_string(),
            reason,
        });
        info!("Disconnected from {} ({:?})", device_id, reason);
        true
    }

    async fn teardown_all(&self, reason: DisconnectReason) {
        let ids: Vec<String> = lock(&self.entries).keys().cloned().collect();
        join_all(ids.iter().map(|id| self.teardown(id, reason))).await;
    }

    // --- Auto-reconnect ---

    /// Reconnect paired devices that have auto-connect enabled.
    ///
    /// Selects up to three devices that are not already connected, most
    /// recently connected first, and attempts them with the reconnect
    /// timeout. The configured limit bounds how many run at once, also
    /// across overlapping calls. Attempts are independent: one failure
    /// does not stop the others. Returns each attempted device with its
    /// outcome.
    #[tracing::instrument(level = "info", skip(self))]
    pub async fn auto_reconnect(&self) -> HashMap<String, Result<()>> {
        if !self.pairing.auto_connect().await {
            debug!("Auto-connect disabled, skipping reconnect");
            return HashMap::new();
        }

        let candidates: Vec<PairedDevice> = self
            .pairing
            .auto_connect_candidates()
            .await
            .into_iter()
            .filter(|paired| !self.connection_state(paired.id()).is_active())
            .take(MAX_CONCURRENT_RECONNECTS)
            .collect();
        if candidates.is_empty() {
            return HashMap::new();
        }
        info!("Auto-reconnecting {} devices", candidates.len());

        let timeout = self.config.reconnect_timeout();
        let attempts = candidates.into_iter().map(|paired| async move {
            let device_id = paired.device.id.clone();
            let result = match self.reconnect_limit.acquire().await {
                Ok(_permit) => self.connect_device(paired.device, timeout).await,
                Err(_) => Err(Error::connection_failed(&device_id, "reconnect limiter closed")),
            };
            if let Err(e) = &result {
                self.events.send(ManagerEvent::error(Some(device_id.as_str()), e));
            }
            (device_id, result)
        });

        let results: HashMap<_, _> = join_all(attempts).await.into_iter().collect();
        let succeeded = results.values().filter(|r| r.is_ok()).count();
        info!(
            "Auto-reconnect finished: {}/{} connected",
            succeeded,
            results.len()
        );
        results
    }

    // --- Forwarded device operations ---

    async fn adapter(&self, device_id: &str) -> Result<Arc<dyn DeviceAdapter>> {
        let entry = lock(&self.entries)
            .get(device_id)
            .cloned()
            .ok_or_else(|| Error::not_connected(device_id))?;
        let slot = entry.session.lock().await;
        slot.as_ref()
            .map(|session| Arc::clone(&session.adapter))
            .ok_or_else(|| Error::not_connected(device_id))
    }

    /// Ask a connected device to send a measurement.
    pub async fn trigger_measurement(&self, device_id: &str) -> Result<()> {
        self.adapter(device_id).await?.trigger_measurement().await
    }

    /// Read one measurement from a connected device.
    pub async fn read_measurement(&self, device_id: &str) -> Result<Measurement> {
        self.adapter(device_id).await?.read_measurement().await
    }

    /// Battery level of a connected device.
    pub async fn battery_level(&self, device_id: &str) -> Result<Option<u8>> {
        self.adapter(device_id).await?.get_battery_level().await
    }

    // --- Queries ---

    /// Devices seen by the last scan, strongest signal first.
    pub async fn discovered_devices(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.discovered.read().await.values().cloned().collect();
        devices.sort_by(|a, b| b.rssi.cmp(&a.rssi).then_with(|| a.id.cmp(&b.id)));
        devices
    }

    /// Paired devices with their current connection state.
    pub async fn paired_devices(&self) -> Vec<PairedDevice> {
        let mut devices = self.pairing.devices().await;
        for paired in &mut devices {
            paired.device.connection_state = self.connection_state(paired.id());
        }
        devices
    }

    /// Current state of a device.
    pub fn connection_state(&self, device_id: &str) -> ConnectionState {
        lock(&self.entries)
            .get(device_id)
            .map(|entry| entry.state())
            .unwrap_or_default()
    }

    /// Ids of devices that are connected or ready.
    pub fn connected_devices(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.entries)
            .iter()
            .filter(|(_, entry)| {
                matches!(
                    entry.state(),
                    ConnectionState::Connected | ConnectionState::Ready
                )
            })
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Enable or disable the global auto-connect policy.
    pub async fn set_auto_connect(&self, enabled: bool) -> Result<()> {
        self.pairing.set_auto_connect(enabled).await
    }

    /// Enable or disable auto-connect for one paired device.
    pub async fn set_device_auto_connect(&self, device_id: &str, enabled: bool) -> Result<()> {
        self.pairing
            .set_device_auto_connect(device_id, enabled)
            .await
    }

    // --- Internals ---

    fn entry(&self, device_id: &str) -> Arc<DeviceEntry> {
        Arc::clone(
            lock(&self.entries)
                .entry(device_id.to_string())
                .or_default(),
        )
    }

    async fn set_state(&self, entry: &DeviceEntry, device_id: &str, state: ConnectionState) {
        *lock(&entry.state) = state;
        if let Some(device) = self.discovered.write().await.get_mut(device_id) {
            device.connection_state = state;
        }
        self.pairing.set_connection_state(device_id, state).await;
        debug!("{} -> {}", device_id, state);
        self.events.send(ManagerEvent::StateChanged {
            device_id: device_id.to_string(),
            state,
        });
    }
}
