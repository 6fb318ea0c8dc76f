//! Durable pairing records and the auto-connect policy.
//!
//! The in-memory map is authoritative for the session. Every mutation
//! bumps a revision and writes a full snapshot to the backing
//! [`KeyValueStore`]; a failed write leaves the store dirty and the next
//! snapshot carries the missed change along with its own.
//!
//! Snapshots are taken and written under a separate writer lock, so readers
//! and in-memory updates never wait on the backend and snapshots land in
//! revision order.

use std::collections::BTreeMap;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use medlink_types::{ConnectionState, Device, DeviceInfo, KeyValueStore, PairedDevice, StoreError};

use crate::error::{Error, Result};

/// Key holding the JSON array of paired devices.
pub const PAIRED_DEVICES_KEY: &str = "paired_devices";

/// Key holding the global auto-connect flag.
pub const AUTO_CONNECT_KEY: &str = "auto_connect";

#[derive(Debug)]
struct State {
    devices: BTreeMap<String, PairedDevice>,
    auto_connect: bool,
    revision: u64,
    saved_revision: u64,
}

impl State {
    fn touch(&mut self) {
        self.revision += 1;
    }

    fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision
    }

    fn upsert(&mut self, device: &Device, now: OffsetDateTime) {
        match self.devices.get_mut(&device.id) {
            Some(existing) => {
                existing.record_connection(device, now);
                debug!(
                    "Refreshed pairing for {} ({} connections)",
                    device.id, existing.connection_count
                );
            }
            None => {
                info!("Paired new device {}", device.id);
                self.devices
                    .insert(device.id.clone(), PairedDevice::new(device.clone(), now));
            }
        }
        self.touch();
    }

    fn apply_details(&mut self, device_id: &str, info: Option<DeviceInfo>, battery_level: Option<u8>) {
        let Some(record) = self.devices.get_mut(device_id) else {
            return;
        };
        if info.is_some() {
            record.device_info = info;
        }
        if battery_level.is_some() {
            record.battery_level = battery_level;
        }
        self.touch();
    }
}

/// Paired devices, backed by a [`KeyValueStore`].
pub struct PairingStore {
    backend: Arc<dyn KeyValueStore>,
    state: Mutex<State>,
    writer: Mutex<()>,
}

impl std::fmt::Debug for PairingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingStore").finish_non_exhaustive()
    }
}

impl PairingStore {
    /// Load pairing records from `backend`.
    ///
    /// Unreadable or corrupt data is logged and treated as empty, so a bad
    /// store never prevents the engine from starting.
    pub async fn load(backend: Arc<dyn KeyValueStore>) -> Self {
        let reader = Arc::clone(&backend);
        let loaded = tokio::task::spawn_blocking(move || {
            (
                reader.get(PAIRED_DEVICES_KEY),
                reader.get(AUTO_CONNECT_KEY),
            )
        })
        .await;

        let (devices, auto_connect) = match loaded {
            Ok((devices, auto_connect)) => (devices, auto_connect),
            Err(e) => {
                warn!("Pairing store load task failed: {}", e);
                (Ok(None), Ok(None))
            }
        };

        let devices = parse_devices(devices);
        let auto_connect = parse_auto_connect(auto_connect);
        info!(
            "Loaded {} paired devices (auto-connect {})",
            devices.len(),
            if auto_connect { "on" } else { "off" }
        );

        Self {
            backend,
            state: Mutex::new(State {
                devices,
                auto_connect,
                revision: 0,
                saved_revision: 0,
            }),
            writer: Mutex::new(()),
        }
    }

    /// All paired devices, ordered by id.
    pub async fn devices(&self) -> Vec<PairedDevice> {
        self.state.lock().await.devices.values().cloned().collect()
    }

    /// The pairing record for `device_id`.
    pub async fn get(&self, device_id: &str) -> Option<PairedDevice> {
        self.state.lock().await.devices.get(device_id).cloned()
    }

    /// Whether `device_id` is paired.
    pub async fn contains(&self, device_id: &str) -> bool {
        self.state.lock().await.devices.contains_key(device_id)
    }

    /// Number of paired devices.
    pub async fn len(&self) -> usize {
        self.state.lock().await.devices.len()
    }

    /// Whether no device is paired.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Devices eligible for auto-reconnect, most recently connected first.
    pub async fn auto_connect_candidates(&self) -> Vec<PairedDevice> {
        let state = self.state.lock().await;
        let mut candidates: Vec<_> = state
            .devices
            .values()
            .filter(|d| d.auto_connect)
            .cloned()
            .collect();
        candidates.sort_by(|a, b| b.last_connected_at.cmp(&a.last_connected_at));
        candidates
    }

    /// The global auto-connect flag.
    pub async fn auto_connect(&self) -> bool {
        self.state.lock().await.auto_connect
    }

    /// Whether some change has not reached the backend yet.
    pub async fn is_dirty(&self) -> bool {
        self.state.lock().await.is_dirty()
    }

    /// Create or refresh the record for a successful connection.
    ///
    /// The in-memory record is updated even if persisting fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if the snapshot could not be written.
    pub async fn record_connection(&self, device: &Device, now: OffsetDateTime) -> Result<()> {
        self.state.lock().await.upsert(device, now);
        self.persist().await
    }

    /// Record a connection with its details in memory only.
    ///
    /// The change reaches the backend on the next [`flush`](Self::flush) or
    /// persisting mutation.
    pub async fn note_connection(
        &self,
        device: &Device,
        now: OffsetDateTime,
        info: Option<DeviceInfo>,
        battery_level: Option<u8>,
    ) {
        let mut state = self.state.lock().await;
        state.upsert(device, now);
        state.apply_details(&device.id, info, battery_level);
    }

    /// Store the latest device information and battery level.
    pub async fn update_details(
        &self,
        device_id: &str,
        info: Option<DeviceInfo>,
        battery_level: Option<u8>,
    ) -> Result<()> {
        self.state
            .lock()
            .await
            .apply_details(device_id, info, battery_level);
        self.persist().await
    }

    /// Record the current connection state of a paired device.
    ///
    /// Connection state is not persisted, so this never writes.
    pub async fn set_connection_state(&self, device_id: &str, connection_state: ConnectionState) {
        if let Some(record) = self.state.lock().await.devices.get_mut(device_id) {
            record.device.connection_state = connection_state;
        }
    }

    /// Enable or disable auto-reconnect for one device.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] if the device is not paired, or
    /// [`Error::Persistence`] if the snapshot could not be written.
    pub async fn set_device_auto_connect(&self, device_id: &str, enabled: bool) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            let record = state
                .devices
                .get_mut(device_id)
                .ok_or_else(|| Error::device_not_found(device_id))?;
            record.auto_connect = enabled;
            state.touch();
        }
        self.persist().await
    }

    /// Enable or disable the global auto-connect policy.
    pub async fn set_auto_connect(&self, enabled: bool) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            state.auto_connect = enabled;
            state.touch();
        }
        self.persist().await
    }

    /// Delete the record for `device_id`, returning it.
    ///
    /// The record is removed from memory even if persisting fails.
    pub async fn remove(&self, device_id: &str) -> Result<Option<PairedDevice>> {
        let removed = {
            let mut state = self.state.lock().await;
            let removed = state.devices.remove(device_id);
            if removed.is_some() {
                state.touch();
            }
            removed
        };
        self.persist().await?;
        Ok(removed)
    }

    /// Write the current snapshot if any change is unwritten.
    pub async fn flush(&self) -> Result<()> {
        self.persist().await
    }

    async fn persist(&self) -> Result<()> {
        let _writer = self.writer.lock().await;
        let (revision, devices, auto_connect) = {
            let state = self.state.lock().await;
            if !state.is_dirty() {
                return Ok(());
            }
            let records: Vec<&PairedDevice> = state.devices.values().collect();
            let devices = serde_json::to_string(&records).map_err(|e| StoreError::Malformed {
                key: PAIRED_DEVICES_KEY.to_string(),
                message: e.to_string(),
            })?;
            (state.revision, devices, state.auto_connect.to_string())
        };

        let backend = Arc::clone(&self.backend);
        let written = tokio::task::spawn_blocking(move || {
            backend.set(PAIRED_DEVICES_KEY, &devices)?;
            backend.set(AUTO_CONNECT_KEY, &auto_connect)
        })
        .await
        .unwrap_or_else(|e| Err(StoreError::Backend(format!("write task failed: {}", e))));

        match written {
            Ok(()) => {
                let mut state = self.state.lock().await;
                state.saved_revision = state.saved_revision.max(revision);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to persist pairing store: {}", e);
                Err(Error::Persistence(e))
            }
        }
    }
}

fn parse_devices(
    raw: std::result::Result<Option<String>, StoreError>,
) -> BTreeMap<String, PairedDevice> {
    let json = match raw {
        Ok(Some(json)) => json,
        Ok(None) => return BTreeMap::new(),
        Err(e) => {
            warn!("Failed to read paired devices: {}", e);
            return BTreeMap::new();
        }
    };

    match serde_json::from_str::<Vec<PairedDevice>>(&json) {
        Ok(records) => records
            .into_iter()
            .map(|mut record| {
                record.device.paired = true;
                record.device.connection_state = ConnectionState::Disconnected;
                (record.device.id.clone(), record)
            })
            .collect(),
        Err(e) => {
            warn!("Ignoring corrupt paired device data: {}", e);
            BTreeMap::new()
        }
    }
}

fn parse_auto_connect(raw: std::result::Result<Option<String>, StoreError>) -> bool {
    match raw {
        Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
            warn!("Ignoring corrupt auto-connect flag: {}", e);
            true
        }),
        Ok(None) => true,
        Err(e) => {
            warn!("Failed to read auto-connect flag: {}", e);
            true
        }
    }
}
