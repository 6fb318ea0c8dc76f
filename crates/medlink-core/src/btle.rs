//! [`Transport`] implementation backed by btleplug.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, Characteristic, Manager as _, Peripheral as _,
    ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::transport::{
    Advertisement, AdvertisementStream, GattService, NotificationStream, RadioState, Transport,
    TransportEvent, TransportEventStream,
};
use crate::util::{create_identifier, format_peripheral_id};

type PeripheralMap = Arc<RwLock<HashMap<String, Peripheral>>>;

/// BLE transport using the first available platform adapter.
pub struct BtleplugTransport {
    adapter: Adapter,
    peripherals: PeripheralMap,
}

impl BtleplugTransport {
    /// Open the first available Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BluetoothPoweredOff`] if the system has no adapter.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(Error::BluetoothPoweredOff)?;
        Ok(Self::with_adapter(adapter))
    }

    /// Wrap an already opened adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            peripherals: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn peripheral(&self, device_id: &str) -> Result<Peripheral> {
        if let Some(peripheral) = self.peripherals.read().await.get(device_id) {
            return Ok(peripheral.clone());
        }

        // Not seen in this session's scans; the platform may still know it.
        for peripheral in self.adapter.peripherals().await? {
            if identifier_of(&peripheral).await == device_id {
                self.peripherals
                    .write()
                    .await
                    .insert(device_id.to_string(), peripheral.clone());
                return Ok(peripheral);
            }
        }

        Err(Error::device_not_found(device_id))
    }

    fn characteristic(&self, peripheral: &Peripheral, uuid: Uuid) -> Result<Characteristic> {
        peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| Error::characteristic_not_found(uuid))
    }
}

async fn identifier_of(peripheral: &Peripheral) -> String {
    match peripheral.properties().await {
        Ok(Some(properties)) => create_identifier(&properties.address.to_string(), &peripheral.id()),
        _ => format_peripheral_id(&peripheral.id()),
    }
}

async fn advertisement_for(
    adapter: &Adapter,
    peripherals: &PeripheralMap,
    id: &PeripheralId,
) -> Option<Advertisement> {
    let peripheral = adapter.peripheral(id).await.ok()?;
    let properties = match peripheral.properties().await {
        Ok(Some(properties)) => properties,
        Ok(None) => return None,
        Err(e) => {
            debug!("Error reading peripheral properties: {}", e);
            return None;
        }
    };

    let device_id = create_identifier(&properties.address.to_string(), id);
    peripherals
        .write()
        .await
        .insert(device_id.clone(), peripheral);

    Some(Advertisement {
        device_id,
        name: properties.local_name,
        rssi: properties.rssi,
        services: properties.services,
    })
}

fn radio_state(state: CentralState) -> RadioState {
    match state {
        CentralState::PoweredOn => RadioState::PoweredOn,
        CentralState::PoweredOff => RadioState::PoweredOff,
        _ => RadioState::Unknown,
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    async fn radio_state(&self) -> Result<RadioState> {
        Ok(radio_state(self.adapter.adapter_state().await?))
    }

    async fn events(&self) -> Result<TransportEventStream> {
        let events = self.adapter.events().await?;
        let peripherals = Arc::clone(&self.peripherals);

        let stream = events.filter_map(move |event| {
            let peripherals = Arc::clone(&peripherals);
            async move {
                match event {
                    CentralEvent::StateUpdate(state) => {
                        Some(TransportEvent::RadioStateChanged(radio_state(state)))
                    }
                    CentralEvent::DeviceDisconnected(id) => {
                        let known = peripherals.read().await;
                        let device_id = known
                            .iter()
                            .find(|(_, p)| p.id() == id)
                            .map(|(device_id, _)| device_id.clone())
                            .unwrap_or_else(|| format_peripheral_id(&id));
                        Some(TransportEvent::Disconnected { device_id })
                    }
                    _ => None,
                }
            }
        });

        Ok(Box::pin(stream))
    }

    async fn start_scan(&self, services: &[Uuid]) -> Result<AdvertisementStream> {
        let events = self.adapter.events().await?;
        self.adapter
            .start_scan(ScanFilter {
                services: services.to_vec(),
            })
            .await?;
        info!("BLE scan started ({} service filters)", services.len());

        let adapter = self.adapter.clone();
        let peripherals = Arc::clone(&self.peripherals);

        let stream = events.filter_map(move |event| {
            let adapter = adapter.clone();
            let peripherals = Arc::clone(&peripherals);
            async move {
                match event {
                    CentralEvent::DeviceDiscovered(id)
                    | CentralEvent::DeviceUpdated(id)
                    | CentralEvent::ServicesAdvertisement { id, .. } => {
                        advertisement_for(&adapter, &peripherals, &id).await
                    }
                    _ => None,
                }
            }
        });

        Ok(Box::pin(stream))
    }

    async fn stop_scan(&self) -> Result<()> {
        if let Err(e) = self.adapter.stop_scan().await {
            // Stopping an idle scanner is reported as an error on some platforms.
            debug!("stop_scan: {}", e);
        }
        Ok(())
    }

    async fn connect(&self, device_id: &str) -> Result<()> {
        let peripheral = self.peripheral(device_id).await?;
        peripheral
            .connect()
            .await
            .map_err(|e| Error::connection_failed(device_id, e.to_string()))
    }

    async fn cancel_connection(&self, device_id: &str) -> Result<()> {
        // btleplug has no explicit cancel; disconnecting aborts a pending link.
        let peripheral = self.peripheral(device_id).await?;
        if let Err(e) = peripheral.disconnect().await {
            warn!("Failed to cancel connection to {}: {}", device_id, e);
        }
        Ok(())
    }

    async fn disconnect(&self, device_id: &str) -> Result<()> {
        let peripheral = self.peripheral(device_id).await?;
        peripheral.disconnect().await?;
        Ok(())
    }

    async fn discover_services(&self, device_id: &str) -> Result<Vec<GattService>> {
        let peripheral = self.peripheral(device_id).await?;
        peripheral.discover_services().await?;

        let services = peripheral
            .services()
            .into_iter()
            .map(|service| {
                debug!("  Service: {}", service.uuid);
                GattService::new(
                    service.uuid,
                    service
                        .characteristics
                        .iter()
                        .map(|c| c.uuid)
                        .collect::<Vec<_>>(),
                )
            })
            .collect::<Vec<_>>();
        debug!("Found {} services on {}", services.len(), device_id);
        Ok(services)
    }

    async fn read(&self, device_id: &str, characteristic: Uuid) -> Result<Vec<u8>> {
        let peripheral = self.peripheral(device_id).await?;
        let characteristic = self.characteristic(&peripheral, characteristic)?;
        Ok(peripheral.read(&characteristic).await?)
    }

    async fn write(&self, device_id: &str, characteristic: Uuid, data: &[u8]) -> Result<()> {
        let peripheral = self.peripheral(device_id).await?;
        let characteristic = self.characteristic(&peripheral, characteristic)?;
        peripheral
            .write(&characteristic, data, WriteType::WithResponse)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, device_id: &str, characteristic: Uuid) -> Result<NotificationStream> {
        let peripheral = self.peripheral(device_id).await?;
        let target = self.characteristic(&peripheral, characteristic)?;

        // Open the stream first so no notification slips in between.
        let notifications = peripheral.notifications().await?;
        peripheral
            .subscribe(&target)
            .await
            .map_err(|e| Error::notification_failed(characteristic, e.to_string()))?;

        let stream = notifications.filter_map(move |notification| async move {
            (notification.uuid == characteristic).then_some(notification.value)
        });
        Ok(Box::pin(stream))
    }

    async fn unsubscribe(&self, device_id: &str, characteristic: Uuid) -> Result<()> {
        let peripheral = self.peripheral(device_id).await?;
        let target = self.characteristic(&peripheral, characteristic)?;
        peripheral.unsubscribe(&target).await?;
        Ok(())
    }
}
