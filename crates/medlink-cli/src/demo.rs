//! Simulated devices for `--mock`.
//!
//! Deterministic readings so output is reproducible without hardware.

use std::sync::Arc;
use std::time::Duration;

use medlink_core::{MockPeripheral, MockTransport, uuids};
use medlink_types::{DeviceKind, sfloat};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const BLOOD_PRESSURE_ID: &str = "D0:00:00:00:00:01";
pub const GLUCOSE_ID: &str = "D0:00:00:00:00:02";
pub const OXIMETER_ID: &str = "D0:00:00:00:00:03";
pub const SCALE_ID: &str = "D0:00:00:00:00:04";

/// How often the simulated devices push a reading.
const FEED_INTERVAL: Duration = Duration::from_secs(3);

/// A mock transport populated with one device of each kind.
pub fn transport() -> MockTransport {
    let transport = MockTransport::new();
    transport.add_peripheral(
        MockPeripheral::new(BLOOD_PRESSURE_ID, "OMRON M7 Intelli IT", DeviceKind::BloodPressure)
            .with_rssi(-48),
    );
    transport.add_peripheral(
        MockPeripheral::new(GLUCOSE_ID, "Accu-Chek Guide", DeviceKind::Glucose)
            .with_rssi(-61)
            .with_battery(64)
            .with_stored_record(glucose_payload(42, 5.4)),
    );
    transport.add_peripheral(
        MockPeripheral::new(OXIMETER_ID, "Pulse Oximeter PO3", DeviceKind::PulseOximeter)
            .with_rssi(-70),
    );
    transport.add_peripheral(
        MockPeripheral::new(SCALE_ID, "Body Scale", DeviceKind::Scale).with_rssi(-77),
    );
    transport
}

/// Push a reading from every connected push-mode device until cancelled.
pub fn spawn_feed(mock: Arc<MockTransport>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick: u16 = 0;
        let mut interval = tokio::time::interval(FEED_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            let step = tick % 5;
            mock.notify(
                BLOOD_PRESSURE_ID,
                uuids::BLOOD_PRESSURE_MEASUREMENT,
                &blood_pressure_payload(118 + step, 76 + step, 68 + step),
            );
            mock.notify(
                OXIMETER_ID,
                uuids::PLX_SPOT_CHECK_MEASUREMENT,
                &oximetry_payload(97.0 + f64::from(step % 2), 64.0 + f64::from(step)),
            );
            mock.notify(
                SCALE_ID,
                uuids::WEIGHT_MEASUREMENT,
                &weight_payload(71.2 + f64::from(step) * 0.1),
            );
            tick = tick.wrapping_add(1);
        }
    })
}

/// Blood pressure in mmHg with pulse (flags `0x04`).
pub fn blood_pressure_payload(systolic: u16, diastolic: u16, pulse: u16) -> Vec<u8> {
    let map = diastolic + (systolic - diastolic) / 3;
    let mut bytes = vec![0x04];
    for value in [systolic, diastolic, map, pulse] {
        bytes.extend_from_slice(&(value * 10).to_le_bytes());
    }
    bytes
}

/// Glucose record in mmol/L (flags `0x04`, concentration in mol/L).
pub fn glucose_payload(sequence: u16, mmol_per_l: f64) -> Vec<u8> {
    let mut bytes = vec![0x04];
    bytes.extend_from_slice(&sequence.to_le_bytes());
    // 2024-03-15 07:45:00
    bytes.extend_from_slice(&[0xE8, 0x07, 0x03, 0x0F, 0x07, 0x2D, 0x00]);
    let concentration = sfloat::encode(mmol_per_l / 1000.0).unwrap_or(0x07FF);
    bytes.extend_from_slice(&concentration.to_le_bytes());
    bytes
}

fn oximetry_payload(spo2: f64, pulse: f64) -> Vec<u8> {
    let mut bytes = vec![0x00];
    for value in [spo2, pulse] {
        let raw = sfloat::encode(value).unwrap_or(0x07FF);
        bytes.extend_from_slice(&raw.to_le_bytes());
    }
    bytes
}

fn weight_payload(kilograms: f64) -> Vec<u8> {
    let raw = (kilograms / 0.005).round() as u16;
    let mut bytes = vec![0x00];
    bytes.extend_from_slice(&raw.to_le_bytes());
    bytes
}
