//! Utility functions for medlink-core.

use std::sync::{Mutex, MutexGuard};

use btleplug::platform::PeripheralId;

/// Address CoreBluetooth reports for every peripheral.
const HIDDEN_ADDRESS: &str = "00:00:00:00:00:00";

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms they wrap the MAC
/// address.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    strip_peripheral_debug(&format!("{:?}", id))
}

/// Create a stable device identifier from an address and peripheral ID.
///
/// Uses the Bluetooth address where the platform exposes one and falls back
/// to the peripheral ID on macOS.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    choose_identifier(address, || format_peripheral_id(peripheral_id))
}

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn strip_peripheral_debug(debug: &str) -> String {
    debug
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

fn choose_identifier(address: &str, fallback: impl FnOnce() -> String) -> String {
    if address == HIDDEN_ADDRESS || address.is_empty() {
        fallback()
    } else {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_choose_identifier_prefers_address() {
        let id = choose_identifier("AA:BB:CC:DD:EE:FF", || "fallback".to_string());
        assert_eq!(id, "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_choose_identifier_hidden_address() {
        let id = choose_identifier(HIDDEN_ADDRESS, || "5F0E7C1A".to_string());
        assert_eq!(id, "5F0E7C1A");
        let id = choose_identifier("", || "5F0E7C1A".to_string());
        assert_eq!(id, "5F0E7C1A");
    }

    #[test]
    fn test_strip_peripheral_debug() {
        assert_eq!(
            strip_peripheral_debug("PeripheralId(4b2e1c9a-0000-4000-8000-00805f9b34fb)"),
            "4b2e1c9a-0000-4000-8000-00805f9b34fb"
        );
        assert_eq!(strip_peripheral_debug("plain"), "plain");
    }
}
