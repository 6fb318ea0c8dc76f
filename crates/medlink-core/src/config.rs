//! Connection manager configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::adapter::ConnectionConfig;
use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_CAPACITY;

/// Hard ceiling on simultaneous auto-reconnect attempts.
pub const MAX_CONCURRENT_RECONNECTS: usize = 3;

/// Configuration for the [`ConnectionManager`](crate::ConnectionManager).
///
/// Deserializes from partial input; missing fields take their defaults.
///
/// ```
/// use medlink_core::ManagerConfig;
///
/// let config: ManagerConfig = serde_json::from_str(r#"{"connect_timeout_secs": 20}"#).unwrap();
/// assert_eq!(config.connect_timeout_secs, 20);
/// assert_eq!(config.reconnect_timeout_secs, 8);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// How long a scan runs unless stopped.
    pub scan_timeout_secs: u64,
    /// Timeout for user-initiated connects.
    pub connect_timeout_secs: u64,
    /// Timeout for auto-reconnect attempts.
    pub reconnect_timeout_secs: u64,
    /// Timeout for reads, writes and requested measurements.
    pub read_timeout_secs: u64,
    /// Events buffered per subscriber before it starts lagging.
    pub event_capacity: usize,
    /// Simultaneous auto-reconnect attempts, between 1 and 3.
    pub max_concurrent_reconnects: usize,
    /// Reconnect paired devices when the radio powers on.
    pub auto_reconnect_on_power_on: bool,
    /// Scan only for the supported health services.
    pub service_filter: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            scan_timeout_secs: 10,
            connect_timeout_secs: 15,
            reconnect_timeout_secs: 8,
            read_timeout_secs: 5,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            max_concurrent_reconnects: MAX_CONCURRENT_RECONNECTS,
            auto_reconnect_on_power_on: true,
            service_filter: true,
        }
    }
}

impl ManagerConfig {
    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for zero timeouts, a zero event
    /// capacity, or a reconnect limit outside `1..=3`.
    pub fn validate(&self) -> Result<()> {
        let timeouts = [
            ("scan_timeout_secs", self.scan_timeout_secs),
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("reconnect_timeout_secs", self.reconnect_timeout_secs),
            ("read_timeout_secs", self.read_timeout_secs),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, secs)| *secs == 0) {
            return Err(Error::invalid_config(format!("{} must be positive", name)));
        }
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be positive"));
        }
        if !(1..=MAX_CONCURRENT_RECONNECTS).contains(&self.max_concurrent_reconnects) {
            return Err(Error::invalid_config(format!(
                "max_concurrent_reconnects must be between 1 and {}, got {}",
                MAX_CONCURRENT_RECONNECTS, self.max_concurrent_reconnects
            )));
        }
        Ok(())
    }

    /// Scan duration.
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    /// User connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Auto-reconnect timeout.
    pub fn reconnect_timeout(&self) -> Duration {
        Duration::from_secs(self.reconnect_timeout_secs)
    }

    /// GATT timeouts handed to each adapter.
    pub fn connection_config(&self) -> ConnectionConfig {
        let read = Duration::from_secs(self.read_timeout_secs);
        ConnectionConfig::default()
            .read_timeout(read)
            .write_timeout(read)
            .discovery_timeout(self.connect_timeout())
    }

    /// Set the scan timeout.
    #[must_use]
    pub fn scan_timeout_secs(mut self, secs: u64) -> Self {
        self.scan_timeout_secs = secs;
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// Set the auto-reconnect timeout.
    #[must_use]
    pub fn reconnect_timeout_secs(mut self, secs: u64) -> Self {
        self.reconnect_timeout_secs = secs;
        self
    }

    /// Set the auto-reconnect concurrency limit.
    #[must_use]
    pub fn max_concurrent_reconnects(mut self, limit: usize) -> Self {
        self.max_concurrent_reconnects = limit;
        self
    }
}
