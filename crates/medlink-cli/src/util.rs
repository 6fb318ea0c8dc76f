//! Utility functions for CLI operations.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use medlink_core::{
    BtleplugTransport, ConnectionManager, MockTransport, PairingStore, Transport,
};
use medlink_store::SqliteStore;
use medlink_types::{KeyValueStore, MemoryStore};

use crate::config::Config;
use crate::demo;

/// A connection manager together with the mock transport when simulated
/// devices are in use.
pub struct Session {
    pub manager: Arc<ConnectionManager>,
    pub mock: Option<Arc<MockTransport>>,
}

/// Build the transport, pairing store and manager for a command.
pub async fn open_session(config: &Config, use_mock: bool) -> Result<Session> {
    let mock = use_mock.then(|| Arc::new(demo::transport()));
    let transport: Arc<dyn Transport> = match &mock {
        Some(mock) => mock.clone(),
        None => Arc::new(
            BtleplugTransport::new()
                .await
                .context("Failed to open the Bluetooth adapter")?,
        ),
    };

    let pairing = open_pairing(config, use_mock).await?;
    let manager = ConnectionManager::new(transport, pairing, config.manager.clone())
        .context("Invalid manager configuration")?;
    let manager = Arc::new(manager);
    manager
        .start()
        .await
        .context("Failed to follow Bluetooth events")?;

    Ok(Session { manager, mock })
}

/// Load the pairing store without touching Bluetooth.
///
/// Simulated runs keep pairing records in memory unless a database is
/// configured explicitly, so they never touch real pairings.
pub async fn open_pairing(config: &Config, use_mock: bool) -> Result<PairingStore> {
    let backend: Arc<dyn KeyValueStore> = if use_mock && config.database.is_none() {
        Arc::new(MemoryStore::new())
    } else {
        let path = config.database_path();
        let store = SqliteStore::open(&path)
            .with_context(|| format!("Failed to open pairing database {}", path.display()))?;
        Arc::new(store)
    };
    Ok(PairingStore::load(backend).await)
}

/// Parse hex bytes, ignoring whitespace, `:` and `-` separators and an
/// optional `0x` prefix.
pub fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let trimmed = input.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: Vec<char> = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();

    if digits.is_empty() {
        bail!("No bytes given");
    }
    if digits.len() % 2 != 0 {
        bail!("Odd number of hex digits ({})", digits.len());
    }

    digits
        .chunks(2)
        .map(|pair| {
            let byte: String = pair.iter().collect();
            u8::from_str_radix(&byte, 16).with_context(|| format!("Invalid hex byte '{}'", byte))
        })
        .collect()
}

/// Format bytes as space-separated uppercase hex.
pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_plain() {
        assert_eq!(parse_hex("04b004").unwrap(), vec![0x04, 0xB0, 0x04]);
    }

    #[test]
    fn test_parse_hex_separators_and_prefix() {
        assert_eq!(parse_hex("0x04 B0:04-20").unwrap(), vec![0x04, 0xB0, 0x04, 0x20]);
        assert_eq!(parse_hex("  0a 0B  ").unwrap(), vec![0x0A, 0x0B]);
    }

    #[test]
    fn test_parse_hex_errors() {
        assert!(parse_hex("").is_err());
        assert!(parse_hex("0x").is_err());
        assert!(parse_hex("abc").unwrap_err().to_string().contains("Odd"));
        assert!(parse_hex("zz").unwrap_err().to_string().contains("zz"));
    }

    #[test]
    fn test_format_hex() {
        assert_eq!(format_hex(&[0x04, 0xB0]), "04 B0");
        assert_eq!(format_hex(&[]), "");
    }

    #[tokio::test]
    async fn test_pairing_database_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database: Some(dir.path().join("pairing.db")),
            ..Config::default()
        };
        let pairing = open_pairing(&config, false).await.unwrap();
        pairing.set_auto_connect(false).await.unwrap();
        assert!(dir.path().join("pairing.db").exists());

        let reopened = open_pairing(&config, false).await.unwrap();
        assert!(!reopened.auto_connect().await);
    }

    #[tokio::test]
    async fn test_mock_session_uses_memory_store() {
        let session = open_session(&Config::default(), true).await.unwrap();
        assert!(session.mock.is_some());
        assert!(session.manager.pairing().is_empty().await);
        session.manager.shutdown().await;
    }
}
