//! Pairing record commands: list, forget, auto-connect.
//!
//! These only touch the pairing database, never the radio.

use anyhow::{Result, bail};
use medlink_core::PairingStore;

use crate::cli::{OutputFormat, Toggle};
use crate::format::format_paired;

pub async fn cmd_paired(pairing: &PairingStore, format: OutputFormat) -> Result<()> {
    let devices = pairing.devices().await;
    let auto_connect = pairing.auto_connect().await;
    print!("{}", format_paired(&devices, auto_connect, format)?);
    Ok(())
}

pub async fn cmd_forget(pairing: &PairingStore, device_id: &str, quiet: bool) -> Result<()> {
    match pairing.remove(device_id).await? {
        Some(paired) => {
            if !quiet {
                eprintln!("Forgot {} ({})", paired.device.name, device_id);
            }
            Ok(())
        }
        None => bail!("{} is not paired. Run 'medlink paired' to list devices.", device_id),
    }
}

pub async fn cmd_auto_connect(
    pairing: &PairingStore,
    state: Toggle,
    device_id: Option<&str>,
    quiet: bool,
) -> Result<()> {
    let enabled = state.enabled();
    let label = if enabled { "enabled" } else { "disabled" };
    match device_id {
        Some(id) => {
            pairing.set_device_auto_connect(id, enabled).await?;
            if !quiet {
                eprintln!("Auto-connect {} for {}", label, id);
            }
        }
        None => {
            pairing.set_auto_connect(enabled).await?;
            if !quiet {
                eprintln!("Auto-connect {}", label);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use medlink_core::uuids;
    use medlink_types::{Device, MemoryStore};
    use time::OffsetDateTime;

    async fn store_with_device() -> PairingStore {
        let pairing = PairingStore::load(Arc::new(MemoryStore::new())).await;
        let device = Device::new("AA:BB", "OMRON M7", vec![uuids::BLOOD_PRESSURE_SERVICE]);
        pairing
            .record_connection(&device, OffsetDateTime::now_utc())
            .await
            .unwrap();
        pairing
    }

    #[tokio::test]
    async fn test_forget_removes_record() {
        let pairing = store_with_device().await;
        cmd_forget(&pairing, "AA:BB", true).await.unwrap();
        assert!(pairing.is_empty().await);

        let err = cmd_forget(&pairing, "AA:BB", true).await.unwrap_err();
        assert!(err.to_string().contains("not paired"));
    }

    #[tokio::test]
    async fn test_auto_connect_toggles() {
        let pairing = store_with_device().await;
        cmd_auto_connect(&pairing, Toggle::Off, Some("AA:BB"), true)
            .await
            .unwrap();
        assert!(!pairing.get("AA:BB").await.unwrap().auto_connect);

        cmd_auto_connect(&pairing, Toggle::Off, None, true).await.unwrap();
        assert!(!pairing.auto_connect().await);

        assert!(
            cmd_auto_connect(&pairing, Toggle::On, Some("CC:DD"), true)
                .await
                .is_err()
        );
    }
}
