//! Configuration file management.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use medlink_core::ManagerConfig;

/// Configuration file structure
///
/// ```toml
/// log_level = "info"
/// database = "/var/lib/medlink/pairing.db"
///
/// [manager]
/// connect_timeout_secs = 20
/// max_concurrent_reconnects = 2
///
/// [aliases]
/// cuff = "AA:BB:CC:DD:EE:FF"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection manager settings
    #[serde(default)]
    pub manager: ManagerConfig,

    /// Pairing database path (defaults to the platform data directory)
    #[serde(default)]
    pub database: Option<PathBuf>,

    /// Log filter used when neither -v, -q nor RUST_LOG is given
    #[serde(default)]
    pub log_level: Option<String>,

    /// Device aliases (friendly name -> device identifier)
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("medlink")
            .join("config.toml")
    }

    /// Load config from `path` (or the default path). A missing file yields
    /// the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let default_path = Self::default_path();
        let path = path.unwrap_or(&default_path);
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config: {}", path.display()))
    }

    /// Parse and validate config text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse TOML")?;
        config.manager.validate()?;
        Ok(config)
    }

    /// Pairing database path
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(medlink_store::default_db_path)
    }

    /// Resolve a device alias, returning the input unchanged if it is not one.
    pub fn resolve_alias(&self, device: &str) -> String {
        self.aliases
            .get(device)
            .cloned()
            .unwrap_or_else(|| device.to_string())
    }
}
