//! Scan command implementation.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::cli::OutputFormat;
use crate::format::format_scan;
use crate::util::Session;

pub async fn cmd_scan(
    session: &Session,
    timeout: Option<u64>,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    let manager = &session.manager;
    let duration = timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| manager.config().scan_timeout());

    if !quiet && format == OutputFormat::Text {
        eprintln!("Scanning for {}s...", duration.as_secs());
    }

    let devices = manager
        .scan(Some(duration))
        .await
        .context("Failed to scan for devices")?;

    print!("{}", format_scan(&devices, format)?);
    manager.shutdown().await;
    Ok(())
}
