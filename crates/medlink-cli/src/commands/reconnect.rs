//! Reconnect command implementation.

use anyhow::Result;

use crate::cli::OutputFormat;
use crate::format::format_reconnect;
use crate::util::Session;

/// Reconnect paired devices, report each outcome, then disconnect.
pub async fn cmd_reconnect(session: &Session, format: OutputFormat) -> Result<()> {
    let manager = &session.manager;
    let results = manager.auto_reconnect().await;
    print!("{}", format_reconnect(&results, format)?);
    manager.shutdown().await;
    Ok(())
}
