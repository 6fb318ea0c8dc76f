//! Watch command implementation.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use medlink_core::{ConnectionManager, ErrorKind, EventReceiver, ManagerEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::OutputFormat;
use crate::demo;
use crate::format::format_event;
use crate::util::Session;

/// Arguments for the watch command.
pub struct WatchArgs {
    /// Resolved device identifiers; empty means reconnect paired devices.
    pub devices: Vec<String>,
    /// Stop after this many measurements (0 for no limit).
    pub count: u32,
    pub trigger: bool,
    pub format: OutputFormat,
    pub quiet: bool,
}

pub async fn cmd_watch(session: &Session, args: WatchArgs) -> Result<()> {
    let manager = &session.manager;
    // Subscribe before connecting so readiness events are not missed.
    let mut events = manager.subscribe();

    let cancel = CancellationToken::new();
    let feed = session
        .mock
        .clone()
        .map(|mock| demo::spawn_feed(mock, cancel.clone()));

    let result = watch(manager, &mut events, &args).await;

    cancel.cancel();
    if let Some(feed) = feed {
        let _ = feed.await;
    }
    manager.shutdown().await;
    result
}

async fn watch(
    manager: &Arc<ConnectionManager>,
    events: &mut EventReceiver,
    args: &WatchArgs,
) -> Result<()> {
    let connected = if args.devices.is_empty() {
        reconnect_paired(manager, args.quiet).await?
    } else {
        discover(manager, &args.devices).await?;
        for device_id in &args.devices {
            manager
                .connect(device_id)
                .await
                .with_context(|| format!("Failed to connect to {}", device_id))?;
        }
        args.devices.clone()
    };

    if args.trigger {
        for device_id in &connected {
            match manager.trigger_measurement(device_id).await {
                Ok(()) => info!("Requested last record from {}", device_id),
                Err(e) if e.kind() == ErrorKind::UnsupportedOperation => {}
                Err(e) => warn!("Failed to request a record from {}: {}", device_id, e),
            }
        }
    }

    if !args.quiet {
        eprintln!("Watching {} device(s). Press Ctrl+C to stop.", connected.len());
    }

    let mut received = 0u32;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                if !args.quiet {
                    eprintln!();
                }
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(line) = format_event(&event, args.format)? {
                        print!("{}", line);
                    }
                    if matches!(event, ManagerEvent::MeasurementReceived { .. }) {
                        received += 1;
                        if args.count > 0 && received >= args.count {
                            break;
                        }
                    }
                }
                Err(RecvError::Lagged(missed)) => warn!("Dropped {} events", missed),
                Err(RecvError::Closed) => break,
            }
        }
    }
    Ok(())
}

/// Reconnect auto-connect devices, returning the ones that came up.
async fn reconnect_paired(manager: &ConnectionManager, quiet: bool) -> Result<Vec<String>> {
    let results = manager.auto_reconnect().await;
    let mut connected = Vec::new();
    for (device_id, result) in results {
        match result {
            Ok(()) => connected.push(device_id),
            Err(e) => {
                if !quiet {
                    eprintln!("{}: {}", device_id, e);
                }
            }
        }
    }
    if connected.is_empty() {
        bail!("No paired devices connected. Pass --device, or run 'medlink scan' to find one.");
    }
    connected.sort();
    Ok(connected)
}

/// Scan until every wanted device has been seen or the scan times out.
async fn discover(manager: &Arc<ConnectionManager>, wanted: &[String]) -> Result<()> {
    let mut missing: HashSet<&str> = wanted.iter().map(String::as_str).collect();
    let mut events = manager.subscribe();

    let scanner = Arc::clone(manager);
    let mut scan = tokio::spawn(async move { scanner.scan(None).await });

    let finished = loop {
        if missing.is_empty() {
            manager.stop_scan();
            break (&mut scan).await;
        }
        tokio::select! {
            result = &mut scan => break result,
            event = events.recv() => match event {
                Ok(ManagerEvent::DeviceDiscovered { device }) => {
                    missing.remove(device.id.as_str());
                }
                Err(RecvError::Closed) => {
                    manager.stop_scan();
                    break (&mut scan).await;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
            }
        }
    };
    finished.context("Scan task failed")??;

    let discovered: HashSet<String> = manager
        .discovered_devices()
        .await
        .into_iter()
        .map(|device| device.id)
        .collect();
    let mut missing: Vec<&String> = wanted.iter().filter(|id| !discovered.contains(*id)).collect();
    if !missing.is_empty() {
        missing.sort();
        let ids: Vec<&str> = missing.iter().map(|id| id.as_str()).collect();
        bail!("Device(s) not found: {}", ids.join(", "));
    }
    Ok(())
}
