//! Output formatting for CLI commands.

use std::collections::HashMap;

use anyhow::Result;
use serde::Serialize;
use time::OffsetDateTime;
use time::macros::format_description;

use medlink_core::{ManagerEvent, Result as CoreResult, ValidationResult};
use medlink_types::{Device, Measurement, PairedDevice};

use crate::cli::OutputFormat;

#[must_use]
pub fn format_time(at: OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    at.format(&format).unwrap_or_else(|_| at.to_string())
}

fn format_rssi(rssi: Option<i16>) -> String {
    rssi.map_or_else(|| "-".to_string(), |r| format!("{} dBm", r))
}

fn kind_label(device: &Device) -> String {
    device
        .kind
        .map_or_else(|| "unknown".to_string(), |k| k.to_string())
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)? + "\n")
}

pub fn format_scan(devices: &[Device], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json(devices),
        OutputFormat::Text => Ok(format_scan_text(devices)),
    }
}

#[must_use]
pub fn format_scan_text(devices: &[Device]) -> String {
    if devices.is_empty() {
        return "No health devices found.\n".to_string();
    }

    let mut output = format!("Found {} device(s)\n\n", devices.len());
    output.push_str(&format!(
        "{:<24} {:<20} {:<16} {:>8}  {}\n",
        "Name", "Identifier", "Kind", "RSSI", "Paired"
    ));
    for device in devices {
        let name = if device.name.is_empty() {
            "(unnamed)"
        } else {
            device.name.as_str()
        };
        output.push_str(&format!(
            "{:<24} {:<20} {:<16} {:>8}  {}\n",
            name,
            device.id,
            kind_label(device),
            format_rssi(device.rssi),
            if device.paired { "yes" } else { "no" }
        ));
    }
    output
}

pub fn format_paired(devices: &[PairedDevice], auto_connect: bool, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct PairedOutput<'a> {
                auto_connect: bool,
                devices: &'a [PairedDevice],
            }
            to_json(&PairedOutput {
                auto_connect,
                devices,
            })
        }
        OutputFormat::Text => Ok(format_paired_text(devices, auto_connect)),
    }
}

#[must_use]
pub fn format_paired_text(devices: &[PairedDevice], auto_connect: bool) -> String {
    let mut output = format!(
        "Auto-connect: {}\n",
        if auto_connect { "enabled" } else { "disabled" }
    );
    if devices.is_empty() {
        output.push_str("No paired devices.\n");
        return output;
    }

    output.push('\n');
    for paired in devices {
        let device = &paired.device;
        output.push_str(&format!("{} ({})\n", device.name, device.id));
        output.push_str(&format!("  Kind:           {}\n", kind_label(device)));
        output.push_str(&format!(
            "  Last connected: {} ({} connection(s))\n",
            format_time(paired.last_connected_at),
            paired.connection_count
        ));
        output.push_str(&format!(
            "  Auto-connect:   {}\n",
            if paired.auto_connect { "on" } else { "off" }
        ));
        if let Some(battery) = paired.battery_level {
            output.push_str(&format!("  Battery:        {}%\n", battery));
        }
        if let Some(info) = &paired.device_info {
            output.push_str(&format!(
                "  Model:          {} {} (fw {})\n",
                info.manufacturer, info.model, info.firmware
            ));
        }
    }
    output
}

#[must_use]
pub fn format_validation(validation: &ValidationResult) -> String {
    let mut notes: Vec<String> = validation
        .errors
        .iter()
        .map(|issue| format!("invalid: {}", issue))
        .collect();
    notes.extend(validation.warnings.iter().map(|issue| format!("warning: {}", issue)));
    if notes.is_empty() {
        String::new()
    } else {
        format!(" [{}]", notes.join("; "))
    }
}

#[must_use]
pub fn format_measurement_line(
    device_id: &str,
    measurement: &Measurement,
    validation: &ValidationResult,
) -> String {
    format!(
        "{}  {:<20} {}{}\n",
        format_time(measurement.timestamp()),
        device_id,
        measurement,
        format_validation(validation)
    )
}

/// One line per event for `watch`. Returns `None` for events not shown in
/// text mode.
pub fn format_event(event: &ManagerEvent, format: OutputFormat) -> Result<Option<String>> {
    if format == OutputFormat::Json {
        return Ok(Some(serde_json::to_string(event)? + "\n"));
    }
    let line = match event {
        ManagerEvent::MeasurementReceived {
            device_id,
            measurement,
            validation,
        } => format_measurement_line(device_id, measurement, validation),
        ManagerEvent::DeviceReady {
            device_id,
            profile,
            battery_level,
        } => match battery_level {
            Some(level) => format!("{} ready ({}, battery {}%)\n", device_id, profile, level),
            None => format!("{} ready ({})\n", device_id, profile),
        },
        ManagerEvent::DeviceDisconnected { device_id, reason } => {
            format!("{} disconnected ({:?})\n", device_id, reason)
        }
        ManagerEvent::Error {
            device_id, message, ..
        } => format!(
            "error{}: {}\n",
            device_id
                .as_deref()
                .map(|id| format!(" on {}", id))
                .unwrap_or_default(),
            message
        ),
        _ => return Ok(None),
    };
    Ok(Some(line))
}

pub fn format_reconnect(results: &HashMap<String, CoreResult<()>>, format: OutputFormat) -> Result<String> {
    let mut ids: Vec<&String> = results.keys().collect();
    ids.sort();

    match format {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct Outcome<'a> {
                device_id: &'a str,
                connected: bool,
                error: Option<String>,
            }
            let outcomes: Vec<Outcome<'_>> = ids
                .iter()
                .map(|id| {
                    let result = &results[*id];
                    Outcome {
                        device_id: id,
                        connected: result.is_ok(),
                        error: result.as_ref().err().map(ToString::to_string),
                    }
                })
                .collect();
            to_json(&outcomes)
        }
        OutputFormat::Text => {
            if ids.is_empty() {
                return Ok("Nothing to reconnect.\n".to_string());
            }
            let mut output = String::new();
            for id in ids {
                match &results[id] {
                    Ok(()) => output.push_str(&format!("{:<20} connected\n", id)),
                    Err(e) => output.push_str(&format!("{:<20} failed: {}\n", id, e)),
                }
            }
            Ok(output)
        }
    }
}

pub fn format_decoded(
    measurement: &Measurement,
    validation: &ValidationResult,
    format: OutputFormat,
) -> Result<String> {
    match format {
        OutputFormat::Json => {
            #[derive(Serialize)]
            struct Decoded<'a> {
                measurement: &'a Measurement,
                validation: &'a ValidationResult,
            }
            to_json(&Decoded {
                measurement,
                validation,
            })
        }
        OutputFormat::Text => Ok(format!(
            "{}\n{}\n",
            measurement,
            if validation.is_valid {
                format!("valid{}", format_validation(validation))
            } else {
                format!("INVALID{}", format_validation(validation))
            }
        )),
    }
}
