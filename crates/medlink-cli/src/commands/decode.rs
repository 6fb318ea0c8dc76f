//! Decode command implementation.
//!
//! Decodes a captured payload offline, e.g. one copied from a BLE sniffer.

use anyhow::{Context, Result, bail};
use medlink_core::{AdapterProfile, validate};
use medlink_types::{DecodeContext, DeviceKind};

use crate::cli::{OutputFormat, PayloadKind};
use crate::format::format_decoded;
use crate::util::{format_hex, parse_hex};

impl From<PayloadKind> for DeviceKind {
    fn from(kind: PayloadKind) -> Self {
        match kind {
            PayloadKind::BloodPressure => DeviceKind::BloodPressure,
            PayloadKind::Glucose => DeviceKind::Glucose,
            PayloadKind::PulseOximeter => DeviceKind::PulseOximeter,
            PayloadKind::Weight => DeviceKind::Scale,
        }
    }
}

/// Pick the profile to decode with: the named one if it fits `kind`,
/// otherwise the standard profile.
pub fn resolve_profile(kind: PayloadKind, profile: Option<&str>) -> Result<AdapterProfile> {
    let kind = DeviceKind::from(kind);
    let Some(name) = profile else {
        return AdapterProfile::standard(kind)
            .with_context(|| format!("No profile for {} devices", kind));
    };

    let profile: AdapterProfile = name.parse()?;
    if profile.kind() != kind {
        bail!(
            "Profile {} decodes {} payloads, not {}",
            profile,
            profile.kind(),
            kind
        );
    }
    Ok(profile)
}

pub fn cmd_decode(
    kind: PayloadKind,
    hex: &str,
    profile: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let bytes = parse_hex(hex)?;
    let profile = resolve_profile(kind, profile)?;
    tracing::debug!("Decoding {} with {}", format_hex(&bytes), profile);

    let measurement = profile
        .decode(&bytes, &DecodeContext::new("cli"))
        .with_context(|| format!("Failed to decode {} payload", profile))?;
    let validation = validate(&measurement);

    print!("{}", format_decoded(&measurement, &validation, format)?);
    Ok(())
}
