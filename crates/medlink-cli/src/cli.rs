//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Measurement characteristic layouts accepted by `decode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PayloadKind {
    /// Blood Pressure Measurement (0x2A35)
    BloodPressure,
    /// Glucose Measurement (0x2A18)
    Glucose,
    /// PLX Spot-Check Measurement (0x2A5E)
    PulseOximeter,
    /// Weight Measurement (0x2A9D)
    Weight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        matches!(self, Toggle::On)
    }
}

#[derive(Debug, Parser)]
#[command(name = "medlink")]
#[command(author, version, about = "CLI for BLE health devices", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true, env = "MEDLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Use simulated devices instead of the Bluetooth adapter
    #[arg(long, global = true, env = "MEDLINK_MOCK")]
    pub mock: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan for nearby health devices
    Scan {
        /// Scan timeout in seconds (overrides config)
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Include devices that advertise no supported health service
        #[arg(long)]
        all: bool,
    },

    /// Connect and print measurements as they arrive
    Watch {
        /// Device identifier(s); reconnects paired devices when omitted
        #[arg(short, long, value_delimiter = ',', env = "MEDLINK_DEVICE")]
        device: Vec<String>,

        /// Stop after this many measurements (0 for no limit)
        #[arg(short = 'n', long, default_value = "0")]
        count: u32,

        /// Request the last stored record from meters that support it
        #[arg(long)]
        trigger: bool,
    },

    /// List paired devices
    Paired,

    /// Remove a device's pairing record
    Forget {
        /// Device identifier
        device: String,
    },

    /// Enable or disable auto-connect globally or for one device
    AutoConnect {
        #[arg(value_enum)]
        state: Toggle,

        /// Only change this device
        #[arg(short, long)]
        device: Option<String>,
    },

    /// Reconnect up to three paired devices that have auto-connect enabled
    Reconnect,

    /// Decode a measurement payload given as hex
    Decode {
        /// Characteristic layout
        #[arg(value_enum)]
        kind: PayloadKind,

        /// Payload bytes, e.g. "04 b0 04 20 03" or "04b0042003"
        hex: String,

        /// Adapter profile to decode with, e.g. omron_blood_pressure
        #[arg(short, long)]
        profile: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_watch_accepts_comma_separated_devices() {
        let cli = Cli::try_parse_from(["medlink", "watch", "--device", "AA,BB", "-n", "3"]).unwrap();
        let Commands::Watch { device, count, .. } = cli.command else {
            panic!("expected watch");
        };
        assert_eq!(device, vec!["AA".to_string(), "BB".to_string()]);
        assert_eq!(count, 3);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["medlink", "paired", "--format", "json", "--mock"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.mock);
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["medlink", "-v", "-q", "paired"]).is_err());
    }

    #[test]
    fn test_decode_arguments() {
        let cli = Cli::try_parse_from(["medlink", "decode", "glucose", "0407"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Decode {
                kind: PayloadKind::Glucose,
                ..
            }
        ));
    }
}
