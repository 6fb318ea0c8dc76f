mod cli;
mod commands;
mod config;
mod demo;
mod format;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::{
    WatchArgs, cmd_auto_connect, cmd_decode, cmd_forget, cmd_paired, cmd_reconnect, cmd_scan,
    cmd_watch,
};
use config::Config;
use util::{open_pairing, open_session};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;

    // Quiet mode suppresses info-level logging. Logs go to stderr so
    // stdout stays parseable.
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(config.log_level.as_deref().unwrap_or("info"))
        })
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Decode { kind, hex, profile } => {
            cmd_decode(kind, &hex, profile.as_deref(), cli.format)?;
        }
        Commands::Paired => {
            let pairing = open_pairing(&config, cli.mock).await?;
            cmd_paired(&pairing, cli.format).await?;
        }
        Commands::Forget { device } => {
            let pairing = open_pairing(&config, cli.mock).await?;
            cmd_forget(&pairing, &config.resolve_alias(&device), cli.quiet).await?;
        }
        Commands::AutoConnect { state, device } => {
            let pairing = open_pairing(&config, cli.mock).await?;
            let device = device.map(|d| config.resolve_alias(&d));
            cmd_auto_connect(&pairing, state, device.as_deref(), cli.quiet).await?;
        }
        Commands::Scan { timeout, all } => {
            if all {
                config.manager.service_filter = false;
            }
            let session = open_session(&config, cli.mock).await?;
            cmd_scan(&session, timeout, cli.format, cli.quiet).await?;
        }
        Commands::Watch {
            device,
            count,
            trigger,
        } => {
            let session = open_session(&config, cli.mock).await?;
            let args = WatchArgs {
                devices: device.iter().map(|d| config.resolve_alias(d)).collect(),
                count,
                trigger,
                format: cli.format,
                quiet: cli.quiet,
            };
            cmd_watch(&session, args).await?;
        }
        Commands::Reconnect => {
            let session = open_session(&config, cli.mock).await?;
            cmd_reconnect(&session, cli.format).await?;
        }
    }

    Ok(())
}
