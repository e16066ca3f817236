// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! # arrayvol CLI
//!
//! Drives volume lifecycle operations against a storage array from the
//! command line. Every command builds the services in-process from the
//! driver configuration and runs a single operation.
//!
//! ## Commands
//!
//! - `arrayvol volume create|delete|expand` - Volume lifecycle
//! - `arrayvol snapshot create|delete` - Snapshots
//! - `arrayvol export publish|unpublish` - Export rules for nodes
//! - `arrayvol node publish|unpublish` - Mounts on this node
//! - `arrayvol config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;
mod embedded;

use commands::{ConfigCommand, ExportCommand, NodeCommand, SnapshotCommand, VolumeCommand};

/// arrayvol - NFS volume lifecycle on a storage array
#[derive(Parser)]
#[command(name = "arrayvol")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "ARRAYVOL_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "ARRAYVOL_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Volume lifecycle operations
    #[command(name = "volume")]
    Volume {
        #[command(subcommand)]
        command: VolumeCommand,
    },

    /// Snapshot operations
    #[command(name = "snapshot")]
    Snapshot {
        #[command(subcommand)]
        command: SnapshotCommand,
    },

    /// Export access rules
    #[command(name = "export")]
    Export {
        #[command(subcommand)]
        command: ExportCommand,
    },

    /// Mounts on this node
    #[command(name = "node")]
    Node {
        #[command(subcommand)]
        command: NodeCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Volume { command }) => commands::volume::handle_command(command, cli.config).await,
        Some(Commands::Snapshot { command }) => commands::snapshot::handle_command(command, cli.config).await,
        Some(Commands::Export { command }) => commands::export::handle_command(command, cli.config).await,
        Some(Commands::Node { command }) => commands::node::handle_command(command, cli.config).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_volume_create() {
        let cli = Cli::try_parse_from([
            "arrayvol",
            "volume",
            "create",
            "pvc-1",
            "--capacity",
            "500Mi",
            "-p",
            "pool_name=pool0",
            "-p",
            "nfs_networkspace=ns0",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Volume {
                command: VolumeCommand::Create {
                    name,
                    capacity,
                    params,
                    source_kind,
                    ..
                },
            }) => {
                assert_eq!(name, "pvc-1");
                assert_eq!(capacity, 500 * 1024 * 1024);
                assert_eq!(params.len(), 2);
                assert!(source_kind.is_none());
            }
            _ => panic!("expected volume create"),
        }
    }

    #[test]
    fn test_source_kind_requires_source_id() {
        assert!(Cli::try_parse_from([
            "arrayvol",
            "volume",
            "create",
            "pvc-1",
            "--capacity",
            "1Gi",
            "--source-kind",
            "snapshot",
        ])
        .is_err());
    }
}
