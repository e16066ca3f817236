// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use arrayvol_core::domain::driver_config::{ArrayBackendKind, DriverConfigManifest};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a starter configuration
    Generate {
        #[arg(short, long, default_value = "./arrayvol-config.yaml")]
        output: PathBuf,

        /// Target a REST array instead of the in-memory backend
        #[arg(long, value_name = "URL")]
        array_url: Option<String>,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, array_url } => generate(&output, array_url),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = DriverConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. ARRAYVOL_CONFIG_PATH: {}",
            std::env::var("ARRAYVOL_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./arrayvol-config.yaml");
        println!("  4. ~/.arrayvol/config.yaml");
        println!("  5. /etc/arrayvol/config.yaml");
        println!();
    }

    println!("{}", "Node:".bold());
    println!("  ID: {}", config.spec.node.id);
    if config.spec.node.ip_address.is_empty() {
        println!("  IP: {}", "(not set)".dimmed());
    } else {
        println!("  IP: {}", config.spec.node.ip_address);
    }
    println!();

    let array = &config.spec.array;
    println!("{}", "Storage array:".bold());
    match array.backend {
        ArrayBackendKind::Rest => {
            println!("  Backend: rest");
            println!("  URL: {}", array.url);
            println!("  Username: {}", array.username);
            println!(
                "  Password: {}",
                if array.password.is_some() { "(set)" } else { "(not set)" }
            );
            println!("  Timeout: {}s", array.timeout_secs);
        }
        ArrayBackendKind::Memory => println!("  Backend: memory"),
    }
    println!();

    let provisioning = &config.spec.provisioning;
    println!("{}", "Provisioning defaults:".bold());
    println!("  Export root: {}", provisioning.export_root);
    println!("  Max filesystems: {}", provisioning.max_filesystems);
    println!("  Export permissions: {}", provisioning.nfs_export_permissions);
    println!("  no_root_squash: {}", provisioning.no_root_squash);
    println!("  Mount options: {}", provisioning.nfs_mount_options);
    println!("  SSD enabled: {}", provisioning.ssd_enabled);
    println!();

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = DriverConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: &Path, array_url: Option<String>) -> Result<()> {
    let mut config = DriverConfigManifest::default();
    if let Some(url) = array_url {
        config.spec.array.backend = ArrayBackendKind::Rest;
        config.spec.array.url = url;
        config.spec.array.username = "admin".to_string();
    }

    config
        .to_yaml_file(output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
