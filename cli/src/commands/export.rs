// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! Export rule commands (controller-side attach/detach)
//!
//! Commands: publish, unpublish

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use arrayvol_core::application::VolumeService;

use super::{collect_pairs, parse_key_value};
use crate::embedded::EmbeddedDriver;

#[derive(Subcommand)]
pub enum ExportCommand {
    /// Grant the configured node access to a volume's export
    Publish {
        /// Volume context entry (repeatable); exportID is required
        #[arg(long = "context", value_name = "KEY=VALUE", value_parser = parse_key_value, required = true)]
        context: Vec<(String, String)>,
    },

    /// Revoke a node's access to a volume's exports
    Unpublish {
        #[arg(value_name = "VOLUME_ID")]
        volume_id: String,

        /// Client address the rule was granted to
        #[arg(long, value_name = "NODE")]
        node: String,
    },
}

pub async fn handle_command(command: ExportCommand, config: Option<PathBuf>) -> Result<()> {
    let driver = EmbeddedDriver::new(config).await?;

    match command {
        ExportCommand::Publish { context } => {
            let export = driver
                .volumes
                .publish_volume(&collect_pairs(context))
                .await
                .context("Publish failed")?;

            println!(
                "{}",
                format!(
                    "✓ Export {} open to {}",
                    export.id, driver.config.spec.node.ip_address
                )
                .green()
            );
            for rule in &export.permissions {
                println!("  {} {} no_root_squash={}", rule.client, rule.access, rule.no_root_squash);
            }
        }
        ExportCommand::Unpublish { volume_id, node } => {
            driver
                .volumes
                .unpublish_volume(&volume_id, &node)
                .await
                .context("Unpublish failed")?;
            println!("{}", format!("✓ Access for {} revoked", node).green());
        }
    }
    Ok(())
}
