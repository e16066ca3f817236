// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! Node-side mount commands
//!
//! Commands: publish, unpublish

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use super::{collect_pairs, parse_key_value};
use crate::embedded::EmbeddedDriver;

#[derive(Subcommand)]
pub enum NodeCommand {
    /// Mount a volume's export at a target path on this node
    Publish {
        #[arg(value_name = "TARGET")]
        target: PathBuf,

        /// Volume context entry (repeatable); ipAddress and volPathd are required
        #[arg(long = "context", value_name = "KEY=VALUE", value_parser = parse_key_value, required = true)]
        context: Vec<(String, String)>,

        #[arg(long)]
        read_only: bool,
    },

    /// Unmount a target path and drop this node's export rule
    Unpublish {
        #[arg(value_name = "VOLUME_ID")]
        volume_id: String,

        #[arg(value_name = "TARGET")]
        target: PathBuf,
    },
}

pub async fn handle_command(command: NodeCommand, config: Option<PathBuf>) -> Result<()> {
    let driver = EmbeddedDriver::new(config).await?;

    match command {
        NodeCommand::Publish {
            target,
            context,
            read_only,
        } => {
            driver
                .node
                .publish(&target, &collect_pairs(context), read_only)
                .await
                .with_context(|| format!("Failed to mount at {}", target.display()))?;
            println!("{}", format!("✓ Mounted at {}", target.display()).green());
        }
        NodeCommand::Unpublish { volume_id, target } => {
            driver
                .node
                .unpublish(&volume_id, &target)
                .await
                .with_context(|| format!("Failed to unmount {}", target.display()))?;
            println!("{}", format!("✓ {} detached", target.display()).green());
        }
    }
    Ok(())
}
