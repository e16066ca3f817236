// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! Snapshot commands
//!
//! Commands: create, delete

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use arrayvol_core::application::VolumeService;

use crate::embedded::EmbeddedDriver;

#[derive(Subcommand)]
pub enum SnapshotCommand {
    /// Snapshot a volume; repeating the same name and source is a no-op
    Create {
        #[arg(value_name = "NAME")]
        name: String,

        /// Source volume handle ("<id>$$nfs")
        #[arg(long, value_name = "VOLUME_HANDLE")]
        source: String,
    },

    Delete {
        #[arg(value_name = "SNAPSHOT_ID")]
        snapshot_id: String,
    },
}

pub async fn handle_command(command: SnapshotCommand, config: Option<PathBuf>) -> Result<()> {
    let driver = EmbeddedDriver::new(config).await?;

    match command {
        SnapshotCommand::Create { name, source } => {
            let handle = driver
                .volumes
                .create_snapshot(&name, &source)
                .await
                .context("Snapshot creation failed")?;

            let status = if handle.reused { "already exists" } else { "created" };
            println!("{}", format!("✓ Snapshot {} {}", handle.id, status).green());
            println!("  Source filesystem: {}", handle.record.parent_id);
            println!("  Size: {} bytes", handle.record.size);
            println!("  Created at: {}", handle.record.created_at.to_rfc3339());
        }
        SnapshotCommand::Delete { snapshot_id } => {
            driver
                .volumes
                .delete_snapshot(&snapshot_id)
                .await
                .context("Snapshot deletion failed")?;
            println!("{}", format!("✓ Snapshot {} deleted", snapshot_id).green());
        }
    }
    Ok(())
}
