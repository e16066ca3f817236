// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! Volume lifecycle commands
//!
//! Commands: create, delete, expand

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use arrayvol_core::{
    application::{DeletionOutcome, VolumeService},
    domain::{options::ProvisionRequest, volume::ContentSource},
};

use super::{collect_pairs, parse_capacity, parse_key_value};
use crate::embedded::EmbeddedDriver;

#[derive(Subcommand)]
pub enum VolumeCommand {
    /// Provision a volume (fresh, or from a snapshot or another volume)
    Create {
        /// Volume name; also the last component of the export path
        #[arg(value_name = "NAME")]
        name: String,

        /// Requested capacity, e.g. 500Mi, 10Gi or a plain byte count
        #[arg(long, value_parser = parse_capacity)]
        capacity: u64,

        /// Provisioning parameter (repeatable), e.g. -p pool_name=pool0
        #[arg(short = 'p', long = "param", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        params: Vec<(String, String)>,

        /// Content source kind: snapshot or volume
        #[arg(long, requires = "source_id")]
        source_kind: Option<String>,

        /// Handle of the snapshot or volume to copy from
        #[arg(long, requires = "source_kind")]
        source_id: Option<String>,
    },

    /// Delete a volume (deferred while snapshots or clones depend on it)
    Delete {
        #[arg(value_name = "VOLUME_ID")]
        volume_id: String,
    },

    /// Change a volume's capacity
    Expand {
        #[arg(value_name = "VOLUME_ID")]
        volume_id: String,

        #[arg(long, value_parser = parse_capacity)]
        capacity: u64,
    },
}

pub async fn handle_command(command: VolumeCommand, config: Option<PathBuf>) -> Result<()> {
    let driver = EmbeddedDriver::new(config).await?;

    match command {
        VolumeCommand::Create {
            name,
            capacity,
            params,
            source_kind,
            source_id,
        } => {
            let source = match (source_kind, source_id) {
                (Some(kind), Some(id)) => ContentSource::classify(&kind, &id)?,
                _ => ContentSource::None,
            };
            let mut request = ProvisionRequest::new(name, capacity).with_content_source(source);
            request.parameters = collect_pairs(params);
            create(&driver, request).await
        }
        VolumeCommand::Delete { volume_id } => delete(&driver, &volume_id).await,
        VolumeCommand::Expand { volume_id, capacity } => expand(&driver, &volume_id, capacity).await,
    }
}

async fn create(driver: &EmbeddedDriver, request: ProvisionRequest) -> Result<()> {
    println!("Creating volume {}...", request.name.bold());

    let volume = driver
        .volumes
        .create_volume(request)
        .await
        .context("Volume creation failed")?;

    let descriptor = &volume.descriptor;
    println!("{}", format!("✓ Volume created: {}", descriptor.volume_id).green());
    println!("  Handle: {}", descriptor.handle());
    println!("  Capacity: {} bytes", descriptor.vol_size);
    println!("  Mount source: {}", descriptor.mount_source());
    println!();
    println!("{}", "Volume context:".bold());
    println!("{}", serde_json::to_string_pretty(&volume.context)?);
    Ok(())
}

async fn delete(driver: &EmbeddedDriver, volume_id: &str) -> Result<()> {
    let outcome = driver
        .volumes
        .delete_volume(volume_id)
        .await
        .context("Volume deletion failed")?;

    match outcome {
        DeletionOutcome::Deleted {
            filesystem_id,
            parents_reaped,
        } => {
            println!("{}", format!("✓ Filesystem {} deleted", filesystem_id).green());
            for parent in parents_reaped {
                println!("  Also removed parent {}", parent);
            }
        }
        DeletionOutcome::Deferred { filesystem_id } => {
            println!(
                "{}",
                format!(
                    "Filesystem {} still has snapshots or clones; marked for deletion",
                    filesystem_id
                )
                .yellow()
            );
        }
        DeletionOutcome::AlreadyGone => {
            println!("{}", format!("✓ Volume {} already gone", volume_id).green());
        }
    }
    Ok(())
}

async fn expand(driver: &EmbeddedDriver, volume_id: &str, capacity: u64) -> Result<()> {
    let expanded = driver
        .volumes
        .expand_volume(volume_id, Some(capacity))
        .await
        .context("Volume expansion failed")?;

    println!(
        "{}",
        format!(
            "✓ Filesystem {} now {} bytes",
            expanded.filesystem_id, expanded.capacity_bytes
        )
        .green()
    );
    Ok(())
}
