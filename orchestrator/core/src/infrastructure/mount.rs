// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! Mounter backed by the host's `mount`/`umount` binaries

use async_trait::async_trait;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::domain::mounter::{MountError, VolumeMounter};

#[derive(Debug, Clone, Default)]
pub struct SystemMounter;

impl SystemMounter {
    pub fn new() -> Self {
        Self
    }

    async fn run(command: &mut Command, name: &str) -> Result<(), MountError> {
        let output = command.output().await?;
        if output.status.success() {
            return Ok(());
        }
        Err(MountError::CommandFailed {
            command: name.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

#[async_trait]
impl VolumeMounter for SystemMounter {
    /// A path on the same device as its parent is not a mount point.
    /// Bind mounts of the same device are missed, hence "likely".
    async fn is_likely_not_mount_point(&self, path: &Path) -> Result<bool, MountError> {
        let metadata = tokio::fs::metadata(path).await?;
        let parent = path.parent().unwrap_or_else(|| Path::new("/"));
        let parent_metadata = tokio::fs::metadata(parent).await?;
        Ok(metadata.dev() == parent_metadata.dev())
    }

    async fn mount(
        &self,
        source: &str,
        target: &Path,
        fs_type: &str,
        options: &[String],
    ) -> Result<(), MountError> {
        let mut command = Command::new("mount");
        command.arg("-t").arg(fs_type);
        if !options.is_empty() {
            command.arg("-o").arg(options.join(","));
        }
        command.arg(source).arg(target);

        debug!("Mounting {} at {:?} ({}) with {:?}", source, target, fs_type, options);
        Self::run(&mut command, "mount").await
    }

    async fn unmount(&self, target: &Path) -> Result<(), MountError> {
        debug!("Unmounting {:?}", target);
        Self::run(Command::new("umount").arg(target), "umount").await
    }
}
