// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! Node-side mount utility boundary

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[async_trait]
pub trait VolumeMounter: Send + Sync {
    /// `Ok(true)` when `path` is probably not a mount point.
    ///
    /// Fails with [`MountError::NotFound`] when `path` does not exist.
    async fn is_likely_not_mount_point(&self, path: &Path) -> Result<bool, MountError>;

    async fn mount(
        &self,
        source: &str,
        target: &Path,
        fs_type: &str,
        options: &[String],
    ) -> Result<(), MountError>;

    async fn unmount(&self, target: &Path) -> Result<(), MountError>;
}

#[derive(Debug, Error)]
pub enum MountError {
    #[error("Path does not exist: {0}")]
    NotFound(String),

    #[error("{command} exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for MountError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            MountError::NotFound(err.to_string())
        } else {
            MountError::Io(err.to_string())
        }
    }
}
