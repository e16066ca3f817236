// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;
use tracing::{debug, error};

use crate::domain::array::{ExportRecord, NewExport, StorageArrayClient};
use crate::domain::error::DriverError;
use crate::domain::options::{ExportPolicy, EXPORT_TRANSPORT};
use crate::domain::volume::{ExportId, FilesystemId};

/// Creates and removes the NFS export of a filesystem
pub struct ExportPathManager {
    array: Arc<dyn StorageArrayClient>,
}

impl ExportPathManager {
    pub fn new(array: Arc<dyn StorageArrayClient>) -> Self {
        Self { array }
    }

    /// Export `filesystem_id` at `export_path`, open to any client under `policy`
    pub async fn create_export(
        &self,
        filesystem_id: FilesystemId,
        export_path: &str,
        policy: &ExportPolicy,
    ) -> Result<ExportRecord, DriverError> {
        let request = NewExport {
            filesystem_id,
            export_path: export_path.to_string(),
            transport_protocols: EXPORT_TRANSPORT.to_string(),
            privileged_port: true,
            permissions: vec![policy.wildcard_permission()],
        };

        let export = self.array.export_filesystem(&request).await.map_err(|e| {
            error!("Failed to export filesystem {} at {}: {}", filesystem_id, export_path, e);
            DriverError::Internal(format!("failed to create export path {}: {}", export_path, e))
        })?;

        debug!(
            "Created export {} (block {}) for filesystem {}",
            export.id, export.export_block, filesystem_id
        );
        Ok(export)
    }

    pub async fn delete_export(&self, export_id: ExportId) -> Result<(), DriverError> {
        self.array
            .delete_export_path(export_id)
            .await
            .map_err(|e| DriverError::Internal(format!("failed to delete export {}: {}", export_id, e)))
    }
}
