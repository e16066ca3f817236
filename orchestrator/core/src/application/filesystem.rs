// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;
use tracing::{error, info};

use crate::domain::array::{FilesystemRecord, NewFilesystem, StorageArrayClient};
use crate::domain::error::DriverError;
use crate::domain::options::ProvisioningOptions;

/// Creates brand-new filesystems under the array-wide ceiling
pub struct FilesystemProvisioner {
    array: Arc<dyn StorageArrayClient>,
    max_filesystems: u64,
}

impl FilesystemProvisioner {
    pub fn new(array: Arc<dyn StorageArrayClient>, max_filesystems: u64) -> Self {
        Self {
            array,
            max_filesystems,
        }
    }

    pub async fn create_filesystem(
        &self,
        name: &str,
        options: &ProvisioningOptions,
        capacity_bytes: u64,
    ) -> Result<FilesystemRecord, DriverError> {
        let count = self
            .array
            .get_filesystem_count()
            .await
            .map_err(|e| DriverError::Internal(format!("failed to count filesystems: {}", e)))?;
        if count >= self.max_filesystems {
            error!("Filesystem ceiling reached: {} of {}", count, self.max_filesystems);
            return Err(DriverError::ResourceExhausted(format!(
                "maximum number of filesystems ({}) already exists on the array",
                self.max_filesystems
            )));
        }

        let pool_id = self
            .array
            .get_storage_pool_id_by_name(&options.pool_name)
            .await
            .map_err(|e| {
                DriverError::Internal(format!(
                    "failed to resolve storage pool '{}': {}",
                    options.pool_name, e
                ))
            })?;

        let request = NewFilesystem {
            pool_id,
            name: name.to_string(),
            ssd_enabled: options.ssd_enabled,
            provtype: options.provision_type.clone(),
            size: capacity_bytes,
        };

        let filesystem = self.array.create_filesystem(&request).await.map_err(|e| {
            error!("Failed to create filesystem '{}': {}", name, e);
            DriverError::Internal(format!("failed to create filesystem '{}': {}", name, e))
        })?;

        info!(
            "Created filesystem {} ('{}', {} bytes) in pool {}",
            filesystem.id, name, capacity_bytes, pool_id
        );
        Ok(filesystem)
    }
}
