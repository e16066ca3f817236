// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! Snapshot Resolver
//!
//! Everything snapshot-shaped:
//! - resolving clone and restore sources into the filesystem a new volume uses
//! - user-visible snapshots, idempotent by name and parent
//!
//! Source checks are read-only and run before any snapshot is created.

use std::sync::Arc;
use tracing::{debug, error, info};

use crate::domain::array::{
    ArrayError, FilesystemRecord, NewSnapshot, SnapshotRecord, StorageArrayClient,
};
use crate::domain::error::DriverError;
use crate::domain::volume::{CompositeId, FilesystemId};

/// Outcome of a user-visible snapshot request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotHandle {
    /// `"<snapshot id>$$<source auxiliary>"`
    pub id: CompositeId,
    pub record: SnapshotRecord,
    /// An existing snapshot was returned instead of creating one
    pub reused: bool,
}

pub struct SnapshotResolver {
    array: Arc<dyn StorageArrayClient>,
}

impl SnapshotResolver {
    pub fn new(array: Arc<dyn StorageArrayClient>) -> Self {
        Self { array }
    }

    pub async fn create_snapshot(
        &self,
        parent_id: FilesystemId,
        name: &str,
        write_protected: bool,
    ) -> Result<SnapshotRecord, DriverError> {
        let request = NewSnapshot {
            parent_id,
            name: name.to_string(),
            write_protected,
        };
        self.array.create_filesystem_snapshot(&request).await.map_err(|e| {
            error!("Failed to create snapshot '{}' of {}: {}", name, parent_id, e);
            DriverError::Internal(format!("failed to create snapshot '{}': {}", name, e))
        })
    }

    /// Existing snapshot named `name` whose parent is `parent_id`
    pub async fn find_snapshot(
        &self,
        name: &str,
        parent_id: FilesystemId,
    ) -> Result<Option<SnapshotRecord>, DriverError> {
        let snapshots = self
            .array
            .get_snapshots_by_name(name)
            .await
            .map_err(|e| DriverError::Internal(format!("failed to look up snapshot '{}': {}", name, e)))?;
        Ok(snapshots.into_iter().find(|s| s.parent_id == parent_id))
    }

    /// Fetch a clone/restore source and check it matches the request
    async fn resolve_source(
        &self,
        source_id: FilesystemId,
        capacity_bytes: u64,
        pool_name: &str,
    ) -> Result<FilesystemRecord, DriverError> {
        let source = self
            .array
            .get_filesystem_by_id(source_id)
            .await
            .map_err(|e| DriverError::NotFound(format!("source volume {} not found: {}", source_id, e)))?;

        if source.size != capacity_bytes {
            return Err(DriverError::InvalidArgument(format!(
                "source volume {} has size {} but {} was requested",
                source_id, source.size, capacity_bytes
            )));
        }

        let pool_id = self
            .array
            .get_storage_pool_id_by_name(pool_name)
            .await
            .map_err(|e| DriverError::Internal(format!("failed to resolve storage pool '{}': {}", pool_name, e)))?;
        if pool_id != source.pool_id {
            return Err(DriverError::InvalidArgument(format!(
                "source volume {} is in pool {} but pool '{}' ({}) was requested",
                source_id, source.pool_id, pool_name, pool_id
            )));
        }

        Ok(source)
    }

    /// Clone a live volume: a writable snapshot of it becomes the new filesystem
    pub async fn clone_volume(
        &self,
        source_handle: &str,
        name: &str,
        capacity_bytes: u64,
        pool_name: &str,
    ) -> Result<FilesystemRecord, DriverError> {
        let source_id = FilesystemId::from_handle(source_handle)?;
        let source = self.resolve_source(source_id, capacity_bytes, pool_name).await?;

        let snapshot = self.create_snapshot(source.id, name, false).await?;
        info!("Cloned volume {} into filesystem {} ('{}')", source.id, snapshot.snapshot_id, name);

        Ok(FilesystemRecord {
            id: snapshot.snapshot_id,
            name: snapshot.name,
            pool_id: source.pool_id,
            size: snapshot.size,
            parent_id: Some(source.id),
            write_protected: snapshot.write_protected,
            created_at: Some(snapshot.created_at),
        })
    }

    /// Restore from a snapshot
    ///
    /// The snapshot source is snapshotted, restored from that snapshot, and
    /// the source's parent is what the new volume addresses afterwards.
    pub async fn restore_from_snapshot(
        &self,
        snapshot_handle: &str,
        name: &str,
        capacity_bytes: u64,
        pool_name: &str,
    ) -> Result<FilesystemRecord, DriverError> {
        let source_id = FilesystemId::from_handle(snapshot_handle)?;
        let source = self.resolve_source(source_id, capacity_bytes, pool_name).await?;
        let parent_id = source.parent_id.ok_or_else(|| {
            DriverError::InvalidArgument(format!(
                "restore source {} is not a snapshot: it has no parent filesystem",
                source.id
            ))
        })?;

        let snapshot = self.create_snapshot(source.id, name, false).await?;

        let restored = self
            .array
            .restore_filesystem_from_snapshot(source.id, snapshot.snapshot_id)
            .await
            .map_err(|e| {
                error!("Restore of {} from {} failed: {}", source.id, snapshot.snapshot_id, e);
                DriverError::Internal(format!("error restoring {} from snapshot: {}", source.id, e))
            })?;
        if !restored {
            return Err(DriverError::Internal(format!(
                "restore of volume {} from snapshot {} reported failure",
                source.id, snapshot.snapshot_id
            )));
        }

        let parent = self.array.get_filesystem_by_id(parent_id).await.map_err(|e| {
            DriverError::Internal(format!("unable to retrieve restored volume {}: {}", parent_id, e))
        })?;

        info!("Restored '{}' from snapshot {} onto filesystem {}", name, source.id, parent.id);
        Ok(parent)
    }

    /// Create a write-protected snapshot of a volume, or return the existing one
    pub async fn create_user_snapshot(
        &self,
        name: &str,
        source_volume_id: &str,
    ) -> Result<SnapshotHandle, DriverError> {
        let source = CompositeId::parse(source_volume_id)
            .map_err(|e| DriverError::Internal(format!("volume id and protocol not found: {}", e)))?;
        let parent_id = source
            .filesystem_id()
            .map_err(|e| DriverError::Internal(e.to_string()))?;

        if let Some(existing) = self.find_snapshot(name, parent_id).await? {
            debug!("Snapshot '{}' of {} already exists as {}", name, parent_id, existing.snapshot_id);
            return Ok(SnapshotHandle {
                id: CompositeId::new(existing.snapshot_id.to_string(), source.auxiliary),
                record: existing,
                reused: true,
            });
        }

        let record = self.create_snapshot(parent_id, name, true).await?;
        info!("Created snapshot {} ('{}') of volume {}", record.snapshot_id, name, parent_id);
        Ok(SnapshotHandle {
            id: CompositeId::new(record.snapshot_id.to_string(), source.auxiliary),
            record,
            reused: false,
        })
    }

    /// Delete a snapshot by its composite ID; a missing snapshot is not an error
    pub async fn delete_snapshot(&self, snapshot_id: &str) -> Result<FilesystemId, DriverError> {
        let composite = CompositeId::parse(snapshot_id)
            .map_err(|e| DriverError::Internal(format!("snapshot id and protocol not found: {}", e)))?;
        let id = composite
            .filesystem_id()
            .map_err(|e| DriverError::Internal(e.to_string()))?;

        match self.array.delete_filesystem(id).await {
            Ok(()) => Ok(id),
            Err(ArrayError::NotFound(_)) => {
                debug!("Snapshot {} already gone", id);
                Ok(id)
            }
            Err(e) => {
                error!("Failed to delete snapshot {}: {}", id, e);
                Err(DriverError::Internal(format!("failed to delete snapshot {}: {}", id, e)))
            }
        }
    }
}
