// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! Volume Manager Application Service
//!
//! Entry point for every controller-side lifecycle operation, coordinating:
//! - Application components: provisioner, deletion manager, snapshot resolver,
//!   export rule manager
//! - Infrastructure: the storage array client
//! - Event bus: publishing VolumeEvents for observability
//!
//! Mutating operations run on their own task and hold a per-name guard, so a
//! caller that gives up never abandons an in-flight step or its rollback.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::application::deletion::{DeletionOutcome, VolumeDeletionManager};
use crate::application::export_rules::ExportRuleManager;
use crate::application::name_lock::{LockKey, NameLocks};
use crate::application::provisioning::{ProvisionedVolume, VolumeProvisioner};
use crate::application::snapshot::{SnapshotHandle, SnapshotResolver};
use crate::domain::array::{ExportRecord, StorageArrayClient};
use crate::domain::error::DriverError;
use crate::domain::events::VolumeEvent;
use crate::domain::options::{ProvisionRequest, ProvisioningDefaults};
use crate::domain::volume::{normalize_capacity, FilesystemId};
use crate::infrastructure::event_bus::EventBus;

/// Result of a capacity change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandedVolume {
    pub filesystem_id: FilesystemId,
    pub capacity_bytes: u64,
    /// Always false: the array grows the filesystem transparently
    pub node_expansion_required: bool,
}

// ============================================================================
// Service Trait
// ============================================================================

#[async_trait]
pub trait VolumeService: Send + Sync {
    /// Provision a volume (fresh, cloned or restored)
    async fn create_volume(&self, request: ProvisionRequest) -> Result<ProvisionedVolume, DriverError>;

    /// Delete a volume; already-gone volumes succeed
    async fn delete_volume(&self, volume_id: &str) -> Result<DeletionOutcome, DriverError>;

    async fn expand_volume(
        &self,
        volume_id: &str,
        capacity_bytes: Option<u64>,
    ) -> Result<ExpandedVolume, DriverError>;

    /// Create a user-visible snapshot, idempotent by name and source
    async fn create_snapshot(&self, name: &str, source_volume_id: &str) -> Result<SnapshotHandle, DriverError>;

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), DriverError>;

    /// Grant this node access to the volume's export
    async fn publish_volume(&self, volume_context: &BTreeMap<String, String>) -> Result<ExportRecord, DriverError>;

    /// Revoke a node's access to the volume's exports
    async fn unpublish_volume(&self, volume_id: &str, node_id: &str) -> Result<(), DriverError>;
}

// ============================================================================
// Standard Implementation
// ============================================================================

struct ServiceState {
    array: Arc<dyn StorageArrayClient>,
    provisioner: VolumeProvisioner,
    deletion: VolumeDeletionManager,
    snapshots: SnapshotResolver,
    export_rules: ExportRuleManager,
    event_bus: Arc<EventBus>,
    locks: NameLocks,
    node_ip: String,
}

#[derive(Clone)]
pub struct StandardVolumeService {
    state: Arc<ServiceState>,
}

impl StandardVolumeService {
    pub fn new(
        array: Arc<dyn StorageArrayClient>,
        defaults: ProvisioningDefaults,
        node_ip: impl Into<String>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            state: Arc::new(ServiceState {
                provisioner: VolumeProvisioner::new(array.clone(), defaults),
                deletion: VolumeDeletionManager::new(array.clone()),
                snapshots: SnapshotResolver::new(array.clone()),
                export_rules: ExportRuleManager::new(array.clone()),
                array,
                event_bus,
                locks: NameLocks::new(),
                node_ip: node_ip.into(),
            }),
        }
    }

    pub fn defaults(&self) -> &ProvisioningDefaults {
        self.state.provisioner.defaults()
    }

    /// Names with an operation in flight
    pub fn operations_in_flight(&self) -> usize {
        self.state.locks.len()
    }
}

/// Run a mutating operation on its own task
///
/// Dropping the returned future does not cancel the operation.
async fn run_detached<F, T>(operation: &'static str, future: F) -> Result<T, DriverError>
where
    F: Future<Output = Result<T, DriverError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(future).await.map_err(|e| {
        error!("{} task did not complete: {}", operation, e);
        DriverError::Internal(format!("{} task did not complete: {}", operation, e))
    })?
}

impl ServiceState {
    async fn create_volume(&self, request: ProvisionRequest) -> Result<ProvisionedVolume, DriverError> {
        let _guard = self.locks.acquire(&LockKey::volume_name(&request.name)).await;

        match self.provisioner.provision(&request).await {
            Ok(volume) => {
                self.event_bus.publish_volume_event(VolumeEvent::VolumeCreated {
                    name: request.name.clone(),
                    filesystem_id: volume.descriptor.filesystem_id,
                    export_id: volume.descriptor.export_id,
                    source: request.content_source.kind().to_string(),
                    capacity_bytes: volume.descriptor.vol_size,
                    export_path: volume.descriptor.vol_path.clone(),
                    created_at: Utc::now(),
                });
                Ok(volume)
            }
            Err(failure) => {
                if failure.compensations_run > 0 {
                    self.event_bus.publish_volume_event(VolumeEvent::ProvisioningRolledBack {
                        name: request.name.clone(),
                        error: failure.error.to_string(),
                        compensation_failures: failure.compensation_failures,
                        rolled_back_at: Utc::now(),
                    });
                }
                Err(failure.into())
            }
        }
    }

    async fn delete_volume(&self, volume_id: String) -> Result<DeletionOutcome, DriverError> {
        let _guard = self.locks.acquire(&LockKey::handle(&volume_id)).await;
        info!("Deleting volume {}", volume_id);

        let outcome = self.deletion.delete_volume(&volume_id).await?;
        match &outcome {
            DeletionOutcome::Deleted {
                filesystem_id,
                parents_reaped,
            } => self.event_bus.publish_volume_event(VolumeEvent::VolumeDeleted {
                filesystem_id: *filesystem_id,
                parents_reaped: parents_reaped.clone(),
                deleted_at: Utc::now(),
            }),
            DeletionOutcome::Deferred { filesystem_id } => {
                self.event_bus.publish_volume_event(VolumeEvent::VolumeDeletionDeferred {
                    filesystem_id: *filesystem_id,
                    deferred_at: Utc::now(),
                })
            }
            DeletionOutcome::AlreadyGone => debug!("Volume {} was already gone", volume_id),
        }
        Ok(outcome)
    }

    async fn expand_volume(&self, filesystem_id: FilesystemId, requested: u64) -> Result<ExpandedVolume, DriverError> {
        let _guard = self.locks.acquire(&LockKey::Filesystem(filesystem_id)).await;
        let (capacity, clamped) = normalize_capacity(requested);
        if clamped {
            warn!(
                "Expansion of {} requested {} bytes, raising to the {} byte minimum",
                filesystem_id, requested, capacity
            );
        }

        self.array
            .update_filesystem_size(filesystem_id, capacity)
            .await
            .map_err(|e| {
                error!("Failed to resize filesystem {}: {}", filesystem_id, e);
                DriverError::Internal(format!("failed to update filesystem {}: {}", filesystem_id, e))
            })?;
        info!("Filesystem {} resized to {} bytes", filesystem_id, capacity);

        self.event_bus.publish_volume_event(VolumeEvent::VolumeExpanded {
            filesystem_id,
            capacity_bytes: capacity,
            expanded_at: Utc::now(),
        });

        Ok(ExpandedVolume {
            filesystem_id,
            capacity_bytes: capacity,
            node_expansion_required: false,
        })
    }

    async fn create_snapshot(&self, name: String, source_volume_id: String) -> Result<SnapshotHandle, DriverError> {
        let _guard = self.locks.acquire(&LockKey::snapshot_name(&name)).await;

        let handle = self.snapshots.create_user_snapshot(&name, &source_volume_id).await?;
        self.event_bus.publish_volume_event(VolumeEvent::SnapshotCreated {
            snapshot_id: handle.id.to_string(),
            source_filesystem_id: handle.record.parent_id,
            reused: handle.reused,
            created_at: Utc::now(),
        });
        Ok(handle)
    }

    async fn delete_snapshot(&self, snapshot_id: String) -> Result<(), DriverError> {
        let _guard = self.locks.acquire(&LockKey::handle(&snapshot_id)).await;

        self.snapshots.delete_snapshot(&snapshot_id).await?;
        info!("Deleted snapshot {}", snapshot_id);
        self.event_bus.publish_volume_event(VolumeEvent::SnapshotDeleted {
            snapshot_id,
            deleted_at: Utc::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl VolumeService for StandardVolumeService {
    async fn create_volume(&self, request: ProvisionRequest) -> Result<ProvisionedVolume, DriverError> {
        let state = Arc::clone(&self.state);
        run_detached("create volume", async move { state.create_volume(request).await }).await
    }

    async fn delete_volume(&self, volume_id: &str) -> Result<DeletionOutcome, DriverError> {
        let state = Arc::clone(&self.state);
        let volume_id = volume_id.to_string();
        run_detached("delete volume", async move { state.delete_volume(volume_id).await }).await
    }

    async fn expand_volume(
        &self,
        volume_id: &str,
        capacity_bytes: Option<u64>,
    ) -> Result<ExpandedVolume, DriverError> {
        if volume_id.trim().is_empty() {
            return Err(DriverError::InvalidArgument("volume ID missing in request".to_string()));
        }
        let requested = capacity_bytes
            .ok_or_else(|| DriverError::InvalidArgument("capacity range cannot be empty".to_string()))?;
        let filesystem_id = FilesystemId::from_handle(volume_id)?;

        let state = Arc::clone(&self.state);
        run_detached("expand volume", async move {
            state.expand_volume(filesystem_id, requested).await
        })
        .await
    }

    async fn create_snapshot(&self, name: &str, source_volume_id: &str) -> Result<SnapshotHandle, DriverError> {
        if name.trim().is_empty() {
            return Err(DriverError::InvalidArgument("snapshot name missing in request".to_string()));
        }
        let state = Arc::clone(&self.state);
        let (name, source) = (name.to_string(), source_volume_id.to_string());
        run_detached("create snapshot", async move { state.create_snapshot(name, source).await }).await
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<(), DriverError> {
        let state = Arc::clone(&self.state);
        let snapshot_id = snapshot_id.to_string();
        run_detached("delete snapshot", async move { state.delete_snapshot(snapshot_id).await }).await
    }

    async fn publish_volume(&self, volume_context: &BTreeMap<String, String>) -> Result<ExportRecord, DriverError> {
        let state = &self.state;
        let export = state
            .export_rules
            .publish(volume_context, state.provisioner.defaults(), &state.node_ip)
            .await?;

        state.event_bus.publish_volume_event(VolumeEvent::VolumePublished {
            export_id: export.id,
            node_ip: state.node_ip.clone(),
            published_at: Utc::now(),
        });
        Ok(export)
    }

    async fn unpublish_volume(&self, volume_id: &str, node_id: &str) -> Result<(), DriverError> {
        let state = &self.state;
        let filesystem_id = state.export_rules.unpublish(volume_id, node_id).await?;

        state.event_bus.publish_volume_event(VolumeEvent::VolumeUnpublished {
            filesystem_id,
            node: node_id.to_string(),
            unpublished_at: Utc::now(),
        });
        Ok(())
    }
}
