// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! Volume Deletion Manager
//!
//! Deletion is idempotent: anything already gone counts as deleted. A
//! filesystem with live children is only tagged for deferred deletion; the
//! actual removal happens out-of-band once the children are gone.
//!
//! After a successful delete the parent chain is reaped while each parent
//! carries the deferred-delete marker and has no children left. Reaping is
//! best-effort and never fails the delete.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::application::metadata::MetadataTagger;
use crate::domain::array::{ArrayError, StorageArrayClient};
use crate::domain::error::DriverError;
use crate::domain::volume::FilesystemId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionOutcome {
    Deleted {
        filesystem_id: FilesystemId,
        parents_reaped: Vec<FilesystemId>,
    },
    /// Children exist; the filesystem carries the deferred-delete marker
    Deferred { filesystem_id: FilesystemId },
    /// Nothing to delete
    AlreadyGone,
}

pub struct VolumeDeletionManager {
    array: Arc<dyn StorageArrayClient>,
    metadata: MetadataTagger,
}

impl VolumeDeletionManager {
    pub fn new(array: Arc<dyn StorageArrayClient>) -> Self {
        Self {
            metadata: MetadataTagger::new(array.clone()),
            array,
        }
    }

    /// Delete by external volume ID (`"<id>"` or `"<id>$$<auxiliary>"`)
    pub async fn delete_volume(&self, volume_id: &str) -> Result<DeletionOutcome, DriverError> {
        if volume_id.trim().is_empty() {
            return Err(DriverError::InvalidArgument("volume ID missing in request".to_string()));
        }

        match FilesystemId::from_handle(volume_id) {
            Ok(id) => self.delete_filesystem(id).await,
            Err(e) => {
                warn!("Ignoring delete of unparsable volume ID '{}': {}", volume_id, e);
                Ok(DeletionOutcome::AlreadyGone)
            }
        }
    }

    pub async fn delete_filesystem(&self, id: FilesystemId) -> Result<DeletionOutcome, DriverError> {
        if let Err(e) = self.array.get_filesystem_by_id(id).await {
            info!("Filesystem {} not retrievable, treating as deleted: {}", id, e);
            return Ok(DeletionOutcome::AlreadyGone);
        }

        let has_child = self
            .array
            .filesystem_has_child(id)
            .await
            .map_err(|e| DriverError::Internal(format!("failed to check children of {}: {}", id, e)))?;

        if has_child {
            self.metadata.mark_for_deferred_delete(id).await.map_err(|e| {
                error!("Failed to mark filesystem {} for deferred deletion: {}", id, e);
                DriverError::Internal(format!("failed to set deferred-delete marker on {}: {}", id, e))
            })?;
            info!("Filesystem {} has children, deletion deferred", id);
            return Ok(DeletionOutcome::Deferred { filesystem_id: id });
        }

        let parent = self.parent_of(id).await;

        match self.array.delete_filesystem_complete(id).await {
            Ok(()) => {}
            Err(ArrayError::NotFound(_)) => {
                info!("Filesystem {} already deleted from the array", id);
                return Ok(DeletionOutcome::AlreadyGone);
            }
            Err(e) => {
                error!("Failed to delete filesystem {}: {}", id, e);
                return Err(DriverError::Internal(format!("failed to delete filesystem {}: {}", id, e)));
            }
        }
        info!("Deleted filesystem {}", id);

        let parents_reaped = self.reap_parents(parent).await;
        Ok(DeletionOutcome::Deleted {
            filesystem_id: id,
            parents_reaped,
        })
    }

    async fn parent_of(&self, id: FilesystemId) -> Option<FilesystemId> {
        match self.array.get_parent_id(id).await {
            Ok(parent) => parent,
            Err(e) => {
                warn!("Could not resolve parent of {}: {}", id, e);
                None
            }
        }
    }

    async fn reap_parents(&self, mut next: Option<FilesystemId>) -> Vec<FilesystemId> {
        let mut reaped = Vec::new();

        while let Some(parent) = next {
            match self.metadata.is_marked_for_delete(parent).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Parent {} is not marked for deletion", parent);
                    break;
                }
                Err(e) => {
                    warn!("Could not read metadata of parent {}: {}", parent, e);
                    break;
                }
            }

            match self.array.filesystem_has_child(parent).await {
                Ok(false) => {}
                Ok(true) => {
                    debug!("Parent {} still has children", parent);
                    break;
                }
                Err(e) => {
                    warn!("Could not check children of parent {}: {}", parent, e);
                    break;
                }
            }

            let grandparent = self.parent_of(parent).await;
            if let Err(e) = self.array.delete_filesystem_complete(parent).await {
                error!("Failed to delete parent filesystem {}: {}", parent, e);
                break;
            }
            info!("Deleted parent filesystem {} marked for deferred deletion", parent);
            reaped.push(parent);
            next = grandparent;
        }

        reaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::metadata::DEFERRED_DELETE_KEY;
    use crate::domain::volume::{PoolId, GIB};
    use crate::infrastructure::array::{ArrayOp, InMemoryArray};

    fn setup() -> (Arc<InMemoryArray>, VolumeDeletionManager) {
        let array = Arc::new(InMemoryArray::new());
        let manager = VolumeDeletionManager::new(array.clone());
        (array, manager)
    }

    #[tokio::test]
    async fn test_missing_volume_is_success() {
        let (array, manager) = setup();
        assert_eq!(manager.delete_volume("4242").await.unwrap(), DeletionOutcome::AlreadyGone);
        assert_eq!(manager.delete_volume("garbage").await.unwrap(), DeletionOutcome::AlreadyGone);
        assert!(array.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_volume_id_is_invalid() {
        let (_array, manager) = setup();
        assert!(matches!(
            manager.delete_volume("").await,
            Err(DriverError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_children_defer_deletion() {
        let (array, manager) = setup();
        let parent = array.insert_filesystem("vol", PoolId(1), GIB, None);
        array.insert_filesystem("snap", PoolId(1), GIB, Some(parent));

        let outcome = manager.delete_volume(&parent.to_string()).await.unwrap();

        assert_eq!(outcome, DeletionOutcome::Deferred { filesystem_id: parent });
        assert_eq!(array.metadata(parent)[DEFERRED_DELETE_KEY], serde_json::Value::Bool(true));
        assert_eq!(array.call_count(ArrayOp::DeleteFilesystemComplete), 0);
        assert!(array.filesystem(parent).is_some());
    }

    #[tokio::test]
    async fn test_marked_parent_is_reaped_with_last_child() {
        let (array, manager) = setup();
        let parent = array.insert_filesystem("vol", PoolId(1), GIB, None);
        let child = array.insert_filesystem("clone", PoolId(1), GIB, Some(parent));

        manager.delete_volume(&parent.to_string()).await.unwrap();
        let outcome = manager.delete_volume(&format!("{}$$nfs", child)).await.unwrap();

        assert_eq!(
            outcome,
            DeletionOutcome::Deleted {
                filesystem_id: child,
                parents_reaped: vec![parent]
            }
        );
        assert_eq!(array.filesystem_count(), 0);
    }

    #[tokio::test]
    async fn test_parent_reap_failure_still_reports_child_deleted() {
        let (array, manager) = setup();
        let parent = array.insert_filesystem("vol", PoolId(1), GIB, None);
        let child = array.insert_filesystem("clone", PoolId(1), GIB, Some(parent));
        manager.delete_volume(&parent.to_string()).await.unwrap();
        // the child's delete goes through, the parent's is refused
        array.fail_on_after(ArrayOp::DeleteFilesystemComplete, 1);

        let outcome = manager.delete_volume(&child.to_string()).await.unwrap();

        assert_eq!(
            outcome,
            DeletionOutcome::Deleted {
                filesystem_id: child,
                parents_reaped: vec![]
            }
        );
        assert_eq!(array.call_count(ArrayOp::DeleteFilesystemComplete), 2);
        assert!(array.filesystem(child).is_none());
        assert!(array.filesystem(parent).is_some());
        assert_eq!(array.metadata(parent)[DEFERRED_DELETE_KEY], serde_json::Value::Bool(true));
    }

    #[tokio::test]
    async fn test_unmarked_parent_survives() {
        let (array, manager) = setup();
        let parent = array.insert_filesystem("vol", PoolId(1), GIB, None);
        let child = array.insert_filesystem("clone", PoolId(1), GIB, Some(parent));

        let outcome = manager.delete_volume(&child.to_string()).await.unwrap();

        assert_eq!(
            outcome,
            DeletionOutcome::Deleted {
                filesystem_id: child,
                parents_reaped: vec![]
            }
        );
        assert!(array.filesystem(parent).is_some());
    }

    #[tokio::test]
    async fn test_marker_failure_is_internal() {
        let (array, manager) = setup();
        let parent = array.insert_filesystem("vol", PoolId(1), GIB, None);
        array.insert_filesystem("snap", PoolId(1), GIB, Some(parent));
        array.fail_on(ArrayOp::AttachMetadataToObject);

        assert!(matches!(
            manager.delete_volume(&parent.to_string()).await,
            Err(DriverError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_not_found_during_delete_is_success() {
        let (array, manager) = setup();
        let fs = array.insert_filesystem("vol", PoolId(1), GIB, None);
        array.not_found_on(ArrayOp::DeleteFilesystemComplete);

        assert_eq!(manager.delete_volume(&fs.to_string()).await.unwrap(), DeletionOutcome::AlreadyGone);
    }
}
