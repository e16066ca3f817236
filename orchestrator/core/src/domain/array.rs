// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! Storage Array Client Trait - Anti-Corruption Layer for the array API
//!
//! Isolates the lifecycle logic from the array's management API. The
//! orchestrator only ever talks to [`StorageArrayClient`]; concrete
//! adapters live in `infrastructure::array`.
//!
//! Every call may fail with an [`ArrayError`]. The client never retries;
//! classification into the driver taxonomy happens in the application layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::volume::{ExportId, FilesystemId, PoolId};

/// Metadata attached to an array object (key → JSON value)
pub type ObjectMetadata = BTreeMap<String, serde_json::Value>;

/// Filesystem (or filesystem snapshot) as reported by the array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesystemRecord {
    pub id: FilesystemId,
    pub name: String,
    pub pool_id: PoolId,
    /// Provisioned size in bytes
    pub size: u64,
    /// Set when this filesystem is a snapshot/clone of another
    pub parent_id: Option<FilesystemId>,
    pub write_protected: bool,
    pub created_at: Option<DateTime<Utc>>,
}

/// Payload for creating a brand-new filesystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFilesystem {
    pub pool_id: PoolId,
    pub name: String,
    pub ssd_enabled: bool,
    /// Upper-cased provisioning type; empty lets the array decide
    pub provtype: String,
    pub size: u64,
}

/// One access rule on an export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportPermission {
    /// Access mode string, e.g. "RW" or "RO"
    pub access: String,
    pub no_root_squash: bool,
    /// Client pattern ("*" or a node address)
    pub client: String,
}

/// Payload for exporting a filesystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExport {
    pub filesystem_id: FilesystemId,
    pub export_path: String,
    pub transport_protocols: String,
    pub privileged_port: bool,
    pub permissions: Vec<ExportPermission>,
}

/// An export as reported by the array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub id: ExportId,
    pub filesystem_id: FilesystemId,
    pub export_path: String,
    /// Opaque export handle returned by the array
    pub export_block: String,
    pub transport_protocols: String,
    pub privileged_port: bool,
    pub permissions: Vec<ExportPermission>,
}

/// Payload for creating a filesystem snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSnapshot {
    pub parent_id: FilesystemId,
    pub name: String,
    pub write_protected: bool,
}

/// A filesystem snapshot as reported by the array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub snapshot_id: FilesystemId,
    pub parent_id: FilesystemId,
    pub name: String,
    pub write_protected: bool,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Capability set of the remote storage array
///
/// Implementations must be safe for concurrent use; each lifecycle
/// operation calls them strictly sequentially.
#[async_trait]
pub trait StorageArrayClient: Send + Sync {
    /// Create a filesystem and return the array's record of it
    async fn create_filesystem(&self, request: &NewFilesystem) -> Result<FilesystemRecord, ArrayError>;

    /// Delete a filesystem or snapshot object
    async fn delete_filesystem(&self, id: FilesystemId) -> Result<(), ArrayError>;

    /// Delete a filesystem together with its exports and metadata
    async fn delete_filesystem_complete(&self, id: FilesystemId) -> Result<(), ArrayError>;

    async fn get_filesystem_by_id(&self, id: FilesystemId) -> Result<FilesystemRecord, ArrayError>;

    /// Filesystem or snapshot carrying `name`, if any
    async fn get_filesystem_by_name(&self, name: &str) -> Result<Option<FilesystemRecord>, ArrayError>;

    /// Total number of filesystems currently on the array
    async fn get_filesystem_count(&self) -> Result<u64, ArrayError>;

    /// Resize a filesystem
    async fn update_filesystem_size(
        &self,
        id: FilesystemId,
        size: u64,
    ) -> Result<FilesystemRecord, ArrayError>;

    async fn get_storage_pool_id_by_name(&self, name: &str) -> Result<PoolId, ArrayError>;

    /// Export a filesystem over NFS
    async fn export_filesystem(&self, request: &NewExport) -> Result<ExportRecord, ArrayError>;

    async fn delete_export_path(&self, id: ExportId) -> Result<(), ArrayError>;

    /// Add an access rule for a node to an existing export
    async fn add_node_in_export(
        &self,
        id: ExportId,
        access: &str,
        no_root_squash: bool,
        node_ip: &str,
    ) -> Result<ExportRecord, ArrayError>;

    /// Remove a node's access rule from every export of a filesystem
    async fn delete_export_rule(&self, filesystem_id: FilesystemId, node: &str) -> Result<(), ArrayError>;

    async fn create_filesystem_snapshot(&self, request: &NewSnapshot) -> Result<SnapshotRecord, ArrayError>;

    /// Revert `filesystem_id` to the content of `snapshot_id`
    ///
    /// Returns whether the array reports the restore as successful.
    async fn restore_filesystem_from_snapshot(
        &self,
        filesystem_id: FilesystemId,
        snapshot_id: FilesystemId,
    ) -> Result<bool, ArrayError>;

    /// All snapshots with the given name, across parents
    async fn get_snapshots_by_name(&self, name: &str) -> Result<Vec<SnapshotRecord>, ArrayError>;

    async fn filesystem_has_child(&self, id: FilesystemId) -> Result<bool, ArrayError>;

    /// Parent of a snapshot/clone, `None` for a root filesystem
    async fn get_parent_id(&self, id: FilesystemId) -> Result<Option<FilesystemId>, ArrayError> {
        Ok(self.get_filesystem_by_id(id).await?.parent_id)
    }

    /// Merge metadata into an object's existing metadata
    async fn attach_metadata_to_object(
        &self,
        id: FilesystemId,
        metadata: &ObjectMetadata,
    ) -> Result<(), ArrayError>;

    async fn get_object_metadata(&self, id: FilesystemId) -> Result<ObjectMetadata, ArrayError>;

    /// First enabled IP address of a network space
    async fn get_network_space_ip(&self, network_space: &str) -> Result<String, ArrayError>;

    /// Check the pool exists and filter `network_space` (comma separated)
    /// down to the spaces the array knows about
    ///
    /// Returns the validated, comma-joined network space list.
    async fn one_time_validation(&self, pool_name: &str, network_space: &str) -> Result<String, ArrayError>;
}

/// Array client errors
#[derive(Debug, Error)]
pub enum ArrayError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Array API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout while communicating with the storage array")]
    Timeout,

    #[error("Array unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown array error: {0}")]
    Unknown(String),
}

impl From<reqwest::Error> for ArrayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ArrayError::Timeout
        } else if err.is_connect() {
            ArrayError::Network(err.to_string())
        } else if err.is_decode() {
            ArrayError::Serialization(err.to_string())
        } else {
            ArrayError::Unknown(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ArrayError {
    fn from(err: serde_json::Error) -> Self {
        ArrayError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_error_maps_to_serialization() {
        let err = serde_json::from_str::<FilesystemRecord>("{").unwrap_err();
        assert!(matches!(ArrayError::from(err), ArrayError::Serialization(_)));
    }

    #[test]
    fn test_export_permission_wire_shape() {
        let permission = ExportPermission {
            access: "RW".to_string(),
            no_root_squash: true,
            client: "*".to_string(),
        };
        let json = serde_json::to_value(&permission).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"access": "RW", "no_root_squash": true, "client": "*"})
        );
    }
}
