// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! In-memory storage array
//!
//! Behaves like a small array: filesystems, snapshots (child filesystems),
//! exports, metadata, pools and network spaces. Every call is logged and any
//! operation can be made to fail, which is what the lifecycle tests rely on.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::domain::array::{
    ArrayError, ExportRecord, FilesystemRecord, NewExport, NewFilesystem, NewSnapshot,
    ObjectMetadata, SnapshotRecord, StorageArrayClient,
};
use crate::domain::volume::{ExportId, FilesystemId, PoolId};

/// Operations of [`StorageArrayClient`], for call logs and fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayOp {
    CreateFilesystem,
    DeleteFilesystem,
    DeleteFilesystemComplete,
    GetFilesystemById,
    GetFilesystemByName,
    GetFilesystemCount,
    UpdateFilesystem,
    GetStoragePoolIdByName,
    ExportFilesystem,
    DeleteExportPath,
    AddNodeInExport,
    DeleteExportRule,
    CreateFilesystemSnapshot,
    RestoreFilesystemFromSnapshot,
    GetSnapshotsByName,
    FilesystemHasChild,
    AttachMetadataToObject,
    GetObjectMetadata,
    GetNetworkSpaceIp,
    OneTimeValidation,
}

impl ArrayOp {
    /// Whether the operation changes state on the array
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::CreateFilesystem
                | Self::DeleteFilesystem
                | Self::DeleteFilesystemComplete
                | Self::UpdateFilesystem
                | Self::ExportFilesystem
                | Self::DeleteExportPath
                | Self::AddNodeInExport
                | Self::DeleteExportRule
                | Self::CreateFilesystemSnapshot
                | Self::RestoreFilesystemFromSnapshot
                | Self::AttachMetadataToObject
        )
    }
}

impl fmt::Display for ArrayOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy)]
enum Fault {
    Error,
    NotFound,
}

struct ArrayState {
    next_id: i64,
    filesystems: BTreeMap<FilesystemId, FilesystemRecord>,
    exports: BTreeMap<ExportId, ExportRecord>,
    metadata: HashMap<FilesystemId, ObjectMetadata>,
    pools: HashMap<String, PoolId>,
    network_spaces: HashMap<String, String>,
    /// Fault per operation, with the number of calls still let through
    faults: HashMap<ArrayOp, (Fault, usize)>,
    calls: Vec<ArrayOp>,
    reported_count: Option<u64>,
    restore_result: bool,
    unique_names: bool,
}

impl ArrayState {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn filesystem(&self, id: FilesystemId) -> Result<&FilesystemRecord, ArrayError> {
        self.filesystems
            .get(&id)
            .ok_or_else(|| ArrayError::NotFound(format!("filesystem {}", id)))
    }

    fn has_child(&self, id: FilesystemId) -> bool {
        self.filesystems.values().any(|fs| fs.parent_id == Some(id))
    }

    fn snapshot_record(fs: &FilesystemRecord, parent_id: FilesystemId) -> SnapshotRecord {
        SnapshotRecord {
            snapshot_id: fs.id,
            parent_id,
            name: fs.name.clone(),
            write_protected: fs.write_protected,
            size: fs.size,
            created_at: fs.created_at.unwrap_or_else(Utc::now),
        }
    }
}

pub struct InMemoryArray {
    state: Mutex<ArrayState>,
}

impl InMemoryArray {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ArrayState {
                next_id: 1000,
                filesystems: BTreeMap::new(),
                exports: BTreeMap::new(),
                metadata: HashMap::new(),
                pools: HashMap::new(),
                network_spaces: HashMap::new(),
                faults: HashMap::new(),
                calls: Vec::new(),
                reported_count: None,
                restore_result: true,
                unique_names: true,
            }),
        }
    }

    pub fn with_pool(self, name: &str, id: i64) -> Self {
        self.state.lock().pools.insert(name.to_string(), PoolId(id));
        self
    }

    /// Accept several filesystems with the same name, as some arrays do
    pub fn allowing_duplicate_names(self) -> Self {
        self.state.lock().unique_names = false;
        self
    }

    pub fn with_network_space(self, name: &str, ip: &str) -> Self {
        self.state
            .lock()
            .network_spaces
            .insert(name.to_string(), ip.to_string());
        self
    }

    /// Seed a filesystem directly, bypassing the call log
    pub fn insert_filesystem(
        &self,
        name: &str,
        pool_id: PoolId,
        size: u64,
        parent_id: Option<FilesystemId>,
    ) -> FilesystemId {
        let mut state = self.state.lock();
        let id = FilesystemId(state.allocate_id());
        state.filesystems.insert(
            id,
            FilesystemRecord {
                id,
                name: name.to_string(),
                pool_id,
                size,
                parent_id,
                write_protected: false,
                created_at: Some(Utc::now()),
            },
        );
        id
    }

    /// Make every later call of `op` fail with an array error
    pub fn fail_on(&self, op: ArrayOp) {
        self.state.lock().faults.insert(op, (Fault::Error, 0));
    }

    /// Let `passes` calls of `op` succeed, then fail every later one
    pub fn fail_on_after(&self, op: ArrayOp, passes: usize) {
        self.state.lock().faults.insert(op, (Fault::Error, passes));
    }

    /// Make every later call of `op` fail with `ArrayError::NotFound`
    pub fn not_found_on(&self, op: ArrayOp) {
        self.state.lock().faults.insert(op, (Fault::NotFound, 0));
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// Report this many filesystems regardless of actual content
    pub fn set_reported_filesystem_count(&self, count: u64) {
        self.state.lock().reported_count = Some(count);
    }

    pub fn set_restore_result(&self, success: bool) {
        self.state.lock().restore_result = success;
    }

    pub fn calls(&self) -> Vec<ArrayOp> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self, op: ArrayOp) -> usize {
        self.state.lock().calls.iter().filter(|c| **c == op).count()
    }

    pub fn mutating_calls(&self) -> Vec<ArrayOp> {
        self.calls().into_iter().filter(|c| c.is_mutating()).collect()
    }

    pub fn filesystem(&self, id: FilesystemId) -> Option<FilesystemRecord> {
        self.state.lock().filesystems.get(&id).cloned()
    }

    pub fn filesystem_count(&self) -> usize {
        self.state.lock().filesystems.len()
    }

    pub fn exports(&self) -> Vec<ExportRecord> {
        self.state.lock().exports.values().cloned().collect()
    }

    pub fn metadata(&self, id: FilesystemId) -> ObjectMetadata {
        self.state.lock().metadata.get(&id).cloned().unwrap_or_default()
    }

    fn enter(&self, op: ArrayOp) -> Result<MutexGuard<'_, ArrayState>, ArrayError> {
        let mut state = self.state.lock();
        state.calls.push(op);
        let fault = match state.faults.get_mut(&op) {
            Some((_, passes)) if *passes > 0 => {
                *passes -= 1;
                None
            }
            Some((fault, _)) => Some(*fault),
            None => None,
        };
        match fault {
            Some(Fault::Error) => Err(ArrayError::Api {
                code: "INJECTED_FAILURE".to_string(),
                message: format!("injected failure in {}", op),
            }),
            Some(Fault::NotFound) => Err(ArrayError::NotFound(format!("injected not-found in {}", op))),
            None => Ok(state),
        }
    }
}

impl Default for InMemoryArray {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageArrayClient for InMemoryArray {
    async fn create_filesystem(&self, request: &NewFilesystem) -> Result<FilesystemRecord, ArrayError> {
        let mut state = self.enter(ArrayOp::CreateFilesystem)?;
        if !state.pools.values().any(|p| *p == request.pool_id) {
            return Err(ArrayError::NotFound(format!("pool {}", request.pool_id)));
        }
        if state.unique_names && state.filesystems.values().any(|fs| fs.name == request.name) {
            return Err(ArrayError::AlreadyExists(request.name.clone()));
        }

        let id = FilesystemId(state.allocate_id());
        let record = FilesystemRecord {
            id,
            name: request.name.clone(),
            pool_id: request.pool_id,
            size: request.size,
            parent_id: None,
            write_protected: false,
            created_at: Some(Utc::now()),
        };
        state.filesystems.insert(id, record.clone());
        Ok(record)
    }

    async fn delete_filesystem(&self, id: FilesystemId) -> Result<(), ArrayError> {
        let mut state = self.enter(ArrayOp::DeleteFilesystem)?;
        state.filesystem(id)?;
        if state.has_child(id) {
            return Err(ArrayError::Api {
                code: "FILESYSTEM_HAS_CHILDREN".to_string(),
                message: format!("filesystem {} has children", id),
            });
        }
        if state.exports.values().any(|e| e.filesystem_id == id) {
            return Err(ArrayError::Api {
                code: "FILESYSTEM_HAS_EXPORTS".to_string(),
                message: format!("filesystem {} is exported", id),
            });
        }
        state.filesystems.remove(&id);
        state.metadata.remove(&id);
        Ok(())
    }

    async fn delete_filesystem_complete(&self, id: FilesystemId) -> Result<(), ArrayError> {
        let mut state = self.enter(ArrayOp::DeleteFilesystemComplete)?;
        state.filesystem(id)?;
        if state.has_child(id) {
            return Err(ArrayError::Api {
                code: "FILESYSTEM_HAS_CHILDREN".to_string(),
                message: format!("filesystem {} has children", id),
            });
        }
        state.exports.retain(|_, e| e.filesystem_id != id);
        state.metadata.remove(&id);
        state.filesystems.remove(&id);
        Ok(())
    }

    async fn get_filesystem_by_id(&self, id: FilesystemId) -> Result<FilesystemRecord, ArrayError> {
        let state = self.enter(ArrayOp::GetFilesystemById)?;
        state.filesystem(id).cloned()
    }

    async fn get_filesystem_by_name(&self, name: &str) -> Result<Option<FilesystemRecord>, ArrayError> {
        let state = self.enter(ArrayOp::GetFilesystemByName)?;
        Ok(state.filesystems.values().find(|fs| fs.name == name).cloned())
    }

    async fn get_filesystem_count(&self) -> Result<u64, ArrayError> {
        let state = self.enter(ArrayOp::GetFilesystemCount)?;
        Ok(state
            .reported_count
            .unwrap_or(state.filesystems.len() as u64))
    }

    async fn update_filesystem_size(&self, id: FilesystemId, size: u64) -> Result<FilesystemRecord, ArrayError> {
        let mut state = self.enter(ArrayOp::UpdateFilesystem)?;
        let fs = state
            .filesystems
            .get_mut(&id)
            .ok_or_else(|| ArrayError::NotFound(format!("filesystem {}", id)))?;
        fs.size = size;
        Ok(fs.clone())
    }

    async fn get_storage_pool_id_by_name(&self, name: &str) -> Result<PoolId, ArrayError> {
        let state = self.enter(ArrayOp::GetStoragePoolIdByName)?;
        state
            .pools
            .get(name)
            .copied()
            .ok_or_else(|| ArrayError::NotFound(format!("pool {}", name)))
    }

    async fn export_filesystem(&self, request: &NewExport) -> Result<ExportRecord, ArrayError> {
        let mut state = self.enter(ArrayOp::ExportFilesystem)?;
        state.filesystem(request.filesystem_id)?;
        if state.exports.values().any(|e| e.export_path == request.export_path) {
            return Err(ArrayError::AlreadyExists(request.export_path.clone()));
        }

        let id = ExportId(state.allocate_id());
        let record = ExportRecord {
            id,
            filesystem_id: request.filesystem_id,
            export_path: request.export_path.clone(),
            export_block: request.export_path.clone(),
            transport_protocols: request.transport_protocols.clone(),
            privileged_port: request.privileged_port,
            permissions: request.permissions.clone(),
        };
        state.exports.insert(id, record.clone());
        Ok(record)
    }

    async fn delete_export_path(&self, id: ExportId) -> Result<(), ArrayError> {
        let mut state = self.enter(ArrayOp::DeleteExportPath)?;
        state
            .exports
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| ArrayError::NotFound(format!("export {}", id)))
    }

    async fn add_node_in_export(
        &self,
        id: ExportId,
        access: &str,
        no_root_squash: bool,
        node_ip: &str,
    ) -> Result<ExportRecord, ArrayError> {
        let mut state = self.enter(ArrayOp::AddNodeInExport)?;
        let export = state
            .exports
            .get_mut(&id)
            .ok_or_else(|| ArrayError::NotFound(format!("export {}", id)))?;
        if !export.permissions.iter().any(|p| p.client == node_ip) {
            export.permissions.push(crate::domain::array::ExportPermission {
                access: access.to_string(),
                no_root_squash,
                client: node_ip.to_string(),
            });
        }
        Ok(export.clone())
    }

    async fn delete_export_rule(&self, filesystem_id: FilesystemId, node: &str) -> Result<(), ArrayError> {
        let mut state = self.enter(ArrayOp::DeleteExportRule)?;
        for export in state.exports.values_mut() {
            if export.filesystem_id == filesystem_id {
                export.permissions.retain(|p| p.client != node);
            }
        }
        Ok(())
    }

    async fn create_filesystem_snapshot(&self, request: &NewSnapshot) -> Result<SnapshotRecord, ArrayError> {
        let mut state = self.enter(ArrayOp::CreateFilesystemSnapshot)?;
        let parent = state.filesystem(request.parent_id)?.clone();

        let id = FilesystemId(state.allocate_id());
        let record = FilesystemRecord {
            id,
            name: request.name.clone(),
            pool_id: parent.pool_id,
            size: parent.size,
            parent_id: Some(parent.id),
            write_protected: request.write_protected,
            created_at: Some(Utc::now()),
        };
        state.filesystems.insert(id, record.clone());
        Ok(ArrayState::snapshot_record(&record, parent.id))
    }

    async fn restore_filesystem_from_snapshot(
        &self,
        filesystem_id: FilesystemId,
        snapshot_id: FilesystemId,
    ) -> Result<bool, ArrayError> {
        let state = self.enter(ArrayOp::RestoreFilesystemFromSnapshot)?;
        state.filesystem(filesystem_id)?;
        state.filesystem(snapshot_id)?;
        Ok(state.restore_result)
    }

    async fn get_snapshots_by_name(&self, name: &str) -> Result<Vec<SnapshotRecord>, ArrayError> {
        let state = self.enter(ArrayOp::GetSnapshotsByName)?;
        Ok(state
            .filesystems
            .values()
            .filter(|fs| fs.name == name)
            .filter_map(|fs| fs.parent_id.map(|parent| ArrayState::snapshot_record(fs, parent)))
            .collect())
    }

    async fn filesystem_has_child(&self, id: FilesystemId) -> Result<bool, ArrayError> {
        let state = self.enter(ArrayOp::FilesystemHasChild)?;
        state.filesystem(id)?;
        Ok(state.has_child(id))
    }

    async fn attach_metadata_to_object(&self, id: FilesystemId, metadata: &ObjectMetadata) -> Result<(), ArrayError> {
        let mut state = self.enter(ArrayOp::AttachMetadataToObject)?;
        state.filesystem(id)?;
        let entry = state.metadata.entry(id).or_default();
        for (key, value) in metadata {
            entry.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn get_object_metadata(&self, id: FilesystemId) -> Result<ObjectMetadata, ArrayError> {
        let state = self.enter(ArrayOp::GetObjectMetadata)?;
        state.filesystem(id)?;
        Ok(state.metadata.get(&id).cloned().unwrap_or_default())
    }

    async fn get_network_space_ip(&self, network_space: &str) -> Result<String, ArrayError> {
        let state = self.enter(ArrayOp::GetNetworkSpaceIp)?;
        network_space
            .split(',')
            .map(str::trim)
            .find_map(|name| state.network_spaces.get(name).cloned())
            .ok_or_else(|| ArrayError::NotFound(format!("network space {}", network_space)))
    }

    async fn one_time_validation(&self, pool_name: &str, network_space: &str) -> Result<String, ArrayError> {
        let state = self.enter(ArrayOp::OneTimeValidation)?;
        if !state.pools.contains_key(pool_name) {
            return Err(ArrayError::NotFound(format!("pool {}", pool_name)));
        }
        let valid: Vec<&str> = network_space
            .split(',')
            .map(str::trim)
            .filter(|name| state.network_spaces.contains_key(*name))
            .collect();
        if valid.is_empty() {
            return Err(ArrayError::NotFound(format!(
                "no valid network space in '{}'",
                network_space
            )));
        }
        Ok(valid.join(","))
    }
}
