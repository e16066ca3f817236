// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! Volume Provisioning Orchestrator
//!
//! Drives a create request through its steps, strictly in order:
//!
//! 1. Resolve or create the filesystem (fresh, clone or restore)
//! 2. Export it under the export root
//! 3. Resolve the network-space IP clients mount from
//! 4. Tag the filesystem with its owning volume name
//!
//! Every mutating step registers its undo on a [`CompensationStack`]. Any
//! failure unwinds the stack before the error is returned, so a descriptor
//! exists if and only if all four steps committed. A restored filesystem is
//! a pre-existing parent and is never deleted on rollback.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::application::compensation::{Compensation, CompensationStack};
use crate::application::export_path::ExportPathManager;
use crate::application::filesystem::FilesystemProvisioner;
use crate::application::metadata::MetadataTagger;
use crate::application::snapshot::SnapshotResolver;
use crate::domain::array::{ArrayError, ExportRecord, FilesystemRecord, StorageArrayClient};
use crate::domain::error::DriverError;
use crate::domain::options::{
    ProvisionRequest, ProvisioningDefaults, ProvisioningOptions, NFS_NETWORKSPACE,
};
use crate::domain::volume::{
    build_volume_context, normalize_capacity, AccessType, ContentSource, VolumeDescriptor,
};

/// A fully committed volume and the context the attach path needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedVolume {
    pub descriptor: VolumeDescriptor,
    pub context: BTreeMap<String, String>,
}

/// A failed provisioning attempt
#[derive(Debug)]
pub struct ProvisioningFailure {
    pub error: DriverError,
    /// Undo actions executed while unwinding
    pub compensations_run: usize,
    pub compensation_failures: usize,
}

impl ProvisioningFailure {
    fn before_mutation(error: DriverError) -> Self {
        Self {
            error,
            compensations_run: 0,
            compensation_failures: 0,
        }
    }
}

impl From<ProvisioningFailure> for DriverError {
    fn from(failure: ProvisioningFailure) -> Self {
        failure.error
    }
}

pub struct VolumeProvisioner {
    array: Arc<dyn StorageArrayClient>,
    defaults: ProvisioningDefaults,
    filesystems: FilesystemProvisioner,
    exports: ExportPathManager,
    snapshots: SnapshotResolver,
    metadata: MetadataTagger,
}

impl VolumeProvisioner {
    pub fn new(array: Arc<dyn StorageArrayClient>, defaults: ProvisioningDefaults) -> Self {
        Self {
            filesystems: FilesystemProvisioner::new(array.clone(), defaults.max_filesystems),
            exports: ExportPathManager::new(array.clone()),
            snapshots: SnapshotResolver::new(array.clone()),
            metadata: MetadataTagger::new(array.clone()),
            array,
            defaults,
        }
    }

    pub fn defaults(&self) -> &ProvisioningDefaults {
        &self.defaults
    }

    pub async fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionedVolume, ProvisioningFailure> {
        let options = ProvisioningOptions::from_parameters(&request.parameters, &self.defaults).map_err(|e| {
            error!("Rejected volume '{}': {}", request.name, e);
            ProvisioningFailure::before_mutation(e)
        })?;

        let (capacity, clamped) = normalize_capacity(request.capacity_bytes);
        if clamped {
            warn!(
                "Volume '{}' requested {} bytes, raising to the {} byte minimum",
                request.name, request.capacity_bytes, capacity
            );
        }

        info!(
            "Provisioning volume '{}' ({} bytes, source: {}) in pool '{}'",
            request.name,
            capacity,
            request.content_source.kind(),
            options.pool_name
        );

        let mut compensations = CompensationStack::new();
        match self.run_steps(request, options, capacity, &mut compensations).await {
            Ok(volume) => {
                compensations.commit();
                info!(
                    "Volume '{}' provisioned as filesystem {} exported at {}",
                    request.name, volume.descriptor.filesystem_id, volume.descriptor.vol_path
                );
                Ok(volume)
            }
            Err(error) => {
                let compensations_run = compensations.len();
                let compensation_failures = compensations.unwind(self.array.as_ref()).await;
                error!(
                    "Provisioning of '{}' failed: {} ({} rollback steps, {} failed)",
                    request.name, error, compensations_run, compensation_failures
                );
                Err(ProvisioningFailure {
                    error,
                    compensations_run,
                    compensation_failures,
                })
            }
        }
    }

    async fn run_steps(
        &self,
        request: &ProvisionRequest,
        mut options: ProvisioningOptions,
        capacity: u64,
        compensations: &mut CompensationStack,
    ) -> Result<ProvisionedVolume, DriverError> {
        self.ensure_name_free(&request.name).await?;

        let mut parameters = request.parameters.clone();

        let filesystem = match &request.content_source {
            ContentSource::None => {
                let validated = self
                    .array
                    .one_time_validation(&options.pool_name, &options.network_space)
                    .await
                    .map_err(|e| match e {
                        ArrayError::NotFound(message) => DriverError::InvalidArgument(message),
                        other => DriverError::Internal(format!("network space validation failed: {}", other)),
                    })?;
                debug!("Validated network spaces: {}", validated);
                parameters.insert(NFS_NETWORKSPACE.to_string(), validated.clone());
                options.network_space = validated;

                let fs = self
                    .filesystems
                    .create_filesystem(&request.name, &options, capacity)
                    .await?;
                compensations.push(Compensation::DeleteFilesystem(fs.id));
                fs
            }
            ContentSource::Volume(source) => {
                let fs = self
                    .snapshots
                    .clone_volume(source, &request.name, capacity, &options.pool_name)
                    .await?;
                compensations.push(Compensation::DeleteFilesystem(fs.id));
                fs
            }
            ContentSource::Snapshot(source) => {
                self.snapshots
                    .restore_from_snapshot(source, &request.name, capacity, &options.pool_name)
                    .await?
            }
        };

        let export_path = self.defaults.export_path_for(&request.name);
        let export = self
            .exports
            .create_export(filesystem.id, &export_path, &options.export_policy())
            .await?;
        compensations.push(Compensation::DeleteExport(export.id));

        let ip_address = self
            .array
            .get_network_space_ip(&options.network_space)
            .await
            .map_err(|e| {
                DriverError::Internal(format!(
                    "failed to resolve IP of network space '{}': {}",
                    options.network_space, e
                ))
            })?;
        debug!("Network space '{}' resolves to {}", options.network_space, ip_address);

        self.metadata
            .tag_owner(filesystem.id, &request.name)
            .await
            .map_err(|e| {
                DriverError::Internal(format!("failed to attach metadata to {}: {}", filesystem.id, e))
            })?;

        let descriptor = describe(&request.name, &filesystem, capacity, export_path, ip_address, export);
        let context = build_volume_context(&parameters, &descriptor);
        Ok(ProvisionedVolume { descriptor, context })
    }

    /// Arrays may accept duplicate names, so the check happens here
    async fn ensure_name_free(&self, name: &str) -> Result<(), DriverError> {
        match self.array.get_filesystem_by_name(name).await {
            Ok(None) => Ok(()),
            Ok(Some(existing)) => {
                warn!("Volume '{}' already exists as filesystem {}", name, existing.id);
                Err(DriverError::AlreadyExists(format!(
                    "filesystem '{}' already exists as {}",
                    name, existing.id
                )))
            }
            Err(e) => Err(DriverError::Internal(format!(
                "failed to look up filesystem '{}': {}",
                name, e
            ))),
        }
    }
}

fn describe(
    name: &str,
    filesystem: &FilesystemRecord,
    capacity: u64,
    export_path: String,
    ip_address: String,
    export: ExportRecord,
) -> VolumeDescriptor {
    VolumeDescriptor {
        vol_name: name.to_string(),
        volume_id: filesystem.id.to_string(),
        vol_size: capacity,
        vol_path: export_path,
        ip_address,
        vol_access_type: AccessType::Mount,
        ephemeral: false,
        export_id: export.id,
        filesystem_id: filesystem.id,
        export_block: export.export_block,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::volume::{context_keys, FilesystemId, PoolId, GIB, MIB};
    use crate::infrastructure::array::{ArrayOp, InMemoryArray};
    use tonic::Code;

    fn array() -> Arc<InMemoryArray> {
        Arc::new(
            InMemoryArray::new()
                .with_pool("pool0", 1)
                .with_network_space("ns0", "10.0.0.1"),
        )
    }

    fn request(name: &str, capacity: u64) -> ProvisionRequest {
        ProvisionRequest::new(name, capacity)
            .with_parameter("pool_name", "pool0")
            .with_parameter("nfs_networkspace", "ns0")
    }

    #[tokio::test]
    async fn test_fresh_volume() {
        let array = array();
        let provisioner = VolumeProvisioner::new(array.clone(), ProvisioningDefaults::default());

        let volume = provisioner.provision(&request("pvc-1", 500 * MIB)).await.unwrap();

        let descriptor = &volume.descriptor;
        assert_eq!(descriptor.vol_size, GIB);
        assert_eq!(descriptor.vol_path, "/fs/pvc-1");
        assert_eq!(descriptor.ip_address, "10.0.0.1");
        assert_eq!(descriptor.volume_id, descriptor.filesystem_id.to_string());
        assert_eq!(volume.context[context_keys::VOL_PATH], "/fs/pvc-1");
        assert_eq!(volume.context["pool_name"], "pool0");
        assert_eq!(array.filesystem(descriptor.filesystem_id).unwrap().size, GIB);
        assert_eq!(
            array.mutating_calls(),
            vec![
                ArrayOp::CreateFilesystem,
                ArrayOp::ExportFilesystem,
                ArrayOp::AttachMetadataToObject
            ]
        );
    }

    #[tokio::test]
    async fn test_validated_network_space_replaces_parameter() {
        let array = array();
        let provisioner = VolumeProvisioner::new(array.clone(), ProvisioningDefaults::default());

        let volume = provisioner
            .provision(&request("pvc-1", GIB).with_parameter("nfs_networkspace", "stale, ns0"))
            .await
            .unwrap();

        assert_eq!(volume.context[NFS_NETWORKSPACE], "ns0");
    }

    #[tokio::test]
    async fn test_restore_failure_never_deletes_parent() {
        let array = array();
        let parent = array.insert_filesystem("vol", PoolId(1), GIB, None);
        let snap = array.insert_filesystem("snap", PoolId(1), GIB, Some(parent));
        array.fail_on(ArrayOp::ExportFilesystem);
        let provisioner = VolumeProvisioner::new(array.clone(), ProvisioningDefaults::default());

        let failure = provisioner
            .provision(
                &request("pvc-r", GIB)
                    .with_content_source(ContentSource::Snapshot(format!("{}$$nfs", snap))),
            )
            .await
            .unwrap_err();

        assert!(matches!(failure.error, DriverError::Internal(_)));
        assert_eq!(failure.compensations_run, 0);
        assert!(array.filesystem(parent).is_some());
        assert_eq!(array.call_count(ArrayOp::DeleteFilesystem), 0);
    }

    #[tokio::test]
    async fn test_clone_rollback_deletes_clone() {
        let array = array();
        let source = array.insert_filesystem("src", PoolId(1), GIB, None);
        array.fail_on(ArrayOp::GetNetworkSpaceIp);
        let provisioner = VolumeProvisioner::new(array.clone(), ProvisioningDefaults::default());

        let failure = provisioner
            .provision(
                &request("pvc-c", GIB).with_content_source(ContentSource::Volume(source.to_string())),
            )
            .await
            .unwrap_err();

        assert_eq!(failure.compensations_run, 2);
        assert_eq!(failure.compensation_failures, 0);
        assert!(array.exports().is_empty());
        assert_eq!(array.filesystem_count(), 1);
        assert!(array.filesystem(source).is_some());
        assert!(array.filesystem(FilesystemId(source.0 + 1)).is_none());
    }

    #[tokio::test]
    async fn test_failed_rollback_keeps_original_error() {
        let array = array();
        array.fail_on(ArrayOp::AttachMetadataToObject);
        array.fail_on(ArrayOp::DeleteExportPath);
        let provisioner = VolumeProvisioner::new(array.clone(), ProvisioningDefaults::default());

        let failure = provisioner.provision(&request("pvc-1", GIB)).await.unwrap_err();

        match &failure.error {
            DriverError::Internal(message) => assert!(message.contains("metadata"), "{message}"),
            other => panic!("expected metadata failure, got {other:?}"),
        }
        // the export survives, so the filesystem delete behind it fails too
        assert_eq!(failure.compensations_run, 2);
        assert_eq!(failure.compensation_failures, 2);
        assert_eq!(array.call_count(ArrayOp::DeleteExportPath), 1);
        assert_eq!(array.call_count(ArrayOp::DeleteFilesystem), 1);
        assert_eq!(array.filesystem_count(), 1);
    }

    #[tokio::test]
    async fn test_single_rollback_failure_is_counted() {
        let array = array();
        array.fail_on(ArrayOp::AttachMetadataToObject);
        array.fail_on(ArrayOp::DeleteFilesystem);
        let provisioner = VolumeProvisioner::new(array.clone(), ProvisioningDefaults::default());

        let failure = provisioner.provision(&request("pvc-1", GIB)).await.unwrap_err();

        assert!(matches!(failure.error, DriverError::Internal(ref m) if m.contains("metadata")));
        assert_eq!(failure.compensations_run, 2);
        assert_eq!(failure.compensation_failures, 1);
        assert!(array.exports().is_empty());
    }

    #[tokio::test]
    async fn test_existing_name_rejected_before_mutation() {
        let array = Arc::new(
            InMemoryArray::new()
                .with_pool("pool0", 1)
                .with_network_space("ns0", "10.0.0.1")
                .allowing_duplicate_names(),
        );
        let provisioner = VolumeProvisioner::new(array.clone(), ProvisioningDefaults::default());

        provisioner.provision(&request("pvc-1", GIB)).await.unwrap();
        let failure = provisioner.provision(&request("pvc-1", GIB)).await.unwrap_err();

        assert!(matches!(failure.error, DriverError::AlreadyExists(_)));
        assert_eq!(failure.error.code(), Code::AlreadyExists);
        assert_eq!(failure.compensations_run, 0);
        assert_eq!(array.call_count(ArrayOp::CreateFilesystem), 1);
        assert_eq!(array.filesystem_count(), 1);
        assert_eq!(array.exports().len(), 1);
    }

    #[tokio::test]
    async fn test_name_lookup_failure_is_internal() {
        let array = array();
        array.fail_on(ArrayOp::GetFilesystemByName);
        let provisioner = VolumeProvisioner::new(array.clone(), ProvisioningDefaults::default());

        let failure = provisioner.provision(&request("pvc-1", GIB)).await.unwrap_err();

        assert!(matches!(failure.error, DriverError::Internal(_)));
        assert!(array.mutating_calls().is_empty());
    }
}
