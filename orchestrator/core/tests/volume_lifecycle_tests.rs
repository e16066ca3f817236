// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

use arrayvol_core::application::deletion::DeletionOutcome;
use arrayvol_core::application::metadata::{DEFERRED_DELETE_KEY, OWNER_KEY};
use arrayvol_core::application::{StandardVolumeService, VolumeService};
use arrayvol_core::domain::error::DriverError;
use arrayvol_core::domain::options::{ProvisionRequest, ProvisioningDefaults};
use arrayvol_core::domain::volume::{context_keys, ContentSource, FilesystemId, PoolId, GIB, MIB};
use arrayvol_core::infrastructure::array::{ArrayOp, InMemoryArray};
use arrayvol_core::infrastructure::event_bus::EventBus;
use std::sync::Arc;

fn setup() -> (Arc<InMemoryArray>, StandardVolumeService) {
    let array = Arc::new(
        InMemoryArray::new()
            .with_pool("pool0", 1)
            .with_pool("pool1", 2)
            .with_network_space("ns0", "10.0.0.1"),
    );
    let service = StandardVolumeService::new(
        array.clone(),
        ProvisioningDefaults::default(),
        "10.9.9.9",
        Arc::new(EventBus::with_default_capacity()),
    );
    (array, service)
}

fn request(name: &str, capacity: u64) -> ProvisionRequest {
    ProvisionRequest::new(name, capacity)
        .with_parameter("pool_name", "pool0")
        .with_parameter("nfs_networkspace", "ns0")
}

#[tokio::test]
async fn test_small_request_is_raised_to_one_gib() {
    let (array, service) = setup();

    let volume = service.create_volume(request("pvc-1", 500 * MIB)).await.unwrap();

    assert_eq!(volume.descriptor.vol_size, 1_073_741_824);
    assert_eq!(volume.descriptor.vol_path, "/fs/pvc-1");
    assert_eq!(volume.context[context_keys::VOL_SIZE], "1073741824");
    assert_eq!(volume.context[context_keys::IP_ADDRESS], "10.0.0.1");
    assert_eq!(
        volume.context[context_keys::FILESYSTEM_ID],
        volume.descriptor.filesystem_id.to_string()
    );

    let owner = array.metadata(volume.descriptor.filesystem_id);
    assert_eq!(owner[OWNER_KEY], "pvc-1");
}

#[tokio::test]
async fn test_missing_parameters_touch_nothing() {
    let (array, service) = setup();

    let err = service
        .create_volume(ProvisionRequest::new("pvc-1", GIB).with_parameter("pool_name", "pool0"))
        .await
        .unwrap_err();

    assert!(matches!(err, DriverError::InvalidArgument(_)));
    assert!(array.calls().is_empty());
}

#[tokio::test]
async fn test_ceiling_is_resource_exhausted() {
    let (array, service) = setup();
    array.set_reported_filesystem_count(4000);

    let err = service.create_volume(request("pvc-1", GIB)).await.unwrap_err();

    assert!(matches!(err, DriverError::ResourceExhausted(_)));
    assert_eq!(array.call_count(ArrayOp::CreateFilesystem), 0);
}

#[test]
fn test_unrecognized_source_kind_is_invalid() {
    let err = ContentSource::classify("backup", "17").unwrap_err();
    assert!(matches!(err, DriverError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_export_failure_rolls_back_filesystem() {
    let (array, service) = setup();
    array.fail_on(ArrayOp::ExportFilesystem);

    let err = service.create_volume(request("pvc-1", GIB)).await.unwrap_err();

    assert!(matches!(err, DriverError::Internal(_)));
    assert_eq!(array.filesystem_count(), 0);
    assert_eq!(array.call_count(ArrayOp::DeleteFilesystem), 1);
}

#[tokio::test]
async fn test_metadata_failure_rolls_back_export_then_filesystem() {
    let (array, service) = setup();
    array.fail_on(ArrayOp::AttachMetadataToObject);

    assert!(service.create_volume(request("pvc-1", GIB)).await.is_err());

    assert!(array.exports().is_empty());
    assert_eq!(array.filesystem_count(), 0);
    let mutating = array.mutating_calls();
    assert_eq!(
        &mutating[mutating.len() - 2..],
        &[ArrayOp::DeleteExportPath, ArrayOp::DeleteFilesystem]
    );
}

#[tokio::test]
async fn test_clone_mismatch_makes_no_mutating_calls() {
    let (array, service) = setup();
    let source = array.insert_filesystem("src", PoolId(2), GIB, None);

    let err = service
        .create_volume(
            request("pvc-c", GIB).with_content_source(ContentSource::Volume(format!("{}$$nfs", source))),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DriverError::InvalidArgument(_)));
    assert!(array.mutating_calls().is_empty());
}

#[tokio::test]
async fn test_restore_size_mismatch_makes_no_mutating_calls() {
    let (array, service) = setup();
    let parent = array.insert_filesystem("vol", PoolId(1), GIB, None);
    let snap = array.insert_filesystem("snap", PoolId(1), GIB, Some(parent));

    let err = service
        .create_volume(
            request("pvc-r", 3 * GIB).with_content_source(ContentSource::Snapshot(format!("{}$$nfs", snap))),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, DriverError::InvalidArgument(_)));
    assert!(array.mutating_calls().is_empty());
}

#[tokio::test]
async fn test_snapshot_create_is_idempotent() {
    let (array, service) = setup();
    let volume = service.create_volume(request("pvc-1", GIB)).await.unwrap();
    let handle = volume.descriptor.handle().to_string();

    let first = service.create_snapshot("snap-1", &handle).await.unwrap();
    let second = service.create_snapshot("snap-1", &handle).await.unwrap();

    assert_eq!(first.id, second.id);
    assert!(second.reused);
    assert_eq!(array.call_count(ArrayOp::CreateFilesystemSnapshot), 1);
}

#[tokio::test]
async fn test_delete_of_missing_volume_succeeds() {
    let (array, service) = setup();

    let outcome = service.delete_volume("99999$$nfs").await.unwrap();

    assert_eq!(outcome, DeletionOutcome::AlreadyGone);
    assert!(array.mutating_calls().is_empty());
}

#[tokio::test]
async fn test_delete_with_children_defers_then_cascades() {
    let (array, service) = setup();
    let volume = service.create_volume(request("pvc-1", GIB)).await.unwrap();
    let parent = volume.descriptor.filesystem_id;
    let snapshot = service
        .create_snapshot("snap-1", &volume.descriptor.handle().to_string())
        .await
        .unwrap();

    let outcome = service.delete_volume(&parent.to_string()).await.unwrap();

    assert_eq!(outcome, DeletionOutcome::Deferred { filesystem_id: parent });
    assert_eq!(array.call_count(ArrayOp::DeleteFilesystemComplete), 0);
    assert_eq!(array.metadata(parent)[DEFERRED_DELETE_KEY], true);

    service.delete_snapshot(&snapshot.id.to_string()).await.unwrap();
    let snapshot_fs: FilesystemId = snapshot.record.snapshot_id;
    assert!(array.filesystem(snapshot_fs).is_none());
}

#[tokio::test]
async fn test_deleting_last_child_reaps_marked_parent() {
    let (array, service) = setup();
    let parent = array.insert_filesystem("vol", PoolId(1), GIB, None);
    let child = array.insert_filesystem("clone", PoolId(1), GIB, Some(parent));

    service.delete_volume(&parent.to_string()).await.unwrap();
    let outcome = service.delete_volume(&child.to_string()).await.unwrap();

    assert_eq!(
        outcome,
        DeletionOutcome::Deleted {
            filesystem_id: child,
            parents_reaped: vec![parent],
        }
    );
    assert_eq!(array.filesystem_count(), 0);
}

#[tokio::test]
async fn test_expand_to_five_gib() {
    let (_array, service) = setup();
    let volume = service.create_volume(request("pvc-1", GIB)).await.unwrap();

    let expanded = service
        .expand_volume(&volume.descriptor.volume_id, Some(5 * GIB))
        .await
        .unwrap();

    assert_eq!(expanded.capacity_bytes, 5_368_709_120);
    assert!(!expanded.node_expansion_required);
}

#[tokio::test]
async fn test_concurrent_creates_of_one_name_do_not_duplicate() {
    // the array itself would accept a second filesystem with the same name
    let array = Arc::new(
        InMemoryArray::new()
            .with_pool("pool0", 1)
            .with_network_space("ns0", "10.0.0.1")
            .allowing_duplicate_names(),
    );
    let service = StandardVolumeService::new(
        array.clone(),
        ProvisioningDefaults::default(),
        "10.9.9.9",
        Arc::new(EventBus::with_default_capacity()),
    );

    let (a, b) = tokio::join!(
        service.create_volume(request("pvc-1", GIB)),
        service.create_volume(request("pvc-1", GIB)),
    );

    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    let err = a.err().or(b.err()).unwrap();
    assert!(matches!(err, DriverError::AlreadyExists(_)), "{err:?}");
    assert_eq!(array.call_count(ArrayOp::CreateFilesystem), 1);
    assert_eq!(array.filesystem_count(), 1);
    assert_eq!(array.exports().len(), 1);
    assert_eq!(service.operations_in_flight(), 0);
}
