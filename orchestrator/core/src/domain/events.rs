// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::volume::{ExportId, FilesystemId};

/// Volume lifecycle outcomes published on the event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VolumeEvent {
    VolumeCreated {
        name: String,
        filesystem_id: FilesystemId,
        export_id: ExportId,
        source: String,
        capacity_bytes: u64,
        export_path: String,
        created_at: DateTime<Utc>,
    },
    ProvisioningRolledBack {
        name: String,
        error: String,
        compensation_failures: usize,
        rolled_back_at: DateTime<Utc>,
    },
    VolumeDeleted {
        filesystem_id: FilesystemId,
        parents_reaped: Vec<FilesystemId>,
        deleted_at: DateTime<Utc>,
    },
    VolumeDeletionDeferred {
        filesystem_id: FilesystemId,
        deferred_at: DateTime<Utc>,
    },
    VolumeExpanded {
        filesystem_id: FilesystemId,
        capacity_bytes: u64,
        expanded_at: DateTime<Utc>,
    },
    SnapshotCreated {
        snapshot_id: String,
        source_filesystem_id: FilesystemId,
        reused: bool,
        created_at: DateTime<Utc>,
    },
    SnapshotDeleted {
        snapshot_id: String,
        deleted_at: DateTime<Utc>,
    },
    VolumePublished {
        export_id: ExportId,
        node_ip: String,
        published_at: DateTime<Utc>,
    },
    VolumeUnpublished {
        filesystem_id: FilesystemId,
        node: String,
        unpublished_at: DateTime<Utc>,
    },
}
