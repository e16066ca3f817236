// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod compensation;
pub mod deletion;
pub mod export_path;
pub mod export_rules;
pub mod filesystem;
pub mod metadata;
pub mod name_lock;
pub mod node;
pub mod provisioning;
pub mod snapshot;
pub mod volume_manager;

pub use deletion::DeletionOutcome;
pub use node::NodeService;
pub use provisioning::{ProvisionedVolume, VolumeProvisioner};
pub use snapshot::SnapshotHandle;
pub use volume_manager::{ExpandedVolume, StandardVolumeService, VolumeService};
