// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::domain::error::DriverError;

// ============================================================================
// Capacity
// ============================================================================

pub const KIB: u64 = 1024;
pub const MIB: u64 = KIB * 1024;
pub const GIB: u64 = MIB * 1024;
pub const TIB: u64 = GIB * 1024;

/// Smallest filesystem the array will be asked to create or grow to.
pub const MIN_CAPACITY_BYTES: u64 = GIB;

/// Clamp a requested capacity to the 1 GiB floor.
///
/// Returns the effective capacity and whether it was raised.
pub fn normalize_capacity(requested_bytes: u64) -> (u64, bool) {
    if requested_bytes < MIN_CAPACITY_BYTES {
        (MIN_CAPACITY_BYTES, true)
    } else {
        (requested_bytes, false)
    }
}

// ============================================================================
// Value Objects
// ============================================================================

/// Identifier of a filesystem (or filesystem snapshot) on the array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilesystemId(pub i64);

impl FilesystemId {
    /// Parse a bare numeric filesystem ID.
    pub fn parse(s: &str) -> Result<Self, DriverError> {
        match s.trim().parse::<i64>() {
            Ok(id) if id > 0 => Ok(Self(id)),
            _ => Err(DriverError::InvalidArgument(format!(
                "invalid filesystem id '{}'",
                s
            ))),
        }
    }

    /// Parse the leading segment of a volume handle.
    ///
    /// Accepts both `"<id>"` and `"<id>$$<auxiliary>"`.
    pub fn from_handle(handle: &str) -> Result<Self, DriverError> {
        let leading = match handle.split_once(COMPOSITE_DELIMITER) {
            Some((leading, _)) => leading,
            None => handle,
        };
        Self::parse(leading)
    }
}

impl fmt::Display for FilesystemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an NFS export on the array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExportId(pub i64);

impl ExportId {
    pub fn parse(s: &str) -> Result<Self, DriverError> {
        match s.trim().parse::<i64>() {
            Ok(id) if id > 0 => Ok(Self(id)),
            _ => Err(DriverError::InvalidArgument(format!("invalid export id '{}'", s))),
        }
    }
}

impl fmt::Display for ExportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a storage pool on the array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(pub i64);

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Delimiter used by composite identifiers at the external boundary.
pub const COMPOSITE_DELIMITER: &str = "$$";

/// Protocol tag carried as the auxiliary half of NFS volume handles.
pub const NFS_PROTOCOL_TAG: &str = "nfs";

/// Two-part identifier serialized as `"<id>$$<auxiliary>"`
///
/// Snapshots and exported volumes carry both their own array ID and a
/// secondary reference (the protocol tag of the source volume).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeId {
    pub id: String,
    pub auxiliary: String,
}

impl CompositeId {
    pub fn new(id: impl Into<String>, auxiliary: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            auxiliary: auxiliary.into(),
        }
    }

    /// Parse a composite identifier.
    ///
    /// Exactly one delimiter with a non-empty part on either side is accepted.
    pub fn parse(s: &str) -> Result<Self, CompositeIdError> {
        let (id, auxiliary) = s
            .split_once(COMPOSITE_DELIMITER)
            .ok_or_else(|| CompositeIdError::MissingDelimiter(s.to_string()))?;

        if auxiliary.contains(COMPOSITE_DELIMITER) {
            return Err(CompositeIdError::TooManyParts(s.to_string()));
        }
        if id.is_empty() || auxiliary.is_empty() {
            return Err(CompositeIdError::EmptyPart(s.to_string()));
        }

        Ok(Self::new(id, auxiliary))
    }

    /// The leading part interpreted as a filesystem ID.
    pub fn filesystem_id(&self) -> Result<FilesystemId, DriverError> {
        FilesystemId::parse(&self.id)
    }
}

impl fmt::Display for CompositeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.id, COMPOSITE_DELIMITER, self.auxiliary)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompositeIdError {
    #[error("identifier '{0}' has no '$$' delimiter")]
    MissingDelimiter(String),

    #[error("identifier '{0}' has more than two parts")]
    TooManyParts(String),

    #[error("identifier '{0}' has an empty part")]
    EmptyPart(String),
}

/// Source the new volume's content is taken from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ContentSource {
    /// Brand-new, empty filesystem
    #[default]
    None,
    /// Restore from an existing snapshot (snapshot handle)
    Snapshot(String),
    /// Clone from an existing volume (volume handle)
    Volume(String),
}

impl ContentSource {
    /// Classify a caller-supplied source kind.
    ///
    /// Anything other than `snapshot` or `volume` is rejected instead of
    /// falling through to fresh provisioning.
    pub fn classify(kind: &str, id: &str) -> Result<Self, DriverError> {
        if id.trim().is_empty() {
            return Err(DriverError::InvalidArgument(format!(
                "content source of kind '{}' has an empty id",
                kind
            )));
        }
        match kind {
            "snapshot" => Ok(Self::Snapshot(id.to_string())),
            "volume" => Ok(Self::Volume(id.to_string())),
            other => Err(DriverError::InvalidArgument(format!(
                "unrecognized content source kind '{}'",
                other
            ))),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Snapshot(_) => "snapshot",
            Self::Volume(_) => "volume",
        }
    }
}

/// How the volume is consumed by the workload
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessType {
    /// Mounted filesystem (the only kind this driver provisions)
    #[default]
    Mount,
    /// Raw block device
    Block,
}

// ============================================================================
// Volume Descriptor
// ============================================================================

/// Identity and placement of a provisioned volume
///
/// `volume_id` is the string form of `filesystem_id`; both name the same
/// array object for the whole life of the volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeDescriptor {
    pub vol_name: String,
    #[serde(rename = "volID")]
    pub volume_id: String,
    pub vol_size: u64,
    pub vol_path: String,
    pub ip_address: String,
    pub vol_access_type: AccessType,
    pub ephemeral: bool,
    #[serde(rename = "exportID")]
    pub export_id: ExportId,
    #[serde(rename = "fileSystemID")]
    pub filesystem_id: FilesystemId,
    pub export_block: String,
}

impl VolumeDescriptor {
    /// Composite handle handed to callers that need the protocol tag.
    pub fn handle(&self) -> CompositeId {
        CompositeId::new(self.volume_id.clone(), NFS_PROTOCOL_TAG)
    }

    /// Mount source used by the node attach path.
    pub fn mount_source(&self) -> String {
        format!("{}:{}", self.ip_address, self.vol_path)
    }
}

/// Keys written into the volume context and required at attach time.
pub mod context_keys {
    pub const IP_ADDRESS: &str = "ipAddress";
    pub const VOL_ID: &str = "volID";
    pub const VOL_SIZE: &str = "volSize";
    pub const EXPORT_ID: &str = "exportID";
    pub const FILESYSTEM_ID: &str = "fileSystemID";
    pub const VOL_PATH: &str = "volPathd";
    pub const EXPORT_BLOCK: &str = "exportBlock";
}

/// Merge the resolved placement of a volume into the request parameters.
pub fn build_volume_context(
    parameters: &BTreeMap<String, String>,
    descriptor: &VolumeDescriptor,
) -> BTreeMap<String, String> {
    let mut context = parameters.clone();
    context.insert(context_keys::IP_ADDRESS.to_string(), descriptor.ip_address.clone());
    context.insert(context_keys::VOL_ID.to_string(), descriptor.volume_id.clone());
    context.insert(context_keys::VOL_SIZE.to_string(), descriptor.vol_size.to_string());
    context.insert(context_keys::EXPORT_ID.to_string(), descriptor.export_id.to_string());
    context.insert(context_keys::FILESYSTEM_ID.to_string(), descriptor.filesystem_id.to_string());
    context.insert(context_keys::VOL_PATH.to_string(), descriptor.vol_path.clone());
    context.insert(context_keys::EXPORT_BLOCK.to_string(), descriptor.export_block.clone());
    context
}

// ============================================================================
// Tests
// ============================================================================
