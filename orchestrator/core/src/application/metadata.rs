// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

use serde_json::Value;
use std::sync::Arc;

use crate::domain::array::{ArrayError, ObjectMetadata, StorageArrayClient};
use crate::domain::volume::FilesystemId;

/// Owner tag: name of the volume a filesystem was provisioned for
pub const OWNER_KEY: &str = "host.k8s.pvname";
pub const FILESYSTEM_TYPE_KEY: &str = "filesystem_type";
/// Set when deletion was requested while children still existed
pub const DEFERRED_DELETE_KEY: &str = "host.k8s.to_be_deleted";

/// Reads and writes the metadata tags this driver relies on
pub struct MetadataTagger {
    array: Arc<dyn StorageArrayClient>,
}

impl MetadataTagger {
    pub fn new(array: Arc<dyn StorageArrayClient>) -> Self {
        Self { array }
    }

    pub async fn tag_owner(&self, id: FilesystemId, volume_name: &str) -> Result<(), ArrayError> {
        let mut metadata = ObjectMetadata::new();
        metadata.insert(OWNER_KEY.to_string(), Value::from(volume_name));
        metadata.insert(FILESYSTEM_TYPE_KEY.to_string(), Value::from(""));
        self.array.attach_metadata_to_object(id, &metadata).await
    }

    pub async fn mark_for_deferred_delete(&self, id: FilesystemId) -> Result<(), ArrayError> {
        let mut metadata = ObjectMetadata::new();
        metadata.insert(DEFERRED_DELETE_KEY.to_string(), Value::Bool(true));
        self.array.attach_metadata_to_object(id, &metadata).await
    }

    /// Whether the marker is set; arrays may store it as bool or string
    pub async fn is_marked_for_delete(&self, id: FilesystemId) -> Result<bool, ArrayError> {
        let metadata = self.array.get_object_metadata(id).await?;
        Ok(match metadata.get(DEFERRED_DELETE_KEY) {
            Some(Value::Bool(marked)) => *marked,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::volume::{PoolId, GIB};
    use crate::infrastructure::array::InMemoryArray;

    #[tokio::test]
    async fn test_owner_tag() {
        let array = Arc::new(InMemoryArray::new());
        let fs = array.insert_filesystem("pvc-1", PoolId(1), GIB, None);

        MetadataTagger::new(array.clone()).tag_owner(fs, "pvc-1").await.unwrap();

        let metadata = array.metadata(fs);
        assert_eq!(metadata[OWNER_KEY], Value::from("pvc-1"));
        assert_eq!(metadata[FILESYSTEM_TYPE_KEY], Value::from(""));
    }

    #[tokio::test]
    async fn test_deferred_delete_marker() {
        let array = Arc::new(InMemoryArray::new());
        let fs = array.insert_filesystem("pvc-1", PoolId(1), GIB, None);
        let tagger = MetadataTagger::new(array.clone());

        assert!(!tagger.is_marked_for_delete(fs).await.unwrap());
        tagger.mark_for_deferred_delete(fs).await.unwrap();
        assert!(tagger.is_marked_for_delete(fs).await.unwrap());
    }
}
