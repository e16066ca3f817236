// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

use crate::domain::array::{ExportRecord, StorageArrayClient};
use crate::domain::error::DriverError;
use crate::domain::options::{ExportPolicy, ProvisioningDefaults};
use crate::domain::volume::{context_keys, ExportId, FilesystemId};

/// Grants and revokes node access on existing exports
///
/// Never touches the lifecycle of the filesystem or the export itself.
pub struct ExportRuleManager {
    array: Arc<dyn StorageArrayClient>,
}

impl ExportRuleManager {
    pub fn new(array: Arc<dyn StorageArrayClient>) -> Self {
        Self { array }
    }

    pub async fn add_node_rule(
        &self,
        export_id: ExportId,
        policy: &ExportPolicy,
        node_ip: &str,
    ) -> Result<ExportRecord, DriverError> {
        let export = self
            .array
            .add_node_in_export(export_id, &policy.access, policy.no_root_squash, node_ip)
            .await
            .map_err(|e| {
                error!("Failed to add {} to export {}: {}", node_ip, export_id, e);
                DriverError::Internal(format!("failed to add node {} to export {}: {}", node_ip, export_id, e))
            })?;
        info!("Granted {} access to export {}", node_ip, export_id);
        Ok(export)
    }

    pub async fn remove_node_rule(&self, filesystem_id: FilesystemId, node: &str) -> Result<(), DriverError> {
        self.array
            .delete_export_rule(filesystem_id, node)
            .await
            .map_err(|e| {
                error!("Failed to remove {} from exports of {}: {}", node, filesystem_id, e);
                DriverError::Internal(format!(
                    "failed to remove node {} from filesystem {}: {}",
                    node, filesystem_id, e
                ))
            })?;
        info!("Revoked {} access to filesystem {}", node, filesystem_id);
        Ok(())
    }

    /// Attach path: export ID and policy come from the volume context
    pub async fn publish(
        &self,
        context: &BTreeMap<String, String>,
        defaults: &ProvisioningDefaults,
        node_ip: &str,
    ) -> Result<ExportRecord, DriverError> {
        let export_id = context
            .get(context_keys::EXPORT_ID)
            .ok_or_else(|| DriverError::InvalidArgument("exportID missing from volume context".to_string()))
            .and_then(|raw| ExportId::parse(raw))?;
        let policy = ExportPolicy::from_context(context, defaults);
        self.add_node_rule(export_id, &policy, node_ip).await
    }

    /// Detach path: the filesystem is the leading segment of the volume ID
    pub async fn unpublish(&self, volume_id: &str, node: &str) -> Result<FilesystemId, DriverError> {
        let filesystem_id = FilesystemId::from_handle(volume_id)?;
        self.remove_node_rule(filesystem_id, node).await?;
        Ok(filesystem_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::array::NewExport;
    use crate::domain::volume::{PoolId, GIB};
    use crate::infrastructure::array::{ArrayOp, InMemoryArray};

    async fn exported() -> (Arc<InMemoryArray>, FilesystemId, ExportId) {
        let array = Arc::new(InMemoryArray::new());
        let fs = array.insert_filesystem("pvc-1", PoolId(1), GIB, None);
        let export = array
            .export_filesystem(&NewExport {
                filesystem_id: fs,
                export_path: "/fs/pvc-1".to_string(),
                transport_protocols: "TCP".to_string(),
                privileged_port: true,
                permissions: vec![],
            })
            .await
            .unwrap();
        (array, fs, export.id)
    }

    fn context(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[tokio::test]
    async fn test_publish_then_unpublish() {
        let (array, fs, export_id) = exported().await;
        let manager = ExportRuleManager::new(array.clone());
        let defaults = ProvisioningDefaults::default();

        let export = manager
            .publish(
                &context(&[("exportID", &export_id.to_string()), ("no_root_squash", "false")]),
                &defaults,
                "10.0.0.9",
            )
            .await
            .unwrap();
        assert_eq!(export.permissions.len(), 1);
        assert_eq!(export.permissions[0].access, "RW");
        assert!(!export.permissions[0].no_root_squash);

        assert_eq!(manager.unpublish(&format!("{}$$nfs", fs), "10.0.0.9").await.unwrap(), fs);
        assert!(array.exports()[0].permissions.is_empty());
    }

    #[tokio::test]
    async fn test_publish_requires_export_id() {
        let (array, _fs, _export_id) = exported().await;
        let manager = ExportRuleManager::new(array.clone());
        let defaults = ProvisioningDefaults::default();

        let err = manager.publish(&context(&[]), &defaults, "10.0.0.9").await.unwrap_err();
        assert!(matches!(err, DriverError::InvalidArgument(_)));

        let err = manager
            .publish(&context(&[("exportID", "x")]), &defaults, "10.0.0.9")
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::InvalidArgument(_)));
        assert_eq!(array.call_count(ArrayOp::AddNodeInExport), 0);
    }

    #[tokio::test]
    async fn test_array_failure_is_internal() {
        let (array, fs, _export_id) = exported().await;
        array.fail_on(ArrayOp::DeleteExportRule);
        let manager = ExportRuleManager::new(array);

        let err = manager.remove_node_rule(fs, "10.0.0.9").await.unwrap_err();
        assert!(matches!(err, DriverError::Internal(_)));
    }
}
