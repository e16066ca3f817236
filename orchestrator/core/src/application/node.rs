// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! Node-side publish/unpublish
//!
//! Mounts an exported volume at a workload's target path and tears it down
//! again. Everything the mount needs comes from the volume context produced
//! at provisioning time.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::application::export_rules::ExportRuleManager;
use crate::domain::array::StorageArrayClient;
use crate::domain::error::DriverError;
use crate::domain::mounter::{MountError, VolumeMounter};
use crate::domain::options::{ProvisioningDefaults, NFS_MOUNT_OPTIONS};
use crate::domain::volume::context_keys;

pub const NFS_FS_TYPE: &str = "nfs";
const TARGET_DIR_MODE: u32 = 0o750;

pub struct NodeService {
    mounter: Arc<dyn VolumeMounter>,
    export_rules: ExportRuleManager,
    defaults: ProvisioningDefaults,
    node_ip: String,
}

impl NodeService {
    pub fn new(
        mounter: Arc<dyn VolumeMounter>,
        array: Arc<dyn StorageArrayClient>,
        defaults: ProvisioningDefaults,
        node_ip: impl Into<String>,
    ) -> Self {
        Self {
            mounter,
            export_rules: ExportRuleManager::new(array),
            defaults,
            node_ip: node_ip.into(),
        }
    }

    /// Mount options from the context, falling back to the defaults
    pub fn mount_options(&self, context: &BTreeMap<String, String>, read_only: bool) -> Vec<String> {
        let configured = context
            .get(NFS_MOUNT_OPTIONS)
            .filter(|v| !v.is_empty())
            .unwrap_or(&self.defaults.nfs_mount_options);

        let mut options: Vec<String> = configured
            .split(',')
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();
        if read_only {
            options.push("ro".to_string());
        }
        options
    }

    pub async fn publish(
        &self,
        target: &Path,
        context: &BTreeMap<String, String>,
        read_only: bool,
    ) -> Result<(), DriverError> {
        let not_mounted = match self.mounter.is_likely_not_mount_point(target).await {
            Ok(not_mounted) => not_mounted,
            Err(MountError::NotFound(_)) => {
                create_target_dir(target).await?;
                true
            }
            Err(e) => {
                error!("Cannot inspect target {:?}: {}", target, e);
                return Err(DriverError::Internal(format!("cannot inspect target {:?}: {}", target, e)));
            }
        };
        if !not_mounted {
            debug!("{:?} is already mounted", target);
            return Ok(());
        }

        let required = |key: &str| {
            context
                .get(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| DriverError::InvalidArgument(format!("{} missing from volume context", key)))
        };
        let source = format!(
            "{}:{}",
            required(context_keys::IP_ADDRESS)?,
            required(context_keys::VOL_PATH)?
        );
        let options = self.mount_options(context, read_only);

        self.mounter
            .mount(&source, target, NFS_FS_TYPE, &options)
            .await
            .map_err(|e| {
                error!("Failed to mount {} at {:?}: {}", source, target, e);
                DriverError::Internal(format!("failed to mount target path {:?}: {}", target, e))
            })?;
        info!("Mounted {} at {:?}", source, target);
        Ok(())
    }

    pub async fn unpublish(&self, volume_id: &str, target: &Path) -> Result<(), DriverError> {
        let not_mounted = match self.mounter.is_likely_not_mount_point(target).await {
            Ok(not_mounted) => not_mounted,
            Err(MountError::NotFound(_)) => {
                warn!("Target {:?} already gone", target);
                return Ok(());
            }
            Err(e) => {
                return Err(DriverError::Internal(format!("cannot inspect target {:?}: {}", target, e)));
            }
        };

        if not_mounted {
            if let Err(e) = tokio::fs::remove_dir(target).await {
                error!("Failed to remove target {:?}: {}", target, e);
            }
            return Ok(());
        }

        self.mounter.unmount(target).await.map_err(|e| {
            DriverError::Internal(format!("failed to unmount target path {:?}: {}", target, e))
        })?;
        match tokio::fs::remove_dir(target).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(DriverError::Internal(format!(
                    "cannot remove unmounted target path {:?}: {}",
                    target, e
                )))
            }
        }
        info!("Unmounted {:?}", target);

        self.export_rules.unpublish(volume_id, &self.node_ip).await?;
        Ok(())
    }
}

async fn create_target_dir(target: &Path) -> Result<(), DriverError> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true).mode(TARGET_DIR_MODE);
    builder.create(target).await.map_err(|e| {
        error!("Failed to create target {:?}: {}", target, e);
        DriverError::Internal(format!("failed to create target path {:?}: {}", target, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::array::NewExport;
    use crate::domain::volume::{PoolId, GIB};
    use crate::infrastructure::array::{ArrayOp, InMemoryArray};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashSet;
    use std::path::PathBuf;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct MountCall {
        source: String,
        target: PathBuf,
        fs_type: String,
        options: Vec<String>,
    }

    #[derive(Default)]
    struct FakeMounter {
        mounted: Mutex<HashSet<PathBuf>>,
        mounts: Mutex<Vec<MountCall>>,
    }

    #[async_trait]
    impl VolumeMounter for FakeMounter {
        async fn is_likely_not_mount_point(&self, path: &Path) -> Result<bool, MountError> {
            if !path.exists() {
                return Err(MountError::NotFound(path.display().to_string()));
            }
            Ok(!self.mounted.lock().contains(path))
        }

        async fn mount(&self, source: &str, target: &Path, fs_type: &str, options: &[String]) -> Result<(), MountError> {
            self.mounted.lock().insert(target.to_path_buf());
            self.mounts.lock().push(MountCall {
                source: source.to_string(),
                target: target.to_path_buf(),
                fs_type: fs_type.to_string(),
                options: options.to_vec(),
            });
            Ok(())
        }

        async fn unmount(&self, target: &Path) -> Result<(), MountError> {
            self.mounted.lock().remove(target);
            Ok(())
        }
    }

    fn context() -> BTreeMap<String, String> {
        [("ipAddress", "10.0.0.1"), ("volPathd", "/fs/pvc-1")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn node(array: Arc<InMemoryArray>) -> (Arc<FakeMounter>, NodeService) {
        let mounter = Arc::new(FakeMounter::default());
        let service = NodeService::new(mounter.clone(), array, ProvisioningDefaults::default(), "10.9.9.9");
        (mounter, service)
    }

    #[tokio::test]
    async fn test_publish_creates_target_and_mounts() {
        let (mounter, node) = node(Arc::new(InMemoryArray::new()));
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("pods/vol");

        node.publish(&target, &context(), true).await.unwrap();

        assert!(target.is_dir());
        let mounts = mounter.mounts.lock().clone();
        assert_eq!(
            mounts,
            vec![MountCall {
                source: "10.0.0.1:/fs/pvc-1".to_string(),
                target: target.clone(),
                fs_type: "nfs".to_string(),
                options: vec![
                    "hard".to_string(),
                    "rsize=1024".to_string(),
                    "wsize=1024".to_string(),
                    "ro".to_string()
                ],
            }]
        );

        // Already mounted: no second mount
        node.publish(&target, &context(), true).await.unwrap();
        assert_eq!(mounter.mounts.lock().len(), 1);
    }

    #[test]
    fn test_mount_options_drop_empty_entries() {
        let (_mounter, node) = node(Arc::new(InMemoryArray::new()));
        let mut ctx = context();
        ctx.insert(NFS_MOUNT_OPTIONS.to_string(), "vers=4.1,,soft,".to_string());
        assert_eq!(node.mount_options(&ctx, false), vec!["vers=4.1", "soft"]);
    }

    #[tokio::test]
    async fn test_unpublish_missing_target_is_ok() {
        let (_mounter, node) = node(Arc::new(InMemoryArray::new()));
        let dir = tempfile::tempdir().unwrap();
        node.unpublish("1$$nfs", &dir.path().join("gone")).await.unwrap();
    }

    #[tokio::test]
    async fn test_unpublish_unmounted_target_removes_dir() {
        let array = Arc::new(InMemoryArray::new());
        let (_mounter, node) = node(array.clone());
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("vol");
        std::fs::create_dir(&target).unwrap();

        node.unpublish("1$$nfs", &target).await.unwrap();

        assert!(!target.exists());
        assert!(array.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unpublish_mounted_target_revokes_rule() {
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
        array.add_node_in_export(export.id, "RW", true, "10.9.9.9").await.unwrap();

        let (_mounter, node) = node(array.clone());
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("vol");
        node.publish(&target, &context(), false).await.unwrap();

        node.unpublish(&format!("{}$$nfs", fs), &target).await.unwrap();

        assert!(!target.exists());
        assert_eq!(array.call_count(ArrayOp::DeleteExportRule), 1);
        assert!(array.exports()[0].permissions.is_empty());
    }
}
