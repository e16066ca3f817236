// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! Per-name mutual exclusion
//!
//! The array does not enforce name uniqueness atomically, so two concurrent
//! requests for the same volume name are serialized here. Entries live only
//! while someone holds or waits for them.
//!
//! Keys are namespaced by what they guard: a volume name never collides with
//! a filesystem ID, and every spelling of one filesystem handle maps to the
//! same key.

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::domain::volume::FilesystemId;

type LockTable = DashMap<String, Arc<Mutex<()>>>;

/// What an operation holds exclusive use of
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey {
    /// A volume being created under this name
    VolumeName(String),
    /// A user snapshot being created under this name
    SnapshotName(String),
    /// An existing filesystem (volume or snapshot) addressed by ID
    Filesystem(FilesystemId),
    /// A handle that does not parse as a filesystem ID
    UnparsedHandle(String),
}

impl LockKey {
    pub fn volume_name(name: &str) -> Self {
        Self::VolumeName(name.to_string())
    }

    pub fn snapshot_name(name: &str) -> Self {
        Self::SnapshotName(name.to_string())
    }

    /// `"17"` and `"17$$nfs"` both lock filesystem 17
    pub fn handle(handle: &str) -> Self {
        match FilesystemId::from_handle(handle) {
            Ok(id) => Self::Filesystem(id),
            Err(_) => Self::UnparsedHandle(handle.to_string()),
        }
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VolumeName(name) => write!(f, "volume:{}", name),
            Self::SnapshotName(name) => write!(f, "snapshot:{}", name),
            Self::Filesystem(id) => write!(f, "filesystem:{}", id),
            Self::UnparsedHandle(handle) => write!(f, "handle:{}", handle),
        }
    }
}

#[derive(Clone, Default)]
pub struct NameLocks {
    table: Arc<LockTable>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `key`
    pub async fn acquire(&self, key: &LockKey) -> NameGuard {
        let name = key.to_string();
        let mutex = self
            .table
            .entry(name.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();

        if mutex.try_lock().is_err() {
            debug!("Waiting for in-flight operation on '{}'", name);
        }
        let guard = mutex.lock_owned().await;

        NameGuard {
            table: Arc::clone(&self.table),
            name,
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or waited on
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

pub struct NameGuard {
    table: Arc<LockTable>,
    name: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for NameGuard {
    fn drop(&mut self) {
        self.guard.take();
        // Only the table's own reference left: nobody is waiting.
        self.table
            .remove_if(&self.name, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_removed_after_release() {
        let locks = NameLocks::new();
        {
            let _guard = locks.acquire(&LockKey::volume_name("pvc-1")).await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_same_name_is_serialized() {
        let locks = NameLocks::new();
        let guard = locks.acquire(&LockKey::volume_name("pvc-1")).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&LockKey::volume_name("pvc-1")).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_names_do_not_block() {
        let locks = NameLocks::new();
        let _a = locks.acquire(&LockKey::volume_name("pvc-a")).await;
        let _b = tokio::time::timeout(Duration::from_secs(1), locks.acquire(&LockKey::volume_name("pvc-b")))
            .await
            .unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn test_handle_spellings_share_a_key() {
        assert_eq!(LockKey::handle("17"), LockKey::handle("17$$nfs"));
        assert_eq!(LockKey::handle("17$$nfs").to_string(), "filesystem:17");
        assert_eq!(LockKey::handle("x$$nfs"), LockKey::UnparsedHandle("x$$nfs".to_string()));
    }

    #[test]
    fn test_kinds_do_not_collide() {
        assert_ne!(LockKey::volume_name("17").to_string(), LockKey::handle("17").to_string());
        assert_ne!(
            LockKey::volume_name("s").to_string(),
            LockKey::snapshot_name("s").to_string()
        );
    }

    #[tokio::test]
    async fn test_delete_by_composite_handle_waits_for_plain_id() {
        let locks = NameLocks::new();
        let guard = locks.acquire(&LockKey::handle("17")).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&LockKey::handle("17$$nfs")).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());
        assert_eq!(locks.len(), 1);

        drop(guard);
        contender.await.unwrap();
        assert!(locks.is_empty());
    }
}
