// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! Compensation stack for multi-step provisioning
//!
//! Each mutating step pushes the action that undoes it. On failure the
//! stack is unwound in reverse order; on success it is committed and the
//! actions are discarded. Unwinding is best-effort: failures are logged and
//! counted, never returned.

use tracing::{error, info};

use crate::domain::array::StorageArrayClient;
use crate::domain::volume::{ExportId, FilesystemId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compensation {
    DeleteFilesystem(FilesystemId),
    DeleteExport(ExportId),
}

#[derive(Debug, Default)]
pub struct CompensationStack {
    actions: Vec<Compensation>,
}

impl CompensationStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Compensation) {
        self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Keep everything that was created
    pub fn commit(mut self) {
        self.actions.clear();
    }

    /// Run every pending action, newest first
    ///
    /// Returns the number of actions that failed.
    pub async fn unwind(mut self, array: &dyn StorageArrayClient) -> usize {
        let mut failures = 0;

        while let Some(action) = self.actions.pop() {
            let result = match action {
                Compensation::DeleteExport(id) => array.delete_export_path(id).await,
                Compensation::DeleteFilesystem(id) => array.delete_filesystem(id).await,
            };

            match result {
                Ok(()) => info!("Rolled back {:?}", action),
                Err(e) => {
                    failures += 1;
                    error!("Rollback step {:?} failed: {}", action, e);
                }
            }
        }

        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::array::NewExport;
    use crate::domain::volume::{PoolId, GIB};
    use crate::infrastructure::array::{ArrayOp, InMemoryArray};

    #[tokio::test]
    async fn test_unwind_runs_in_reverse_order() {
        let array = InMemoryArray::new();
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

        let mut stack = CompensationStack::new();
        stack.push(Compensation::DeleteFilesystem(fs));
        stack.push(Compensation::DeleteExport(export.id));
        assert_eq!(stack.len(), 2);

        assert_eq!(stack.unwind(&array).await, 0);
        assert!(array.filesystem(fs).is_none());
        assert!(array.exports().is_empty());
        assert_eq!(
            array.mutating_calls(),
            vec![
                ArrayOp::ExportFilesystem,
                ArrayOp::DeleteExportPath,
                ArrayOp::DeleteFilesystem
            ]
        );
    }

    #[tokio::test]
    async fn test_unwind_continues_past_failures() {
        let array = InMemoryArray::new();
        let fs = array.insert_filesystem("pvc-1", PoolId(1), GIB, None);
        array.fail_on(ArrayOp::DeleteExportPath);

        let mut stack = CompensationStack::new();
        stack.push(Compensation::DeleteFilesystem(fs));
        stack.push(Compensation::DeleteExport(ExportId(99)));

        assert_eq!(stack.unwind(&array).await, 1);
        assert!(array.filesystem(fs).is_none());
    }

    #[tokio::test]
    async fn test_commit_discards_actions() {
        let array = InMemoryArray::new();
        let fs = array.insert_filesystem("pvc-1", PoolId(1), GIB, None);

        let mut stack = CompensationStack::new();
        stack.push(Compensation::DeleteFilesystem(fs));
        stack.commit();

        assert!(array.filesystem(fs).is_some());
        assert!(array.calls().is_empty());
    }
}
