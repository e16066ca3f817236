// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! REST Storage Array Client
//!
//! Talks to the array's management API. Implements the
//! [`StorageArrayClient`] trait as an Anti-Corruption Layer.
//!
//! # API Endpoints
//!
//! - `GET|POST /api/rest/filesystems` - List (filterable) / create filesystems
//! - `GET|PUT|DELETE /api/rest/filesystems/{id}` - Single filesystem
//! - `POST /api/rest/filesystems/{id}/restore` - Restore from snapshot
//! - `GET|POST /api/rest/exports`, `GET|PUT|DELETE /api/rest/exports/{id}`
//! - `GET /api/rest/pools?name=` - Pool lookup
//! - `GET /api/rest/network/spaces?name=` - Network space lookup
//! - `GET|PUT /api/rest/metadata/{id}` - Object metadata
//!
//! Every response is wrapped in `{"result": ..., "error": ..., "metadata": ...}`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::domain::array::{
    ArrayError, ExportPermission, ExportRecord, FilesystemRecord, NewExport, NewFilesystem,
    NewSnapshot, ObjectMetadata, SnapshotRecord, StorageArrayClient,
};
use crate::domain::volume::{ExportId, FilesystemId, PoolId};

const API_PREFIX: &str = "/api/rest";

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    error: Option<ApiErrorBody>,
    #[serde(default)]
    metadata: Option<ApiMetadata>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiMetadata {
    #[serde(default)]
    number_of_objects: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WireFilesystem {
    id: i64,
    name: String,
    pool_id: i64,
    size: u64,
    /// 0 for root filesystems
    #[serde(default)]
    parent_id: i64,
    #[serde(default)]
    write_protected: bool,
    /// Milliseconds since the epoch
    #[serde(default)]
    created_at: Option<i64>,
}

impl WireFilesystem {
    fn parent(&self) -> Option<FilesystemId> {
        (self.parent_id > 0).then_some(FilesystemId(self.parent_id))
    }

    fn created(&self) -> Option<DateTime<Utc>> {
        self.created_at.and_then(DateTime::from_timestamp_millis)
    }

    fn into_record(self) -> FilesystemRecord {
        FilesystemRecord {
            id: FilesystemId(self.id),
            parent_id: self.parent(),
            created_at: self.created(),
            name: self.name,
            pool_id: PoolId(self.pool_id),
            size: self.size,
            write_protected: self.write_protected,
        }
    }

    fn into_snapshot(self) -> Option<SnapshotRecord> {
        let parent_id = self.parent()?;
        Some(SnapshotRecord {
            snapshot_id: FilesystemId(self.id),
            parent_id,
            created_at: self.created().unwrap_or_else(Utc::now),
            name: self.name,
            write_protected: self.write_protected,
            size: self.size,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireExport {
    id: i64,
    filesystem_id: i64,
    export_path: String,
    #[serde(default)]
    inner_path: String,
    #[serde(default)]
    transport_protocols: String,
    #[serde(default)]
    privileged_port: bool,
    #[serde(default)]
    permissions: Vec<ExportPermission>,
}

impl WireExport {
    fn into_record(self) -> ExportRecord {
        let export_block = if self.inner_path.is_empty() {
            self.export_path.clone()
        } else {
            self.inner_path
        };
        ExportRecord {
            id: ExportId(self.id),
            filesystem_id: FilesystemId(self.filesystem_id),
            export_path: self.export_path,
            export_block,
            transport_protocols: self.transport_protocols,
            privileged_port: self.privileged_port,
            permissions: self.permissions,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WirePool {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct WireNetworkSpace {
    name: String,
    #[serde(default)]
    ips: Vec<WireIp>,
}

#[derive(Debug, Deserialize)]
struct WireIp {
    ip_address: String,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
struct WireMetadataEntry {
    key: String,
    value: serde_json::Value,
}

// ============================================================================
// Client
// ============================================================================

/// Management API adapter
pub struct RestArrayClient {
    client: Client,
    /// Base URL (e.g., "https://array.example.com")
    base_url: String,
    username: String,
    password: Option<String>,
}

impl RestArrayClient {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ArrayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ArrayError::Unknown(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password,
        })
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, API_PREFIX, path)
    }

    /// Issue a request and unwrap the response envelope
    async fn call(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<(serde_json::Value, ApiMetadata), ArrayError> {
        debug!("{} {}", method, path);

        let mut request = self
            .client
            .request(method, self.build_url(path))
            .basic_auth(&self.username, self.password.as_deref());
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ArrayError::Authentication(format!("{} returned {}", path, status)));
        }

        let text = response.text().await?;
        let envelope: Option<Envelope> = serde_json::from_str(&text).ok();

        if let Some(error) = envelope.as_ref().and_then(|e| e.error.as_ref()) {
            if status == StatusCode::NOT_FOUND || error.code.ends_with("_NOT_FOUND") {
                return Err(ArrayError::NotFound(error.message.clone()));
            }
            return Err(ArrayError::Api {
                code: error.code.clone(),
                message: error.message.clone(),
            });
        }

        match (status, envelope) {
            (StatusCode::NOT_FOUND, _) => Err(ArrayError::NotFound(path.to_string())),
            (s, _) if s.is_server_error() => Err(ArrayError::Unavailable(format!("HTTP {}: {}", s, text))),
            (s, Some(envelope)) if s.is_success() => Ok((envelope.result, envelope.metadata.unwrap_or_default())),
            (s, _) => Err(ArrayError::Unknown(format!("HTTP {} from {}: {}", s, path, text))),
        }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<T, ArrayError> {
        let (result, _) = self.call(method, path, query, body).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn exports_of(&self, filesystem_id: FilesystemId) -> Result<Vec<WireExport>, ArrayError> {
        self.fetch(
            Method::GET,
            "/exports",
            &[("filesystem_id", filesystem_id.to_string())],
            None,
        )
        .await
    }

    async fn network_space(&self, name: &str) -> Result<Option<WireNetworkSpace>, ArrayError> {
        let spaces: Vec<WireNetworkSpace> = self
            .fetch(Method::GET, "/network/spaces", &[("name", name.to_string())], None)
            .await?;
        Ok(spaces.into_iter().find(|s| s.name == name))
    }

    async fn put_permissions(&self, id: i64, permissions: &[ExportPermission]) -> Result<WireExport, ArrayError> {
        self.fetch(
            Method::PUT,
            &format!("/exports/{}", id),
            &[],
            Some(json!({ "permissions": permissions })),
        )
        .await
    }
}

#[async_trait]
impl StorageArrayClient for RestArrayClient {
    async fn create_filesystem(&self, request: &NewFilesystem) -> Result<FilesystemRecord, ArrayError> {
        let mut body = json!({
            "pool_id": request.pool_id,
            "name": request.name,
            "ssd_enabled": request.ssd_enabled,
            "size": request.size,
        });
        if !request.provtype.is_empty() {
            body["provtype"] = json!(request.provtype);
        }

        let fs: WireFilesystem = self.fetch(Method::POST, "/filesystems", &[], Some(body)).await?;
        Ok(fs.into_record())
    }

    async fn delete_filesystem(&self, id: FilesystemId) -> Result<(), ArrayError> {
        self.call(
            Method::DELETE,
            &format!("/filesystems/{}", id),
            &[("approved", "true".to_string())],
            None,
        )
        .await?;
        Ok(())
    }

    async fn delete_filesystem_complete(&self, id: FilesystemId) -> Result<(), ArrayError> {
        for export in self.exports_of(id).await? {
            self.delete_export_path(ExportId(export.id)).await?;
        }

        match self
            .call(Method::DELETE, &format!("/metadata/{}", id), &[], None)
            .await
        {
            Ok(_) | Err(ArrayError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        self.delete_filesystem(id).await
    }

    async fn get_filesystem_by_id(&self, id: FilesystemId) -> Result<FilesystemRecord, ArrayError> {
        let fs: WireFilesystem = self
            .fetch(Method::GET, &format!("/filesystems/{}", id), &[], None)
            .await?;
        Ok(fs.into_record())
    }

    async fn get_filesystem_by_name(&self, name: &str) -> Result<Option<FilesystemRecord>, ArrayError> {
        let filesystems: Vec<WireFilesystem> = self
            .fetch(Method::GET, "/filesystems", &[("name", name.to_string())], None)
            .await?;
        Ok(filesystems.into_iter().next().map(WireFilesystem::into_record))
    }

    async fn get_filesystem_count(&self) -> Result<u64, ArrayError> {
        let (result, metadata) = self
            .call(Method::GET, "/filesystems", &[("page_size", "1".to_string())], None)
            .await?;
        match metadata.number_of_objects {
            Some(count) => Ok(count),
            None => Ok(result.as_array().map(|a| a.len() as u64).unwrap_or(0)),
        }
    }

    async fn update_filesystem_size(&self, id: FilesystemId, size: u64) -> Result<FilesystemRecord, ArrayError> {
        let fs: WireFilesystem = self
            .fetch(
                Method::PUT,
                &format!("/filesystems/{}", id),
                &[("approved", "true".to_string())],
                Some(json!({ "size": size })),
            )
            .await?;
        Ok(fs.into_record())
    }

    async fn get_storage_pool_id_by_name(&self, name: &str) -> Result<PoolId, ArrayError> {
        let pools: Vec<WirePool> = self
            .fetch(Method::GET, "/pools", &[("name", name.to_string())], None)
            .await?;
        pools
            .first()
            .map(|p| PoolId(p.id))
            .ok_or_else(|| ArrayError::NotFound(format!("pool {}", name)))
    }

    async fn export_filesystem(&self, request: &NewExport) -> Result<ExportRecord, ArrayError> {
        let export: WireExport = self
            .fetch(Method::POST, "/exports", &[], Some(serde_json::to_value(request)?))
            .await?;
        Ok(export.into_record())
    }

    async fn delete_export_path(&self, id: ExportId) -> Result<(), ArrayError> {
        self.call(
            Method::DELETE,
            &format!("/exports/{}", id),
            &[("approved", "true".to_string())],
            None,
        )
        .await?;
        Ok(())
    }

    async fn add_node_in_export(
        &self,
        id: ExportId,
        access: &str,
        no_root_squash: bool,
        node_ip: &str,
    ) -> Result<ExportRecord, ArrayError> {
        let export: WireExport = self
            .fetch(Method::GET, &format!("/exports/{}", id), &[], None)
            .await?;
        if export.permissions.iter().any(|p| p.client == node_ip) {
            debug!("Export {} already grants access to {}", id, node_ip);
            return Ok(export.into_record());
        }

        let mut permissions = export.permissions;
        permissions.push(ExportPermission {
            access: access.to_string(),
            no_root_squash,
            client: node_ip.to_string(),
        });
        Ok(self.put_permissions(id.0, &permissions).await?.into_record())
    }

    async fn delete_export_rule(&self, filesystem_id: FilesystemId, node: &str) -> Result<(), ArrayError> {
        for export in self.exports_of(filesystem_id).await? {
            if !export.permissions.iter().any(|p| p.client == node) {
                continue;
            }
            let remaining: Vec<ExportPermission> = export
                .permissions
                .into_iter()
                .filter(|p| p.client != node)
                .collect();
            self.put_permissions(export.id, &remaining).await?;
        }
        Ok(())
    }

    async fn create_filesystem_snapshot(&self, request: &NewSnapshot) -> Result<SnapshotRecord, ArrayError> {
        let fs: WireFilesystem = self
            .fetch(Method::POST, "/filesystems", &[], Some(serde_json::to_value(request)?))
            .await?;
        fs.into_snapshot()
            .ok_or_else(|| ArrayError::Serialization("snapshot response carries no parent_id".to_string()))
    }

    async fn restore_filesystem_from_snapshot(
        &self,
        filesystem_id: FilesystemId,
        snapshot_id: FilesystemId,
    ) -> Result<bool, ArrayError> {
        self.fetch(
            Method::POST,
            &format!("/filesystems/{}/restore", filesystem_id),
            &[("approved", "true".to_string())],
            Some(json!({ "source_id": snapshot_id })),
        )
        .await
    }

    async fn get_snapshots_by_name(&self, name: &str) -> Result<Vec<SnapshotRecord>, ArrayError> {
        let filesystems: Vec<WireFilesystem> = self
            .fetch(Method::GET, "/filesystems", &[("name", name.to_string())], None)
            .await?;
        Ok(filesystems.into_iter().filter_map(WireFilesystem::into_snapshot).collect())
    }

    async fn filesystem_has_child(&self, id: FilesystemId) -> Result<bool, ArrayError> {
        let (result, metadata) = self
            .call(
                Method::GET,
                "/filesystems",
                &[("parent_id", id.to_string()), ("page_size", "1".to_string())],
                None,
            )
            .await?;
        match metadata.number_of_objects {
            Some(count) => Ok(count > 0),
            None => Ok(result.as_array().is_some_and(|a| !a.is_empty())),
        }
    }

    async fn attach_metadata_to_object(&self, id: FilesystemId, metadata: &ObjectMetadata) -> Result<(), ArrayError> {
        self.call(
            Method::PUT,
            &format!("/metadata/{}", id),
            &[],
            Some(serde_json::to_value(metadata)?),
        )
        .await?;
        Ok(())
    }

    async fn get_object_metadata(&self, id: FilesystemId) -> Result<ObjectMetadata, ArrayError> {
        let entries: Vec<WireMetadataEntry> = self
            .fetch(Method::GET, &format!("/metadata/{}", id), &[], None)
            .await?;
        Ok(entries.into_iter().map(|e| (e.key, e.value)).collect())
    }

    async fn get_network_space_ip(&self, network_space: &str) -> Result<String, ArrayError> {
        for name in network_space.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if let Some(space) = self.network_space(name).await? {
                if let Some(ip) = space.ips.into_iter().find(|ip| ip.enabled) {
                    return Ok(ip.ip_address);
                }
            }
        }
        Err(ArrayError::NotFound(format!(
            "no enabled IP in network space '{}'",
            network_space
        )))
    }

    async fn one_time_validation(&self, pool_name: &str, network_space: &str) -> Result<String, ArrayError> {
        self.get_storage_pool_id_by_name(pool_name).await?;

        let mut valid = Vec::new();
        for name in network_space.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if self.network_space(name).await?.is_some() {
                valid.push(name);
            }
        }

        if valid.is_empty() {
            return Err(ArrayError::NotFound(format!(
                "no valid network space in '{}'",
                network_space
            )));
        }
        Ok(valid.join(","))
    }
}
