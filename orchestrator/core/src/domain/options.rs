// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! Provisioning options
//!
//! Callers hand over a flat `String → String` parameter map. It is parsed
//! once, at the boundary, into [`ProvisioningOptions`] using the immutable
//! [`ProvisioningDefaults`] the service was constructed with. Recognized
//! option names and their defaults are part of the external contract.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::array::ExportPermission;
use crate::domain::error::DriverError;
use crate::domain::volume::ContentSource;

pub const POOL_NAME: &str = "pool_name";
pub const NFS_NETWORKSPACE: &str = "nfs_networkspace";
pub const SSD_ENABLED: &str = "ssd_enabled";
pub const PROVISION_TYPE: &str = "provision_type";
pub const NFS_EXPORT_PERMISSIONS: &str = "nfs_export_permissions";
pub const NO_ROOT_SQUASH: &str = "no_root_squash";
pub const NFS_MOUNT_OPTIONS: &str = "nfs_mount_options";

const REQUIRED_PARAMETERS: [&str; 2] = [POOL_NAME, NFS_NETWORKSPACE];

/// Client pattern used for the default export rule.
pub const ANY_CLIENT: &str = "*";
/// Transport every export is created with.
pub const EXPORT_TRANSPORT: &str = "TCP";

/// Policy defaults applied when a request leaves an option unset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningDefaults {
    /// Root every export path is joined under
    #[serde(default = "default_export_root")]
    pub export_root: String,

    /// Hard ceiling on filesystems the array may hold
    #[serde(default = "default_max_filesystems")]
    pub max_filesystems: u64,

    #[serde(default = "default_export_permissions")]
    pub nfs_export_permissions: String,

    #[serde(default = "default_true")]
    pub no_root_squash: bool,

    #[serde(default = "default_mount_options")]
    pub nfs_mount_options: String,

    #[serde(default)]
    pub ssd_enabled: bool,

    #[serde(default)]
    pub provision_type: String,
}

fn default_export_root() -> String {
    "/fs".to_string()
}

fn default_max_filesystems() -> u64 {
    4000
}

fn default_export_permissions() -> String {
    "RW".to_string()
}

fn default_true() -> bool {
    true
}

fn default_mount_options() -> String {
    "hard,rsize=1024,wsize=1024".to_string()
}

impl Default for ProvisioningDefaults {
    fn default() -> Self {
        Self {
            export_root: default_export_root(),
            max_filesystems: default_max_filesystems(),
            nfs_export_permissions: default_export_permissions(),
            no_root_squash: true,
            nfs_mount_options: default_mount_options(),
            ssd_enabled: false,
            provision_type: String::new(),
        }
    }
}

impl ProvisioningDefaults {
    /// Deterministic export path for a volume name
    pub fn export_path_for(&self, volume_name: &str) -> String {
        format!(
            "{}/{}",
            self.export_root.trim_end_matches('/'),
            volume_name.trim_start_matches('/')
        )
    }
}

/// Access policy of an export rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPolicy {
    pub access: String,
    pub no_root_squash: bool,
}

impl ExportPolicy {
    /// The rule granted to any client when the export is created
    pub fn wildcard_permission(&self) -> ExportPermission {
        self.permission_for(ANY_CLIENT)
    }

    pub fn permission_for(&self, client: &str) -> ExportPermission {
        ExportPermission {
            access: self.access.clone(),
            no_root_squash: self.no_root_squash,
            client: client.to_string(),
        }
    }

    /// Read the policy back out of a volume context.
    ///
    /// An unparsable `no_root_squash` falls back to `true`.
    pub fn from_context(context: &BTreeMap<String, String>, defaults: &ProvisioningDefaults) -> Self {
        let access = context
            .get(NFS_EXPORT_PERMISSIONS)
            .filter(|v| !v.is_empty())
            .cloned()
            .unwrap_or_else(|| defaults.nfs_export_permissions.clone());
        let no_root_squash = context
            .get(NO_ROOT_SQUASH)
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(true);
        Self { access, no_root_squash }
    }
}

/// Validated, defaulted view of the request parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningOptions {
    pub pool_name: String,
    pub network_space: String,
    pub ssd_enabled: bool,
    pub provision_type: String,
    pub export_permissions: String,
    pub no_root_squash: bool,
    pub mount_options: String,
}

impl ProvisioningOptions {
    /// Parse and validate request parameters.
    ///
    /// Every missing mandatory field and every malformed boolean is reported
    /// in a single `InvalidArgument`.
    pub fn from_parameters(
        parameters: &BTreeMap<String, String>,
        defaults: &ProvisioningDefaults,
    ) -> Result<Self, DriverError> {
        let mut problems = Vec::new();

        for key in REQUIRED_PARAMETERS {
            if parameters.get(key).map_or(true, |v| v.trim().is_empty()) {
                problems.push(format!("{} value missing", key));
            }
        }

        let ssd_enabled = parse_bool(parameters, SSD_ENABLED, defaults.ssd_enabled, &mut problems);
        let no_root_squash = parse_bool(parameters, NO_ROOT_SQUASH, defaults.no_root_squash, &mut problems);

        if !problems.is_empty() {
            return Err(DriverError::InvalidArgument(format!(
                "failed to validate parameters: {}",
                problems.join(", ")
            )));
        }

        let text = |key: &str, default: &str| {
            parameters
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            pool_name: text(POOL_NAME, ""),
            network_space: text(NFS_NETWORKSPACE, ""),
            ssd_enabled,
            provision_type: text(PROVISION_TYPE, &defaults.provision_type).to_uppercase(),
            export_permissions: text(NFS_EXPORT_PERMISSIONS, &defaults.nfs_export_permissions),
            no_root_squash,
            mount_options: text(NFS_MOUNT_OPTIONS, &defaults.nfs_mount_options),
        })
    }

    pub fn export_policy(&self) -> ExportPolicy {
        ExportPolicy {
            access: self.export_permissions.clone(),
            no_root_squash: self.no_root_squash,
        }
    }
}

fn parse_bool(
    parameters: &BTreeMap<String, String>,
    key: &str,
    default: bool,
    problems: &mut Vec<String>,
) -> bool {
    match parameters.get(key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => default,
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "true" | "1" => true,
            "false" | "0" => false,
            _ => {
                problems.push(format!("{} must be a boolean, got '{}'", key, value));
                default
            }
        },
    }
}

/// Inbound request to provision a volume
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionRequest {
    pub name: String,
    /// Requested capacity in bytes, before the 1 GiB floor is applied
    pub capacity_bytes: u64,
    pub parameters: BTreeMap<String, String>,
    pub content_source: ContentSource,
}

impl ProvisionRequest {
    pub fn new(name: impl Into<String>, capacity_bytes: u64) -> Self {
        Self {
            name: name.into(),
            capacity_bytes,
            parameters: BTreeMap::new(),
            content_source: ContentSource::None,
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_content_source(mut self, source: ContentSource) -> Self {
        self.content_source = source;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let options = ProvisioningOptions::from_parameters(
            &params(&[(POOL_NAME, "pool0"), (NFS_NETWORKSPACE, "ns0")]),
            &ProvisioningDefaults::default(),
        )
        .unwrap();

        assert_eq!(options.pool_name, "pool0");
        assert_eq!(options.network_space, "ns0");
        assert!(!options.ssd_enabled);
        assert_eq!(options.provision_type, "");
        assert_eq!(options.export_permissions, "RW");
        assert!(options.no_root_squash);
        assert_eq!(options.mount_options, "hard,rsize=1024,wsize=1024");
    }

    #[test]
    fn test_reports_every_missing_field() {
        let err = ProvisioningOptions::from_parameters(
            &params(&[(NFS_NETWORKSPACE, "")]),
            &ProvisioningDefaults::default(),
        )
        .unwrap_err();

        match err {
            DriverError::InvalidArgument(message) => {
                assert!(message.contains("pool_name"));
                assert!(message.contains("nfs_networkspace"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_explicit_options_override_defaults() {
        let options = ProvisioningOptions::from_parameters(
            &params(&[
                (POOL_NAME, "pool0"),
                (NFS_NETWORKSPACE, "ns0"),
                (SSD_ENABLED, "true"),
                (PROVISION_TYPE, "thin"),
                (NFS_EXPORT_PERMISSIONS, "RO"),
                (NO_ROOT_SQUASH, "false"),
            ]),
            &ProvisioningDefaults::default(),
        )
        .unwrap();

        assert!(options.ssd_enabled);
        assert_eq!(options.provision_type, "THIN");
        assert_eq!(
            options.export_policy(),
            ExportPolicy {
                access: "RO".to_string(),
                no_root_squash: false
            }
        );
    }

    #[test]
    fn test_malformed_boolean_is_rejected() {
        let err = ProvisioningOptions::from_parameters(
            &params(&[(POOL_NAME, "pool0"), (NFS_NETWORKSPACE, "ns0"), (SSD_ENABLED, "maybe")]),
            &ProvisioningDefaults::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DriverError::InvalidArgument(m) if m.contains("ssd_enabled")));
    }

    #[test]
    fn test_export_path_joins_root() {
        let defaults = ProvisioningDefaults::default();
        assert_eq!(defaults.export_path_for("pvc-1"), "/fs/pvc-1");

        let custom = ProvisioningDefaults {
            export_root: "/exports/".to_string(),
            ..ProvisioningDefaults::default()
        };
        assert_eq!(custom.export_path_for("pvc-1"), "/exports/pvc-1");
    }

    #[test]
    fn test_policy_from_context_falls_back() {
        let defaults = ProvisioningDefaults::default();

        let policy = ExportPolicy::from_context(&params(&[(NO_ROOT_SQUASH, "nonsense")]), &defaults);
        assert_eq!(policy.access, "RW");
        assert!(policy.no_root_squash);

        let policy = ExportPolicy::from_context(
            &params(&[(NFS_EXPORT_PERMISSIONS, "RO"), (NO_ROOT_SQUASH, "false")]),
            &defaults,
        );
        assert_eq!(policy.access, "RO");
        assert!(!policy.no_root_squash);
    }
}
