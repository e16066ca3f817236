// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

// Driver Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing:
// - Node identity (ID and the IP used in export rules)
// - Storage array connection
// - Provisioning policy defaults

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::options::ProvisioningDefaults;

pub const API_VERSION: &str = "arrayvol.io/v1";
pub const KIND: &str = "DriverConfig";

/// Top-level driver configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfigManifest {
    /// API version (must be "arrayvol.io/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "DriverConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: DriverConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfigSpec {
    pub node: NodeIdentity,

    #[serde(default)]
    pub array: ArrayConfig,

    #[serde(default)]
    pub provisioning: ProvisioningDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// Stable node identifier reported to the container platform
    pub id: String,

    /// Address granted access in export rules when this node attaches
    #[serde(default)]
    pub ip_address: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayBackendKind {
    /// Management REST API of a real array
    Rest,
    /// In-process array, for development and dry runs
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayConfig {
    #[serde(default = "default_backend")]
    pub backend: ArrayBackendKind,

    /// Management API base URL, e.g. "https://array.example.com"
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub username: String,

    /// Prefer ARRAYVOL_ARRAY_PASSWORD over storing this in the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_backend() -> ArrayBackendKind {
    ArrayBackendKind::Rest
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: String::new(),
            username: String::new(),
            password: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for DriverConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "arrayvol-node".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname.clone(),
                labels: None,
            },
            spec: DriverConfigSpec {
                node: NodeIdentity {
                    id: hostname,
                    ip_address: String::new(),
                },
                array: ArrayConfig {
                    backend: ArrayBackendKind::Memory,
                    ..ArrayConfig::default()
                },
                provisioning: ProvisioningDefaults::default(),
            },
        }
    }
}

impl DriverConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. ARRAYVOL_CONFIG_PATH environment variable
    /// 2. ./arrayvol-config.yaml (working directory)
    /// 3. ~/.arrayvol/config.yaml (user home)
    /// 4. /etc/arrayvol/config.yaml
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("ARRAYVOL_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./arrayvol-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".arrayvol").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/arrayvol/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing/invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using in-memory array defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ARRAYVOL_ARRAY_URL") {
            tracing::info!("Environment override: ARRAYVOL_ARRAY_URL={}", val);
            self.spec.array.url = val;
        }
        if let Ok(val) = std::env::var("ARRAYVOL_ARRAY_USERNAME") {
            tracing::info!("Environment override: ARRAYVOL_ARRAY_USERNAME={}", val);
            self.spec.array.username = val;
        }
        if let Ok(val) = std::env::var("ARRAYVOL_ARRAY_PASSWORD") {
            tracing::info!("Environment override: ARRAYVOL_ARRAY_PASSWORD=<redacted>");
            self.spec.array.password = Some(val);
        }
        if let Ok(val) = std::env::var("ARRAYVOL_NODE_IP") {
            tracing::info!("Environment override: ARRAYVOL_NODE_IP={}", val);
            self.spec.node.ip_address = val;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.node.id.is_empty() {
            anyhow::bail!("spec.node.id cannot be empty");
        }

        if self.spec.array.backend == ArrayBackendKind::Rest {
            if !self.spec.array.url.starts_with("http://") && !self.spec.array.url.starts_with("https://") {
                anyhow::bail!(
                    "spec.array.url must start with http:// or https://, got '{}'",
                    self.spec.array.url
                );
            }
            if self.spec.array.username.is_empty() {
                anyhow::bail!("spec.array.username cannot be empty for the rest backend");
            }
        }

        if self.spec.provisioning.max_filesystems == 0 {
            anyhow::bail!("spec.provisioning.max_filesystems must be greater than zero");
        }

        if !self.spec.provisioning.export_root.starts_with('/') {
            anyhow::bail!(
                "spec.provisioning.export_root must be absolute, got '{}'",
                self.spec.provisioning.export_root
            );
        }

        Ok(())
    }
}
