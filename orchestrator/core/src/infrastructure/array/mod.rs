// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! Storage array adapters
//!
//! - [`RestArrayClient`]: the array's management REST API
//! - [`InMemoryArray`]: in-process array for tests and dry runs

pub mod memory;
pub mod rest;

pub use memory::{ArrayOp, InMemoryArray};
pub use rest::RestArrayClient;

use std::sync::Arc;
use std::time::Duration;

use crate::domain::array::{ArrayError, StorageArrayClient};
use crate::domain::driver_config::{ArrayBackendKind, ArrayConfig};

/// Array backend configuration
#[derive(Debug, Clone)]
pub enum ArrayBackend {
    Rest {
        url: String,
        username: String,
        password: Option<String>,
        timeout: Duration,
    },
    Memory,
}

impl From<&ArrayConfig> for ArrayBackend {
    fn from(config: &ArrayConfig) -> Self {
        match config.backend {
            ArrayBackendKind::Rest => ArrayBackend::Rest {
                url: config.url.clone(),
                username: config.username.clone(),
                password: config.password.clone(),
                timeout: Duration::from_secs(config.timeout_secs),
            },
            ArrayBackendKind::Memory => ArrayBackend::Memory,
        }
    }
}

/// Create array client from backend configuration
pub fn create_array_client(backend: ArrayBackend) -> Result<Arc<dyn StorageArrayClient>, ArrayError> {
    match backend {
        ArrayBackend::Rest {
            url,
            username,
            password,
            timeout,
        } => Ok(Arc::new(RestArrayClient::new(url, username, password, timeout)?)),
        ArrayBackend::Memory => Ok(Arc::new(InMemoryArray::new())),
    }
}
