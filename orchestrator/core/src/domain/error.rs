// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! Driver error taxonomy
//!
//! Every lifecycle operation fails with exactly one classified
//! [`DriverError`]. The classification maps onto gRPC status codes so an
//! RPC layer can hand errors back verbatim.

use thiserror::Error;
use tonic::{Code, Status};

use crate::domain::array::ArrayError;

#[derive(Debug, Error)]
pub enum DriverError {
    /// Missing or mismatched request fields, malformed identifiers
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Source volume or snapshot is absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Array-side failure on create/restore/attach/update
    #[error("internal error: {0}")]
    Internal(String),

    /// An object with the requested name is already on the array
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The array refuses more objects (filesystem ceiling reached)
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Unclassified failure reported by the array client
    #[error("storage array error: {0}")]
    Array(#[from] ArrayError),
}

impl DriverError {
    pub fn code(&self) -> Code {
        match self {
            Self::InvalidArgument(_) => Code::InvalidArgument,
            Self::NotFound(_) => Code::NotFound,
            Self::Internal(_) | Self::Array(_) => Code::Internal,
            Self::AlreadyExists(_) => Code::AlreadyExists,
            Self::ResourceExhausted(_) => Code::ResourceExhausted,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Array(ArrayError::NotFound(_)))
    }
}

impl From<DriverError> for Status {
    fn from(err: DriverError) -> Self {
        Status::new(err.code(), err.to_string())
    }
}
