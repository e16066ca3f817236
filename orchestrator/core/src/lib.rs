// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0
//! arrayvol core
//!
//! Lifecycle of NFS-exported filesystems on a storage array: create (fresh,
//! clone, restore), delete, expand, snapshot, and node attach/detach.
//!
//! # Architecture
//!
//! - **domain:** value objects, the array and mounter boundaries, errors
//! - **application:** the lifecycle components and the `VolumeService` facade
//! - **infrastructure:** REST and in-memory array clients, mounter, event bus

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
