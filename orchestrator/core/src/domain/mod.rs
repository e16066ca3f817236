// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: value objects, boundary traits and the error taxonomy.

pub mod array;
pub mod driver_config;
pub mod error;
pub mod events;
pub mod mounter;
pub mod options;
pub mod volume;
