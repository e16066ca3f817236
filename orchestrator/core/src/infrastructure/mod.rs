// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod array;
pub mod event_bus;
pub mod mount;

pub use event_bus::EventBus;
pub use mount::SystemMounter;
