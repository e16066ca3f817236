// Copyright (c) 2026 arrayvol contributors
// SPDX-License-Identifier: AGPL-3.0

//! In-process driver
//!
//! Builds the array client and lifecycle services from the driver
//! configuration and runs each command directly against them.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use arrayvol_core::{
    application::{NodeService, StandardVolumeService},
    domain::driver_config::DriverConfigManifest,
    infrastructure::{
        array::{create_array_client, ArrayBackend},
        event_bus::{EventBus, EventBusError},
        SystemMounter,
    },
};

pub struct EmbeddedDriver {
    pub config: DriverConfigManifest,
    pub volumes: StandardVolumeService,
    pub node: NodeService,
    event_bus: Arc<EventBus>,
}

impl EmbeddedDriver {
    pub async fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let config = DriverConfigManifest::load_or_default(config_path)
            .context("Failed to load configuration")?;

        config
            .validate()
            .context("Configuration validation failed")?;

        let array = create_array_client(ArrayBackend::from(&config.spec.array))
            .context("Failed to initialize storage array client")?;
        let event_bus = Arc::new(EventBus::with_default_capacity());
        let defaults = config.spec.provisioning.clone();
        let node_ip = config.spec.node.ip_address.clone();

        let volumes = StandardVolumeService::new(array.clone(), defaults.clone(), node_ip.clone(), event_bus.clone());
        let node = NodeService::new(Arc::new(SystemMounter::new()), array, defaults, node_ip);

        let driver = Self {
            config,
            volumes,
            node,
            event_bus,
        };
        driver.spawn_event_logger();
        Ok(driver)
    }

    /// Echo lifecycle events at debug level until the bus closes
    fn spawn_event_logger(&self) {
        let mut receiver = self.event_bus.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => debug!(?event, "volume event"),
                    Err(EventBusError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
        });
    }
}
