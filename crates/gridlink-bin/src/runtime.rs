// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! Gateway runtime orchestration.
//!
//! Builds the bus, store and manager, registers the plugin modules named
//! in the boot configuration, restores persisted nodes, starts the
//! autostart set and runs until shutdown is signaled.

use std::sync::Arc;

use tracing::{info, warn};

use gridlink_core::bus::MessageBus;
use gridlink_core::manager::Manager;
use gridlink_core::message::NodeCtl;
use gridlink_core::plugin::PluginModule;
use gridlink_core::store::{MemStore, Store};
use gridlink_core::types::NodeName;

use crate::config::BootConfig;
use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;

// =============================================================================
// GatewayRuntime
// =============================================================================

/// The main gateway runtime.
pub struct GatewayRuntime {
    config: BootConfig,
    shutdown: ShutdownCoordinator,
    store: Arc<dyn Store>,
}

impl GatewayRuntime {
    /// Creates a runtime over the in-memory store.
    pub fn new(config: BootConfig) -> Self {
        Self::with_store(config, Arc::new(MemStore::new()))
    }

    /// Creates a runtime over a caller-provided store.
    pub fn with_store(config: BootConfig, store: Arc<dyn Store>) -> Self {
        Self {
            config,
            shutdown: ShutdownCoordinator::new(),
            store,
        }
    }

    /// Runs the gateway until shutdown is signaled.
    pub async fn run(self) -> BinResult<()> {
        info!("starting GRIDLINK gateway v{}", gridlink_core::VERSION);

        let bus = MessageBus::new();
        let manager = Manager::new(bus, self.store.clone());

        for name in &self.config.plugins {
            let module = builtin_module(name).ok_or_else(|| {
                BinError::Initialization(format!("unknown plugin module '{}'", name))
            })?;
            manager.add_plugin(module).await?;
        }

        if let Err(code) = manager.restore().await {
            warn!(%code, "restore finished with errors");
        }

        for node in &self.config.autostart {
            let node = NodeName::new(node.clone());
            if let Err(code) = manager.node_ctl(&node, NodeCtl::Start).await {
                warn!(node = %node, %code, "autostart failed");
            } else {
                info!(node = %node, "autostarted node");
            }
        }

        info!("gateway running; waiting for shutdown signal");
        self.shutdown.listen_for_signals().await;

        info!("shutting down");
        manager.shutdown().await;
        info!("gateway shutdown complete");
        Ok(())
    }

    /// Validates the configuration without starting anything.
    pub fn validate(&self) -> BinResult<()> {
        for name in &self.config.plugins {
            if builtin_module(name).is_none() {
                return Err(BinError::Initialization(format!(
                    "unknown plugin module '{}'",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Resolves a built-in plugin module by name.
fn builtin_module(name: &str) -> Option<Arc<dyn PluginModule>> {
    match name {
        gridlink_modbus::PLUGIN_NAME => Some(gridlink_modbus::module()),
        gridlink_mqtt::PLUGIN_NAME => Some(gridlink_mqtt::module()),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_modules_resolve() {
        assert!(builtin_module("modbus").is_some());
        assert!(builtin_module("mqtt").is_some());
        assert!(builtin_module("ghost").is_none());
    }

    #[test]
    fn test_validate_rejects_unknown_plugins() {
        let runtime = GatewayRuntime::new(BootConfig {
            plugins: vec!["ghost".to_string()],
            autostart: Vec::new(),
        });
        assert!(runtime.validate().is_err());

        let runtime = GatewayRuntime::new(BootConfig::default());
        assert!(runtime.validate().is_ok());
    }
}
