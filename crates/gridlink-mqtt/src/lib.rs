// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! # gridlink-mqtt
//!
//! MQTT northbound app plugin for the GRIDLINK gateway.
//!
//! Snapshots are formatted as JSON payloads and handed to a
//! [`Publisher`]; the concrete broker client is external to the gateway
//! and plugs in behind that trait.

#![warn(missing_docs)]

pub mod app;
pub mod publisher;

pub use app::{MqttApp, METRIC_PUBLISHED, METRIC_PUBLISH_ERRORS, STATUS_TOPIC};
pub use publisher::{MemoryPublisher, Published, Publisher};

use std::sync::Arc;

use gridlink_core::error::ErrorCode;
use gridlink_core::plugin::{
    CacheKind, PluginDescriptor, PluginInstance, PluginModule,
};
use gridlink_core::reactor::TimerKind;
use gridlink_core::types::NodeKind;

/// The plugin module name.
pub const PLUGIN_NAME: &str = "mqtt";

/// The registered MQTT plugin module.
pub struct MqttModule {
    descriptor: PluginDescriptor,
    publisher: Arc<dyn Publisher>,
}

impl MqttModule {
    /// Creates the module with an in-memory publisher.
    pub fn new() -> Self {
        Self::with_publisher(Arc::new(MemoryPublisher::new()))
    }

    /// Creates the module over a caller-owned publisher.
    pub fn with_publisher(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            descriptor: PluginDescriptor {
                name: PLUGIN_NAME.to_string(),
                description: "MQTT northbound bridge".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                schema: "mqtt".to_string(),
                kind: NodeKind::App,
                single: false,
                single_name: None,
                timer_kind: TimerKind::NonBlock,
                cache: CacheKind::None,
            },
            publisher,
        }
    }
}

impl Default for MqttModule {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginModule for MqttModule {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn open(&self) -> Result<PluginInstance, ErrorCode> {
        Ok(PluginInstance::App(Box::new(MqttApp::new(
            self.publisher.clone(),
        ))))
    }
}

/// Convenience constructor for registry registration.
pub fn module() -> Arc<dyn PluginModule> {
    Arc::new(MqttModule::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_descriptor() {
        let module = MqttModule::new();
        assert_eq!(module.descriptor().name, "mqtt");
        assert_eq!(module.descriptor().kind, NodeKind::App);
    }

    #[test]
    fn test_module_opens_app_instances() {
        let module = MqttModule::new();
        assert_eq!(module.open().unwrap().kind(), NodeKind::App);
    }
}
