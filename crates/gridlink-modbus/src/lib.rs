// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! # gridlink-modbus
//!
//! Simulated Modbus driver plugin for the GRIDLINK gateway.
//!
//! The plugin implements the whole driver surface (address validation,
//! per-group polling, endianness-aware decoding, single and batch writes)
//! against an in-process register bank. Real Modbus PDU framing is an
//! external concern; deployments swap the bank for a transport without
//! touching the plugin surface.

#![warn(missing_docs)]

pub mod device;
pub mod driver;
pub mod point;

pub use device::{Area, SimDevice};
pub use driver::ModbusSimDriver;
pub use point::{Point, PointError};

use std::sync::Arc;

use gridlink_core::error::ErrorCode;
use gridlink_core::plugin::{
    CacheKind, PluginDescriptor, PluginInstance, PluginModule,
};
use gridlink_core::reactor::TimerKind;
use gridlink_core::types::NodeKind;

/// The plugin module name.
pub const PLUGIN_NAME: &str = "modbus";

/// The registered Modbus plugin module.
pub struct ModbusModule {
    descriptor: PluginDescriptor,
    device: SimDevice,
}

impl ModbusModule {
    /// Creates the module with a fresh device per gateway.
    pub fn new() -> Self {
        Self::with_device(SimDevice::new())
    }

    /// Creates the module over a caller-owned device; tests use this to
    /// seed register values.
    pub fn with_device(device: SimDevice) -> Self {
        Self {
            descriptor: PluginDescriptor {
                name: PLUGIN_NAME.to_string(),
                description: "Modbus device driver (simulated transport)".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                schema: "modbus".to_string(),
                kind: NodeKind::Driver,
                single: false,
                single_name: None,
                // Device turnaround blocks the poll; no tick overlap.
                timer_kind: TimerKind::Block,
                cache: CacheKind::None,
            },
            device,
        }
    }

    /// The device handle backing every instance of this module.
    pub fn device(&self) -> SimDevice {
        self.device.clone()
    }
}

impl Default for ModbusModule {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginModule for ModbusModule {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn open(&self) -> Result<PluginInstance, ErrorCode> {
        Ok(PluginInstance::Driver(Box::new(ModbusSimDriver::new(
            self.device.clone(),
        ))))
    }
}

/// Convenience constructor for registry registration.
pub fn module() -> Arc<dyn PluginModule> {
    Arc::new(ModbusModule::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_descriptor() {
        let module = ModbusModule::new();
        let d = module.descriptor();
        assert_eq!(d.name, "modbus");
        assert_eq!(d.kind, NodeKind::Driver);
        assert_eq!(d.timer_kind, TimerKind::Block);
        assert!(!d.single);
    }

    #[test]
    fn test_module_opens_driver_instances() {
        let module = ModbusModule::new();
        let instance = module.open().unwrap();
        assert_eq!(instance.kind(), NodeKind::Driver);
    }
}
