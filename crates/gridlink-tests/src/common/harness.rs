// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! Test harness assembling a complete in-process gateway.

use std::sync::Arc;
use std::time::Duration;

use gridlink_core::bus::{Mailbox, MessageBus};
use gridlink_core::manager::Manager;
use gridlink_core::store::MemStore;
use gridlink_core::types::NodeName;
use gridlink_modbus::{ModbusModule, SimDevice};

use crate::common::mocks::{Probe, ProbeModule};

/// A running gateway with a seeded device and a probe app module.
pub struct TestGateway {
    /// Message bus.
    pub bus: MessageBus,
    /// Control plane.
    pub manager: Arc<Manager>,
    /// Persistence store shared with the manager.
    pub store: Arc<MemStore>,
    /// The simulated device backing every modbus node.
    pub device: SimDevice,
    /// The probe record backing every probe app node.
    pub probe: Arc<Probe>,
}

impl TestGateway {
    /// Builds the gateway and registers the modbus and probe modules.
    pub async fn start() -> Self {
        Self::start_with_store(Arc::new(MemStore::new())).await
    }

    /// Builds the gateway over an existing store (for restore tests).
    pub async fn start_with_store(store: Arc<MemStore>) -> Self {
        let bus = MessageBus::new();
        let manager = Manager::new(bus.clone(), store.clone());

        let device = SimDevice::new();
        let probe = Probe::new();
        manager
            .add_plugin(Arc::new(ModbusModule::with_device(device.clone())))
            .await
            .expect("register modbus module");
        manager
            .add_plugin(ProbeModule::new(probe.clone()))
            .await
            .expect("register probe module");

        Self {
            bus,
            manager,
            store,
            device,
            probe,
        }
    }

    /// Binds an extra mailbox for the test itself to act as a peer.
    pub fn bind(&self, name: &str) -> Mailbox {
        self.bus.bind(NodeName::new(name))
    }
}

/// Polls `predicate` until it holds or the timeout elapses.
///
/// Works under both real and paused tokio time.
pub async fn wait_until<F: FnMut() -> bool>(mut predicate: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
