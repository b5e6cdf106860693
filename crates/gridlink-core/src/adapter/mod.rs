// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! Adapters: the runtime containers for nodes.
//!
//! One adapter pairs a plugin instance with a reactor, a mailbox and a
//! state machine, and runs them on a single control task. Cross-task
//! interaction is by envelope only; the manager observes state through the
//! shared [`NodeStatusCell`](crate::types::NodeStatusCell).
//!
//! State machine: `Init → Ready ↔ Running → Stopped`. `init` runs as the
//! control task starts; `NodeCtl` envelopes toggle `Ready ↔ Running`;
//! `NodeUninit` tears the adapter down and ends the task.

mod app;
mod driver;

pub use app::AppAdapter;
pub use driver::DriverAdapter;

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::bus::{Mailbox, MessageBus};
use crate::error::ErrorCode;
use crate::group::GroupTable;
use crate::message::Envelope;
use crate::metrics::{MetricKind, NodeMetrics, METRIC_RECV_MSGS, METRIC_SEND_MSGS, METRIC_SEND_MSG_ERRORS};
use crate::plugin::{PluginDescriptor, PluginEnv, PluginInstance};
use crate::time::SharedClock;
use crate::types::{NodeKind, NodeName, NodeStatusCell};

// =============================================================================
// Spawn Surface
// =============================================================================

/// Everything an adapter control task needs at spawn time.
pub struct AdapterContext {
    /// Shared node name cell; renames go through it.
    pub name: Arc<RwLock<NodeName>>,
    /// The adapter's descriptor.
    pub descriptor: PluginDescriptor,
    /// Bus handle.
    pub bus: MessageBus,
    /// The adapter's bound mailbox; the control task takes it at startup.
    pub mailbox: Option<Mailbox>,
    /// Shared status cell.
    pub status: Arc<NodeStatusCell>,
    /// The node's metric block.
    pub metrics: Arc<NodeMetrics>,
    /// The shared snapshot clock.
    pub clock: SharedClock,
    /// Setting blob to apply during init, if any.
    pub setting: Option<String>,
    /// `true` when restoring from persistence.
    pub load: bool,
}

impl AdapterContext {
    /// Builds the plugin environment for this adapter.
    pub fn plugin_env(&self) -> PluginEnv {
        PluginEnv::new(
            self.name.clone(),
            self.bus.clone(),
            self.status.clone(),
            self.metrics.clone(),
            self.clock.clone(),
        )
    }

    /// Registers the message metrics every adapter carries.
    pub fn register_base_metrics(&self) {
        self.metrics.register(
            METRIC_SEND_MSGS,
            "envelopes sent by this node",
            MetricKind::Counter,
            0,
        );
        self.metrics.register(
            METRIC_SEND_MSG_ERRORS,
            "envelopes this node failed to deliver",
            MetricKind::Counter,
            0,
        );
        self.metrics.register(
            METRIC_RECV_MSGS,
            "envelopes received by this node",
            MetricKind::Counter,
            0,
        );
    }

    /// Current node name.
    pub fn node(&self) -> NodeName {
        self.name.read().clone()
    }

    /// Sends an envelope, counting delivery and drops on this node.
    pub fn send(&self, envelope: Envelope) {
        let kind = envelope.body.kind();
        let receiver = envelope.receiver.clone();
        match self.bus.send(envelope) {
            Ok(()) => self.metrics.update(METRIC_SEND_MSGS, 1),
            Err(_) => {
                self.metrics.update(METRIC_SEND_MSG_ERRORS, 1);
                tracing::warn!(
                    node = %self.node(),
                    to = %receiver,
                    kind,
                    "failed to deliver envelope"
                );
            }
        }
    }
}

/// Running-adapter handle kept by the manager.
pub struct AdapterHandle {
    /// Shared node name cell.
    pub name: Arc<RwLock<NodeName>>,
    /// Node kind.
    pub kind: NodeKind,
    /// Shared status cell.
    pub status: Arc<NodeStatusCell>,
    /// The driver's group table; empty table for apps.
    pub groups: Arc<GroupTable>,
    /// Control task handle, awaited during teardown.
    pub join: JoinHandle<()>,
}

impl std::fmt::Debug for AdapterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterHandle")
            .field("name", &*self.name.read())
            .field("kind", &self.kind)
            .field("state", &self.status.state())
            .finish()
    }
}

/// Spawns the control task matching the instance kind.
pub fn spawn(context: AdapterContext, instance: PluginInstance) -> Result<AdapterHandle, ErrorCode> {
    let name = context.name.clone();
    let kind = instance.kind();
    let status = context.status.clone();

    match instance {
        PluginInstance::Driver(plugin) => {
            let groups: Arc<GroupTable> = Arc::new(GroupTable::new());
            let adapter = DriverAdapter::new(context, plugin, groups.clone());
            let join = tokio::spawn(adapter.run());
            Ok(AdapterHandle {
                name,
                kind,
                status,
                groups,
                join,
            })
        }
        PluginInstance::App(plugin) => {
            let adapter = AppAdapter::new(context, plugin);
            let join = tokio::spawn(adapter.run());
            Ok(AdapterHandle {
                name,
                kind,
                status,
                groups: Arc::new(GroupTable::new()),
                join,
            })
        }
    }
}
