// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! Probe plugin: an app that records everything delivered to it.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use gridlink_core::error::ErrorCode;
use gridlink_core::message::{Body, Context, NodesState, SubscribeReq, TransData, UnsubscribeReq};
use gridlink_core::plugin::{
    AppPlugin, CacheKind, Plugin, PluginDescriptor, PluginEnv, PluginInstance, PluginModule,
};
use gridlink_core::reactor::TimerKind;
use gridlink_core::types::{LinkState, NodeKind, NodeName};

/// The probe plugin module name.
pub const PROBE_PLUGIN: &str = "probe";

/// Shared record of everything a probe app observed.
#[derive(Debug, Default)]
pub struct Probe {
    snapshots: Mutex<Vec<TransData>>,
    deleted: Mutex<Vec<NodeName>>,
    subscribes: Mutex<Vec<SubscribeReq>>,
    unsubscribes: Mutex<Vec<UnsubscribeReq>>,
    responses: Mutex<Vec<(Context, Body)>>,
    states: Mutex<Vec<NodesState>>,
}

impl Probe {
    /// Creates an empty probe.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Snapshots received so far.
    pub fn snapshots(&self) -> Vec<TransData> {
        self.snapshots.lock().clone()
    }

    /// Node-deleted notifications received so far.
    pub fn deleted(&self) -> Vec<NodeName> {
        self.deleted.lock().clone()
    }

    /// Subscribe announcements received so far.
    pub fn subscribes(&self) -> Vec<SubscribeReq> {
        self.subscribes.lock().clone()
    }

    /// Unsubscribe announcements received so far.
    pub fn unsubscribes(&self) -> Vec<UnsubscribeReq> {
        self.unsubscribes.lock().clone()
    }

    /// Correlated responses received so far.
    pub fn responses(&self) -> Vec<(Context, Body)> {
        self.responses.lock().clone()
    }

    /// State digests received so far.
    pub fn states(&self) -> Vec<NodesState> {
        self.states.lock().clone()
    }
}

struct ProbeApp {
    env: Option<PluginEnv>,
    probe: Arc<Probe>,
}

#[async_trait]
impl Plugin for ProbeApp {
    async fn init(&mut self, env: PluginEnv, _load: bool) -> Result<(), ErrorCode> {
        self.env = Some(env);
        Ok(())
    }

    async fn uninit(&mut self) -> Result<(), ErrorCode> {
        self.env = None;
        Ok(())
    }

    async fn start(&mut self) -> Result<(), ErrorCode> {
        if let Some(env) = &self.env {
            env.set_link_state(LinkState::Connected);
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ErrorCode> {
        if let Some(env) = &self.env {
            env.set_link_state(LinkState::Disconnected);
        }
        Ok(())
    }

    async fn setting(&mut self, _setting: &str) -> Result<(), ErrorCode> {
        Ok(())
    }
}

#[async_trait]
impl AppPlugin for ProbeApp {
    async fn on_snapshot(&mut self, data: &TransData) -> Result<(), ErrorCode> {
        self.probe.snapshots.lock().push(data.clone());
        Ok(())
    }

    async fn on_subscribe(&mut self, sub: &SubscribeReq) -> Result<(), ErrorCode> {
        self.probe.subscribes.lock().push(sub.clone());
        Ok(())
    }

    async fn on_unsubscribe(&mut self, unsub: &UnsubscribeReq) -> Result<(), ErrorCode> {
        self.probe.unsubscribes.lock().push(unsub.clone());
        Ok(())
    }

    async fn on_node_deleted(&mut self, node: &NodeName) -> Result<(), ErrorCode> {
        self.probe.deleted.lock().push(node.clone());
        Ok(())
    }

    async fn on_nodes_state(&mut self, states: &NodesState) -> Result<(), ErrorCode> {
        self.probe.states.lock().push(states.clone());
        Ok(())
    }

    async fn on_response(&mut self, context: Context, body: &Body) -> Result<(), ErrorCode> {
        self.probe.responses.lock().push((context, body.clone()));
        Ok(())
    }
}

/// The probe module; every opened instance records into the same probe.
pub struct ProbeModule {
    descriptor: PluginDescriptor,
    probe: Arc<Probe>,
}

impl ProbeModule {
    /// Creates the module recording into `probe`.
    pub fn new(probe: Arc<Probe>) -> Arc<dyn PluginModule> {
        Arc::new(Self {
            descriptor: PluginDescriptor {
                name: PROBE_PLUGIN.to_string(),
                description: "recording test app".to_string(),
                version: "0.0.0".to_string(),
                schema: PROBE_PLUGIN.to_string(),
                kind: NodeKind::App,
                single: false,
                single_name: None,
                timer_kind: TimerKind::NonBlock,
                cache: CacheKind::None,
            },
            probe,
        })
    }
}

impl PluginModule for ProbeModule {
    fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn open(&self) -> Result<PluginInstance, ErrorCode> {
        Ok(PluginInstance::App(Box::new(ProbeApp {
            env: None,
            probe: self.probe.clone(),
        })))
    }
}
