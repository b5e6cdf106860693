// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! The plugin surface: descriptors, lifecycle traits and the registry.
//!
//! A plugin module is registered code exporting a [`PluginDescriptor`] and
//! an `open` constructor, the in-process rendition of a dynamically loaded
//! library exporting its descriptor symbol. Instances reach the gateway
//! only through the [`PluginEnv`] callback table handed to `init`; there is
//! no back-pointer into the adapter.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::bus::MessageBus;
use crate::error::ErrorCode;
use crate::message::{Body, Context, Envelope, NodesState, SubscribeReq, TransData, UnsubscribeReq};
use crate::metrics::{MetricKind, NodeMetrics};
use crate::reactor::TimerKind;
use crate::tag::{Tag, TagValue};
use crate::time::SharedClock;
use crate::types::{LinkState, NodeKind, NodeName, NodeStatusCell, Value};

// =============================================================================
// Descriptor
// =============================================================================

/// Tag value caching behavior of a driver plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    /// Every snapshot reflects a fresh device read.
    #[default]
    None,
    /// The driver may serve the last sampled value between polls.
    LastValue,
}

/// Static description a plugin module exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Module name, unique in the registry.
    pub name: String,
    /// Human description.
    pub description: String,
    /// Module version string.
    pub version: String,
    /// Name of the setting schema consumed by the UI.
    pub schema: String,
    /// Node kind this module implements.
    pub kind: NodeKind,
    /// At most one instance process-wide when set.
    pub single: bool,
    /// Fixed instance name for singleton modules.
    pub single_name: Option<String>,
    /// Timer kind for driver group polling.
    pub timer_kind: TimerKind,
    /// Tag caching behavior.
    pub cache: CacheKind,
}

/// Registry listing entry for the get-plugin surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Module name.
    pub name: String,
    /// Human description.
    pub description: String,
    /// Node kind.
    pub kind: NodeKind,
    /// Singleton flag.
    pub single: bool,
}

// =============================================================================
// Plugin Environment
// =============================================================================

/// Callback table through which a plugin reaches the gateway.
///
/// The node name is shared with the adapter so renames stay visible to a
/// long-lived plugin instance.
#[derive(Clone)]
pub struct PluginEnv {
    node: Arc<parking_lot::RwLock<NodeName>>,
    bus: MessageBus,
    status: Arc<NodeStatusCell>,
    metrics: Arc<NodeMetrics>,
    clock: SharedClock,
}

impl PluginEnv {
    /// Assembles the environment for one adapter.
    pub fn new(
        node: Arc<parking_lot::RwLock<NodeName>>,
        bus: MessageBus,
        status: Arc<NodeStatusCell>,
        metrics: Arc<NodeMetrics>,
        clock: SharedClock,
    ) -> Self {
        Self {
            node,
            bus,
            status,
            metrics,
            clock,
        }
    }

    /// The owning node's current name.
    pub fn node(&self) -> NodeName {
        self.node.read().clone()
    }

    /// Updates the node's link state.
    pub fn set_link_state(&self, link: LinkState) {
        self.status.set_link(link);
    }

    /// Reads the node's link state.
    pub fn link_state(&self) -> LinkState {
        self.status.link()
    }

    /// Registers a metric on the node's metric block.
    pub fn register_metric(&self, name: &str, help: &str, kind: MetricKind, init: i64) {
        self.metrics.register(name, help, kind, init);
    }

    /// Updates a metric on the node's metric block.
    pub fn update_metric(&self, name: &str, value: i64) {
        self.metrics.update(name, value);
    }

    /// Reading of the shared snapshot clock, in milliseconds.
    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    /// Sends a request envelope to another node, minting the context used
    /// to correlate the eventual response.
    ///
    /// Used by app plugins to originate reads and writes; the reply comes
    /// back through [`AppPlugin::on_response`].
    pub fn send_request(&self, receiver: NodeName, body: Body) -> Result<Context, ErrorCode> {
        let envelope = Envelope::new(self.node(), receiver, body);
        let context = envelope.context;
        self.bus.send(envelope).map_err(|_| ErrorCode::Internal)?;
        Ok(context)
    }
}

impl std::fmt::Debug for PluginEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginEnv").field("node", &self.node()).finish()
    }
}

// =============================================================================
// Plugin Group
// =============================================================================

/// The driver-facing view of one group during polling.
///
/// `user_data` is the plugin's compiled read plan; it survives across
/// ticks and is rebuilt whenever the group revision moves.
pub struct PluginGroup {
    /// Group name.
    pub name: String,
    /// The polled (non-static) tags.
    pub tags: Vec<Tag>,
    /// Poll interval in milliseconds.
    pub interval_ms: u32,
    /// Plugin-owned plan state.
    pub user_data: Option<Box<dyn Any + Send>>,
}

impl PluginGroup {
    /// Creates a plugin group view.
    pub fn new(name: impl Into<String>, tags: Vec<Tag>, interval_ms: u32) -> Self {
        Self {
            name: name.into(),
            tags,
            interval_ms,
            user_data: None,
        }
    }
}

impl std::fmt::Debug for PluginGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginGroup")
            .field("name", &self.name)
            .field("tags", &self.tags.len())
            .field("interval_ms", &self.interval_ms)
            .field("has_user_data", &self.user_data.is_some())
            .finish()
    }
}

// =============================================================================
// Lifecycle Traits
// =============================================================================

/// Lifecycle common to every plugin instance.
#[async_trait]
pub trait Plugin: Send {
    /// Binds the instance to its environment. `load` is `true` when the
    /// node is being restored from persistence.
    async fn init(&mut self, env: PluginEnv, load: bool) -> Result<(), ErrorCode>;

    /// Releases everything; the instance is dropped afterwards.
    async fn uninit(&mut self) -> Result<(), ErrorCode>;

    /// Arms the instance for data-plane work.
    async fn start(&mut self) -> Result<(), ErrorCode>;

    /// Disarms the instance.
    async fn stop(&mut self) -> Result<(), ErrorCode>;

    /// Applies an opaque JSON setting blob.
    async fn setting(&mut self, setting: &str) -> Result<(), ErrorCode>;
}

/// Driver-side protocol callbacks.
#[async_trait]
pub trait DriverPlugin: Plugin {
    /// Validates one tag (address grammar, type support).
    fn validate_tag(&self, tag: &Tag) -> Result<(), ErrorCode>;

    /// Optional whole-set validation before a tag batch is committed.
    fn tag_validator(&self, _tags: &[Tag]) -> Result<(), ErrorCode> {
        Ok(())
    }

    /// Executes one poll cycle for `group` and returns the sampled values.
    async fn group_timer(&mut self, group: &mut PluginGroup) -> Result<Vec<TagValue>, ErrorCode>;

    /// Rebuilds the read plan after a group revision change. The default
    /// leaves planning to `group_timer`.
    async fn group_sync(&mut self, _group: &mut PluginGroup) -> Result<(), ErrorCode> {
        Ok(())
    }

    /// Writes one tag; returns the per-tag result code.
    async fn write_tag(&mut self, tag: &Tag, value: Value) -> ErrorCode;

    /// Writes several tags; returns one code per element.
    async fn write_tags(&mut self, tag_values: &[(Tag, Value)]) -> Vec<ErrorCode> {
        let mut results = Vec::with_capacity(tag_values.len());
        for (tag, value) in tag_values {
            results.push(self.write_tag(tag, value.clone()).await);
        }
        results
    }

    /// Hook invoked when tags are restored from persistence.
    async fn load_tags(&mut self, _group: &str, _tags: &[Tag]) -> Result<(), ErrorCode> {
        Ok(())
    }

    /// Hook invoked after tags were committed to a group.
    async fn add_tags(&mut self, _group: &str, _tags: &[Tag]) -> Result<(), ErrorCode> {
        Ok(())
    }

    /// Hook invoked after tags were removed from a group.
    async fn del_tags(&mut self, _group: &str, _tags: &[String]) -> Result<(), ErrorCode> {
        Ok(())
    }
}

/// App-side consumption callbacks.
#[async_trait]
pub trait AppPlugin: Plugin {
    /// Consumes one group snapshot.
    async fn on_snapshot(&mut self, data: &TransData) -> Result<(), ErrorCode>;

    /// A subscription now routes snapshots to this app.
    async fn on_subscribe(&mut self, _sub: &SubscribeReq) -> Result<(), ErrorCode> {
        Ok(())
    }

    /// A subscription was torn down.
    async fn on_unsubscribe(&mut self, _unsub: &UnsubscribeReq) -> Result<(), ErrorCode> {
        Ok(())
    }

    /// A subscribed driver was deleted.
    async fn on_node_deleted(&mut self, _node: &NodeName) -> Result<(), ErrorCode> {
        Ok(())
    }

    /// Periodic node state digest.
    async fn on_nodes_state(&mut self, _states: &NodesState) -> Result<(), ErrorCode> {
        Ok(())
    }

    /// Response to a request this app originated via
    /// [`PluginEnv::send_request`], correlated by context.
    async fn on_response(&mut self, _context: Context, _body: &Body) -> Result<(), ErrorCode> {
        Ok(())
    }
}

/// A freshly opened plugin instance.
pub enum PluginInstance {
    /// Driver-side instance.
    Driver(Box<dyn DriverPlugin>),
    /// App-side instance.
    App(Box<dyn AppPlugin>),
}

impl PluginInstance {
    /// Returns the node kind of the instance.
    pub fn kind(&self) -> NodeKind {
        match self {
            PluginInstance::Driver(_) => NodeKind::Driver,
            PluginInstance::App(_) => NodeKind::App,
        }
    }
}

impl std::fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PluginInstance::{}", self.kind())
    }
}

/// A registered plugin module: descriptor plus instance constructor.
pub trait PluginModule: Send + Sync {
    /// The exported descriptor.
    fn descriptor(&self) -> &PluginDescriptor;

    /// Opens a fresh instance.
    fn open(&self) -> Result<PluginInstance, ErrorCode>;
}

// =============================================================================
// Registry
// =============================================================================

/// Maps plugin names to modules and enforces instantiation rules.
pub struct PluginRegistry {
    modules: HashMap<String, Arc<dyn PluginModule>>,
    live_singletons: HashSet<String>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
            live_singletons: HashSet::new(),
        }
    }

    /// Registers a module under its descriptor name.
    pub fn add(&mut self, module: Arc<dyn PluginModule>) -> Result<(), ErrorCode> {
        let name = module.descriptor().name.clone();
        if self.modules.contains_key(&name) {
            return Err(ErrorCode::LibraryFailedToOpen);
        }
        tracing::info!(plugin = %name, "registered plugin module");
        self.modules.insert(name, module);
        Ok(())
    }

    /// Removes a module. Fails while instances may still exist; the caller
    /// ensures no node references it.
    pub fn remove(&mut self, name: &str) -> Result<(), ErrorCode> {
        self.modules
            .remove(name)
            .map(|_| ())
            .ok_or(ErrorCode::LibraryNotFound)
    }

    /// Replaces a registered module in place (e.g. a newer version).
    pub fn update(&mut self, module: Arc<dyn PluginModule>) -> Result<(), ErrorCode> {
        let name = module.descriptor().name.clone();
        if !self.modules.contains_key(&name) {
            return Err(ErrorCode::LibraryNotFound);
        }
        self.modules.insert(name, module);
        Ok(())
    }

    /// Looks up a module.
    pub fn find(&self, name: &str) -> Option<Arc<dyn PluginModule>> {
        self.modules.get(name).cloned()
    }

    /// Lists registry entries.
    pub fn list(&self) -> Vec<PluginInfo> {
        let mut infos: Vec<PluginInfo> = self
            .modules
            .values()
            .map(|module| {
                let d = module.descriptor();
                PluginInfo {
                    name: d.name.clone(),
                    description: d.description.clone(),
                    kind: d.kind,
                    single: d.single,
                }
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Opens an instance of `plugin` for a node named `node` of `kind`.
    ///
    /// Enforces: module exists, kind matches, singleton modules instantiate
    /// at most once and only under their fixed name.
    pub fn open(
        &mut self,
        plugin: &str,
        kind: NodeKind,
        node: &NodeName,
    ) -> Result<(PluginInstance, PluginDescriptor), ErrorCode> {
        let module = self
            .modules
            .get(plugin)
            .cloned()
            .ok_or(ErrorCode::LibraryNotFound)?;
        let descriptor = module.descriptor().clone();

        if descriptor.kind != kind {
            return Err(ErrorCode::PluginTypeNotSupport);
        }
        if descriptor.single {
            let fixed = descriptor.single_name.as_deref().unwrap_or(&descriptor.name);
            if node.as_str() != fixed || self.live_singletons.contains(plugin) {
                return Err(ErrorCode::LibraryNotAllowCreateInstance);
            }
        }

        let instance = module.open()?;
        if instance.kind() != kind {
            return Err(ErrorCode::PluginTypeNotSupport);
        }
        if descriptor.single {
            self.live_singletons.insert(plugin.to_string());
        }
        Ok((instance, descriptor))
    }

    /// Releases the singleton slot after its node is destroyed.
    pub fn release(&mut self, plugin: &str) {
        self.live_singletons.remove(plugin);
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("modules", &self.modules.len())
            .field("live_singletons", &self.live_singletons)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct NullApp;

    #[async_trait]
    impl Plugin for NullApp {
        async fn init(&mut self, _env: PluginEnv, _load: bool) -> Result<(), ErrorCode> {
            Ok(())
        }
        async fn uninit(&mut self) -> Result<(), ErrorCode> {
            Ok(())
        }
        async fn start(&mut self) -> Result<(), ErrorCode> {
            Ok(())
        }
        async fn stop(&mut self) -> Result<(), ErrorCode> {
            Ok(())
        }
        async fn setting(&mut self, _setting: &str) -> Result<(), ErrorCode> {
            Ok(())
        }
    }

    #[async_trait]
    impl AppPlugin for NullApp {
        async fn on_snapshot(&mut self, _data: &TransData) -> Result<(), ErrorCode> {
            Ok(())
        }
    }

    struct NullModule {
        descriptor: PluginDescriptor,
    }

    impl NullModule {
        fn new(name: &str, single: bool) -> Arc<dyn PluginModule> {
            Arc::new(Self {
                descriptor: PluginDescriptor {
                    name: name.to_string(),
                    description: "test module".to_string(),
                    version: "1.0.0".to_string(),
                    schema: name.to_string(),
                    kind: NodeKind::App,
                    single,
                    single_name: single.then(|| format!("{}-singleton", name)),
                    timer_kind: TimerKind::NonBlock,
                    cache: CacheKind::None,
                },
            })
        }
    }

    impl PluginModule for NullModule {
        fn descriptor(&self) -> &PluginDescriptor {
            &self.descriptor
        }

        fn open(&self) -> Result<PluginInstance, ErrorCode> {
            Ok(PluginInstance::App(Box::new(NullApp)))
        }
    }

    #[test]
    fn test_registry_add_find_remove() {
        let mut registry = PluginRegistry::new();
        registry.add(NullModule::new("sink", false)).unwrap();
        assert!(registry.find("sink").is_some());
        assert_eq!(
            registry.add(NullModule::new("sink", false)).unwrap_err(),
            ErrorCode::LibraryFailedToOpen
        );
        assert_eq!(registry.list().len(), 1);
        registry.remove("sink").unwrap();
        assert_eq!(registry.remove("sink").unwrap_err(), ErrorCode::LibraryNotFound);
    }

    #[test]
    fn test_open_unknown_module() {
        let mut registry = PluginRegistry::new();
        let err = registry
            .open("ghost", NodeKind::App, &"a1".into())
            .unwrap_err();
        assert_eq!(err, ErrorCode::LibraryNotFound);
    }

    #[test]
    fn test_open_kind_mismatch() {
        let mut registry = PluginRegistry::new();
        registry.add(NullModule::new("sink", false)).unwrap();
        let err = registry
            .open("sink", NodeKind::Driver, &"d1".into())
            .unwrap_err();
        assert_eq!(err, ErrorCode::PluginTypeNotSupport);
    }

    #[test]
    fn test_singleton_enforcement() {
        let mut registry = PluginRegistry::new();
        registry.add(NullModule::new("mono", true)).unwrap();

        // Wrong name refused.
        let err = registry
            .open("mono", NodeKind::App, &"other".into())
            .unwrap_err();
        assert_eq!(err, ErrorCode::LibraryNotAllowCreateInstance);

        // Fixed name accepted once.
        registry
            .open("mono", NodeKind::App, &"mono-singleton".into())
            .unwrap();
        let err = registry
            .open("mono", NodeKind::App, &"mono-singleton".into())
            .unwrap_err();
        assert_eq!(err, ErrorCode::LibraryNotAllowCreateInstance);

        // Released slot may be reused.
        registry.release("mono");
        registry
            .open("mono", NodeKind::App, &"mono-singleton".into())
            .unwrap();
    }
}
