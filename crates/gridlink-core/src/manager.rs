// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! The manager: registry of adapters, plugins and subscriptions.
//!
//! A single logical controller serializes every mutation of the plugin
//! registry, node registry and subscription table under one lock. Requests
//! that touch adapter-owned state (groups, tags, writes, lifecycle) travel
//! to the adapter's mailbox as envelopes; the manager's own mailbox
//! receives the correlated replies and a dispatcher resolves them against
//! the pending table.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::adapter::{self, AdapterContext, AdapterHandle};
use crate::bus::MessageBus;
use crate::error::ErrorCode;
use crate::group::MIN_INTERVAL_MS;
use crate::message::{
    AddGroupReq, Body, Context, DelGroupReq, DelTagReq, Envelope, GTagReq, GroupTags, NodeCtl,
    NodeDeleted, NodeRenameReq, NodeSettingReq, NodeStateEntry, NodesState, SubscribeReq, TagReq,
    UnsubscribeReq, UpdateGroupReq,
};
use crate::metrics::{MetricKind, MetricsRegistry};
use crate::plugin::{PluginDescriptor, PluginInfo, PluginModule, PluginRegistry};
use crate::store::{GroupRecord, NodeRecord, Store, SubscriptionRecord};
use crate::subscription::{SubscriptionInfo, SubscriptionTable};
use crate::tag::Tag;
use crate::time::SharedClock;
use crate::types::{LinkState, NodeKind, NodeName, NodeState};

/// The manager's bus address.
pub const MANAGER_NAME: &str = "manager";

/// Maximum number of groups one driver may hold.
pub const GROUP_MAX_PER_NODE: usize = 512;

/// How long the manager waits for an adapter reply.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Period of the manager tick timer.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Every n-th tick pushes a node state digest to running apps.
const STATE_DIGEST_TICKS: u64 = 5;

// =============================================================================
// Public Types
// =============================================================================

/// Node listing entry.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct NodeInfo {
    /// Node name.
    pub name: NodeName,
    /// Plugin module name.
    pub plugin: String,
    /// Node kind.
    pub kind: NodeKind,
    /// Running state.
    pub state: NodeState,
    /// Link state.
    pub link: LinkState,
}

/// Group listing entry.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct GroupInfo {
    /// Group name.
    pub name: String,
    /// Poll interval in milliseconds.
    pub interval_ms: u32,
    /// Number of tags.
    pub tag_count: usize,
}

/// One driver in a bulk [`Manager::add_drivers`] request.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DriverSpec {
    /// Node name.
    pub node: NodeName,
    /// Plugin module name.
    pub plugin: String,
    /// Opaque setting blob.
    pub setting: Option<String>,
    /// Groups with their tags.
    pub groups: Vec<GroupTags>,
}

struct NodeEntry {
    plugin: String,
    descriptor: PluginDescriptor,
    handle: AdapterHandle,
}

struct ManagerInner {
    plugins: PluginRegistry,
    nodes: HashMap<NodeName, NodeEntry>,
    subscriptions: SubscriptionTable,
}

// =============================================================================
// Manager
// =============================================================================

/// The gateway control plane.
pub struct Manager {
    bus: MessageBus,
    clock: SharedClock,
    metrics: Arc<MetricsRegistry>,
    store: Arc<dyn Store>,
    inner: Mutex<ManagerInner>,
    pending: Arc<DashMap<Context, oneshot::Sender<Body>>>,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl Manager {
    /// Creates the manager, binds its control mailbox and starts the
    /// dispatcher and tick timer.
    ///
    /// # Panics
    ///
    /// Panics when the control mailbox cannot be bound; the process cannot
    /// run without it.
    pub fn new(bus: MessageBus, store: Arc<dyn Store>) -> Arc<Self> {
        let clock = SharedClock::new();
        let metrics = Arc::new(MetricsRegistry::new());
        metrics.register_global(
            "uptime_seconds",
            "seconds since the manager started",
            MetricKind::Gauge,
            0,
        );

        let mailbox = bus.bind(NodeName::new(MANAGER_NAME));
        assert!(
            bus.is_bound(&NodeName::new(MANAGER_NAME)),
            "failed to bind the manager control mailbox"
        );

        let manager = Arc::new(Self {
            bus,
            clock,
            metrics,
            store,
            inner: Mutex::new(ManagerInner {
                plugins: PluginRegistry::new(),
                nodes: HashMap::new(),
                subscriptions: SubscriptionTable::new(),
            }),
            pending: Arc::new(DashMap::new()),
            tasks: parking_lot::Mutex::new(Vec::new()),
        });

        // Reply dispatcher.
        let pending = manager.pending.clone();
        let mut mailbox = mailbox;
        let dispatcher = tokio::spawn(async move {
            while let Some(envelope) = mailbox.recv().await {
                match pending.remove(&envelope.context) {
                    Some((_, tx)) => {
                        let _ = tx.send(envelope.body);
                    }
                    None => {
                        tracing::warn!(
                            sender = %envelope.sender,
                            kind = envelope.body.kind(),
                            "dropping uncorrelated envelope"
                        );
                    }
                }
            }
        });

        // Clock tick and state digest.
        let tick_manager = Arc::downgrade(&manager);
        let ticker = tokio::spawn(async move {
            let mut ticks: u64 = 0;
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(manager) = tick_manager.upgrade() else {
                    return;
                };
                ticks += 1;
                manager.clock.tick();
                manager.metrics.update_global("uptime_seconds", ticks as i64);
                if ticks % STATE_DIGEST_TICKS == 0 {
                    manager.push_state_digest().await;
                }
            }
        });

        manager.tasks.lock().push(dispatcher);
        manager.tasks.lock().push(ticker);
        manager
    }

    /// The shared snapshot clock.
    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    /// The metrics registry.
    pub fn metrics(&self) -> Arc<MetricsRegistry> {
        self.metrics.clone()
    }

    // =========================================================================
    // Plugin Registry
    // =========================================================================

    /// Registers a plugin module.
    pub async fn add_plugin(&self, module: Arc<dyn PluginModule>) -> Result<(), ErrorCode> {
        self.inner.lock().await.plugins.add(module)
    }

    /// Removes a plugin module; refused while any node instantiates it.
    pub async fn del_plugin(&self, name: &str) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock().await;
        if inner.nodes.values().any(|entry| entry.plugin == name) {
            return Err(ErrorCode::LibraryNotAllowCreateInstance);
        }
        inner.plugins.remove(name)
    }

    /// Replaces a registered plugin module with a newer build. Running
    /// instances keep the code they were opened with.
    pub async fn update_plugin(&self, module: Arc<dyn PluginModule>) -> Result<(), ErrorCode> {
        self.inner.lock().await.plugins.update(module)
    }

    /// Lists registered plugin modules.
    pub async fn get_plugins(&self) -> Vec<PluginInfo> {
        self.inner.lock().await.plugins.list()
    }

    // =========================================================================
    // Node Registry
    // =========================================================================

    /// Creates a node running an instance of `plugin`.
    pub async fn add_node(
        &self,
        name: NodeName,
        plugin: &str,
        setting: Option<String>,
    ) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock().await;
        self.create_node(&mut inner, name, plugin, setting, false)
    }

    /// Deletes a node, cascading subscriptions and notifications.
    pub async fn del_node(&self, name: &NodeName) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock().await;
        self.remove_node(&mut inner, name, false).await
    }

    /// Renames a node, cascading the subscription table, metrics, bus
    /// binding and persisted rows.
    pub async fn rename_node(&self, old: &NodeName, new: NodeName) -> Result<(), ErrorCode> {
        if new.as_str().is_empty() || new.as_str() == MANAGER_NAME {
            return Err(ErrorCode::NodeExist);
        }
        let mut inner = self.inner.lock().await;
        if !inner.nodes.contains_key(old) {
            return Err(ErrorCode::NodeNotExist);
        }
        if inner.nodes.contains_key(&new) {
            return Err(ErrorCode::NodeExist);
        }

        if !self.bus.rebind(old, new.clone()) {
            return Err(ErrorCode::Internal);
        }
        if let Err(code) = self
            .request(
                new.clone(),
                Body::NodeRename(NodeRenameReq {
                    new_name: new.clone(),
                }),
            )
            .await
        {
            self.bus.rebind(&new, old.clone());
            return Err(code);
        }

        let entry = inner.nodes.remove(old).ok_or(ErrorCode::NodeNotExist)?;
        let kind = entry.handle.kind;
        inner.nodes.insert(new.clone(), entry);
        self.metrics.rename_node(old, new.clone());

        match kind {
            NodeKind::Driver => {
                inner.subscriptions.update_driver_name(old, &new);
                for sub in inner.subscriptions.find_by_driver(&new) {
                    self.notify(
                        sub.app.clone(),
                        Body::SubscribeGroup(SubscribeReq {
                            app: sub.app.clone(),
                            driver: new.clone(),
                            group: sub.group.clone(),
                            params: sub.params.clone(),
                        }),
                    );
                }
            }
            NodeKind::App => {
                let subs = inner.subscriptions.find_by_app(old);
                inner.subscriptions.update_app_name(old, &new);
                for sub in subs {
                    self.notify(
                        sub.driver.clone(),
                        Body::UnsubscribeGroup(UnsubscribeReq {
                            app: old.clone(),
                            driver: sub.driver.clone(),
                            group: sub.group.clone(),
                        }),
                    );
                    self.notify(
                        sub.driver.clone(),
                        Body::SubscribeGroup(SubscribeReq {
                            app: new.clone(),
                            driver: sub.driver,
                            group: sub.group,
                            params: sub.params,
                        }),
                    );
                }
            }
        }

        self.store.update_node_name(old, &new)?;
        Ok(())
    }

    /// Starts or stops a node.
    pub async fn node_ctl(&self, name: &NodeName, ctl: NodeCtl) -> Result<(), ErrorCode> {
        let inner = self.inner.lock().await;
        if !inner.nodes.contains_key(name) {
            return Err(ErrorCode::NodeNotExist);
        }
        self.expect_ok(name.clone(), Body::NodeCtl(ctl)).await
    }

    /// Lists nodes, optionally filtered by kind.
    pub async fn get_nodes(&self, kind: Option<NodeKind>) -> Vec<NodeInfo> {
        let inner = self.inner.lock().await;
        let mut nodes: Vec<NodeInfo> = inner
            .nodes
            .iter()
            .filter(|(_, entry)| kind.map_or(true, |k| entry.handle.kind == k))
            .map(|(name, entry)| NodeInfo {
                name: name.clone(),
                plugin: entry.plugin.clone(),
                kind: entry.handle.kind,
                state: entry.handle.status.state(),
                link: entry.handle.status.link(),
            })
            .collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }

    /// Assembles the node state digest.
    pub async fn nodes_state(&self) -> NodesState {
        let inner = self.inner.lock().await;
        let mut states: Vec<NodeStateEntry> = inner
            .nodes
            .iter()
            .map(|(name, entry)| NodeStateEntry {
                node: name.clone(),
                state: entry.handle.status.state(),
                link: entry.handle.status.link(),
            })
            .collect();
        states.sort_by(|a, b| a.node.cmp(&b.node));
        NodesState { states }
    }

    /// Applies a setting blob to a node and persists it.
    pub async fn set_node_setting(&self, name: &NodeName, setting: &str) -> Result<(), ErrorCode> {
        let inner = self.inner.lock().await;
        if !inner.nodes.contains_key(name) {
            return Err(ErrorCode::NodeNotExist);
        }
        self.expect_ok(
            name.clone(),
            Body::NodeSetting(NodeSettingReq {
                setting: setting.to_string(),
            }),
        )
        .await?;
        self.store.save_node_setting(name, setting)?;
        Ok(())
    }

    /// Reads a node's current setting blob.
    pub async fn get_node_setting(&self, name: &NodeName) -> Result<Option<String>, ErrorCode> {
        let inner = self.inner.lock().await;
        if !inner.nodes.contains_key(name) {
            return Err(ErrorCode::NodeNotExist);
        }
        drop(inner);
        match self.request(name.clone(), Body::GetNodeSetting).await? {
            Body::GetNodeSettingResp(resp) if resp.error.is_ok() => Ok(resp.setting),
            Body::GetNodeSettingResp(resp) => Err(resp.error),
            _ => Err(ErrorCode::Internal),
        }
    }

    // =========================================================================
    // Groups & Tags
    // =========================================================================

    /// Creates a group on a driver.
    pub async fn add_group(
        &self,
        driver: &NodeName,
        group: &str,
        interval_ms: u32,
    ) -> Result<(), ErrorCode> {
        let inner = self.inner.lock().await;
        let entry = self.driver_entry(&inner, driver)?;
        if entry.handle.groups.len() >= GROUP_MAX_PER_NODE {
            return Err(ErrorCode::GroupMaxGroups);
        }
        if group.is_empty() || interval_ms < MIN_INTERVAL_MS {
            return Err(ErrorCode::GroupParameterInvalid);
        }
        self.expect_ok(
            driver.clone(),
            Body::AddGroup(AddGroupReq {
                group: group.to_string(),
                interval_ms,
            }),
        )
        .await?;
        self.store.save_group(GroupRecord {
            driver: driver.clone(),
            name: group.to_string(),
            interval_ms,
        })?;
        Ok(())
    }

    /// Deletes a group, dropping its subscriptions.
    pub async fn del_group(&self, driver: &NodeName, group: &str) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock().await;
        self.driver_entry(&inner, driver)?;
        self.expect_ok(
            driver.clone(),
            Body::DelGroup(DelGroupReq {
                group: group.to_string(),
            }),
        )
        .await?;

        let dropped: Vec<SubscriptionInfo> = inner
            .subscriptions
            .find_by_group(driver, group)
            .into_iter()
            .map(|s| SubscriptionInfo {
                app: s.app,
                driver: driver.clone(),
                group: group.to_string(),
                params: s.params,
            })
            .collect();
        for sub in &dropped {
            inner.subscriptions.unsub(driver, &sub.app, group);
            self.notify(
                sub.app.clone(),
                Body::UnsubscribeGroup(UnsubscribeReq {
                    app: sub.app.clone(),
                    driver: driver.clone(),
                    group: group.to_string(),
                }),
            );
            self.store.delete_subscription(&sub.app, driver, group)?;
        }
        self.store.delete_group(driver, group)?;
        Ok(())
    }

    /// Updates a group's name and/or interval, cascading renames.
    pub async fn update_group(
        &self,
        driver: &NodeName,
        group: &str,
        new_name: Option<String>,
        interval_ms: Option<u32>,
    ) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock().await;
        self.driver_entry(&inner, driver)?;
        let resp = match self
            .request(
                driver.clone(),
                Body::UpdateGroup(UpdateGroupReq {
                    group: group.to_string(),
                    new_name: new_name.clone(),
                    interval_ms,
                }),
            )
            .await?
        {
            Body::UpdateGroupResp(resp) => resp,
            _ => return Err(ErrorCode::Internal),
        };
        if !resp.error.is_ok() {
            return Err(resp.error);
        }

        if resp.group != group {
            inner.subscriptions.update_group_name(driver, group, &resp.group);
        }
        let final_interval = inner
            .nodes
            .get(driver)
            .and_then(|entry| entry.handle.groups.get(&resp.group))
            .map(|g| g.interval_ms())
            .unwrap_or(interval_ms.unwrap_or(MIN_INTERVAL_MS));
        self.store
            .update_group(driver, group, &resp.group, final_interval)?;
        Ok(())
    }

    /// Lists the groups of a driver.
    pub async fn get_groups(&self, driver: &NodeName) -> Result<Vec<GroupInfo>, ErrorCode> {
        let inner = self.inner.lock().await;
        let entry = self.driver_entry(&inner, driver)?;
        Ok(entry
            .handle
            .groups
            .groups()
            .into_iter()
            .map(|group| GroupInfo {
                name: group.name(),
                interval_ms: group.interval_ms(),
                tag_count: group.tag_count(),
            })
            .collect())
    }

    /// Adds tags to a group; validation failures roll the request back.
    pub async fn add_tags(
        &self,
        driver: &NodeName,
        group: &str,
        tags: Vec<Tag>,
    ) -> Result<(), ErrorCode> {
        let inner = self.inner.lock().await;
        self.driver_entry(&inner, driver)?;
        self.expect_ok(
            driver.clone(),
            Body::AddTag(TagReq {
                group: group.to_string(),
                tags: tags.clone(),
            }),
        )
        .await?;
        for tag in &tags {
            self.store.save_tag(driver, group, tag)?;
        }
        Ok(())
    }

    /// Updates existing tags.
    pub async fn update_tags(
        &self,
        driver: &NodeName,
        group: &str,
        tags: Vec<Tag>,
    ) -> Result<(), ErrorCode> {
        let inner = self.inner.lock().await;
        self.driver_entry(&inner, driver)?;
        self.expect_ok(
            driver.clone(),
            Body::UpdateTag(TagReq {
                group: group.to_string(),
                tags: tags.clone(),
            }),
        )
        .await?;
        for tag in &tags {
            self.store.update_tag(driver, group, tag)?;
        }
        Ok(())
    }

    /// Deletes tags by name.
    pub async fn del_tags(
        &self,
        driver: &NodeName,
        group: &str,
        tags: Vec<String>,
    ) -> Result<(), ErrorCode> {
        let inner = self.inner.lock().await;
        self.driver_entry(&inner, driver)?;
        self.expect_ok(
            driver.clone(),
            Body::DelTag(DelTagReq {
                group: group.to_string(),
                tags: tags.clone(),
            }),
        )
        .await?;
        for tag in &tags {
            self.store.delete_tag(driver, group, tag)?;
        }
        Ok(())
    }

    /// Lists tags of a group, optionally filtered by substring query.
    pub async fn get_tags(
        &self,
        driver: &NodeName,
        group: &str,
        name: Option<&str>,
        desc: Option<&str>,
    ) -> Result<Vec<Tag>, ErrorCode> {
        let inner = self.inner.lock().await;
        let entry = self.driver_entry(&inner, driver)?;
        let group = entry
            .handle
            .groups
            .get(group)
            .ok_or(ErrorCode::GroupNotExist)?;
        if name.is_none() && desc.is_none() {
            Ok(group.list_tags())
        } else {
            Ok(group.query(name, desc))
        }
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscribes `app` to `(driver, group)`.
    ///
    /// The subscription is recorded only once both ends acknowledged the
    /// announcement; a half-delivered subscription is rolled back.
    pub async fn subscribe(
        &self,
        app: &NodeName,
        driver: &NodeName,
        group: &str,
        params: Option<String>,
    ) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock().await;

        let app_entry = inner.nodes.get(app).ok_or(ErrorCode::NodeNotExist)?;
        if app_entry.handle.kind != NodeKind::App {
            return Err(ErrorCode::NodeNotAllowSubscribe);
        }
        let app_plugin = app_entry.plugin.clone();
        let driver_entry = inner.nodes.get(driver).ok_or(ErrorCode::NodeNotExist)?;
        if driver_entry.handle.kind != NodeKind::Driver {
            return Err(ErrorCode::NodeNotExist);
        }
        if !driver_entry.handle.groups.contains(group) {
            return Err(ErrorCode::GroupNotExist);
        }
        if app_plugin == "mqtt" && has_empty_topic(params.as_deref()) {
            return Err(ErrorCode::MqttSubscribeFailure);
        }

        let announce = SubscribeReq {
            app: app.clone(),
            driver: driver.clone(),
            group: group.to_string(),
            params: params.clone(),
        };
        let to_app = Envelope::with_context(
            NodeName::new(MANAGER_NAME),
            app.clone(),
            Context::nil(),
            Body::SubscribeGroup(announce.clone()),
        );
        if self.bus.send(to_app).is_err() {
            return Err(ErrorCode::Internal);
        }
        let to_driver = Envelope::with_context(
            NodeName::new(MANAGER_NAME),
            driver.clone(),
            Context::nil(),
            Body::SubscribeGroup(announce),
        );
        if self.bus.send(to_driver).is_err() {
            // The app already heard about the subscription; take it back.
            self.notify(
                app.clone(),
                Body::UnsubscribeGroup(UnsubscribeReq {
                    app: app.clone(),
                    driver: driver.clone(),
                    group: group.to_string(),
                }),
            );
            return Err(ErrorCode::Internal);
        }

        inner
            .subscriptions
            .sub(driver.clone(), app.clone(), group.to_string(), params.clone())?;
        self.store.save_subscription(SubscriptionRecord {
            app: app.clone(),
            driver: driver.clone(),
            group: group.to_string(),
            params,
        })?;
        Ok(())
    }

    /// Updates the params of an existing subscription.
    pub async fn update_subscribe(
        &self,
        app: &NodeName,
        driver: &NodeName,
        group: &str,
        params: Option<String>,
    ) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock().await;
        inner
            .subscriptions
            .update_params(driver, app, group, params.clone())?;

        let update = SubscribeReq {
            app: app.clone(),
            driver: driver.clone(),
            group: group.to_string(),
            params: params.clone(),
        };
        self.notify(app.clone(), Body::UpdateSubscribeGroup(update.clone()));
        self.notify(driver.clone(), Body::UpdateSubscribeGroup(update));
        self.store.save_subscription(SubscriptionRecord {
            app: app.clone(),
            driver: driver.clone(),
            group: group.to_string(),
            params,
        })?;
        Ok(())
    }

    /// Removes a subscription; removing a missing one succeeds.
    pub async fn unsubscribe(
        &self,
        app: &NodeName,
        driver: &NodeName,
        group: &str,
    ) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock().await;
        inner.subscriptions.unsub(driver, app, group);

        let teardown = UnsubscribeReq {
            app: app.clone(),
            driver: driver.clone(),
            group: group.to_string(),
        };
        self.notify(driver.clone(), Body::UnsubscribeGroup(teardown.clone()));
        self.notify(app.clone(), Body::UnsubscribeGroup(teardown));
        self.store.delete_subscription(app, driver, group)?;
        Ok(())
    }

    /// Lists the subscriptions of one app.
    pub async fn get_subscriptions(&self, app: &NodeName) -> Vec<SubscriptionInfo> {
        self.inner.lock().await.subscriptions.find_by_app(app)
    }

    // =========================================================================
    // Bulk Driver Creation
    // =========================================================================

    /// Creates several drivers with groups and tags in one request.
    ///
    /// Every driver is preflighted first; a failure while provisioning
    /// rolls back all previously added drivers in reverse order.
    pub async fn add_drivers(&self, specs: Vec<DriverSpec>) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock().await;

        for spec in &specs {
            let module = inner
                .plugins
                .find(&spec.plugin)
                .ok_or(ErrorCode::LibraryNotFound)?;
            let descriptor = module.descriptor();
            if descriptor.single {
                return Err(ErrorCode::LibraryNotAllowCreateInstance);
            }
            if descriptor.kind != NodeKind::Driver {
                return Err(ErrorCode::PluginTypeNotSupport);
            }
            if spec.groups.len() > GROUP_MAX_PER_NODE {
                return Err(ErrorCode::GroupMaxGroups);
            }
        }

        for (i, spec) in specs.iter().enumerate() {
            let result = self.provision_driver(&mut inner, spec).await;
            if let Err(code) = result {
                tracing::error!(driver = %spec.node, %code, "bulk driver add failed, rolling back");
                for done in specs[..i].iter().rev() {
                    if let Err(rollback) = self.remove_node(&mut inner, &done.node, true).await {
                        tracing::warn!(driver = %done.node, %rollback, "rollback failed");
                    }
                }
                return Err(code);
            }
        }
        Ok(())
    }

    async fn provision_driver(
        &self,
        inner: &mut ManagerInner,
        spec: &DriverSpec,
    ) -> Result<(), ErrorCode> {
        // Replace any pre-existing node of the same name.
        if inner.nodes.contains_key(&spec.node) {
            self.remove_node(inner, &spec.node, false).await?;
        }
        self.create_node(inner, spec.node.clone(), &spec.plugin, spec.setting.clone(), false)?;

        let result = self
            .expect_ok(
                spec.node.clone(),
                Body::AddGTags(GTagReq {
                    groups: spec.groups.clone(),
                }),
            )
            .await;
        if let Err(code) = result {
            let _ = self.remove_node(inner, &spec.node, true).await;
            return Err(code);
        }

        for gt in &spec.groups {
            self.store.save_group(GroupRecord {
                driver: spec.node.clone(),
                name: gt.group.clone(),
                interval_ms: gt.interval_ms,
            })?;
            for tag in &gt.tags {
                self.store.save_tag(&spec.node, &gt.group, tag)?;
            }
        }
        Ok(())
    }

    // =========================================================================
    // Startup Restore
    // =========================================================================

    /// Restores nodes, groups, tags and subscriptions from the store.
    pub async fn restore(&self) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock().await;

        for record in self.store.load_nodes()? {
            if let Err(code) = self.create_node(
                &mut inner,
                record.name.clone(),
                &record.plugin,
                record.setting.clone(),
                true,
            ) {
                tracing::error!(node = %record.name, %code, "failed to restore node");
                continue;
            }
            let entry = match inner.nodes.get(&record.name) {
                Some(entry) => entry,
                None => continue,
            };
            if entry.handle.kind != NodeKind::Driver {
                continue;
            }
            let mut groups = Vec::new();
            for group in self.store.load_groups(&record.name)? {
                let tags = self.store.load_tags(&record.name, &group.name)?;
                groups.push(GroupTags {
                    group: group.name,
                    interval_ms: group.interval_ms,
                    tags,
                });
            }
            if !groups.is_empty() {
                if let Err(code) = self
                    .expect_ok(record.name.clone(), Body::AddGTags(GTagReq { groups }))
                    .await
                {
                    tracing::error!(node = %record.name, %code, "failed to restore groups");
                }
            }
        }

        for sub in self.store.load_subscriptions()? {
            let announce = SubscribeReq {
                app: sub.app.clone(),
                driver: sub.driver.clone(),
                group: sub.group.clone(),
                params: sub.params.clone(),
            };
            self.notify(sub.app.clone(), Body::SubscribeGroup(announce.clone()));
            self.notify(sub.driver.clone(), Body::SubscribeGroup(announce));
            inner
                .subscriptions
                .sub(sub.driver, sub.app, sub.group, sub.params)?;
        }
        Ok(())
    }

    /// Uninitializes every node and stops the background tasks.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        let names: Vec<NodeName> = inner.nodes.keys().cloned().collect();
        for name in names {
            if let Err(code) = self.teardown_node(&mut inner, &name, true, false).await {
                tracing::warn!(node = %name, %code, "failed to tear down node");
            }
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn create_node(
        &self,
        inner: &mut ManagerInner,
        name: NodeName,
        plugin: &str,
        setting: Option<String>,
        load: bool,
    ) -> Result<(), ErrorCode> {
        if name.as_str().is_empty() || name.as_str() == MANAGER_NAME {
            return Err(ErrorCode::NodeExist);
        }
        if inner.nodes.contains_key(&name) {
            return Err(ErrorCode::NodeExist);
        }

        let kind = inner
            .plugins
            .find(plugin)
            .ok_or(ErrorCode::LibraryNotFound)?
            .descriptor()
            .kind;
        let (instance, descriptor) = inner.plugins.open(plugin, kind, &name)?;

        let status = Arc::new(crate::types::NodeStatusCell::new());
        let metrics = self
            .metrics
            .register_node(name.clone(), kind, status.clone());
        let mailbox = self.bus.bind(name.clone());
        let shared_name = Arc::new(RwLock::new(name.clone()));

        let context = AdapterContext {
            name: shared_name,
            descriptor: descriptor.clone(),
            bus: self.bus.clone(),
            mailbox: Some(mailbox),
            status,
            metrics,
            clock: self.clock.clone(),
            setting: setting.clone(),
            load,
        };
        let handle = adapter::spawn(context, instance)?;

        inner.nodes.insert(
            name.clone(),
            NodeEntry {
                plugin: plugin.to_string(),
                descriptor,
                handle,
            },
        );

        if !load {
            self.store.save_node(NodeRecord {
                name: name.clone(),
                kind,
                plugin: plugin.to_string(),
                setting,
            })?;
        }
        tracing::info!(node = %name, plugin, ?kind, "created node");
        Ok(())
    }

    async fn remove_node(
        &self,
        inner: &mut ManagerInner,
        name: &NodeName,
        force_singleton: bool,
    ) -> Result<(), ErrorCode> {
        self.teardown_node(inner, name, force_singleton, true).await
    }

    /// Tears a node down. `persist` distinguishes administrative deletion
    /// (rows removed) from process shutdown (rows kept for restore).
    async fn teardown_node(
        &self,
        inner: &mut ManagerInner,
        name: &NodeName,
        force_singleton: bool,
        persist: bool,
    ) -> Result<(), ErrorCode> {
        let entry = inner.nodes.get(name).ok_or(ErrorCode::NodeNotExist)?;
        if entry.descriptor.single && !force_singleton {
            return Err(ErrorCode::NodeNotAllowDelete);
        }
        let kind = entry.handle.kind;

        if persist {
            match kind {
                NodeKind::App => {
                    for sub in inner.subscriptions.unsub_all(name) {
                        self.notify(
                            sub.driver.clone(),
                            Body::UnsubscribeGroup(UnsubscribeReq {
                                app: sub.app.clone(),
                                driver: sub.driver.clone(),
                                group: sub.group.clone(),
                            }),
                        );
                        self.store
                            .delete_subscription(&sub.app, &sub.driver, &sub.group)?;
                    }
                }
                NodeKind::Driver => {
                    let removed = inner.subscriptions.remove_driver(name);
                    let mut notified: Vec<NodeName> = Vec::new();
                    for sub in &removed {
                        self.store
                            .delete_subscription(&sub.app, &sub.driver, &sub.group)?;
                        // Exactly one notification per former subscriber.
                        if !notified.contains(&sub.app) {
                            notified.push(sub.app.clone());
                            self.notify(
                                sub.app.clone(),
                                Body::NodeDeleted(NodeDeleted { node: name.clone() }),
                            );
                        }
                    }
                }
            }
        }

        // Orderly teardown; a dead adapter is aborted after the timeout.
        if self.request(name.clone(), Body::NodeUninit).await.is_err() {
            tracing::warn!(node = %name, "adapter did not acknowledge teardown");
        }
        let entry = inner.nodes.remove(name).ok_or(ErrorCode::NodeNotExist)?;
        entry.handle.join.abort();
        let _ = entry.handle.join.await;

        self.bus.unbind(name);
        self.metrics.unregister_node(name);
        inner.plugins.release(&entry.plugin);
        if persist {
            self.store.delete_node(name)?;
        }
        tracing::info!(node = %name, "deleted node");
        Ok(())
    }

    fn driver_entry<'a>(
        &self,
        inner: &'a ManagerInner,
        driver: &NodeName,
    ) -> Result<&'a NodeEntry, ErrorCode> {
        let entry = inner.nodes.get(driver).ok_or(ErrorCode::NodeNotExist)?;
        if entry.handle.kind != NodeKind::Driver {
            return Err(ErrorCode::NodeNotExist);
        }
        Ok(entry)
    }

    /// Sends a request envelope and awaits the correlated reply.
    async fn request(&self, receiver: NodeName, body: Body) -> Result<Body, ErrorCode> {
        let envelope = Envelope::new(NodeName::new(MANAGER_NAME), receiver, body);
        let context = envelope.context;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(context, tx);

        if self.bus.send(envelope).is_err() {
            self.pending.remove(&context);
            return Err(ErrorCode::Internal);
        }
        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(body)) => Ok(body),
            _ => {
                self.pending.remove(&context);
                Err(ErrorCode::Internal)
            }
        }
    }

    /// Sends a request and expects a successful `RespError`.
    async fn expect_ok(&self, receiver: NodeName, body: Body) -> Result<(), ErrorCode> {
        match self.request(receiver, body).await? {
            Body::RespError(resp) if resp.error.is_ok() => Ok(()),
            Body::RespError(resp) => Err(resp.error),
            _ => Err(ErrorCode::Internal),
        }
    }

    /// Best-effort notification; failures are logged and counted by the bus.
    fn notify(&self, receiver: NodeName, body: Body) {
        let envelope =
            Envelope::with_context(NodeName::new(MANAGER_NAME), receiver, Context::nil(), body);
        if let Err(err) = self.bus.send(envelope) {
            tracing::warn!(error = %err, "failed to deliver notification");
        }
    }

    async fn push_state_digest(&self) {
        let digest = self.nodes_state().await;
        let inner = self.inner.lock().await;
        for (name, entry) in inner.nodes.iter() {
            if entry.handle.kind == NodeKind::App && entry.handle.status.state().is_running() {
                self.notify(name.clone(), Body::NodesState(digest.clone()));
            }
        }
    }
}

/// Returns `true` when `params` carries an explicitly empty `topic`.
fn has_empty_topic(params: Option<&str>) -> bool {
    let Some(params) = params else {
        return false;
    };
    serde_json::from_str::<serde_json::Value>(params)
        .ok()
        .and_then(|v| v.get("topic").and_then(|t| t.as_str().map(str::is_empty)))
        .unwrap_or(false)
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Manager").finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
