// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! # gridlink-core
//!
//! The runtime fabric of the GRIDLINK industrial IoT gateway: the
//! tag/group/node data model, the per-adapter reactor, the message bus,
//! the plugin surface, adapter control loops, the subscription table, the
//! manager control plane, metrics and persistence contracts.
//!
//! Southbound drivers poll field devices on per-group timers and publish
//! snapshots; northbound apps subscribe to `(driver, group)` pairs and
//! receive those snapshots through their mailboxes. Commands flow the
//! other way: apps and the manager address a driver's mailbox by node
//! name, and replies come back correlated by context.
//!
//! ## Example
//!
//! ```rust,ignore
//! use gridlink_core::bus::MessageBus;
//! use gridlink_core::manager::Manager;
//! use gridlink_core::store::MemStore;
//! use std::sync::Arc;
//!
//! let bus = MessageBus::new();
//! let manager = Manager::new(bus, Arc::new(MemStore::new()));
//! manager.add_plugin(my_driver_module()).await?;
//! manager.add_node("d1".into(), "modbus-sim", None).await?;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// =============================================================================
// Data Model
// =============================================================================

pub mod address;
pub mod error;
pub mod group;
pub mod tag;
pub mod types;

// =============================================================================
// Fabric
// =============================================================================

pub mod bus;
pub mod message;
pub mod reactor;
pub mod time;

// =============================================================================
// Runtime
// =============================================================================

pub mod adapter;
pub mod manager;
pub mod metrics;
pub mod plugin;
pub mod store;
pub mod subscription;

// =============================================================================
// Re-exports
// =============================================================================

pub use address::{AddressOption, Endian16, Endian32, Endian64, StringMode};
pub use bus::{MessageBus, Mailbox};
pub use error::{BusError, ErrorCode, GwResult};
pub use group::{Group, GroupTable, MIN_INTERVAL_MS};
pub use manager::{DriverSpec, GroupInfo, Manager, NodeInfo, GROUP_MAX_PER_NODE, MANAGER_NAME};
pub use message::{Body, Context, Envelope, TransData};
pub use metrics::{MetricEntry, MetricKind, MetricsRegistry, NodeMetrics};
pub use plugin::{
    AppPlugin, CacheKind, DriverPlugin, Plugin, PluginDescriptor, PluginEnv, PluginGroup,
    PluginInfo, PluginInstance, PluginModule, PluginRegistry,
};
pub use reactor::{Reactor, ReactorEvent, TimerId, TimerKind, TimerTick, EVENT_CAPACITY};
pub use store::{GroupRecord, MemStore, NodeRecord, Store, SubscriptionRecord};
pub use subscription::{AppSubscription, SubscriptionInfo, SubscriptionTable};
pub use tag::{Tag, TagValue};
pub use time::SharedClock;
pub use types::{
    Attribute, LinkState, NodeKind, NodeName, NodeState, NodeStatusCell, TagType, Value,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
