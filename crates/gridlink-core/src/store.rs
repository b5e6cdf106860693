// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! Persistence contracts consumed by the manager.
//!
//! The real store is an embedded SQL database living outside the core; the
//! manager only depends on this trait. [`MemStore`] is the in-memory
//! implementation used by tests and the default runtime.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::tag::Tag;
use crate::types::{NodeKind, NodeName};

// =============================================================================
// Records
// =============================================================================

/// Persisted node row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node name.
    pub name: NodeName,
    /// Node kind.
    pub kind: NodeKind,
    /// Plugin module name.
    pub plugin: String,
    /// Opaque setting blob.
    pub setting: Option<String>,
}

/// Persisted group row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    /// Owning driver.
    pub driver: NodeName,
    /// Group name.
    pub name: String,
    /// Poll interval in milliseconds.
    pub interval_ms: u32,
}

/// Persisted subscription row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Subscribing app.
    pub app: NodeName,
    /// Publishing driver.
    pub driver: NodeName,
    /// Group name.
    pub group: String,
    /// Opaque params blob.
    pub params: Option<String>,
}

// =============================================================================
// Store Trait
// =============================================================================

/// The persistence surface the core consumes.
pub trait Store: Send + Sync {
    /// Persists a node.
    fn save_node(&self, record: NodeRecord) -> Result<(), ErrorCode>;
    /// Renames a node.
    fn update_node_name(&self, old: &NodeName, new: &NodeName) -> Result<(), ErrorCode>;
    /// Persists a node's setting blob.
    fn save_node_setting(&self, node: &NodeName, setting: &str) -> Result<(), ErrorCode>;
    /// Removes a node and everything hanging off it.
    fn delete_node(&self, name: &NodeName) -> Result<(), ErrorCode>;

    /// Persists a group.
    fn save_group(&self, record: GroupRecord) -> Result<(), ErrorCode>;
    /// Updates a group's name and/or interval.
    fn update_group(
        &self,
        driver: &NodeName,
        group: &str,
        new_name: &str,
        interval_ms: u32,
    ) -> Result<(), ErrorCode>;
    /// Removes a group and its tags.
    fn delete_group(&self, driver: &NodeName, group: &str) -> Result<(), ErrorCode>;

    /// Persists one tag.
    fn save_tag(&self, driver: &NodeName, group: &str, tag: &Tag) -> Result<(), ErrorCode>;
    /// Replaces one tag.
    fn update_tag(&self, driver: &NodeName, group: &str, tag: &Tag) -> Result<(), ErrorCode>;
    /// Removes one tag.
    fn delete_tag(&self, driver: &NodeName, group: &str, tag: &str) -> Result<(), ErrorCode>;

    /// Persists a subscription.
    fn save_subscription(&self, record: SubscriptionRecord) -> Result<(), ErrorCode>;
    /// Removes a subscription.
    fn delete_subscription(
        &self,
        app: &NodeName,
        driver: &NodeName,
        group: &str,
    ) -> Result<(), ErrorCode>;

    /// Loads every node.
    fn load_nodes(&self) -> Result<Vec<NodeRecord>, ErrorCode>;
    /// Loads every group of one driver.
    fn load_groups(&self, driver: &NodeName) -> Result<Vec<GroupRecord>, ErrorCode>;
    /// Loads every tag of one group.
    fn load_tags(&self, driver: &NodeName, group: &str) -> Result<Vec<Tag>, ErrorCode>;
    /// Loads every subscription.
    fn load_subscriptions(&self) -> Result<Vec<SubscriptionRecord>, ErrorCode>;
}

// =============================================================================
// MemStore
// =============================================================================

#[derive(Debug, Default)]
struct MemStoreInner {
    nodes: HashMap<NodeName, NodeRecord>,
    groups: HashMap<(NodeName, String), GroupRecord>,
    tags: HashMap<(NodeName, String), Vec<Tag>>,
    subscriptions: Vec<SubscriptionRecord>,
}

/// In-memory [`Store`] implementation.
#[derive(Debug, Default)]
pub struct MemStore {
    inner: Mutex<MemStoreInner>,
}

impl MemStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemStore {
    fn save_node(&self, record: NodeRecord) -> Result<(), ErrorCode> {
        self.inner.lock().nodes.insert(record.name.clone(), record);
        Ok(())
    }

    fn update_node_name(&self, old: &NodeName, new: &NodeName) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock();
        let Some(mut record) = inner.nodes.remove(old) else {
            return Err(ErrorCode::NodeNotExist);
        };
        record.name = new.clone();
        inner.nodes.insert(new.clone(), record);

        let group_keys: Vec<(NodeName, String)> = inner
            .groups
            .keys()
            .filter(|(driver, _)| driver == old)
            .cloned()
            .collect();
        for key in group_keys {
            if let Some(mut group) = inner.groups.remove(&key) {
                group.driver = new.clone();
                inner.groups.insert((new.clone(), key.1.clone()), group);
            }
            if let Some(tags) = inner.tags.remove(&key) {
                inner.tags.insert((new.clone(), key.1), tags);
            }
        }
        for sub in inner.subscriptions.iter_mut() {
            if &sub.driver == old {
                sub.driver = new.clone();
            }
            if &sub.app == old {
                sub.app = new.clone();
            }
        }
        Ok(())
    }

    fn save_node_setting(&self, node: &NodeName, setting: &str) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock();
        let record = inner.nodes.get_mut(node).ok_or(ErrorCode::NodeNotExist)?;
        record.setting = Some(setting.to_string());
        Ok(())
    }

    fn delete_node(&self, name: &NodeName) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock();
        inner.nodes.remove(name);
        inner.groups.retain(|(driver, _), _| driver != name);
        inner.tags.retain(|(driver, _), _| driver != name);
        inner
            .subscriptions
            .retain(|sub| &sub.driver != name && &sub.app != name);
        Ok(())
    }

    fn save_group(&self, record: GroupRecord) -> Result<(), ErrorCode> {
        self.inner
            .lock()
            .groups
            .insert((record.driver.clone(), record.name.clone()), record);
        Ok(())
    }

    fn update_group(
        &self,
        driver: &NodeName,
        group: &str,
        new_name: &str,
        interval_ms: u32,
    ) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock();
        let key = (driver.clone(), group.to_string());
        let Some(mut record) = inner.groups.remove(&key) else {
            return Err(ErrorCode::GroupNotExist);
        };
        record.name = new_name.to_string();
        record.interval_ms = interval_ms;
        inner
            .groups
            .insert((driver.clone(), new_name.to_string()), record);
        if let Some(tags) = inner.tags.remove(&key) {
            inner.tags.insert((driver.clone(), new_name.to_string()), tags);
        }
        for sub in inner.subscriptions.iter_mut() {
            if &sub.driver == driver && sub.group == group {
                sub.group = new_name.to_string();
            }
        }
        Ok(())
    }

    fn delete_group(&self, driver: &NodeName, group: &str) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock();
        let key = (driver.clone(), group.to_string());
        inner.groups.remove(&key);
        inner.tags.remove(&key);
        inner
            .subscriptions
            .retain(|sub| !(&sub.driver == driver && sub.group == group));
        Ok(())
    }

    fn save_tag(&self, driver: &NodeName, group: &str, tag: &Tag) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock();
        let tags = inner
            .tags
            .entry((driver.clone(), group.to_string()))
            .or_default();
        tags.retain(|t| t.name != tag.name);
        tags.push(tag.clone());
        Ok(())
    }

    fn update_tag(&self, driver: &NodeName, group: &str, tag: &Tag) -> Result<(), ErrorCode> {
        self.save_tag(driver, group, tag)
    }

    fn delete_tag(&self, driver: &NodeName, group: &str, tag: &str) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock();
        if let Some(tags) = inner.tags.get_mut(&(driver.clone(), group.to_string())) {
            tags.retain(|t| t.name != tag);
        }
        Ok(())
    }

    fn save_subscription(&self, record: SubscriptionRecord) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock();
        inner.subscriptions.retain(|sub| {
            !(sub.app == record.app && sub.driver == record.driver && sub.group == record.group)
        });
        inner.subscriptions.push(record);
        Ok(())
    }

    fn delete_subscription(
        &self,
        app: &NodeName,
        driver: &NodeName,
        group: &str,
    ) -> Result<(), ErrorCode> {
        self.inner.lock().subscriptions.retain(|sub| {
            !(&sub.app == app && &sub.driver == driver && sub.group == group)
        });
        Ok(())
    }

    fn load_nodes(&self) -> Result<Vec<NodeRecord>, ErrorCode> {
        let mut nodes: Vec<NodeRecord> = self.inner.lock().nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(nodes)
    }

    fn load_groups(&self, driver: &NodeName) -> Result<Vec<GroupRecord>, ErrorCode> {
        let mut groups: Vec<GroupRecord> = self
            .inner
            .lock()
            .groups
            .values()
            .filter(|g| &g.driver == driver)
            .cloned()
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }

    fn load_tags(&self, driver: &NodeName, group: &str) -> Result<Vec<Tag>, ErrorCode> {
        Ok(self
            .inner
            .lock()
            .tags
            .get(&(driver.clone(), group.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn load_subscriptions(&self) -> Result<Vec<SubscriptionRecord>, ErrorCode> {
        Ok(self.inner.lock().subscriptions.clone())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Attribute, TagType};

    fn node(name: &str) -> NodeRecord {
        NodeRecord {
            name: name.into(),
            kind: NodeKind::Driver,
            plugin: "modbus".into(),
            setting: None,
        }
    }

    #[test]
    fn test_node_roundtrip() {
        let store = MemStore::new();
        store.save_node(node("d1")).unwrap();
        store.save_node_setting(&"d1".into(), "{\"host\":\"x\"}").unwrap();

        let nodes = store.load_nodes().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].setting.as_deref(), Some("{\"host\":\"x\"}"));

        store.delete_node(&"d1".into()).unwrap();
        assert!(store.load_nodes().unwrap().is_empty());
    }

    #[test]
    fn test_group_and_tag_roundtrip() {
        let store = MemStore::new();
        store.save_node(node("d1")).unwrap();
        store
            .save_group(GroupRecord {
                driver: "d1".into(),
                name: "g1".into(),
                interval_ms: 1000,
            })
            .unwrap();
        let tag = Tag::new("t1", "1!400001", Attribute::READ, TagType::Int16);
        store.save_tag(&"d1".into(), "g1", &tag).unwrap();

        assert_eq!(store.load_groups(&"d1".into()).unwrap().len(), 1);
        assert_eq!(store.load_tags(&"d1".into(), "g1").unwrap(), vec![tag]);

        store.delete_group(&"d1".into(), "g1").unwrap();
        assert!(store.load_groups(&"d1".into()).unwrap().is_empty());
        assert!(store.load_tags(&"d1".into(), "g1").unwrap().is_empty());
    }

    #[test]
    fn test_rename_cascades_into_persisted_rows() {
        let store = MemStore::new();
        store.save_node(node("d1")).unwrap();
        store
            .save_group(GroupRecord {
                driver: "d1".into(),
                name: "g1".into(),
                interval_ms: 1000,
            })
            .unwrap();
        store
            .save_subscription(SubscriptionRecord {
                app: "a1".into(),
                driver: "d1".into(),
                group: "g1".into(),
                params: None,
            })
            .unwrap();

        store.update_node_name(&"d1".into(), &"d1b".into()).unwrap();
        assert_eq!(store.load_groups(&"d1b".into()).unwrap().len(), 1);
        let subs = store.load_subscriptions().unwrap();
        assert_eq!(subs[0].driver, NodeName::new("d1b"));
    }

    #[test]
    fn test_delete_node_drops_subscriptions() {
        let store = MemStore::new();
        store.save_node(node("d1")).unwrap();
        store
            .save_subscription(SubscriptionRecord {
                app: "a1".into(),
                driver: "d1".into(),
                group: "g1".into(),
                params: None,
            })
            .unwrap();
        store.delete_node(&"d1".into()).unwrap();
        assert!(store.load_subscriptions().unwrap().is_empty());
    }

    #[test]
    fn test_group_update_moves_tags_and_subs() {
        let store = MemStore::new();
        store
            .save_group(GroupRecord {
                driver: "d1".into(),
                name: "g1".into(),
                interval_ms: 1000,
            })
            .unwrap();
        let tag = Tag::new("t1", "1!400001", Attribute::READ, TagType::Int16);
        store.save_tag(&"d1".into(), "g1", &tag).unwrap();
        store
            .save_subscription(SubscriptionRecord {
                app: "a1".into(),
                driver: "d1".into(),
                group: "g1".into(),
                params: None,
            })
            .unwrap();

        store.update_group(&"d1".into(), "g1", "g2", 500).unwrap();
        let groups = store.load_groups(&"d1".into()).unwrap();
        assert_eq!(groups[0].name, "g2");
        assert_eq!(groups[0].interval_ms, 500);
        assert_eq!(store.load_tags(&"d1".into(), "g2").unwrap().len(), 1);
        assert_eq!(store.load_subscriptions().unwrap()[0].group, "g2");
    }
}
