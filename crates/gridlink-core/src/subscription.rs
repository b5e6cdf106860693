// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! The subscription table: `(driver, group) → {app, params}`.
//!
//! Renames of the driver, app or group cascade in place, preserving the
//! subscription's identity and params. The manager serializes mutations;
//! the table itself is plain data.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::types::NodeName;

// =============================================================================
// Entries
// =============================================================================

/// One subscriber of a `(driver, group)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSubscription {
    /// Subscribing app.
    pub app: NodeName,
    /// Opaque params blob (e.g. a topic template).
    pub params: Option<String>,
}

/// A fully-qualified subscription record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    /// Subscribing app.
    pub app: NodeName,
    /// Publishing driver.
    pub driver: NodeName,
    /// Group name.
    pub group: String,
    /// Opaque params blob.
    pub params: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    driver: NodeName,
    group: String,
}

// =============================================================================
// SubscriptionTable
// =============================================================================

/// The routing table from driver groups to subscriber apps.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    entries: HashMap<Key, Vec<AppSubscription>>,
}

impl SubscriptionTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `app` to `(driver, group)`.
    ///
    /// Idempotent on the triple: a repeated subscription succeeds and
    /// refreshes `params`.
    pub fn sub(
        &mut self,
        driver: NodeName,
        app: NodeName,
        group: String,
        params: Option<String>,
    ) -> Result<(), ErrorCode> {
        let entry = self
            .entries
            .entry(Key { driver, group })
            .or_default();
        if let Some(existing) = entry.iter_mut().find(|s| s.app == app) {
            existing.params = params;
        } else {
            entry.push(AppSubscription { app, params });
        }
        Ok(())
    }

    /// Updates the params of an existing subscription.
    pub fn update_params(
        &mut self,
        driver: &NodeName,
        app: &NodeName,
        group: &str,
        params: Option<String>,
    ) -> Result<(), ErrorCode> {
        let key = Key {
            driver: driver.clone(),
            group: group.to_string(),
        };
        let sub = self
            .entries
            .get_mut(&key)
            .and_then(|subs| subs.iter_mut().find(|s| &s.app == app))
            .ok_or(ErrorCode::GroupNotSubscribe)?;
        sub.params = params;
        Ok(())
    }

    /// Removes the `(app, driver, group)` triple. Removing a missing triple
    /// is a successful no-op.
    pub fn unsub(&mut self, driver: &NodeName, app: &NodeName, group: &str) {
        let key = Key {
            driver: driver.clone(),
            group: group.to_string(),
        };
        if let Some(subs) = self.entries.get_mut(&key) {
            subs.retain(|s| &s.app != app);
            if subs.is_empty() {
                self.entries.remove(&key);
            }
        }
    }

    /// Removes every subscription held by `app`, returning the records.
    pub fn unsub_all(&mut self, app: &NodeName) -> Vec<SubscriptionInfo> {
        let mut removed = Vec::new();
        self.entries.retain(|key, subs| {
            subs.retain(|s| {
                if &s.app == app {
                    removed.push(SubscriptionInfo {
                        app: s.app.clone(),
                        driver: key.driver.clone(),
                        group: key.group.clone(),
                        params: s.params.clone(),
                    });
                    false
                } else {
                    true
                }
            });
            !subs.is_empty()
        });
        removed
    }

    /// Removes every subscription referencing `driver`, returning the
    /// former subscribers.
    pub fn remove_driver(&mut self, driver: &NodeName) -> Vec<SubscriptionInfo> {
        let mut removed = Vec::new();
        self.entries.retain(|key, subs| {
            if &key.driver == driver {
                for s in subs.drain(..) {
                    removed.push(SubscriptionInfo {
                        app: s.app,
                        driver: key.driver.clone(),
                        group: key.group.clone(),
                        params: s.params,
                    });
                }
                false
            } else {
                true
            }
        });
        removed
    }

    /// Returns the subscribers of every group of `driver`.
    pub fn find_by_driver(&self, driver: &NodeName) -> Vec<SubscriptionInfo> {
        self.collect(|key, _| &key.driver == driver)
    }

    /// Returns the subscribers of one `(driver, group)` pair.
    pub fn find_by_group(&self, driver: &NodeName, group: &str) -> Vec<AppSubscription> {
        self.entries
            .get(&Key {
                driver: driver.clone(),
                group: group.to_string(),
            })
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the subscriptions held by `app`.
    pub fn find_by_app(&self, app: &NodeName) -> Vec<SubscriptionInfo> {
        let mut found: Vec<SubscriptionInfo> = self
            .entries
            .iter()
            .flat_map(|(key, subs)| {
                subs.iter().filter(|s| &s.app == app).map(|s| SubscriptionInfo {
                    app: s.app.clone(),
                    driver: key.driver.clone(),
                    group: key.group.clone(),
                    params: s.params.clone(),
                })
            })
            .collect();
        found.sort_by(|a, b| (&a.driver, &a.group).cmp(&(&b.driver, &b.group)));
        found
    }

    /// Looks up one exact subscription.
    pub fn get(&self, driver: &NodeName, app: &NodeName, group: &str) -> Option<SubscriptionInfo> {
        self.entries
            .get(&Key {
                driver: driver.clone(),
                group: group.to_string(),
            })
            .and_then(|subs| subs.iter().find(|s| &s.app == app))
            .map(|s| SubscriptionInfo {
                app: s.app.clone(),
                driver: driver.clone(),
                group: group.to_string(),
                params: s.params.clone(),
            })
    }

    /// Renames a driver in place.
    pub fn update_driver_name(&mut self, old: &NodeName, new: &NodeName) {
        let keys: Vec<Key> = self
            .entries
            .keys()
            .filter(|key| &key.driver == old)
            .cloned()
            .collect();
        for key in keys {
            if let Some(subs) = self.entries.remove(&key) {
                self.entries.insert(
                    Key {
                        driver: new.clone(),
                        group: key.group,
                    },
                    subs,
                );
            }
        }
    }

    /// Renames an app in place.
    pub fn update_app_name(&mut self, old: &NodeName, new: &NodeName) {
        for subs in self.entries.values_mut() {
            for sub in subs.iter_mut() {
                if &sub.app == old {
                    sub.app = new.clone();
                }
            }
        }
    }

    /// Renames one group of `driver` in place.
    pub fn update_group_name(&mut self, driver: &NodeName, old: &str, new: &str) {
        let key = Key {
            driver: driver.clone(),
            group: old.to_string(),
        };
        if let Some(subs) = self.entries.remove(&key) {
            self.entries.insert(
                Key {
                    driver: driver.clone(),
                    group: new.to_string(),
                },
                subs,
            );
        }
    }

    /// Total number of subscription records.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Returns `true` if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn collect<F: Fn(&Key, &AppSubscription) -> bool>(&self, pred: F) -> Vec<SubscriptionInfo> {
        let mut found: Vec<SubscriptionInfo> = self
            .entries
            .iter()
            .flat_map(|(key, subs)| {
                subs.iter()
                    .filter(|s| pred(key, s))
                    .map(|s| SubscriptionInfo {
                        app: s.app.clone(),
                        driver: key.driver.clone(),
                        group: key.group.clone(),
                        params: s.params.clone(),
                    })
            })
            .collect();
        found.sort_by(|a, b| (&a.app, &a.group).cmp(&(&b.app, &b.group)));
        found
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_sub() -> SubscriptionTable {
        let mut table = SubscriptionTable::new();
        table
            .sub("d1".into(), "a1".into(), "g1".into(), Some("topic/x".into()))
            .unwrap();
        table
    }

    #[test]
    fn test_sub_idempotent_updates_params() {
        let mut table = table_with_sub();
        table
            .sub("d1".into(), "a1".into(), "g1".into(), Some("topic/y".into()))
            .unwrap();
        assert_eq!(table.len(), 1);
        let info = table.get(&"d1".into(), &"a1".into(), "g1").unwrap();
        assert_eq!(info.params.as_deref(), Some("topic/y"));
    }

    #[test]
    fn test_unsub_missing_is_noop() {
        let mut table = table_with_sub();
        table.unsub(&"d1".into(), &"ghost".into(), "g1");
        table.unsub(&"ghost".into(), &"a1".into(), "g1");
        assert_eq!(table.len(), 1);

        table.unsub(&"d1".into(), &"a1".into(), "g1");
        assert!(table.is_empty());
    }

    #[test]
    fn test_find_by_driver_and_group() {
        let mut table = table_with_sub();
        table
            .sub("d1".into(), "a2".into(), "g1".into(), None)
            .unwrap();
        table
            .sub("d2".into(), "a1".into(), "g9".into(), None)
            .unwrap();

        assert_eq!(table.find_by_driver(&"d1".into()).len(), 2);
        assert_eq!(table.find_by_group(&"d1".into(), "g1").len(), 2);
        assert_eq!(table.find_by_group(&"d1".into(), "missing").len(), 0);
        assert_eq!(table.find_by_app(&"a1".into()).len(), 2);
    }

    #[test]
    fn test_driver_rename_cascades() {
        let mut table = table_with_sub();
        table.update_driver_name(&"d1".into(), &"d1b".into());

        assert!(table.get(&"d1b".into(), &"a1".into(), "g1").is_some());
        assert!(table.get(&"d1".into(), &"a1".into(), "g1").is_none());
        // Params survive the rename.
        let info = table.get(&"d1b".into(), &"a1".into(), "g1").unwrap();
        assert_eq!(info.params.as_deref(), Some("topic/x"));
    }

    #[test]
    fn test_app_and_group_rename_cascade() {
        let mut table = table_with_sub();
        table.update_app_name(&"a1".into(), &"a1b".into());
        assert!(table.get(&"d1".into(), &"a1b".into(), "g1").is_some());

        table.update_group_name(&"d1".into(), "g1", "g1b");
        assert!(table.get(&"d1".into(), &"a1b".into(), "g1b").is_some());
        assert!(table.get(&"d1".into(), &"a1b".into(), "g1").is_none());
    }

    #[test]
    fn test_unsub_all_returns_records() {
        let mut table = table_with_sub();
        table
            .sub("d2".into(), "a1".into(), "g2".into(), None)
            .unwrap();
        table
            .sub("d2".into(), "a2".into(), "g2".into(), None)
            .unwrap();

        let removed = table.unsub_all(&"a1".into());
        assert_eq!(removed.len(), 2);
        assert_eq!(table.len(), 1);
        assert!(table.find_by_app(&"a1".into()).is_empty());
    }

    #[test]
    fn test_remove_driver_drops_every_reference() {
        let mut table = table_with_sub();
        table
            .sub("d1".into(), "a2".into(), "g2".into(), None)
            .unwrap();
        table
            .sub("d2".into(), "a1".into(), "g1".into(), None)
            .unwrap();

        let removed = table.remove_driver(&"d1".into());
        assert_eq!(removed.len(), 2);
        assert!(table.find_by_driver(&"d1".into()).is_empty());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_update_params_requires_subscription() {
        let mut table = table_with_sub();
        assert_eq!(
            table
                .update_params(&"d1".into(), &"ghost".into(), "g1", None)
                .unwrap_err(),
            ErrorCode::GroupNotSubscribe
        );
        table
            .update_params(&"d1".into(), &"a1".into(), "g1", Some("t".into()))
            .unwrap();
    }
}
