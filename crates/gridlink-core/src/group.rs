// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! Groups: named, polled collections of tags under a driver.
//!
//! Every group guards its tag map with its own mutex. Read operations hand
//! out deep copies so no reference escapes the lock; every mutation bumps
//! the group's revision timestamp, which drivers use to rebuild their poll
//! plans.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ErrorCode;
use crate::tag::Tag;
use crate::types::Attribute;

/// Minimum poll interval in milliseconds.
pub const MIN_INTERVAL_MS: u32 = 1;

// =============================================================================
// Group
// =============================================================================

/// A named ordered collection of tags with a poll interval.
#[derive(Debug)]
pub struct Group {
    inner: Mutex<GroupInner>,
}

#[derive(Debug)]
struct GroupInner {
    name: String,
    interval_ms: u32,
    /// Revision stamp in microseconds, strictly increasing per mutation.
    timestamp: i64,
    tags: BTreeMap<String, Tag>,
}

impl Group {
    /// Creates an empty group.
    ///
    /// The interval is clamped to [`MIN_INTERVAL_MS`].
    pub fn new(name: impl Into<String>, interval_ms: u32) -> Self {
        Self {
            inner: Mutex::new(GroupInner {
                name: name.into(),
                interval_ms: interval_ms.max(MIN_INTERVAL_MS),
                timestamp: 0,
                tags: BTreeMap::new(),
            }),
        }
    }

    /// Returns the group name.
    pub fn name(&self) -> String {
        self.inner.lock().name.clone()
    }

    /// Renames the group.
    pub fn rename(&self, name: impl Into<String>) {
        self.inner.lock().name = name.into();
    }

    /// Returns the poll interval in milliseconds.
    pub fn interval_ms(&self) -> u32 {
        self.inner.lock().interval_ms
    }

    /// Sets the poll interval without touching the revision.
    pub fn set_interval(&self, interval_ms: u32) {
        self.inner.lock().interval_ms = interval_ms.max(MIN_INTERVAL_MS);
    }

    /// Updates the poll interval, bumping the revision only on change.
    pub fn update_interval(&self, interval_ms: u32) {
        let interval_ms = interval_ms.max(MIN_INTERVAL_MS);
        let mut inner = self.inner.lock();
        if inner.interval_ms != interval_ms {
            inner.interval_ms = interval_ms;
            inner.bump();
        }
    }

    /// Returns the current revision stamp.
    pub fn timestamp(&self) -> i64 {
        self.inner.lock().timestamp
    }

    /// Returns the number of tags.
    pub fn tag_count(&self) -> usize {
        self.inner.lock().tags.len()
    }

    // =========================================================================
    // Tag Operations
    // =========================================================================

    /// Adds a tag. Fails with `TagNameConflict` if the name exists; the
    /// revision is untouched on failure.
    pub fn add_tag(&self, tag: Tag) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock();
        if inner.tags.contains_key(&tag.name) {
            return Err(ErrorCode::TagNameConflict);
        }
        inner.tags.insert(tag.name.clone(), tag);
        inner.bump();
        Ok(())
    }

    /// Replaces an existing tag. Fails with `TagNotExist`.
    pub fn update_tag(&self, tag: Tag) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock();
        if !inner.tags.contains_key(&tag.name) {
            return Err(ErrorCode::TagNotExist);
        }
        inner.tags.insert(tag.name.clone(), tag);
        inner.bump();
        Ok(())
    }

    /// Removes a tag by name. Fails with `TagNotExist`.
    pub fn del_tag(&self, name: &str) -> Result<(), ErrorCode> {
        let mut inner = self.inner.lock();
        if inner.tags.remove(name).is_none() {
            return Err(ErrorCode::TagNotExist);
        }
        inner.bump();
        Ok(())
    }

    /// Returns a deep copy of the named tag.
    pub fn find_tag(&self, name: &str) -> Option<Tag> {
        self.inner.lock().tags.get(name).cloned()
    }

    /// Returns deep copies of all tags.
    pub fn list_tags(&self) -> Vec<Tag> {
        self.inner.lock().tags.values().cloned().collect()
    }

    /// Substring query over names and descriptions.
    ///
    /// `name` matches the tag name or the description (case-sensitive);
    /// `desc` additionally constrains the description.
    pub fn query(&self, name: Option<&str>, desc: Option<&str>) -> Vec<Tag> {
        let inner = self.inner.lock();
        inner
            .tags
            .values()
            .filter(|tag| {
                let name_ok = name.map_or(true, |n| {
                    tag.name.contains(n) || tag.description.contains(n)
                });
                let desc_ok = desc.map_or(true, |d| tag.description.contains(d));
                name_ok && desc_ok
            })
            .cloned()
            .collect()
    }

    /// Returns deep copies of readable tags (`READ ∨ SUBSCRIBE ∨ STATIC`).
    pub fn readable_tags(&self) -> Vec<Tag> {
        let inner = self.inner.lock();
        inner
            .tags
            .values()
            .filter(|tag| tag.is_readable())
            .cloned()
            .collect()
    }

    /// Splits tags into `(static, polled)` where polled means `READ ∨ SUBSCRIBE`.
    pub fn split_static(&self) -> (Vec<Tag>, Vec<Tag>) {
        let inner = self.inner.lock();
        inner.split_static()
    }

    /// Returns `true` if the group changed since `timestamp`.
    pub fn is_changed(&self, timestamp: i64) -> bool {
        self.inner.lock().timestamp != timestamp
    }

    /// Invokes `fn` with the current revision, tag split and interval when
    /// the group changed since `timestamp`.
    pub fn change_test<F>(&self, timestamp: i64, f: F)
    where
        F: FnOnce(i64, Vec<Tag>, Vec<Tag>, u32),
    {
        let inner = self.inner.lock();
        if inner.timestamp != timestamp {
            let (static_tags, other_tags) = inner.split_static();
            f(inner.timestamp, static_tags, other_tags, inner.interval_ms);
        }
    }
}

impl GroupInner {
    /// Advances the revision stamp, strictly.
    fn bump(&mut self) {
        let now = chrono::Utc::now().timestamp_micros();
        self.timestamp = now.max(self.timestamp + 1);
    }

    fn split_static(&self) -> (Vec<Tag>, Vec<Tag>) {
        let mut static_tags = Vec::new();
        let mut other_tags = Vec::new();
        for tag in self.tags.values() {
            if tag.attribute_test(Attribute::STATIC) {
                static_tags.push(tag.clone());
            } else if tag.attribute_test(Attribute::SUBSCRIBE)
                || tag.attribute_test(Attribute::READ)
            {
                other_tags.push(tag.clone());
            }
        }
        (static_tags, other_tags)
    }
}

// =============================================================================
// GroupTable
// =============================================================================

/// The ordered set of groups owned by one driver.
///
/// The driver's control task is the only writer; the manager reads it for
/// existence checks and tag queries. Individual [`Group`]s carry their own
/// mutex, so tag-level reads through a shared table are safe.
#[derive(Debug, Default)]
pub struct GroupTable {
    inner: parking_lot::RwLock<BTreeMap<String, Arc<Group>>>,
}

impl GroupTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a group. Returns `false` when the name is already taken.
    pub fn insert(&self, group: Arc<Group>) -> bool {
        let name = group.name();
        let mut inner = self.inner.write();
        if inner.contains_key(&name) {
            return false;
        }
        inner.insert(name, group);
        true
    }

    /// Removes a group by name.
    pub fn remove(&self, name: &str) -> Option<Arc<Group>> {
        self.inner.write().remove(name)
    }

    /// Renames a group, moving its table slot.
    pub fn rename(&self, old: &str, new: &str) -> bool {
        let mut inner = self.inner.write();
        if inner.contains_key(new) {
            return false;
        }
        match inner.remove(old) {
            Some(group) => {
                group.rename(new);
                inner.insert(new.to_string(), group);
                true
            }
            None => false,
        }
    }

    /// Looks up a group.
    pub fn get(&self, name: &str) -> Option<Arc<Group>> {
        self.inner.read().get(name).cloned()
    }

    /// Returns `true` if `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().contains_key(name)
    }

    /// Group names in order.
    pub fn names(&self) -> Vec<String> {
        self.inner.read().keys().cloned().collect()
    }

    /// All groups in name order.
    pub fn groups(&self) -> Vec<Arc<Group>> {
        self.inner.read().values().cloned().collect()
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Returns `true` when no group exists.
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TagType, Value};

    fn tag(name: &str, attr: Attribute) -> Tag {
        Tag::new(name, "1!400001", attr, TagType::Int16)
    }

    #[test]
    fn test_add_tag_conflict_keeps_timestamp() {
        let group = Group::new("g1", 1000);
        group.add_tag(tag("t1", Attribute::READ)).unwrap();
        let ts = group.timestamp();

        let err = group.add_tag(tag("t1", Attribute::READ)).unwrap_err();
        assert_eq!(err, ErrorCode::TagNameConflict);
        assert_eq!(group.timestamp(), ts);
        assert_eq!(group.tag_count(), 1);
    }

    #[test]
    fn test_timestamp_strictly_monotonic() {
        let group = Group::new("g1", 1000);
        let mut last = group.timestamp();
        for i in 0..50 {
            group.add_tag(tag(&format!("t{}", i), Attribute::READ)).unwrap();
            let ts = group.timestamp();
            assert!(ts > last, "revision must strictly increase");
            last = ts;
        }
    }

    #[test]
    fn test_update_and_delete() {
        let group = Group::new("g1", 1000);
        assert_eq!(
            group.update_tag(tag("t1", Attribute::READ)).unwrap_err(),
            ErrorCode::TagNotExist
        );
        group.add_tag(tag("t1", Attribute::READ)).unwrap();

        let mut updated = tag("t1", Attribute::READ | Attribute::WRITE);
        updated.description = "updated".into();
        group.update_tag(updated).unwrap();
        let found = group.find_tag("t1").unwrap();
        assert!(found.attribute_test(Attribute::WRITE));

        group.del_tag("t1").unwrap();
        assert_eq!(group.del_tag("t1").unwrap_err(), ErrorCode::TagNotExist);
        assert!(group.find_tag("t1").is_none());
    }

    #[test]
    fn test_find_returns_deep_copy() {
        let group = Group::new("g1", 1000);
        group.add_tag(tag("t1", Attribute::READ)).unwrap();
        let mut copy = group.find_tag("t1").unwrap();
        copy.description = "local only".into();
        assert_eq!(group.find_tag("t1").unwrap().description, "");
    }

    #[test]
    fn test_query_matches_name_and_description() {
        let group = Group::new("g1", 1000);
        group
            .add_tag(tag("temp_in", Attribute::READ).with_description("inlet temperature"))
            .unwrap();
        group
            .add_tag(tag("pressure", Attribute::READ).with_description("line pressure"))
            .unwrap();

        assert_eq!(group.query(Some("temp"), None).len(), 1);
        // The name filter also matches against descriptions.
        assert_eq!(group.query(Some("pressure"), None).len(), 1);
        assert_eq!(group.query(Some("press"), Some("line")).len(), 1);
        assert_eq!(group.query(Some("press"), Some("inlet")).len(), 0);
        assert_eq!(group.query(None, None).len(), 2);
    }

    #[test]
    fn test_readable_and_split() {
        let group = Group::new("g1", 1000);
        group.add_tag(tag("r", Attribute::READ)).unwrap();
        group.add_tag(tag("w", Attribute::WRITE)).unwrap();
        group.add_tag(tag("s", Attribute::SUBSCRIBE)).unwrap();
        group
            .add_tag(
                Tag::new("st", "1!1", Attribute::STATIC, TagType::Float)
                    .with_static_value(Value::Float(3.14)),
            )
            .unwrap();

        let readable = group.readable_tags();
        assert_eq!(readable.len(), 3);

        let (static_tags, other_tags) = group.split_static();
        assert_eq!(static_tags.len(), 1);
        assert_eq!(static_tags[0].name, "st");
        assert_eq!(other_tags.len(), 2);
    }

    #[test]
    fn test_change_test_fires_only_on_change() {
        let group = Group::new("g1", 500);
        group.add_tag(tag("t1", Attribute::READ)).unwrap();
        let ts = group.timestamp();

        let mut fired = false;
        group.change_test(ts, |_, _, _, _| fired = true);
        assert!(!fired);

        group.add_tag(tag("t2", Attribute::READ)).unwrap();
        let mut seen = None;
        group.change_test(ts, |new_ts, statics, others, interval| {
            seen = Some((new_ts, statics.len(), others.len(), interval));
        });
        let (new_ts, statics, others, interval) = seen.unwrap();
        assert!(new_ts > ts);
        assert_eq!(statics, 0);
        assert_eq!(others, 2);
        assert_eq!(interval, 500);
    }

    #[test]
    fn test_interval_update_bumps_only_on_change() {
        let group = Group::new("g1", 1000);
        let ts = group.timestamp();
        group.update_interval(1000);
        assert_eq!(group.timestamp(), ts);
        group.update_interval(2000);
        assert!(group.timestamp() > ts);
        assert_eq!(group.interval_ms(), 2000);
    }

    #[test]
    fn test_interval_floor() {
        let group = Group::new("g1", 0);
        assert_eq!(group.interval_ms(), MIN_INTERVAL_MS);
    }
}
