// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! Gateway metrics: typed entries, per-node maps, visitor exposure.
//!
//! A metric entry is `{name, help, kind, value}`. Counters accumulate,
//! gauges are set, rolling counters retain timestamped samples over a
//! window and report the windowed sum. The registry reference-counts
//! metric names so a name stays defined while any node still registers it.
//! Exposure is by visitor only: [`MetricsRegistry::visit`] assembles one
//! consistent view under the read lock and hands it to the callback once.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::types::{NodeKind, NodeName, NodeState, NodeStatusCell};

/// Window of rolling counters, in milliseconds.
pub const ROLLING_WINDOW_MS: i64 = 5_000;

// Per-node metric names registered by every adapter.

/// Envelopes delivered by this node.
pub const METRIC_SEND_MSGS: &str = "send_msgs_total";
/// Envelopes this node failed to deliver (the drop counter).
pub const METRIC_SEND_MSG_ERRORS: &str = "send_msg_errors_total";
/// Envelopes received by this node.
pub const METRIC_RECV_MSGS: &str = "recv_msgs_total";
/// Group poll cycles executed by a driver.
pub const METRIC_GROUP_TIMER_TICKS: &str = "group_timer_ticks_total";
/// Tag values sampled over the rolling window.
pub const METRIC_TAG_READS_ROLLING: &str = "tag_reads_5s";

// =============================================================================
// Metric Types
// =============================================================================

/// The kind of a metric entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Monotonically accumulating count.
    Counter,
    /// Last-write-wins level.
    Gauge,
    /// Windowed sum over recent samples.
    RollingCounter,
}

/// A rendered metric entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEntry {
    /// Metric name.
    pub name: String,
    /// Help text.
    pub help: String,
    /// Kind.
    pub kind: MetricKind,
    /// Current value.
    pub value: i64,
}

#[derive(Debug)]
struct Metric {
    help: String,
    kind: MetricKind,
    value: i64,
    samples: VecDeque<(i64, i64)>,
}

impl Metric {
    fn new(help: String, kind: MetricKind, init: i64) -> Self {
        Self {
            help,
            kind,
            value: init,
            samples: VecDeque::new(),
        }
    }

    fn update(&mut self, value: i64, now_ms: i64) {
        match self.kind {
            MetricKind::Counter => self.value += value,
            MetricKind::Gauge => self.value = value,
            MetricKind::RollingCounter => {
                self.samples.push_back((now_ms, value));
                let horizon = now_ms - ROLLING_WINDOW_MS;
                while matches!(self.samples.front(), Some((ts, _)) if *ts < horizon) {
                    self.samples.pop_front();
                }
                self.value = self.samples.iter().map(|(_, v)| v).sum();
            }
        }
    }

    fn entry(&self, name: &str) -> MetricEntry {
        MetricEntry {
            name: name.to_string(),
            help: self.help.clone(),
            kind: self.kind,
            value: self.value,
        }
    }
}

// =============================================================================
// Node Metrics
// =============================================================================

/// Per-node metric block handed to an adapter and its plugin.
#[derive(Debug)]
pub struct NodeMetrics {
    node: RwLock<NodeName>,
    kind: NodeKind,
    status: Arc<NodeStatusCell>,
    entries: RwLock<HashMap<String, Metric>>,
    names: Arc<NameTable>,
}

impl NodeMetrics {
    /// Registers a metric for this node, ref-counting the name.
    pub fn register(&self, name: &str, help: &str, kind: MetricKind, init: i64) {
        let mut entries = self.entries.write();
        if entries.contains_key(name) {
            return;
        }
        self.names.acquire(name, help, kind);
        entries.insert(name.to_string(), Metric::new(help.to_string(), kind, init));
    }

    /// Removes a metric from this node, releasing the name reference.
    pub fn unregister(&self, name: &str) {
        if self.entries.write().remove(name).is_some() {
            self.names.release(name);
        }
    }

    /// Applies `value` per the metric's kind.
    pub fn update(&self, name: &str, value: i64) {
        let now_ms = chrono::Utc::now().timestamp_millis();
        if let Some(metric) = self.entries.write().get_mut(name) {
            metric.update(value, now_ms);
        }
    }

    /// Current node name.
    pub fn node(&self) -> NodeName {
        self.node.read().clone()
    }

    /// Node kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    fn snapshot(&self) -> NodeMetricsSnapshot {
        let entries = self.entries.read();
        let mut metrics: Vec<MetricEntry> =
            entries.iter().map(|(name, m)| m.entry(name)).collect();
        metrics.sort_by(|a, b| a.name.cmp(&b.name));
        NodeMetricsSnapshot {
            node: self.node.read().clone(),
            kind: self.kind,
            state: self.status.state(),
            metrics,
        }
    }
}

/// A consistent snapshot of one node's metrics.
#[derive(Debug, Clone, Serialize)]
pub struct NodeMetricsSnapshot {
    /// Node name.
    pub node: NodeName,
    /// Node kind.
    pub kind: NodeKind,
    /// Running state at snapshot time.
    pub state: NodeState,
    /// Entries, sorted by name.
    pub metrics: Vec<MetricEntry>,
}

// =============================================================================
// Name Table
// =============================================================================

/// Ref-counted metric name definitions.
#[derive(Debug, Default)]
struct NameTable {
    names: RwLock<HashMap<String, NameDef>>,
}

#[derive(Debug)]
struct NameDef {
    help: String,
    kind: MetricKind,
    refs: usize,
}

impl NameTable {
    fn acquire(&self, name: &str, help: &str, kind: MetricKind) {
        let mut names = self.names.write();
        names
            .entry(name.to_string())
            .and_modify(|def| def.refs += 1)
            .or_insert_with(|| NameDef {
                help: help.to_string(),
                kind,
                refs: 1,
            });
    }

    fn release(&self, name: &str) {
        let mut names = self.names.write();
        if let Some(def) = names.get_mut(name) {
            def.refs -= 1;
            if def.refs == 0 {
                names.remove(name);
            }
        }
    }

    fn defined(&self, name: &str) -> bool {
        self.names.read().contains_key(name)
    }
}

// =============================================================================
// Metrics Registry
// =============================================================================

/// Node counts included in every visit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NodeCounts {
    /// Registered drivers.
    pub drivers: usize,
    /// Registered apps.
    pub apps: usize,
    /// Nodes in `Running` state.
    pub running: usize,
    /// Nodes not in `Running` state.
    pub stopped: usize,
}

/// The view handed to the metrics visitor.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsView {
    /// Global entries, sorted by name.
    pub global: Vec<MetricEntry>,
    /// Per-node snapshots, sorted by node name.
    pub nodes: Vec<NodeMetricsSnapshot>,
    /// Node counts by kind and state.
    pub counts: NodeCounts,
}

/// The gateway-wide metrics registry.
#[derive(Debug)]
pub struct MetricsRegistry {
    global: RwLock<HashMap<String, Metric>>,
    nodes: RwLock<HashMap<NodeName, Arc<NodeMetrics>>>,
    names: Arc<NameTable>,
}

impl MetricsRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            global: RwLock::new(HashMap::new()),
            nodes: RwLock::new(HashMap::new()),
            names: Arc::new(NameTable::default()),
        }
    }

    /// Registers a global metric.
    pub fn register_global(&self, name: &str, help: &str, kind: MetricKind, init: i64) {
        let mut global = self.global.write();
        if !global.contains_key(name) {
            self.names.acquire(name, help, kind);
            global.insert(name.to_string(), Metric::new(help.to_string(), kind, init));
        }
    }

    /// Updates a global metric.
    pub fn update_global(&self, name: &str, value: i64) {
        let now_ms = chrono::Utc::now().timestamp_millis();
        if let Some(metric) = self.global.write().get_mut(name) {
            metric.update(value, now_ms);
        }
    }

    /// Creates the metric block for a node.
    pub fn register_node(
        &self,
        node: NodeName,
        kind: NodeKind,
        status: Arc<NodeStatusCell>,
    ) -> Arc<NodeMetrics> {
        let metrics = Arc::new(NodeMetrics {
            node: RwLock::new(node.clone()),
            kind,
            status,
            entries: RwLock::new(HashMap::new()),
            names: self.names.clone(),
        });
        self.nodes.write().insert(node, metrics.clone());
        metrics
    }

    /// Drops a node's metric block, releasing its name references.
    pub fn unregister_node(&self, node: &NodeName) {
        if let Some(metrics) = self.nodes.write().remove(node) {
            let names: Vec<String> = metrics.entries.read().keys().cloned().collect();
            for name in names {
                metrics.unregister(&name);
            }
        }
    }

    /// Renames a node's metric block in place.
    pub fn rename_node(&self, old: &NodeName, new: NodeName) {
        let mut nodes = self.nodes.write();
        if let Some(metrics) = nodes.remove(old) {
            *metrics.node.write() = new.clone();
            nodes.insert(new, metrics);
        }
    }

    /// Returns `true` while any holder still registers `name`.
    pub fn name_defined(&self, name: &str) -> bool {
        self.names.defined(name)
    }

    /// Assembles one consistent view and passes it to `cb` exactly once.
    pub fn visit<F: FnOnce(&MetricsView)>(&self, cb: F) {
        let global_guard = self.global.read();
        let nodes_guard = self.nodes.read();

        let mut global: Vec<MetricEntry> = global_guard
            .iter()
            .map(|(name, m)| m.entry(name))
            .collect();
        global.sort_by(|a, b| a.name.cmp(&b.name));

        let mut nodes: Vec<NodeMetricsSnapshot> =
            nodes_guard.values().map(|m| m.snapshot()).collect();
        nodes.sort_by(|a, b| a.node.cmp(&b.node));

        let mut counts = NodeCounts::default();
        for snapshot in &nodes {
            match snapshot.kind {
                NodeKind::Driver => counts.drivers += 1,
                NodeKind::App => counts.apps += 1,
            }
            if snapshot.state.is_running() {
                counts.running += 1;
            } else {
                counts.stopped += 1;
            }
        }

        let view = MetricsView {
            global,
            nodes,
            counts,
        };
        cb(&view);
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Text Rendering
// =============================================================================

/// Renders a view in the `# HELP / # TYPE / name{labels} value` grammar.
pub fn render_text(view: &MetricsView) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    let mut typed: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();

    let _ = writeln!(out, "# HELP node_count total registered nodes");
    let _ = writeln!(out, "# TYPE node_count gauge");
    let _ = writeln!(
        out,
        "node_count{{kind=\"driver\"}} {}",
        view.counts.drivers
    );
    let _ = writeln!(out, "node_count{{kind=\"app\"}} {}", view.counts.apps);
    let _ = writeln!(
        out,
        "node_count{{state=\"running\"}} {}",
        view.counts.running
    );
    let _ = writeln!(
        out,
        "node_count{{state=\"stopped\"}} {}",
        view.counts.stopped
    );

    for entry in &view.global {
        let _ = writeln!(out, "# HELP {} {}", entry.name, entry.help);
        let _ = writeln!(out, "# TYPE {} {}", entry.name, type_label(entry.kind));
        let _ = writeln!(out, "{} {}", entry.name, entry.value);
        typed.insert(entry.name.clone());
    }

    for snapshot in &view.nodes {
        for entry in &snapshot.metrics {
            if typed.insert(entry.name.clone()) {
                let _ = writeln!(out, "# HELP {} {}", entry.name, entry.help);
                let _ = writeln!(out, "# TYPE {} {}", entry.name, type_label(entry.kind));
            }
            let _ = writeln!(
                out,
                "{}{{node=\"{}\"}} {}",
                entry.name, snapshot.node, entry.value
            );
        }
    }

    out
}

fn type_label(kind: MetricKind) -> &'static str {
    match kind {
        MetricKind::Counter | MetricKind::RollingCounter => "counter",
        MetricKind::Gauge => "gauge",
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_node(name: &str, kind: NodeKind) -> (MetricsRegistry, Arc<NodeMetrics>) {
        let registry = MetricsRegistry::new();
        let status = Arc::new(NodeStatusCell::new());
        let metrics = registry.register_node(NodeName::new(name), kind, status);
        (registry, metrics)
    }

    #[test]
    fn test_counter_and_gauge() {
        let (_registry, metrics) = registry_with_node("d1", NodeKind::Driver);
        metrics.register("reads_total", "reads", MetricKind::Counter, 0);
        metrics.register("level", "level", MetricKind::Gauge, 0);

        metrics.update("reads_total", 2);
        metrics.update("reads_total", 3);
        metrics.update("level", 10);
        metrics.update("level", 7);

        let snapshot = metrics.snapshot();
        let get = |name: &str| {
            snapshot
                .metrics
                .iter()
                .find(|e| e.name == name)
                .unwrap()
                .value
        };
        assert_eq!(get("reads_total"), 5);
        assert_eq!(get("level"), 7);
    }

    #[test]
    fn test_rolling_counter_sums_window() {
        let (_registry, metrics) = registry_with_node("d1", NodeKind::Driver);
        metrics.register("rate", "rate", MetricKind::RollingCounter, 0);
        metrics.update("rate", 2);
        metrics.update("rate", 3);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.metrics[0].value, 5);
    }

    #[test]
    fn test_name_refcounting() {
        let registry = MetricsRegistry::new();
        let status = Arc::new(NodeStatusCell::new());
        let m1 = registry.register_node("d1".into(), NodeKind::Driver, status.clone());
        let m2 = registry.register_node("d2".into(), NodeKind::Driver, status);

        m1.register("shared", "help", MetricKind::Counter, 0);
        m2.register("shared", "help", MetricKind::Counter, 0);
        assert!(registry.name_defined("shared"));

        registry.unregister_node(&"d1".into());
        assert!(registry.name_defined("shared"));

        registry.unregister_node(&"d2".into());
        assert!(!registry.name_defined("shared"));
    }

    #[test]
    fn test_visit_counts_by_kind_and_state() {
        let registry = MetricsRegistry::new();
        let driver_status = Arc::new(NodeStatusCell::new());
        driver_status.set_state(NodeState::Running);
        registry.register_node("d1".into(), NodeKind::Driver, driver_status);
        registry.register_node("a1".into(), NodeKind::App, Arc::new(NodeStatusCell::new()));

        let mut calls = 0;
        registry.visit(|view| {
            calls += 1;
            assert_eq!(view.counts.drivers, 1);
            assert_eq!(view.counts.apps, 1);
            assert_eq!(view.counts.running, 1);
            assert_eq!(view.counts.stopped, 1);
        });
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_rename_node() {
        let (registry, metrics) = registry_with_node("d1", NodeKind::Driver);
        metrics.register("m", "m", MetricKind::Counter, 0);
        registry.rename_node(&"d1".into(), "d1b".into());

        registry.visit(|view| {
            assert_eq!(view.nodes.len(), 1);
            assert_eq!(view.nodes[0].node, NodeName::new("d1b"));
        });
        assert_eq!(metrics.node(), NodeName::new("d1b"));
    }

    #[test]
    fn test_render_text_grammar() {
        let (registry, metrics) = registry_with_node("d1", NodeKind::Driver);
        registry.register_global("uptime_seconds", "gateway uptime", MetricKind::Gauge, 0);
        registry.update_global("uptime_seconds", 42);
        metrics.register(METRIC_SEND_MSGS, "sent envelopes", MetricKind::Counter, 0);
        metrics.update(METRIC_SEND_MSGS, 3);

        let mut text = String::new();
        registry.visit(|view| text = render_text(view));

        assert!(text.contains("# HELP uptime_seconds gateway uptime"));
        assert!(text.contains("# TYPE uptime_seconds gauge"));
        assert!(text.contains("uptime_seconds 42"));
        assert!(text.contains("send_msgs_total{node=\"d1\"} 3"));
        assert!(text.contains("node_count{kind=\"driver\"} 1"));
    }
}
