// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! The MQTT app plugin: formats snapshots into JSON topic payloads.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use gridlink_core::error::ErrorCode;
use gridlink_core::message::{NodesState, SubscribeReq, TransData, UnsubscribeReq};
use gridlink_core::metrics::MetricKind;
use gridlink_core::plugin::{AppPlugin, Plugin, PluginEnv};
use gridlink_core::types::{LinkState, NodeName};

use crate::publisher::Publisher;

/// Messages published northbound by this node.
pub const METRIC_PUBLISHED: &str = "mqtt_published_total";
/// Publish attempts that failed.
pub const METRIC_PUBLISH_ERRORS: &str = "mqtt_publish_errors_total";

/// Topic carrying the periodic node state digest.
pub const STATUS_TOPIC: &str = "gridlink/status";

#[derive(Debug, Deserialize)]
struct TopicParams {
    topic: Option<String>,
}

// =============================================================================
// MqttApp
// =============================================================================

/// App plugin bridging snapshots onto a [`Publisher`].
pub struct MqttApp {
    env: Option<PluginEnv>,
    publisher: Arc<dyn Publisher>,
    /// `(driver, group) → topic` routing built from subscription params.
    topics: HashMap<(NodeName, String), String>,
}

impl MqttApp {
    /// Creates the plugin over `publisher`.
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            env: None,
            publisher,
            topics: HashMap::new(),
        }
    }

    fn default_topic(driver: &NodeName, group: &str) -> String {
        format!("gridlink/{}/{}", driver, group)
    }

    fn payload(data: &TransData) -> Vec<u8> {
        let values: serde_json::Map<String, serde_json::Value> = data
            .values
            .iter()
            .map(|tv| (tv.tag.clone(), tv.value.to_json()))
            .collect();
        serde_json::json!({
            "node": data.driver,
            "group": data.group,
            "timestamp": data.timestamp_ms,
            "values": values,
        })
        .to_string()
        .into_bytes()
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ErrorCode> {
        if !self.publisher.is_connected() {
            return Err(ErrorCode::MqttIsNull);
        }
        match self.publisher.publish(topic, payload).await {
            Ok(()) => {
                if let Some(env) = &self.env {
                    env.update_metric(METRIC_PUBLISHED, 1);
                }
                Ok(())
            }
            Err(code) => {
                if let Some(env) = &self.env {
                    env.update_metric(METRIC_PUBLISH_ERRORS, 1);
                }
                tracing::warn!(topic, %code, "northbound publish failed");
                Err(ErrorCode::MqttPublishFailure)
            }
        }
    }
}

#[async_trait]
impl Plugin for MqttApp {
    async fn init(&mut self, env: PluginEnv, _load: bool) -> Result<(), ErrorCode> {
        env.register_metric(
            METRIC_PUBLISHED,
            "messages published northbound",
            MetricKind::Counter,
            0,
        );
        env.register_metric(
            METRIC_PUBLISH_ERRORS,
            "failed northbound publishes",
            MetricKind::Counter,
            0,
        );
        self.env = Some(env);
        Ok(())
    }

    async fn uninit(&mut self) -> Result<(), ErrorCode> {
        if let Some(env) = &self.env {
            env.set_link_state(LinkState::Disconnected);
        }
        self.env = None;
        self.topics.clear();
        Ok(())
    }

    async fn start(&mut self) -> Result<(), ErrorCode> {
        let Some(env) = &self.env else {
            return Err(ErrorCode::MqttIsNull);
        };
        if !self.publisher.is_connected() {
            env.set_link_state(LinkState::Connecting);
            return Err(ErrorCode::MqttFailure);
        }
        env.set_link_state(LinkState::Connected);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), ErrorCode> {
        if let Some(env) = &self.env {
            env.set_link_state(LinkState::Disconnected);
        }
        Ok(())
    }

    async fn setting(&mut self, setting: &str) -> Result<(), ErrorCode> {
        serde_json::from_str::<serde_json::Value>(setting)
            .map(|_| ())
            .map_err(|_| ErrorCode::MqttFailure)
    }
}

#[async_trait]
impl AppPlugin for MqttApp {
    async fn on_snapshot(&mut self, data: &TransData) -> Result<(), ErrorCode> {
        let key = (data.driver.clone(), data.group.clone());
        let topic = self
            .topics
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Self::default_topic(&data.driver, &data.group));
        self.publish(&topic, Self::payload(data)).await
    }

    async fn on_subscribe(&mut self, sub: &SubscribeReq) -> Result<(), ErrorCode> {
        let topic = match sub.params.as_deref() {
            Some(params) => {
                let parsed: TopicParams =
                    serde_json::from_str(params).map_err(|_| ErrorCode::MqttSubscribeFailure)?;
                match parsed.topic {
                    Some(topic) if topic.is_empty() => {
                        return Err(ErrorCode::MqttSubscribeFailure);
                    }
                    Some(topic) => topic,
                    None => Self::default_topic(&sub.driver, &sub.group),
                }
            }
            None => Self::default_topic(&sub.driver, &sub.group),
        };
        self.topics
            .insert((sub.driver.clone(), sub.group.clone()), topic);
        Ok(())
    }

    async fn on_unsubscribe(&mut self, unsub: &UnsubscribeReq) -> Result<(), ErrorCode> {
        self.topics
            .remove(&(unsub.driver.clone(), unsub.group.clone()));
        Ok(())
    }

    async fn on_node_deleted(&mut self, node: &NodeName) -> Result<(), ErrorCode> {
        self.topics.retain(|(driver, _), _| driver != node);
        Ok(())
    }

    async fn on_nodes_state(&mut self, states: &NodesState) -> Result<(), ErrorCode> {
        let payload = serde_json::to_vec(states).map_err(|_| ErrorCode::MqttFailure)?;
        self.publish(STATUS_TOPIC, payload).await
    }
}

// =============================================================================
// Tests
// =============================================================================
