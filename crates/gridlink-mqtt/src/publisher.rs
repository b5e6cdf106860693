// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! The publisher seam between the MQTT app plugin and a broker client.
//!
//! The concrete MQTT client library lives outside the gateway; the plugin
//! only depends on this trait. [`MemoryPublisher`] records messages for
//! tests and for broker-less deployments.

use async_trait::async_trait;
use parking_lot::Mutex;

use gridlink_core::error::ErrorCode;

/// A northbound message sink.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes one payload to `topic`.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ErrorCode>;

    /// Returns `true` while the sink can accept messages.
    fn is_connected(&self) -> bool;
}

/// One recorded message.
#[derive(Debug, Clone, PartialEq)]
pub struct Published {
    /// Destination topic.
    pub topic: String,
    /// Raw payload.
    pub payload: Vec<u8>,
}

/// In-memory publisher recording everything it is handed.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    messages: Mutex<Vec<Published>>,
}

impl MemoryPublisher {
    /// Creates an empty publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything published so far.
    pub fn messages(&self) -> Vec<Published> {
        self.messages.lock().clone()
    }

    /// Messages published to one topic.
    pub fn on_topic(&self, topic: &str) -> Vec<Published> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ErrorCode> {
        self.messages.lock().push(Published {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_publisher_records() {
        let publisher = MemoryPublisher::new();
        publisher.publish("a/b", b"x".to_vec()).await.unwrap();
        publisher.publish("a/c", b"y".to_vec()).await.unwrap();

        assert_eq!(publisher.messages().len(), 2);
        assert_eq!(publisher.on_topic("a/b").len(), 1);
        assert!(publisher.is_connected());
    }
}
