// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! Northbound MQTT bridge scenarios.

use std::sync::Arc;
use std::time::Duration;

use gridlink_core::error::ErrorCode;
use gridlink_core::message::NodeCtl;
use gridlink_modbus::Area;
use gridlink_mqtt::{MemoryPublisher, MqttModule};
use gridlink_tests::common::builders::writable_int16_tag;
use gridlink_tests::common::harness::{wait_until, TestGateway};

async fn seed_mqtt_gateway(gateway: &TestGateway, publisher: Arc<MemoryPublisher>) {
    gateway
        .manager
        .add_plugin(Arc::new(MqttModule::with_publisher(publisher)))
        .await
        .unwrap();

    gateway
        .device
        .write_words(1, Area::HoldingRegister, 0, &[0x0900]);
    gateway
        .manager
        .add_node("d1".into(), "modbus", None)
        .await
        .unwrap();
    gateway
        .manager
        .add_node("north".into(), "mqtt", None)
        .await
        .unwrap();
    gateway
        .manager
        .add_group(&"d1".into(), "g1", 200)
        .await
        .unwrap();
    gateway
        .manager
        .add_tags(&"d1".into(), "g1", vec![writable_int16_tag("t1", "1!400001")])
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_snapshots_bridge_to_topic() {
    let gateway = TestGateway::start().await;
    let publisher = Arc::new(MemoryPublisher::new());
    seed_mqtt_gateway(&gateway, publisher.clone()).await;

    gateway
        .manager
        .subscribe(
            &"north".into(),
            &"d1".into(),
            "g1",
            Some("{\"topic\":\"plant/line1\"}".into()),
        )
        .await
        .unwrap();
    gateway
        .manager
        .node_ctl(&"d1".into(), NodeCtl::Start)
        .await
        .unwrap();
    gateway
        .manager
        .node_ctl(&"north".into(), NodeCtl::Start)
        .await
        .unwrap();

    assert!(
        wait_until(
            || !publisher.on_topic("plant/line1").is_empty(),
            Duration::from_secs(30)
        )
        .await
    );

    let message = &publisher.on_topic("plant/line1")[0];
    let json: serde_json::Value = serde_json::from_slice(&message.payload).unwrap();
    assert_eq!(json["node"], "d1");
    assert_eq!(json["group"], "g1");
    assert_eq!(json["values"]["t1"], 9);
}

#[tokio::test]
async fn test_empty_topic_param_rejected_at_subscribe() {
    let gateway = TestGateway::start().await;
    let publisher = Arc::new(MemoryPublisher::new());
    seed_mqtt_gateway(&gateway, publisher).await;

    let err = gateway
        .manager
        .subscribe(
            &"north".into(),
            &"d1".into(),
            "g1",
            Some("{\"topic\":\"\"}".into()),
        )
        .await
        .unwrap_err();
    assert_eq!(err, ErrorCode::MqttSubscribeFailure);
    assert!(gateway
        .manager
        .get_subscriptions(&"north".into())
        .await
        .is_empty());
}
