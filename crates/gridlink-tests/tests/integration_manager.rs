// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! Control-plane scenarios: tag conflicts, rename cascades, node deletion,
//! subscription rules and bulk driver creation.

use std::time::Duration;

use gridlink_core::error::ErrorCode;
use gridlink_core::manager::DriverSpec;
use gridlink_core::types::{NodeKind, NodeName};
use gridlink_core::Store;
use gridlink_tests::common::builders::{group_tags, int16_tag, writable_int16_tag};
use gridlink_tests::common::harness::{wait_until, TestGateway};

async fn seed_driver_and_app(gateway: &TestGateway) {
    gateway
        .manager
        .add_node("d1".into(), "modbus", None)
        .await
        .unwrap();
    gateway
        .manager
        .add_node("a1".into(), "probe", None)
        .await
        .unwrap();
    gateway
        .manager
        .add_group(&"d1".into(), "g1", 1000)
        .await
        .unwrap();
    gateway
        .manager
        .add_tags(&"d1".into(), "g1", vec![int16_tag("t1", "1!400001")])
        .await
        .unwrap();
}

#[tokio::test]
async fn test_duplicate_tag_name_conflict() {
    let gateway = TestGateway::start().await;
    seed_driver_and_app(&gateway).await;

    let err = gateway
        .manager
        .add_tags(&"d1".into(), "g1", vec![int16_tag("t1", "1!400002")])
        .await
        .unwrap_err();
    assert_eq!(err, ErrorCode::TagNameConflict);

    let tags = gateway
        .manager
        .get_tags(&"d1".into(), "g1", None, None)
        .await
        .unwrap();
    assert_eq!(tags.len(), 1);
}

#[tokio::test]
async fn test_node_lifecycle_errors() {
    let gateway = TestGateway::start().await;
    seed_driver_and_app(&gateway).await;

    assert_eq!(
        gateway
            .manager
            .add_node("d1".into(), "modbus", None)
            .await
            .unwrap_err(),
        ErrorCode::NodeExist
    );
    assert_eq!(
        gateway
            .manager
            .add_node("d2".into(), "ghost", None)
            .await
            .unwrap_err(),
        ErrorCode::LibraryNotFound
    );
    assert_eq!(
        gateway.manager.del_node(&"ghost".into()).await.unwrap_err(),
        ErrorCode::NodeNotExist
    );
}

#[tokio::test]
async fn test_subscription_rules() {
    let gateway = TestGateway::start().await;
    seed_driver_and_app(&gateway).await;

    // The group must exist on the driver.
    assert_eq!(
        gateway
            .manager
            .subscribe(&"a1".into(), &"d1".into(), "ghost", None)
            .await
            .unwrap_err(),
        ErrorCode::GroupNotExist
    );
    // Only apps subscribe.
    assert_eq!(
        gateway
            .manager
            .subscribe(&"d1".into(), &"d1".into(), "g1", None)
            .await
            .unwrap_err(),
        ErrorCode::NodeNotAllowSubscribe
    );

    // Subscribing twice succeeds and refreshes the params.
    gateway
        .manager
        .subscribe(&"a1".into(), &"d1".into(), "g1", Some("{\"qos\":0}".into()))
        .await
        .unwrap();
    gateway
        .manager
        .subscribe(&"a1".into(), &"d1".into(), "g1", Some("{\"qos\":1}".into()))
        .await
        .unwrap();

    let subs = gateway.manager.get_subscriptions(&"a1".into()).await;
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].params.as_deref(), Some("{\"qos\":1}"));

    // Unsubscribing a missing triple is a successful no-op.
    gateway
        .manager
        .unsubscribe(&"a1".into(), &"d1".into(), "ghost")
        .await
        .unwrap();
    gateway
        .manager
        .unsubscribe(&"a1".into(), &"d1".into(), "g1")
        .await
        .unwrap();
    assert!(gateway.manager.get_subscriptions(&"a1".into()).await.is_empty());
}

#[tokio::test]
async fn test_rename_driver_cascades_subscriptions() {
    let gateway = TestGateway::start().await;
    seed_driver_and_app(&gateway).await;
    gateway
        .manager
        .subscribe(&"a1".into(), &"d1".into(), "g1", None)
        .await
        .unwrap();

    gateway
        .manager
        .rename_node(&"d1".into(), "d1b".into())
        .await
        .unwrap();

    let subs = gateway.manager.get_subscriptions(&"a1".into()).await;
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].driver, NodeName::new("d1b"));
    assert_eq!(subs[0].group, "g1");

    // The node registry follows the rename.
    let nodes = gateway.manager.get_nodes(Some(NodeKind::Driver)).await;
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].name, NodeName::new("d1b"));
    assert!(gateway
        .manager
        .get_groups(&"d1".into())
        .await
        .is_err());
    assert_eq!(
        gateway.manager.get_groups(&"d1b".into()).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_delete_driver_notifies_each_subscriber_once() {
    let gateway = TestGateway::start().await;
    seed_driver_and_app(&gateway).await;
    gateway
        .manager
        .add_group(&"d1".into(), "g2", 1000)
        .await
        .unwrap();
    // Two groups of the same driver, one subscriber app.
    gateway
        .manager
        .subscribe(&"a1".into(), &"d1".into(), "g1", None)
        .await
        .unwrap();
    gateway
        .manager
        .subscribe(&"a1".into(), &"d1".into(), "g2", None)
        .await
        .unwrap();

    gateway.manager.del_node(&"d1".into()).await.unwrap();

    assert!(
        wait_until(
            || gateway.probe.deleted().len() == 1,
            Duration::from_secs(5)
        )
        .await,
        "exactly one NodeDeleted per former subscriber"
    );
    assert_eq!(gateway.probe.deleted()[0], NodeName::new("d1"));
    assert!(gateway.manager.get_subscriptions(&"a1".into()).await.is_empty());
    assert!(gateway.manager.get_nodes(Some(NodeKind::Driver)).await.is_empty());
}

#[tokio::test]
async fn test_delete_app_unsubscribes_drivers() {
    let gateway = TestGateway::start().await;
    seed_driver_and_app(&gateway).await;
    gateway
        .manager
        .subscribe(&"a1".into(), &"d1".into(), "g1", None)
        .await
        .unwrap();

    gateway.manager.del_node(&"a1".into()).await.unwrap();
    assert!(gateway.manager.get_subscriptions(&"a1".into()).await.is_empty());
    assert!(gateway.manager.get_nodes(Some(NodeKind::App)).await.is_empty());
}

#[tokio::test]
async fn test_group_delete_drops_subscriptions() {
    let gateway = TestGateway::start().await;
    seed_driver_and_app(&gateway).await;
    gateway
        .manager
        .subscribe(&"a1".into(), &"d1".into(), "g1", None)
        .await
        .unwrap();

    gateway.manager.del_group(&"d1".into(), "g1").await.unwrap();
    assert!(gateway.manager.get_subscriptions(&"a1".into()).await.is_empty());
    assert!(gateway.manager.get_groups(&"d1".into()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_add_drivers_bulk_success() {
    let gateway = TestGateway::start().await;

    gateway
        .manager
        .add_drivers(vec![
            DriverSpec {
                node: "plc-a".into(),
                plugin: "modbus".into(),
                setting: None,
                groups: vec![group_tags(
                    "fast",
                    100,
                    vec![writable_int16_tag("t1", "1!400001")],
                )],
            },
            DriverSpec {
                node: "plc-b".into(),
                plugin: "modbus".into(),
                setting: None,
                groups: vec![group_tags("slow", 5000, vec![int16_tag("t2", "2!400001")])],
            },
        ])
        .await
        .unwrap();

    let nodes = gateway.manager.get_nodes(Some(NodeKind::Driver)).await;
    assert_eq!(nodes.len(), 2);
    assert_eq!(
        gateway
            .manager
            .get_tags(&"plc-a".into(), "fast", None, None)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_add_drivers_rolls_back_on_failure() {
    let gateway = TestGateway::start().await;

    let err = gateway
        .manager
        .add_drivers(vec![
            DriverSpec {
                node: "plc-a".into(),
                plugin: "modbus".into(),
                setting: None,
                groups: vec![group_tags("g", 100, vec![int16_tag("ok", "1!400001")])],
            },
            DriverSpec {
                node: "plc-b".into(),
                plugin: "modbus".into(),
                setting: None,
                // An unparsable address fails validation on the driver side.
                groups: vec![group_tags("g", 100, vec![int16_tag("bad", "nonsense")])],
            },
        ])
        .await
        .unwrap_err();
    assert_eq!(err, ErrorCode::Internal);

    // The first driver was rolled back too.
    assert!(gateway.manager.get_nodes(None).await.is_empty());
    assert!(gateway.store.load_nodes().unwrap().is_empty());
}

#[tokio::test]
async fn test_add_drivers_preflight() {
    let gateway = TestGateway::start().await;

    let err = gateway
        .manager
        .add_drivers(vec![DriverSpec {
            node: "x".into(),
            plugin: "ghost".into(),
            setting: None,
            groups: vec![],
        }])
        .await
        .unwrap_err();
    assert_eq!(err, ErrorCode::LibraryNotFound);

    // An app plugin cannot provision drivers.
    let err = gateway
        .manager
        .add_drivers(vec![DriverSpec {
            node: "x".into(),
            plugin: "probe".into(),
            setting: None,
            groups: vec![],
        }])
        .await
        .unwrap_err();
    assert_eq!(err, ErrorCode::PluginTypeNotSupport);
}

#[tokio::test]
async fn test_node_setting_roundtrip() {
    let gateway = TestGateway::start().await;
    seed_driver_and_app(&gateway).await;

    gateway
        .manager
        .set_node_setting(&"d1".into(), "{\"host\":\"10.0.0.5\"}")
        .await
        .unwrap();
    let setting = gateway
        .manager
        .get_node_setting(&"d1".into())
        .await
        .unwrap();
    assert_eq!(setting.as_deref(), Some("{\"host\":\"10.0.0.5\"}"));
}
