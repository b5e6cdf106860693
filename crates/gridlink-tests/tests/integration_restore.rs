// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Gridlink Authors. All rights reserved.

//! Persistence restore across gateway restarts.

use std::time::Duration;

use gridlink_core::message::NodeCtl;
use gridlink_core::types::{NodeKind, NodeName};
use gridlink_core::Store;
use gridlink_modbus::Area;
use gridlink_tests::common::builders::{int16_tag, static_float_tag};
use gridlink_tests::common::harness::{wait_until, TestGateway};

#[tokio::test(start_paused = true)]
async fn test_configuration_survives_restart() {
    let store = {
        let gateway = TestGateway::start().await;
        gateway
            .manager
            .add_node("d1".into(), "modbus", Some("{\"unit\":1}".into()))
            .await
            .unwrap();
        gateway
            .manager
            .add_node("a1".into(), "probe", None)
            .await
            .unwrap();
        gateway
            .manager
            .add_group(&"d1".into(), "g1", 500)
            .await
            .unwrap();
        gateway
            .manager
            .add_tags(
                &"d1".into(),
                "g1",
                vec![int16_tag("t1", "1!400001"), static_float_tag("t2", 1.5)],
            )
            .await
            .unwrap();
        gateway
            .manager
            .subscribe(&"a1".into(), &"d1".into(), "g1", None)
            .await
            .unwrap();

        // Orderly shutdown keeps the persisted rows.
        gateway.manager.shutdown().await;
        gateway.store.clone()
    };

    let gateway = TestGateway::start_with_store(store).await;
    gateway.manager.restore().await.unwrap();

    let drivers = gateway.manager.get_nodes(Some(NodeKind::Driver)).await;
    assert_eq!(drivers.len(), 1);
    assert_eq!(drivers[0].name, NodeName::new("d1"));

    let groups = gateway.manager.get_groups(&"d1".into()).await.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].name, "g1");
    assert_eq!(groups[0].interval_ms, 500);
    assert_eq!(groups[0].tag_count, 2);

    let subs = gateway.manager.get_subscriptions(&"a1".into()).await;
    assert_eq!(subs.len(), 1);
    assert_eq!(subs[0].driver, NodeName::new("d1"));

    // The restored gateway polls as configured.
    gateway
        .device
        .write_words(1, Area::HoldingRegister, 0, &[0x0700]);
    gateway
        .manager
        .node_ctl(&"d1".into(), NodeCtl::Start)
        .await
        .unwrap();
    gateway
        .manager
        .node_ctl(&"a1".into(), NodeCtl::Start)
        .await
        .unwrap();

    assert!(
        wait_until(
            || !gateway.probe.snapshots().is_empty(),
            Duration::from_secs(30)
        )
        .await,
        "restored driver must resume polling"
    );
    let snapshot = &gateway.probe.snapshots()[0];
    assert!(snapshot.values.iter().any(|v| v.tag == "t1"));
    assert!(snapshot.values.iter().any(|v| v.tag == "t2"));
}

#[tokio::test]
async fn test_admin_delete_erases_persisted_rows() {
    let gateway = TestGateway::start().await;
    gateway
        .manager
        .add_node("d1".into(), "modbus", None)
        .await
        .unwrap();
    gateway
        .manager
        .add_group(&"d1".into(), "g1", 1000)
        .await
        .unwrap();

    gateway.manager.del_node(&"d1".into()).await.unwrap();
    assert!(gateway.store.load_nodes().unwrap().is_empty());
    assert!(gateway.store.load_groups(&"d1".into()).unwrap().is_empty());
}
