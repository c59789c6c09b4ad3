//! Protocol scenarios against live nwaku containers.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::E2eFixture;
use serial_test::serial;
use waku_harness::node::SINGLE_NODE_NAME;
use waku_harness::scenario::Outcome;
use waku_harness::{AssertionMode, ContainerRuntime, NodeSpec, Scenarios, TopologyKind};

#[tokio::test]
#[serial]
#[ignore = "Requires Docker and the nwaku image - run with --ignored"]
async fn test_node_reports_enr_identity() {
    let fixture = E2eFixture::new().await;
    let topology = fixture.topology(TopologyKind::Single).await;
    let node = &topology.node(0).unwrap().client;

    let info = node.get_node_info().await.expect("node info");
    let enr = info.enr_uri.unwrap_or_default();
    assert!(enr.starts_with("enr:"), "unexpected enrUri: {enr:?}");
    assert!(!info.listen_addresses.is_empty());

    let report = topology.teardown().await;
    assert!(report.is_clean(), "teardown failures: {report}");
}

#[tokio::test]
#[serial]
#[ignore = "Requires Docker and the nwaku image - run with --ignored"]
async fn test_single_node_relay_round_trip() {
    let fixture = E2eFixture::new().await;
    let topology = fixture.topology(TopologyKind::Single).await;
    let node = &topology.node(0).unwrap().client;
    let scenarios = Scenarios::new(&fixture.config);

    // Retrieval polls for at most the message propagation timeout (10s).
    let outcome = scenarios
        .relay_round_trip(node)
        .await
        .expect("node unreachable");
    assert_eq!(outcome, Outcome::Passed, "round trip: {outcome}");

    assert!(topology.teardown().await.is_clean());
}

#[tokio::test]
#[serial]
#[ignore = "Requires Docker and the nwaku image - run with --ignored"]
async fn test_two_nodes_discover_each_other() {
    let fixture = E2eFixture::new().await;
    let topology = fixture.topology(TopologyKind::Pair).await;
    let node2 = &topology.node(1).unwrap().client;

    let outcome = Scenarios::new(&fixture.config).peer_discovery(node2).await;
    assert_eq!(outcome, Outcome::Passed, "peer discovery: {outcome}");

    let peers = node2.get_peers().await.expect("peers");
    assert!(!peers.is_empty());

    assert!(topology.teardown().await.is_clean());
}

#[tokio::test]
#[serial]
#[ignore = "Requires Docker and the nwaku image - run with --ignored"]
async fn test_inter_node_message_best_effort() {
    let fixture = E2eFixture::new().await;
    let topology = fixture.topology(TopologyKind::Pair).await;
    let node1 = &topology.node(0).unwrap().client;
    let node2 = &topology.node(1).unwrap().client;

    let outcome = Scenarios::new(&fixture.config)
        .with_mode(AssertionMode::BestEffort)
        .inter_node_message(node1, node2)
        .await
        .expect("nodes unreachable");
    assert!(!outcome.is_failure(), "inter-node message: {outcome}");

    assert!(topology.teardown().await.is_clean());
}

#[tokio::test]
#[serial]
#[ignore = "Requires Docker and the nwaku image - run with --ignored"]
async fn test_restart_replaces_existing_container() {
    let fixture = E2eFixture::new().await;
    let mut topology = fixture.topology(TopologyKind::Single).await;

    let spec = NodeSpec::new(SINGLE_NODE_NAME, &fixture.config.node1);
    let handle = topology
        .lifecycle_mut()
        .start_node(&spec)
        .await
        .expect("restart");
    assert!(handle
        .client(&fixture.config.endpoints)
        .get_enr_uri()
        .await
        .expect("enr")
        .starts_with("enr:"));

    let existing = fixture
        .docker
        .list_containers(SINGLE_NODE_NAME)
        .await
        .expect("list containers");
    assert_eq!(existing, vec![SINGLE_NODE_NAME.to_string()]);
    assert_eq!(topology.lifecycle_mut().containers().len(), 1);

    assert!(topology.teardown().await.is_clean());
    let leftover = fixture
        .docker
        .list_containers(SINGLE_NODE_NAME)
        .await
        .expect("list containers");
    assert!(leftover.is_empty());
}
