//! Checks of the rig itself that run without a Docker daemon.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::init_test_tracing;
use std::sync::Arc;
use waku_harness::{DockerCli, Error, HarnessConfig, Topology, TopologyKind};

fn missing_runtime() -> Arc<DockerCli> {
    Arc::new(DockerCli::with_binary("/nonexistent/waku-harness/docker"))
}

#[tokio::test]
async fn test_unreachable_runtime_is_unavailable() {
    init_test_tracing();
    assert!(!missing_runtime().is_available().await);
}

#[tokio::test]
async fn test_topology_fails_fast_without_runtime() {
    init_test_tracing();
    let config = Arc::new(HarnessConfig::default());

    let result = Topology::start(TopologyKind::Single, config, missing_runtime()).await;
    assert!(matches!(result, Err(Error::Runtime(_))));
}

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("harness.toml");

    let mut config = HarnessConfig::default();
    config.docker.image = "wakuorg/nwaku:v0.30.0".to_string();
    config.timeouts.peer_connection_secs = 90;
    config.to_file(&path).unwrap();

    let loaded = HarnessConfig::from_file(&path).unwrap();
    assert_eq!(loaded.docker.image, "wakuorg/nwaku:v0.30.0");
    assert_eq!(loaded.timeouts.peer_connection_secs, 90);
    assert_eq!(loaded.node2.ports, config.node2.ports);
    loaded.validate().unwrap();
}
