//! Shared fixture for the Docker-backed tests.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;
use waku_harness::{DockerCli, HarnessConfig, Topology, TopologyKind};

// =============================================================================
// Test Tracing
// =============================================================================

static TRACING: Once = Once::new();

/// Route harness logs to the test writer. `RUST_LOG` wins over the default.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("waku_harness=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

// =============================================================================
// Fixture
// =============================================================================

/// Effective configuration plus a Docker client.
pub struct E2eFixture {
    /// Configuration shared by every node of the test.
    pub config: Arc<HarnessConfig>,
    /// Runtime the topologies are provisioned on.
    pub docker: Arc<DockerCli>,
}

impl E2eFixture {
    /// Load configuration from the environment and check the daemon.
    ///
    /// Panics if Docker is not reachable: the caller opted in with
    /// `--ignored`.
    pub async fn new() -> Self {
        init_test_tracing();
        let config = HarnessConfig::load(None).expect("invalid harness configuration");
        let docker = DockerCli::new();
        assert!(
            docker.is_available().await,
            "Docker daemon is not reachable"
        );
        Self {
            config: Arc::new(config),
            docker: Arc::new(docker),
        }
    }

    /// Start a topology of `kind` on the fixture's runtime.
    pub async fn topology(&self, kind: TopologyKind) -> Topology {
        Topology::start(kind, Arc::clone(&self.config), self.docker.clone())
            .await
            .unwrap_or_else(|e| panic!("failed to start {kind} topology: {e}"))
    }
}
