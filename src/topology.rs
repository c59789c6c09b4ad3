//! Single-node and two-node topologies.
//!
//! A [`Topology`] owns the [`LifecycleManager`] that built it, so dropping a
//! topology (or failing halfway through building one) releases every
//! container and the network.

use crate::client::NodeClient;
use crate::config::HarnessConfig;
use crate::error::{Error, Result};
use crate::lifecycle::{LifecycleManager, NodeHandle, TeardownReport};
use crate::node::{Identity, NodeSpec, NODE1_NAME, NODE2_NAME, SINGLE_NODE_NAME};
use crate::runtime::ContainerRuntime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::info;

/// Shape of a topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopologyKind {
    /// One node, `waku_node_single`.
    Single,
    /// `waku_node1` plus `waku_node2` bootstrapped from it.
    Pair,
}

impl fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => f.write_str("single"),
            Self::Pair => f.write_str("pair"),
        }
    }
}

/// A started node and its control-plane client.
#[derive(Debug, Clone)]
pub struct TopologyNode {
    /// Lifecycle handle.
    pub handle: NodeHandle,
    /// Client bound to the node's REST port.
    pub client: NodeClient,
    /// Identity, if it was resolved while building the topology.
    pub identity: Option<Identity>,
}

/// Machine-readable description of a running topology.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopologyManifest {
    /// Topology shape.
    pub kind: TopologyKind,
    /// Harness network name.
    pub network: String,
    /// Nodes in start order.
    pub nodes: Vec<NodeManifest>,
    /// Creation time in RFC3339.
    pub created_at: String,
}

/// One node of a [`TopologyManifest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeManifest {
    /// Container name.
    pub name: String,
    /// REST base URL.
    pub rest_url: String,
    /// Address on the harness network.
    pub ip: Ipv4Addr,
    /// Node identity, if resolved.
    pub identity: Option<Identity>,
}

/// Network plus started nodes, owned for the duration of a scenario.
pub struct Topology {
    kind: TopologyKind,
    lifecycle: LifecycleManager,
    nodes: Vec<TopologyNode>,
}

impl Topology {
    /// Build a topology of the given shape.
    ///
    /// # Errors
    ///
    /// Returns an error if provisioning fails; resources created so far are
    /// released before returning.
    pub async fn start(
        kind: TopologyKind,
        config: Arc<HarnessConfig>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Self> {
        match kind {
            TopologyKind::Single => Self::single_node(config, runtime).await,
            TopologyKind::Pair => Self::two_nodes(config, runtime).await,
        }
    }

    /// Network plus `waku_node_single` on node1's address and ports.
    ///
    /// # Errors
    ///
    /// Returns an error if provisioning fails.
    pub async fn single_node(
        config: Arc<HarnessConfig>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Self> {
        let mut lifecycle = LifecycleManager::new(Arc::clone(&config), runtime);
        lifecycle.create_network().await?;

        let spec = NodeSpec::new(SINGLE_NODE_NAME, &config.node1);
        let handle = lifecycle.start_node(&spec).await?;
        let client = handle.client(&config.endpoints);
        info!("Single-node topology ready at {}", handle.rest_url);

        Ok(Self {
            kind: TopologyKind::Single,
            lifecycle,
            nodes: vec![TopologyNode {
                handle,
                client,
                identity: None,
            }],
        })
    }

    /// Network plus `waku_node1`, then `waku_node2` bootstrapped from node1's
    /// identity.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the two node assignments collide,
    /// `Error::Provisioning` if node1 reports no identity, or any error from
    /// starting either node.
    pub async fn two_nodes(
        config: Arc<HarnessConfig>,
        runtime: Arc<dyn ContainerRuntime>,
    ) -> Result<Self> {
        config.validate()?;
        let mut lifecycle = LifecycleManager::new(Arc::clone(&config), runtime);
        lifecycle.create_network().await?;

        let node1 = lifecycle
            .start_node(&NodeSpec::new(NODE1_NAME, &config.node1))
            .await?;
        let client1 = node1.client(&config.endpoints);
        let identity = client1.identity().await?.ok_or_else(|| {
            Error::Provisioning(format!("{NODE1_NAME} did not report an identity"))
        })?;
        info!("{} identity: {}", NODE1_NAME, identity);

        let spec2 = NodeSpec::new(NODE2_NAME, &config.node2).with_bootstrap(identity.clone());
        let node2 = lifecycle.start_node(&spec2).await?;
        let client2 = node2.client(&config.endpoints);
        info!("Two-node topology ready");

        Ok(Self {
            kind: TopologyKind::Pair,
            lifecycle,
            nodes: vec![
                TopologyNode {
                    handle: node1,
                    client: client1,
                    identity: Some(identity),
                },
                TopologyNode {
                    handle: node2,
                    client: client2,
                    identity: None,
                },
            ],
        })
    }

    /// Topology shape.
    #[must_use]
    pub fn kind(&self) -> TopologyKind {
        self.kind
    }

    /// Started nodes in start order.
    #[must_use]
    pub fn nodes(&self) -> &[TopologyNode] {
        &self.nodes
    }

    /// Node at `index` in start order.
    #[must_use]
    pub fn node(&self, index: usize) -> Option<&TopologyNode> {
        self.nodes.get(index)
    }

    /// Lifecycle manager that owns the topology's resources.
    pub fn lifecycle_mut(&mut self) -> &mut LifecycleManager {
        &mut self.lifecycle
    }

    /// Describe the running topology.
    #[must_use]
    pub fn manifest(&self) -> TopologyManifest {
        TopologyManifest {
            kind: self.kind,
            network: self
                .lifecycle
                .network()
                .unwrap_or(self.lifecycle.config().docker.network_name.as_str())
                .to_string(),
            nodes: self
                .nodes
                .iter()
                .map(|n| NodeManifest {
                    name: n.handle.name.clone(),
                    rest_url: n.handle.rest_url.clone(),
                    ip: n.handle.spec.ip,
                    identity: n.identity.clone(),
                })
                .collect(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Stop and remove every node and the network.
    pub async fn teardown(mut self) -> TeardownReport {
        self.lifecycle.teardown().await
    }
}
