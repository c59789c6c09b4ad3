//! Declarative description of one node process.
//!
//! A [`NodeSpec`] fixes everything about a node before it is launched: its
//! container name, its ports, the address it advertises and, for dependent
//! nodes, the identity of the peer it bootstraps from. The lifecycle manager
//! turns it into a [`ContainerSpec`].

use crate::config::{DockerConfig, NodeDefaults};
use crate::ports::PortSet;
use crate::runtime::{ContainerSpec, PortBinding};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

// =============================================================================
// Node Names
// =============================================================================

/// Container name of the node in a single-node topology.
pub const SINGLE_NODE_NAME: &str = "waku_node_single";

/// Container name of the first node of a two-node topology.
pub const NODE1_NAME: &str = "waku_node1";

/// Container name of the second node of a two-node topology.
pub const NODE2_NAME: &str = "waku_node2";

/// Every container name the harness may create.
pub const ALL_NODE_NAMES: [&str; 3] = [SINGLE_NODE_NAME, NODE1_NAME, NODE2_NAME];

/// Prefix of a node record in text form.
const ENR_PREFIX: &str = "enr:";

// =============================================================================
// Identity
// =============================================================================

/// Opaque connection descriptor a node publishes about itself (its ENR).
///
/// Produced by one node and handed, unchanged, to the node that bootstraps
/// from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Wrap a descriptor string.
    #[must_use]
    pub fn new(descriptor: impl Into<String>) -> Self {
        Self(descriptor.into())
    }

    /// The descriptor as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the descriptor is a text-encoded node record.
    #[must_use]
    pub fn is_enr(&self) -> bool {
        self.0.starts_with(ENR_PREFIX)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Node State
// =============================================================================

/// Lifecycle phase of a node process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// No process exists.
    Absent,
    /// Waiting for host ports to become free.
    PortCheck,
    /// Stale process removed, fresh process launched.
    Starting,
    /// Being connected to the harness network.
    Attaching,
    /// Running and settled.
    Ready,
    /// Being stopped and removed.
    Stopping,
    /// Stopped and removed.
    Stopped,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Absent => "absent",
            Self::PortCheck => "port-check",
            Self::Starting => "starting",
            Self::Attaching => "attaching",
            Self::Ready => "ready",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Node Spec
// =============================================================================

/// Everything needed to launch one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    /// Container name, unique on the host.
    pub name: String,
    /// Ports bound by the node, published 1:1 on the host.
    pub ports: PortSet,
    /// Static address on the harness network; also advertised to peers.
    pub ip: Ipv4Addr,
    /// Identity of the peer to bootstrap discovery from.
    pub bootstrap: Option<Identity>,
}

impl NodeSpec {
    /// Spec for `name` using a configured address and port set.
    #[must_use]
    pub fn new(name: impl Into<String>, defaults: &NodeDefaults) -> Self {
        Self {
            name: name.into(),
            ports: defaults.ports,
            ip: defaults.ip,
            bootstrap: None,
        }
    }

    /// Bootstrap discovery from `identity`.
    #[must_use]
    pub fn with_bootstrap(mut self, identity: Identity) -> Self {
        self.bootstrap = Some(identity);
        self
    }

    /// Command-line arguments for the node image.
    #[must_use]
    pub fn args(&self, docker: &DockerConfig) -> Vec<String> {
        let mut args = vec![
            "--listen-address=0.0.0.0".to_string(),
            "--rest=true".to_string(),
            "--rest-admin=true".to_string(),
            "--websocket-support=true".to_string(),
            format!("--log-level={}", docker.node_log_level),
            "--rest-relay-cache-capacity=100".to_string(),
            format!("--websocket-port={}", self.ports.websocket),
            format!("--rest-port={}", self.ports.rest),
            format!("--tcp-port={}", self.ports.tcp),
            format!("--discv5-udp-port={}", self.ports.discv5),
            "--rest-address=0.0.0.0".to_string(),
            format!("--nat=extip:{}", self.ip),
            "--peer-exchange=true".to_string(),
            "--discv5-discovery=true".to_string(),
            "--relay=true".to_string(),
        ];
        if let Some(ref enr) = self.bootstrap {
            args.push(format!("--discv5-bootstrap-node={enr}"));
        }
        args
    }

    /// Host port publications, one per role, same port on both sides.
    #[must_use]
    pub fn port_bindings(&self) -> Vec<PortBinding> {
        self.ports
            .entries()
            .into_iter()
            .map(|(role, port)| PortBinding {
                container_port: port,
                host_port: port,
                protocol: role.protocol(),
            })
            .collect()
    }

    /// Container description for the runtime.
    #[must_use]
    pub fn container_spec(&self, docker: &DockerConfig) -> ContainerSpec {
        ContainerSpec {
            name: self.name.clone(),
            image: docker.image.clone(),
            args: self.args(docker),
            ports: self.port_bindings(),
        }
    }

    /// Base URL of the node's REST control plane as seen from the host.
    #[must_use]
    pub fn rest_url(&self, host: Ipv4Addr) -> String {
        format!("http://{host}:{}", self.ports.rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use crate::ports::Protocol;

    #[test]
    fn test_identity() {
        let id = Identity::new("enr:-IO4QDxToTg86pPCK2KvMeVCXC2ADVZWrxXSvNZeaoa0");
        assert!(id.is_enr());
        assert_eq!(id.to_string(), id.as_str());
        assert!(!Identity::new("/ip4/172.18.111.225/tcp/21162").is_enr());
    }

    #[test]
    fn test_args_without_bootstrap() {
        let config = HarnessConfig::default();
        let spec = NodeSpec::new(NODE1_NAME, &config.node1);
        let args = spec.args(&config.docker);

        assert!(args.contains(&"--rest-port=21161".to_string()));
        assert!(args.contains(&"--websocket-port=21163".to_string()));
        assert!(args.contains(&"--tcp-port=21162".to_string()));
        assert!(args.contains(&"--discv5-udp-port=21164".to_string()));
        assert!(args.contains(&"--nat=extip:172.18.111.225".to_string()));
        assert!(args.contains(&"--log-level=TRACE".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--discv5-bootstrap-node")));
    }

    #[test]
    fn test_args_with_bootstrap() {
        let config = HarnessConfig::default();
        let spec = NodeSpec::new(NODE2_NAME, &config.node2)
            .with_bootstrap(Identity::new("enr:-abc"));
        let args = spec.args(&config.docker);
        assert_eq!(args.last().map(String::as_str), Some("--discv5-bootstrap-node=enr:-abc"));
        assert!(args.contains(&"--nat=extip:172.18.111.226".to_string()));
    }

    #[test]
    fn test_container_spec_publishes_every_role() {
        let config = HarnessConfig::default();
        let spec = NodeSpec::new(SINGLE_NODE_NAME, &config.node1);
        let container = spec.container_spec(&config.docker);

        assert_eq!(container.name, SINGLE_NODE_NAME);
        assert_eq!(container.image, "wakuorg/nwaku:v0.24.0");
        assert_eq!(container.ports.len(), 5);
        let udp: Vec<u16> = container
            .ports
            .iter()
            .filter(|b| b.protocol == Protocol::Udp)
            .map(|b| b.host_port)
            .collect();
        assert_eq!(udp, vec![21164]);
        assert!(container
            .ports
            .iter()
            .any(|b| b.to_publish_arg() == "21165:21165/tcp"));
    }

    #[test]
    fn test_rest_url() {
        let config = HarnessConfig::default();
        let spec = NodeSpec::new(NODE1_NAME, &config.node1);
        assert_eq!(spec.rest_url(config.docker.host), "http://127.0.0.1:21161");
    }
}
