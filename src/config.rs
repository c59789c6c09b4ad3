//! Configuration for waku-harness.
//!
//! A [`HarnessConfig`] is built once (defaults, then an optional TOML file,
//! then environment overrides) and handed by reference to every component.
//! Environment variable names follow the settings names the harness has
//! always used, e.g. `DOCKER_IMAGE` or `PEER_CONNECTION_TIMEOUT`.

use crate::error::{Error, Result};
use crate::ports::PortSet;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

/// Top-level harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Container runtime settings.
    #[serde(default)]
    pub docker: DockerConfig,

    /// First node (also used for single-node topologies).
    #[serde(default = "default_node1")]
    pub node1: NodeDefaults,

    /// Second node of a two-node topology.
    #[serde(default = "default_node2")]
    pub node2: NodeDefaults,

    /// Default topic and payload used by scenarios.
    #[serde(default)]
    pub messages: MessageDefaults,

    /// Timeouts and poll intervals.
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Control-plane endpoint paths.
    #[serde(default)]
    pub endpoints: ApiEndpoints,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            docker: DockerConfig::default(),
            node1: default_node1(),
            node2: default_node2(),
            messages: MessageDefaults::default(),
            timeouts: Timeouts::default(),
            endpoints: ApiEndpoints::default(),
        }
    }
}

/// Container runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Node image reference.
    #[serde(default = "default_image")]
    pub image: String,

    /// Name of the isolated network.
    #[serde(default = "default_network_name")]
    pub network_name: String,

    /// Network subnet in CIDR notation.
    #[serde(default = "default_subnet")]
    pub subnet: String,

    /// Network gateway.
    #[serde(default = "default_gateway")]
    pub gateway: Ipv4Addr,

    /// Host address where published node ports are reachable.
    #[serde(default = "default_host")]
    pub host: Ipv4Addr,

    /// Log level passed to each node process.
    #[serde(default = "default_node_log_level")]
    pub node_log_level: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            image: default_image(),
            network_name: default_network_name(),
            subnet: default_subnet(),
            gateway: default_gateway(),
            host: default_host(),
            node_log_level: default_node_log_level(),
        }
    }
}

/// Address and ports assigned to one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDefaults {
    /// Static address on the harness network, also advertised as the external IP.
    pub ip: Ipv4Addr,
    /// Host ports bound by the node.
    pub ports: PortSet,
}

/// Default topic and payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDefaults {
    /// Content topic used by scenarios.
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Base64 payload ("Relay works!!").
    #[serde(default = "default_message")]
    pub payload: String,
}

impl Default for MessageDefaults {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            payload: default_message(),
        }
    }
}

/// Timeouts and poll intervals, in whole seconds unless stated otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeouts {
    /// Upper bound for a container to report `running`.
    #[serde(default = "default_node_startup")]
    pub node_startup_secs: u64,

    /// Upper bound for a peer connection to appear.
    #[serde(default = "default_peer_connection")]
    pub peer_connection_secs: u64,

    /// Upper bound for a published message to become visible.
    #[serde(default = "default_message_propagation")]
    pub message_propagation_secs: u64,

    /// Wait applied after a container reports `running`.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,

    /// Wait applied after removing a stale same-named container.
    #[serde(default = "default_stale_removal_delay")]
    pub stale_removal_delay_secs: u64,

    /// Grace period given to `stop` before the runtime kills the process.
    #[serde(default = "default_stop_grace")]
    pub stop_grace_secs: u64,

    /// Number of host port availability checks before giving up.
    #[serde(default = "default_port_poll_attempts")]
    pub port_poll_attempts: u32,

    /// Interval between host port availability checks.
    #[serde(default = "default_port_poll_interval")]
    pub port_poll_interval_secs: u64,

    /// Interval between container status checks, in milliseconds.
    #[serde(default = "default_status_poll_interval_ms")]
    pub status_poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            node_startup_secs: default_node_startup(),
            peer_connection_secs: default_peer_connection(),
            message_propagation_secs: default_message_propagation(),
            settle_delay_secs: default_settle_delay(),
            stale_removal_delay_secs: default_stale_removal_delay(),
            stop_grace_secs: default_stop_grace(),
            port_poll_attempts: default_port_poll_attempts(),
            port_poll_interval_secs: default_port_poll_interval(),
            status_poll_interval_ms: default_status_poll_interval_ms(),
        }
    }
}

impl Timeouts {
    /// Container startup bound.
    #[must_use]
    pub fn node_startup(&self) -> Duration {
        Duration::from_secs(self.node_startup_secs)
    }

    /// Peer connection bound.
    #[must_use]
    pub fn peer_connection(&self) -> Duration {
        Duration::from_secs(self.peer_connection_secs)
    }

    /// Message propagation bound.
    #[must_use]
    pub fn message_propagation(&self) -> Duration {
        Duration::from_secs(self.message_propagation_secs)
    }

    /// Settle delay after `running`.
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    /// Delay after stale container removal.
    #[must_use]
    pub fn stale_removal_delay(&self) -> Duration {
        Duration::from_secs(self.stale_removal_delay_secs)
    }

    /// Stop grace period.
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    /// Port check interval.
    #[must_use]
    pub fn port_poll_interval(&self) -> Duration {
        Duration::from_secs(self.port_poll_interval_secs)
    }

    /// Container status check interval.
    #[must_use]
    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }

    /// Zero every fixed delay; used by tests driving a fake runtime.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            settle_delay_secs: 0,
            stale_removal_delay_secs: 0,
            stop_grace_secs: 0,
            port_poll_attempts: 1,
            port_poll_interval_secs: 0,
            status_poll_interval_ms: 10,
            ..Self::default()
        }
    }
}

/// Control-plane endpoint paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEndpoints {
    /// Node identity and debug info.
    #[serde(default = "default_debug_info_endpoint")]
    pub debug_info: String,

    /// Relay auto-sharding subscriptions.
    #[serde(default = "default_subscriptions_endpoint")]
    pub subscriptions: String,

    /// Relay auto-sharding messages.
    #[serde(default = "default_messages_endpoint")]
    pub messages: String,

    /// Connected peers.
    #[serde(default = "default_peers_endpoint")]
    pub peers: String,
}

impl Default for ApiEndpoints {
    fn default() -> Self {
        Self {
            debug_info: default_debug_info_endpoint(),
            subscriptions: default_subscriptions_endpoint(),
            messages: default_messages_endpoint(),
            peers: default_peers_endpoint(),
        }
    }
}

impl HarnessConfig {
    /// Build the effective configuration: defaults, then `path` if given,
    /// then process environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or an
    /// environment override has an invalid value.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides looked up by setting name.
    ///
    /// Port sets are given as JSON objects, e.g.
    /// `NODE1_PORTS={"rest":21161,"websocket":21163,"tcp":21162,"discv5":21164,"metrics":21165}`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the variable whose value failed to parse.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DOCKER_IMAGE") {
            self.docker.image = v;
        }
        if let Some(v) = lookup("DOCKER_NETWORK_NAME") {
            self.docker.network_name = v;
        }
        if let Some(v) = lookup("DOCKER_NETWORK_SUBNET") {
            self.docker.subnet = v;
        }
        override_parsed(&lookup, "DOCKER_NETWORK_GATEWAY", &mut self.docker.gateway)?;
        override_parsed(&lookup, "DOCKER_HOST_ADDRESS", &mut self.docker.host)?;
        override_parsed(&lookup, "NODE1_IP", &mut self.node1.ip)?;
        override_parsed(&lookup, "NODE2_IP", &mut self.node2.ip)?;
        override_json(&lookup, "NODE1_PORTS", &mut self.node1.ports)?;
        override_json(&lookup, "NODE2_PORTS", &mut self.node2.ports)?;
        if let Some(v) = lookup("DEFAULT_TOPIC") {
            self.messages.topic = v;
        }
        if let Some(v) = lookup("DEFAULT_MESSAGE") {
            self.messages.payload = v;
        }
        override_parsed(
            &lookup,
            "NODE_STARTUP_TIMEOUT",
            &mut self.timeouts.node_startup_secs,
        )?;
        override_parsed(
            &lookup,
            "PEER_CONNECTION_TIMEOUT",
            &mut self.timeouts.peer_connection_secs,
        )?;
        override_parsed(
            &lookup,
            "MESSAGE_PROPAGATION_TIMEOUT",
            &mut self.timeouts.message_propagation_secs,
        )?;
        if let Some(v) = lookup("DEBUG_INFO_ENDPOINT") {
            self.endpoints.debug_info = v;
        }
        if let Some(v) = lookup("SUBSCRIPTIONS_ENDPOINT") {
            self.endpoints.subscriptions = v;
        }
        if let Some(v) = lookup("MESSAGES_ENDPOINT") {
            self.endpoints.messages = v;
        }
        if let Some(v) = lookup("PEERS_ENDPOINT") {
            self.endpoints.peers = v;
        }
        Ok(())
    }

    /// Reject configurations that would make two nodes collide.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the node port sets overlap, a port set
    /// repeats a port, or both nodes share an address.
    pub fn validate(&self) -> Result<()> {
        for (name, node) in [("node1", &self.node1), ("node2", &self.node2)] {
            if let Some(port) = node.ports.duplicate() {
                return Err(Error::Config(format!(
                    "{name} assigns port {port} to more than one role"
                )));
            }
        }
        if let Some(port) = self.node1.ports.overlap(&self.node2.ports) {
            return Err(Error::Config(format!(
                "node1 and node2 both bind port {port}"
            )));
        }
        if self.node1.ip == self.node2.ip {
            return Err(Error::Config(format!(
                "node1 and node2 share address {}",
                self.node1.ip
            )));
        }
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid {key}={raw:?}: {e}")))?;
    }
    Ok(())
}

fn override_json<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: serde::de::DeserializeOwned,
{
    if let Some(raw) = lookup(key) {
        *target = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("invalid {key}={raw:?}: {e}")))?;
    }
    Ok(())
}

fn default_image() -> String {
    "wakuorg/nwaku:v0.24.0".to_string()
}

fn default_network_name() -> String {
    "waku".to_string()
}

fn default_subnet() -> String {
    "172.18.0.0/16".to_string()
}

const fn default_gateway() -> Ipv4Addr {
    Ipv4Addr::new(172, 18, 0, 1)
}

const fn default_host() -> Ipv4Addr {
    Ipv4Addr::LOCALHOST
}

fn default_node_log_level() -> String {
    "TRACE".to_string()
}

fn default_node1() -> NodeDefaults {
    NodeDefaults {
        ip: Ipv4Addr::new(172, 18, 111, 225),
        ports: PortSet::new(21161, 21163, 21162, 21164, 21165),
    }
}

fn default_node2() -> NodeDefaults {
    NodeDefaults {
        ip: Ipv4Addr::new(172, 18, 111, 226),
        ports: PortSet::new(21171, 21173, 21172, 21174, 21175),
    }
}

fn default_topic() -> String {
    "/my-app/2/chatroom-1/proto".to_string()
}

fn default_message() -> String {
    "UmVsYXkgd29ya3MhIQ==".to_string()
}

const fn default_node_startup() -> u64 {
    30
}

const fn default_peer_connection() -> u64 {
    60
}

const fn default_message_propagation() -> u64 {
    10
}

const fn default_settle_delay() -> u64 {
    5
}

const fn default_stale_removal_delay() -> u64 {
    3
}

const fn default_stop_grace() -> u64 {
    10
}

const fn default_port_poll_attempts() -> u32 {
    30
}

const fn default_port_poll_interval() -> u64 {
    2
}

const fn default_status_poll_interval_ms() -> u64 {
    1000
}

fn default_debug_info_endpoint() -> String {
    "/debug/v1/info".to_string()
}

fn default_subscriptions_endpoint() -> String {
    "/relay/v1/auto/subscriptions".to_string()
}

fn default_messages_endpoint() -> String {
    "/relay/v1/auto/messages".to_string()
}

fn default_peers_endpoint() -> String {
    "/admin/v1/peers".to_string()
}
