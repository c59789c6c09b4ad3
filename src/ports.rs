//! Node port sets and host-side port availability checks.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, UdpSocket};
use std::time::Duration;
use tracing::{debug, info};

/// Transport protocol a port is published with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// TCP.
    Tcp,
    /// UDP.
    Udp,
}

impl Protocol {
    /// Suffix used in container port specifications.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

/// Logical role of a node port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortRole {
    /// REST control plane.
    Rest,
    /// Websocket transport.
    Websocket,
    /// libp2p TCP transport.
    Tcp,
    /// discv5 discovery (UDP).
    Discv5,
    /// Prometheus metrics.
    Metrics,
}

impl PortRole {
    /// Protocol the role is published with.
    #[must_use]
    pub fn protocol(self) -> Protocol {
        match self {
            Self::Discv5 => Protocol::Udp,
            _ => Protocol::Tcp,
        }
    }
}

impl fmt::Display for PortRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rest => "rest",
            Self::Websocket => "websocket",
            Self::Tcp => "tcp",
            Self::Discv5 => "discv5",
            Self::Metrics => "metrics",
        };
        f.write_str(name)
    }
}

/// The ports one node binds, by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSet {
    /// REST control plane port.
    pub rest: u16,
    /// Websocket port.
    pub websocket: u16,
    /// TCP transport port.
    pub tcp: u16,
    /// discv5 UDP port.
    pub discv5: u16,
    /// Metrics port.
    pub metrics: u16,
}

impl PortSet {
    /// Build a port set.
    #[must_use]
    pub const fn new(rest: u16, websocket: u16, tcp: u16, discv5: u16, metrics: u16) -> Self {
        Self {
            rest,
            websocket,
            tcp,
            discv5,
            metrics,
        }
    }

    /// All `(role, port)` pairs in a stable order.
    #[must_use]
    pub fn entries(&self) -> [(PortRole, u16); 5] {
        [
            (PortRole::Rest, self.rest),
            (PortRole::Websocket, self.websocket),
            (PortRole::Tcp, self.tcp),
            (PortRole::Discv5, self.discv5),
            (PortRole::Metrics, self.metrics),
        ]
    }

    /// First port assigned to more than one role, if any.
    #[must_use]
    pub fn duplicate(&self) -> Option<u16> {
        let entries = self.entries();
        entries.iter().enumerate().find_map(|(i, (_, port))| {
            entries[i + 1..]
                .iter()
                .any(|(_, other)| other == port)
                .then_some(*port)
        })
    }

    /// First port shared with `other`, if any.
    #[must_use]
    pub fn overlap(&self, other: &Self) -> Option<u16> {
        self.entries().iter().find_map(|(_, port)| {
            other
                .entries()
                .iter()
                .any(|(_, theirs)| theirs == port)
                .then_some(*port)
        })
    }

    /// Ports that cannot currently be bound on the host loopback address.
    #[must_use]
    pub fn busy_ports(&self) -> Vec<(PortRole, u16)> {
        self.entries()
            .into_iter()
            .filter(|(role, port)| !is_port_free(*port, role.protocol()))
            .collect()
    }
}

/// Whether `port` can be bound on 127.0.0.1 right now.
#[must_use]
pub fn is_port_free(port: u16, protocol: Protocol) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    match protocol {
        Protocol::Tcp => TcpListener::bind(addr).is_ok(),
        Protocol::Udp => UdpSocket::bind(addr).is_ok(),
    }
}

/// Wait until every port in `ports` is bindable.
///
/// Checks up to `max_attempts` times, sleeping `interval` between checks.
///
/// # Errors
///
/// Returns `Error::PortsUnavailable` if any port is still bound after the
/// last attempt.
pub async fn wait_for_ports_available(
    node: &str,
    ports: &PortSet,
    max_attempts: u32,
    interval: Duration,
) -> Result<()> {
    let attempts = max_attempts.max(1);
    let mut busy = Vec::new();

    for attempt in 1..=attempts {
        busy = ports.busy_ports();
        if busy.is_empty() {
            info!("All ports for {} are available", node);
            return Ok(());
        }

        for (role, port) in &busy {
            info!("Port {} ({}) still in use, waiting...", port, role);
        }
        if attempt < attempts {
            debug!("Port check {}/{} for {} failed", attempt, attempts, node);
            tokio::time::sleep(interval).await;
        }
    }

    Err(Error::PortsUnavailable {
        node: node.to_string(),
        busy: busy.into_iter().map(|(_, port)| port).collect(),
        waited_secs: interval.as_secs() * u64::from(attempts),
    })
}
