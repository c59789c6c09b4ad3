//! Container runtime boundary.
//!
//! The lifecycle manager only talks to containers and networks through the
//! [`ContainerRuntime`] trait. [`DockerCli`] drives a local `docker` binary.

mod docker;
#[cfg(test)]
pub(crate) mod mock;

pub use docker::DockerCli;

use crate::error::Result;
use crate::ports::Protocol;
use async_trait::async_trait;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Declarative description of an isolated network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkSpec {
    /// Network name.
    pub name: String,
    /// Network driver (e.g. `bridge`).
    pub driver: String,
    /// Address pool in CIDR notation.
    pub subnet: String,
    /// Gateway address.
    pub gateway: Ipv4Addr,
}

/// A host-to-container port publication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortBinding {
    /// Port inside the container.
    pub container_port: u16,
    /// Port on the host.
    pub host_port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
}

impl PortBinding {
    /// Render as a `docker run -p` value: `host:container/proto`.
    #[must_use]
    pub fn to_publish_arg(&self) -> String {
        format!(
            "{}:{}/{}",
            self.host_port,
            self.container_port,
            self.protocol.as_str()
        )
    }
}

/// Declarative description of a detached container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name, unique on the host.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Arguments passed to the image entrypoint.
    pub args: Vec<String>,
    /// Published ports.
    pub ports: Vec<PortBinding>,
}

/// Runtime status of a container, as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    /// Created but never started.
    Created,
    /// Running.
    Running,
    /// Paused.
    Paused,
    /// Restarting.
    Restarting,
    /// Being removed.
    Removing,
    /// Exited.
    Exited,
    /// Dead.
    Dead,
    /// Unrecognised status string.
    Other(String),
}

impl ContainerStatus {
    /// Parse a runtime status string.
    #[must_use]
    pub fn parse(status: &str) -> Self {
        match status.trim() {
            "created" => Self::Created,
            "running" => Self::Running,
            "paused" => Self::Paused,
            "restarting" => Self::Restarting,
            "removing" => Self::Removing,
            "exited" => Self::Exited,
            "dead" => Self::Dead,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether the container can no longer become `running` on its own.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited | Self::Dead | Self::Removing)
    }
}

impl fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Restarting => "restarting",
            Self::Removing => "removing",
            Self::Exited => "exited",
            Self::Dead => "dead",
            Self::Other(s) => s.as_str(),
        };
        f.write_str(s)
    }
}

/// Operations the harness needs from a container runtime.
///
/// Calls are made sequentially by a single lifecycle manager.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create a network.
    async fn create_network(&self, spec: &NetworkSpec) -> Result<()>;

    /// Remove a network. Returns `Ok(false)` if it did not exist.
    async fn remove_network(&self, name: &str) -> Result<bool>;

    /// Start a detached container; returns its id.
    async fn run_container(&self, spec: &ContainerSpec) -> Result<String>;

    /// Attach a container to a network with a static address.
    async fn connect_container(&self, network: &str, container: &str, ip: Ipv4Addr)
        -> Result<()>;

    /// Current status of a container.
    async fn container_status(&self, name: &str) -> Result<ContainerStatus>;

    /// Stop a container, giving it `grace` before it is killed.
    /// Returns `Ok(false)` if it did not exist.
    async fn stop_container(&self, name: &str, grace: Duration) -> Result<bool>;

    /// Remove a container (forcibly). Returns `Ok(false)` if it did not exist.
    async fn remove_container(&self, name: &str) -> Result<bool>;

    /// Names of all containers (any state) whose name is exactly `name`.
    async fn list_containers(&self, name: &str) -> Result<Vec<String>>;
}
