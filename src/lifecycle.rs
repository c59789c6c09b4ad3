//! Network and node process lifecycle.
//!
//! [`LifecycleManager`] owns every runtime resource a scenario creates. Nodes
//! move through `absent → port-check → starting → attaching → ready` on start
//! and `stopping → stopped` on teardown. Teardown visits every tracked
//! resource even when some of them fail to go away, and a manager dropped
//! with resources still tracked tears them down before the drop returns.

use crate::client::NodeClient;
use crate::config::{ApiEndpoints, HarnessConfig};
use crate::error::{Error, Result};
use crate::node::{NodeSpec, NodeState};
use crate::ports::wait_for_ports_available;
use crate::runtime::{ContainerRuntime, ContainerStatus, NetworkSpec};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Driver used for the harness network.
const NETWORK_DRIVER: &str = "bridge";

// =============================================================================
// Node Handle
// =============================================================================

/// A node that reached the `ready` state.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    /// Container name.
    pub name: String,
    /// Runtime container id.
    pub container_id: String,
    /// Spec the node was started from.
    pub spec: NodeSpec,
    /// Base URL of the node's REST control plane.
    pub rest_url: String,
}

impl NodeHandle {
    /// Control-plane client for this node.
    #[must_use]
    pub fn client(&self, endpoints: &ApiEndpoints) -> NodeClient {
        NodeClient::new(&self.rest_url, endpoints.clone())
    }
}

// =============================================================================
// Teardown Report
// =============================================================================

/// One teardown step that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownFailure {
    /// Container or network name.
    pub resource: String,
    /// Operation that failed (`stop`, `remove`, `remove_network`).
    pub operation: &'static str,
    /// Error text.
    pub error: String,
}

/// Outcome of releasing every tracked resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    /// Containers removed.
    pub removed: Vec<String>,
    /// Network removed, if one was tracked and removal succeeded.
    pub network_removed: Option<String>,
    /// Steps that failed.
    pub failures: Vec<TeardownFailure>,
}

impl TeardownReport {
    /// Whether every step succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    fn fail(&mut self, resource: &str, operation: &'static str, error: &Error) {
        warn!("Failed to {} {}: {}", operation, resource, error);
        self.failures.push(TeardownFailure {
            resource: resource.to_string(),
            operation,
            error: error.to_string(),
        });
    }
}

impl fmt::Display for TeardownReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "removed {} container(s)", self.removed.len())?;
        if let Some(ref network) = self.network_removed {
            write!(f, " and network {network}")?;
        }
        if !self.failures.is_empty() {
            write!(f, "; {} step(s) failed", self.failures.len())?;
        }
        Ok(())
    }
}

// =============================================================================
// Lifecycle Manager
// =============================================================================

/// Creates and releases the network and node processes of one run.
///
/// Every mutating call takes `&mut self`; starts are sequential.
pub struct LifecycleManager {
    config: Arc<HarnessConfig>,
    runtime: Arc<dyn ContainerRuntime>,
    network: Option<String>,
    containers: Vec<String>,
    states: HashMap<String, NodeState>,
}

impl LifecycleManager {
    /// Create a manager with nothing tracked.
    #[must_use]
    pub fn new(config: Arc<HarnessConfig>, runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            config,
            runtime,
            network: None,
            containers: Vec::new(),
            states: HashMap::new(),
        }
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Name of the tracked network, if created.
    #[must_use]
    pub fn network(&self) -> Option<&str> {
        self.network.as_deref()
    }

    /// Tracked containers in start order.
    #[must_use]
    pub fn containers(&self) -> &[String] {
        &self.containers
    }

    /// Current lifecycle phase of `name`.
    #[must_use]
    pub fn node_state(&self, name: &str) -> NodeState {
        self.states.get(name).copied().unwrap_or(NodeState::Absent)
    }

    /// Create the harness network, replacing any network of the same name.
    ///
    /// # Errors
    ///
    /// Returns `Error::Runtime` if an existing network cannot be removed or
    /// the new one cannot be created.
    pub async fn create_network(&mut self) -> Result<()> {
        let docker = &self.config.docker;
        let spec = NetworkSpec {
            name: docker.network_name.clone(),
            driver: NETWORK_DRIVER.to_string(),
            subnet: docker.subnet.clone(),
            gateway: docker.gateway,
        };

        if self.runtime.remove_network(&spec.name).await? {
            info!("Removed existing network: {}", spec.name);
        }
        self.network = None;

        self.runtime.create_network(&spec).await.map_err(|e| {
            error!("Failed to create network: {}", e);
            e
        })?;
        info!("Created network: {} ({})", spec.name, spec.subnet);
        self.network = Some(spec.name);
        Ok(())
    }

    /// Bring a node to the `ready` state.
    ///
    /// On failure the node is back in `absent`; a container that was
    /// launched stays tracked and is released by [`Self::teardown`].
    ///
    /// # Errors
    ///
    /// - `Error::Config` if the network has not been created or the node's
    ///   port set repeats a port (nothing is launched)
    /// - `Error::PortsUnavailable` if the node's host ports stay bound
    /// - `Error::Provisioning` if the container cannot be launched, attached,
    ///   or does not reach `running` within the startup timeout
    pub async fn start_node(&mut self, spec: &NodeSpec) -> Result<NodeHandle> {
        let network = self.network.clone().ok_or_else(|| {
            Error::Config(format!(
                "network must be created before starting {}",
                spec.name
            ))
        })?;
        if let Some(port) = spec.ports.duplicate() {
            return Err(Error::Config(format!(
                "{} assigns port {port} to more than one role",
                spec.name
            )));
        }

        match self.provision(spec, &network).await {
            Ok(handle) => {
                self.set_state(&spec.name, NodeState::Ready);
                Ok(handle)
            }
            Err(e) => {
                self.set_state(&spec.name, NodeState::Absent);
                Err(e)
            }
        }
    }

    /// Stop and remove every tracked container in reverse start order, then
    /// remove the network. Failures are logged and reported, never raised.
    pub async fn teardown(&mut self) -> TeardownReport {
        let containers = std::mem::take(&mut self.containers);
        let network = self.network.take();
        if containers.is_empty() && network.is_none() {
            return TeardownReport::default();
        }

        info!("Tearing down {} container(s)", containers.len());
        for name in &containers {
            self.set_state(name, NodeState::Stopping);
        }
        let report = release(
            self.runtime.as_ref(),
            &containers,
            network.as_deref(),
            self.config.timeouts.stop_grace(),
        )
        .await;
        for name in &containers {
            self.set_state(name, NodeState::Stopped);
        }

        if report.is_clean() {
            info!("Teardown complete: {}", report);
        } else {
            warn!("Teardown finished with failures: {}", report);
        }
        report
    }

    /// Remove leftovers of an earlier run: the named containers and the
    /// configured network. Nothing tracked by this manager is affected.
    pub async fn remove_stale(&self, names: &[&str]) -> TeardownReport {
        let mut present = Vec::new();
        for name in names {
            match self.runtime.list_containers(name).await {
                Ok(found) => present.extend(found),
                Err(e) => warn!("Failed to look up container {}: {}", name, e),
            }
        }
        release(
            self.runtime.as_ref(),
            &present,
            Some(&self.config.docker.network_name),
            self.config.timeouts.stop_grace(),
        )
        .await
    }

    async fn provision(&mut self, spec: &NodeSpec, network: &str) -> Result<NodeHandle> {
        let timeouts = self.config.timeouts.clone();

        // A same-named container still publishes the node's ports.
        self.set_state(&spec.name, NodeState::PortCheck);
        self.remove_existing(&spec.name).await?;
        wait_for_ports_available(
            &spec.name,
            &spec.ports,
            timeouts.port_poll_attempts,
            timeouts.port_poll_interval(),
        )
        .await
        .map_err(|e| {
            error!("Required ports for {} are not available", spec.name);
            e
        })?;

        self.set_state(&spec.name, NodeState::Starting);

        // Tracked before launch: the runtime may create the container and
        // still fail to start it.
        if !self.containers.contains(&spec.name) {
            self.containers.push(spec.name.clone());
        }
        let container = spec.container_spec(&self.config.docker);
        let container_id = self.runtime.run_container(&container).await.map_err(|e| {
            error!("Failed to start container {}: {}", spec.name, e);
            Error::Provisioning(format!("failed to start {}: {e}", spec.name))
        })?;
        info!("Started container: {}", spec.name);

        self.set_state(&spec.name, NodeState::Attaching);
        self.runtime
            .connect_container(network, &spec.name, spec.ip)
            .await
            .map_err(|e| {
                error!("Failed to connect {} to network: {}", spec.name, e);
                Error::Provisioning(format!("failed to attach {} to {network}: {e}", spec.name))
            })?;
        info!(
            "Connected {} to network with IP: {}",
            spec.name, spec.ip
        );

        self.wait_for_running(&spec.name, timeouts.node_startup(), timeouts.status_poll_interval())
            .await?;
        tokio::time::sleep(timeouts.settle_delay()).await;

        Ok(NodeHandle {
            name: spec.name.clone(),
            container_id,
            spec: spec.clone(),
            rest_url: spec.rest_url(self.config.docker.host),
        })
    }

    fn set_state(&mut self, name: &str, state: NodeState) {
        debug!("{} -> {}", name, state);
        self.states.insert(name.to_string(), state);
    }

    /// Stop and remove a same-named container left over from an earlier run.
    async fn remove_existing(&mut self, name: &str) -> Result<()> {
        let existing = self.runtime.list_containers(name).await?;
        if existing.is_empty() {
            return Ok(());
        }

        let grace = self.config.timeouts.stop_grace();
        self.runtime.stop_container(name, grace).await?;
        self.runtime.remove_container(name).await?;
        self.containers.retain(|c| c != name);
        info!("Removed existing container: {}", name);
        tokio::time::sleep(self.config.timeouts.stale_removal_delay()).await;
        Ok(())
    }

    async fn wait_for_running(&self, name: &str, timeout: Duration, interval: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;

        loop {
            match self.runtime.container_status(name).await {
                Ok(ContainerStatus::Running) => {
                    debug!("Container {} is running", name);
                    return Ok(());
                }
                Ok(status) if status.is_terminal() => {
                    return Err(Error::Provisioning(format!(
                        "container {name} is {status} instead of running"
                    )));
                }
                Ok(status) => debug!("Container {} is {}", name, status),
                Err(e) => debug!("Status check for {} failed: {}", name, e),
            }

            if Instant::now() + interval > deadline {
                break;
            }
            tokio::time::sleep(interval).await;
        }

        Err(Error::Provisioning(format!(
            "container {name} not ready within {} seconds",
            timeout.as_secs()
        )))
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        if self.containers.is_empty() && self.network.is_none() {
            return;
        }

        let runtime = Arc::clone(&self.runtime);
        let containers = std::mem::take(&mut self.containers);
        let network = self.network.take();
        let grace = self.config.timeouts.stop_grace();
        warn!(
            "Lifecycle manager dropped with {} container(s) still tracked; cleaning up",
            containers.len()
        );

        // The drop may run inside an async context, so the cleanup gets its
        // own thread and runtime.
        let cleanup = std::thread::spawn(move || {
            match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => {
                    let report = rt.block_on(release(
                        runtime.as_ref(),
                        &containers,
                        network.as_deref(),
                        grace,
                    ));
                    debug!("Drop cleanup: {}", report);
                }
                Err(e) => error!("Failed to build cleanup runtime: {}", e),
            }
        });
        if cleanup.join().is_err() {
            error!("Cleanup thread panicked");
        }
    }
}

/// Stop and remove `containers` (reverse order), then remove `network`.
async fn release(
    runtime: &dyn ContainerRuntime,
    containers: &[String],
    network: Option<&str>,
    grace: Duration,
) -> TeardownReport {
    let mut report = TeardownReport::default();

    for name in containers.iter().rev() {
        if let Err(e) = runtime.stop_container(name, grace).await {
            report.fail(name, "stop", &e);
        }
        match runtime.remove_container(name).await {
            Ok(true) => {
                info!("Cleaned up container: {}", name);
                report.removed.push(name.clone());
            }
            Ok(false) => debug!("Container {} already removed", name),
            Err(e) => report.fail(name, "remove", &e),
        }
    }

    if let Some(network) = network {
        match runtime.remove_network(network).await {
            Ok(true) => {
                info!("Cleaned up network: {}", network);
                report.network_removed = Some(network.to_string());
            }
            Ok(false) => debug!("Network {} already removed", network),
            Err(e) => report.fail(network, "remove_network", &e),
        }
    }

    report
}
