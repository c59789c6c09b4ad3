//! In-memory container runtime for unit tests.
//!
//! Mirrors the daemon behaviours the lifecycle manager depends on (name
//! conflicts, networks with active endpoints refusing removal) and lets tests
//! inject failures per operation and target.

use super::{ContainerRuntime, ContainerSpec, ContainerStatus, NetworkSpec};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::net::Ipv4Addr;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

type RunHook = Arc<dyn Fn(&ContainerSpec) + Send + Sync>;

#[derive(Debug, Clone)]
pub(crate) struct MockContainer {
    pub spec: ContainerSpec,
    pub status: ContainerStatus,
    pub networks: Vec<(String, Ipv4Addr)>,
}

#[derive(Default)]
struct State {
    networks: BTreeMap<String, NetworkSpec>,
    containers: BTreeMap<String, MockContainer>,
    calls: Vec<String>,
    failures: HashSet<(String, String)>,
    status_scripts: HashMap<String, VecDeque<ContainerStatus>>,
    next_id: u64,
    start_status: Option<ContainerStatus>,
    on_run: Option<RunHook>,
}

/// Shared-state fake; clones observe the same state.
#[derive(Clone, Default)]
pub(crate) struct MockRuntime {
    state: Arc<Mutex<State>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `op` fail for `target` ("stop", "remove", "remove_network", "run",
    /// "connect", "create_network", "status", "list"). "start" makes `run`
    /// create the container and then report failure, as a daemon does when
    /// the container cannot be started.
    pub fn fail(&self, op: &str, target: &str) {
        self.state
            .lock()
            .failures
            .insert((op.to_string(), target.to_string()));
    }

    /// Statuses reported for `name` before falling back to its stored status.
    pub fn script_status(&self, name: &str, statuses: Vec<ContainerStatus>) {
        self.state
            .lock()
            .status_scripts
            .insert(name.to_string(), statuses.into());
    }

    /// Status newly run containers report instead of `running`.
    pub fn start_in(&self, status: ContainerStatus) {
        self.state.lock().start_status = Some(status);
    }

    /// Callback invoked whenever a container is started.
    pub fn on_run(&self, hook: impl Fn(&ContainerSpec) + Send + Sync + 'static) {
        self.state.lock().on_run = Some(Arc::new(hook));
    }

    /// Pre-create a container as if left behind by an earlier run.
    pub fn insert_container(&self, name: &str, status: ContainerStatus) {
        let spec = ContainerSpec {
            name: name.to_string(),
            image: "stale".to_string(),
            args: Vec::new(),
            ports: Vec::new(),
        };
        self.state.lock().containers.insert(
            name.to_string(),
            MockContainer {
                spec,
                status,
                networks: Vec::new(),
            },
        );
    }

    /// Pre-create a network as if left behind by an earlier run.
    pub fn insert_network(&self, name: &str) {
        self.state.lock().networks.insert(
            name.to_string(),
            NetworkSpec {
                name: name.to_string(),
                driver: "bridge".to_string(),
                subnet: "10.0.0.0/16".to_string(),
                gateway: Ipv4Addr::new(10, 0, 0, 1),
            },
        );
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn container(&self, name: &str) -> Option<MockContainer> {
        self.state.lock().containers.get(name).cloned()
    }

    pub fn container_names(&self) -> Vec<String> {
        self.state.lock().containers.keys().cloned().collect()
    }

    pub fn network(&self, name: &str) -> Option<NetworkSpec> {
        self.state.lock().networks.get(name).cloned()
    }

    fn record(&self, op: &str, target: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(format!("{op}:{target}"));
        if state
            .failures
            .contains(&(op.to_string(), target.to_string()))
        {
            return Err(Error::Runtime(format!("injected {op} failure for {target}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn create_network(&self, spec: &NetworkSpec) -> Result<()> {
        self.record("create_network", &spec.name)?;
        let mut state = self.state.lock();
        if state.networks.contains_key(&spec.name) {
            return Err(Error::Runtime(format!(
                "network with name {} already exists",
                spec.name
            )));
        }
        state.networks.insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<bool> {
        self.record("remove_network", name)?;
        let mut state = self.state.lock();
        let in_use = state
            .containers
            .values()
            .any(|c| c.networks.iter().any(|(n, _)| n == name));
        if in_use {
            return Err(Error::Runtime(format!(
                "network {name} has active endpoints"
            )));
        }
        Ok(state.networks.remove(name).is_some())
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<String> {
        self.record("run", &spec.name)?;
        let hook = {
            let mut state = self.state.lock();
            if state.containers.contains_key(&spec.name) {
                return Err(Error::Runtime(format!(
                    "Conflict. The container name \"/{}\" is already in use",
                    spec.name
                )));
            }
            state.next_id += 1;
            let status = state
                .start_status
                .clone()
                .unwrap_or(ContainerStatus::Running);
            state.containers.insert(
                spec.name.clone(),
                MockContainer {
                    spec: spec.clone(),
                    status,
                    networks: Vec::new(),
                },
            );
            state.on_run.clone()
        };
        if self
            .state
            .lock()
            .failures
            .contains(&("start".to_string(), spec.name.clone()))
        {
            return Err(Error::Runtime(format!(
                "failed to start container {}: port is already allocated",
                spec.name
            )));
        }
        if let Some(hook) = hook {
            hook(spec);
        }
        let id = self.state.lock().next_id;
        Ok(format!("{id:064x}"))
    }

    async fn connect_container(
        &self,
        network: &str,
        container: &str,
        ip: Ipv4Addr,
    ) -> Result<()> {
        self.record("connect", container)?;
        let mut state = self.state.lock();
        if !state.networks.contains_key(network) {
            return Err(Error::Runtime(format!("network {network} not found")));
        }
        let entry = state
            .containers
            .get_mut(container)
            .ok_or_else(|| Error::Runtime(format!("No such container: {container}")))?;
        entry.networks.push((network.to_string(), ip));
        Ok(())
    }

    async fn container_status(&self, name: &str) -> Result<ContainerStatus> {
        self.record("status", name)?;
        let mut state = self.state.lock();
        if let Some(next) = state
            .status_scripts
            .get_mut(name)
            .and_then(VecDeque::pop_front)
        {
            return Ok(next);
        }
        state
            .containers
            .get(name)
            .map(|c| c.status.clone())
            .ok_or_else(|| Error::Runtime(format!("No such container: {name}")))
    }

    async fn stop_container(&self, name: &str, _grace: Duration) -> Result<bool> {
        self.record("stop", name)?;
        let mut state = self.state.lock();
        Ok(state.containers.get_mut(name).map_or(false, |c| {
            c.status = ContainerStatus::Exited;
            true
        }))
    }

    async fn remove_container(&self, name: &str) -> Result<bool> {
        self.record("remove", name)?;
        Ok(self.state.lock().containers.remove(name).is_some())
    }

    async fn list_containers(&self, name: &str) -> Result<Vec<String>> {
        self.record("list", name)?;
        Ok(self
            .state
            .lock()
            .containers
            .keys()
            .filter(|n| *n == name)
            .cloned()
            .collect())
    }
}
