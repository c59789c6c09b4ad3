//! [`ContainerRuntime`] backed by the `docker` command-line client.

use super::{ContainerRuntime, ContainerSpec, ContainerStatus, NetworkSpec};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace};

/// Captured result of one CLI invocation.
struct CliOutput {
    success: bool,
    stdout: String,
    stderr: String,
}

impl CliOutput {
    /// Whether the daemon reported `target` itself as missing.
    ///
    /// Only the daemon's absence messages count; other failures that happen
    /// to say "not found" (a missing OCI runtime binary, say) are errors.
    fn is_not_found(&self, target: &str) -> bool {
        let absent = [
            format!("No such container: {target}"),
            format!("No such network: {target}"),
            format!("network {target} not found"),
        ];
        self.stderr
            .lines()
            .map(str::trim_end)
            .any(|line| absent.iter().any(|msg| line.ends_with(msg.as_str())))
    }
}

/// Drives containers through a local `docker` binary.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    /// Use `docker` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("docker"),
        }
    }

    /// Use a specific client binary (e.g. `podman`).
    #[must_use]
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Whether the client can reach a daemon.
    pub async fn is_available(&self) -> bool {
        if std::env::var("SKIP_DOCKER_TESTS").is_ok() {
            return false;
        }
        self.exec(&["info".to_string()])
            .await
            .map(|out| out.success)
            .unwrap_or(false)
    }

    async fn exec(&self, args: &[String]) -> Result<CliOutput> {
        trace!("{} {}", self.binary.display(), args.join(" "));
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                Error::Runtime(format!("failed to execute {}: {e}", self.binary.display()))
            })?;

        Ok(CliOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    async fn exec_checked(&self, args: &[String]) -> Result<String> {
        let out = self.exec(args).await?;
        if out.success {
            Ok(out.stdout)
        } else {
            Err(Error::Runtime(format!(
                "docker {} failed: {}",
                args.first().map_or("", String::as_str),
                out.stderr
            )))
        }
    }

    /// Run a command on `target` whose only expected failure is `target`
    /// being absent.
    async fn exec_tolerating_absence(&self, args: &[String], target: &str) -> Result<bool> {
        let out = self.exec(args).await?;
        if out.success {
            Ok(true)
        } else if out.is_not_found(target) {
            debug!("docker {}: target absent", args.join(" "));
            Ok(false)
        } else {
            Err(Error::Runtime(format!(
                "docker {} failed: {}",
                args.join(" "),
                out.stderr
            )))
        }
    }
}

/// `docker run` arguments for `spec`.
fn run_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--detach".to_string(),
        "--name".to_string(),
        spec.name.clone(),
    ];
    for binding in &spec.ports {
        args.push("--publish".to_string());
        args.push(binding.to_publish_arg());
    }
    args.push(spec.image.clone());
    args.extend(spec.args.iter().cloned());
    args
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn create_network(&self, spec: &NetworkSpec) -> Result<()> {
        self.exec_checked(&[
            "network".to_string(),
            "create".to_string(),
            "--driver".to_string(),
            spec.driver.clone(),
            "--subnet".to_string(),
            spec.subnet.clone(),
            "--gateway".to_string(),
            spec.gateway.to_string(),
            spec.name.clone(),
        ])
        .await
        .map(drop)
    }

    async fn remove_network(&self, name: &str) -> Result<bool> {
        self.exec_tolerating_absence(
            &["network".to_string(), "rm".to_string(), name.to_string()],
            name,
        )
        .await
    }

    async fn run_container(&self, spec: &ContainerSpec) -> Result<String> {
        self.exec_checked(&run_args(spec)).await
    }

    async fn connect_container(
        &self,
        network: &str,
        container: &str,
        ip: Ipv4Addr,
    ) -> Result<()> {
        self.exec_checked(&[
            "network".to_string(),
            "connect".to_string(),
            "--ip".to_string(),
            ip.to_string(),
            network.to_string(),
            container.to_string(),
        ])
        .await
        .map(drop)
    }

    async fn container_status(&self, name: &str) -> Result<ContainerStatus> {
        let status = self
            .exec_checked(&[
                "inspect".to_string(),
                "--type".to_string(),
                "container".to_string(),
                "--format".to_string(),
                "{{.State.Status}}".to_string(),
                name.to_string(),
            ])
            .await?;
        Ok(ContainerStatus::parse(&status))
    }

    async fn stop_container(&self, name: &str, grace: Duration) -> Result<bool> {
        self.exec_tolerating_absence(
            &[
                "stop".to_string(),
                "--time".to_string(),
                grace.as_secs().to_string(),
                name.to_string(),
            ],
            name,
        )
        .await
    }

    async fn remove_container(&self, name: &str) -> Result<bool> {
        self.exec_tolerating_absence(
            &["rm".to_string(), "--force".to_string(), name.to_string()],
            name,
        )
        .await
    }

    async fn list_containers(&self, name: &str) -> Result<Vec<String>> {
        let stdout = self
            .exec_checked(&[
                "ps".to_string(),
                "--all".to_string(),
                "--filter".to_string(),
                format!("name=^/?{name}$"),
                "--format".to_string(),
                "{{.Names}}".to_string(),
            ])
            .await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToString::to_string)
            .collect())
    }
}
