//! waku-harness CLI entry point.

mod cli;

use clap::Parser;
use cli::{Cli, Command};
use color_eyre::eyre::{bail, eyre};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use waku_harness::node::ALL_NODE_NAMES;
use waku_harness::scenario::ScenarioReport;
use waku_harness::{
    AssertionMode, ContainerRuntime, DockerCli, HarnessConfig, LifecycleManager, Scenarios,
    Topology, TopologyKind,
};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("waku-harness v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(cli.load_config()?);
    let docker = DockerCli::with_binary(&cli.docker);
    if !docker.is_available().await {
        bail!("container runtime {} is not reachable", cli.docker.display());
    }
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(docker);

    match cli.command {
        Command::Up { topology, manifest } => {
            let topology = Topology::start(topology.into(), config, runtime).await?;

            let json = serde_json::to_string_pretty(&topology.manifest())?;
            if let Some(path) = manifest {
                tokio::fs::write(&path, &json).await?;
                info!("Wrote manifest to {}", path.display());
            } else {
                println!("{json}");
            }

            info!("Topology running. Press Ctrl+C to stop.");
            tokio::signal::ctrl_c().await?;

            let report = topology.teardown().await;
            if !report.is_clean() {
                warn!("Teardown left resources behind: {}", report);
            }
        }
        Command::Smoke { only, strict } => {
            let mode = if strict {
                AssertionMode::Strict
            } else {
                AssertionMode::BestEffort
            };
            let kinds = only.map_or_else(
                || vec![TopologyKind::Single, TopologyKind::Pair],
                |kind| vec![kind.into()],
            );

            let mut reports = Vec::new();
            for kind in kinds {
                reports.extend(run_suite(kind, &config, &runtime, mode).await?);
            }
            println!("{}", serde_json::to_string_pretty(&reports)?);

            let failed = reports.iter().filter(|r| r.outcome.is_failure()).count();
            if failed > 0 {
                bail!("{failed} of {} scenario(s) failed", reports.len());
            }
        }
        Command::Cleanup => {
            let lifecycle = LifecycleManager::new(config, runtime);
            let report = lifecycle.remove_stale(&ALL_NODE_NAMES).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_clean() {
                return Err(eyre!("cleanup incomplete: {report}"));
            }
        }
    }

    Ok(())
}

async fn run_suite(
    kind: TopologyKind,
    config: &Arc<HarnessConfig>,
    runtime: &Arc<dyn ContainerRuntime>,
    mode: AssertionMode,
) -> color_eyre::Result<Vec<ScenarioReport>> {
    info!("Running {} topology scenarios", kind);
    let topology = Topology::start(kind, Arc::clone(config), Arc::clone(runtime)).await?;
    let scenarios = Scenarios::new(config).with_mode(mode);

    let result = match kind {
        TopologyKind::Single => scenarios.run_single_node_suite(&topology).await,
        TopologyKind::Pair => scenarios.run_two_node_suite(&topology).await,
    };

    let report = topology.teardown().await;
    if !report.is_clean() {
        warn!("Teardown left resources behind: {}", report);
    }
    Ok(result?)
}
