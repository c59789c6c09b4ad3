//! CLI definition for waku-harness.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use waku_harness::{HarnessConfig, Result, TopologyKind};

/// Provision containerized Waku nodes and exercise their REST APIs.
#[derive(Parser, Debug)]
#[command(name = "waku-harness")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, short, global = true, env = "WAKU_HARNESS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Node image (overrides the configuration file and `DOCKER_IMAGE`).
    #[arg(long, global = true)]
    pub image: Option<String>,

    /// Container client binary.
    #[arg(long, global = true, default_value = "docker", env = "WAKU_HARNESS_DOCKER")]
    pub docker: PathBuf,

    /// Log level for the harness process.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bring a topology up and keep it running until Ctrl+C.
    Up {
        /// Topology shape.
        #[arg(long, value_enum, default_value = "single")]
        topology: CliTopology,

        /// Path to write the topology manifest JSON.
        #[arg(long)]
        manifest: Option<PathBuf>,
    },

    /// Run the scenario suites against fresh topologies.
    Smoke {
        /// Only run the suite for this topology.
        #[arg(long, value_enum)]
        only: Option<CliTopology>,

        /// Fail when a relayed message is not observed.
        #[arg(long)]
        strict: bool,
    },

    /// Remove containers and the network left behind by an earlier run.
    Cleanup,
}

/// Topology CLI enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliTopology {
    /// One node.
    Single,
    /// Two nodes, the second bootstrapped from the first.
    Pair,
}

impl From<CliTopology> for TopologyKind {
    fn from(t: CliTopology) -> Self {
        match t {
            CliTopology::Single => Self::Single,
            CliTopology::Pair => Self::Pair,
        }
    }
}

impl Cli {
    /// Effective configuration: file, then environment, then flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or is invalid.
    pub fn load_config(&self) -> Result<HarnessConfig> {
        let mut config = HarnessConfig::load(self.config.as_deref())?;
        if let Some(ref image) = self.image {
            config.docker.image.clone_from(image);
        }
        config.validate()?;
        Ok(config)
    }
}
