//! # waku-harness
//!
//! End-to-end test harness for containerized Waku (nwaku) nodes.
//!
//! The harness provisions node containers on an isolated network, drives
//! their REST control plane, and waits on the eventually-consistent state
//! they expose (peer lists, relayed messages) by polling.
//!
//! ## Architecture
//!
//! - [`poll`]: condition polling and retry primitives
//! - [`client`]: HTTP client for one node's control plane
//! - [`runtime`]: container runtime boundary, backed by the `docker` CLI
//! - [`lifecycle`]: network and node creation, readiness gating, teardown
//! - [`topology`]: single-node and bootstrapped two-node topologies
//! - [`scenario`]: protocol scenarios with strict or best-effort grading
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use waku_harness::{DockerCli, HarnessConfig, Scenarios, Topology};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(HarnessConfig::load(None)?);
//!     let topology = Topology::single_node(Arc::clone(&config), Arc::new(DockerCli::new())).await?;
//!     let reports = Scenarios::new(&config).run_single_node_suite(&topology).await?;
//!     println!("{reports:?}");
//!     topology.teardown().await;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod client;
pub mod config;
pub mod error;
#[cfg(test)]
mod fake_node;
pub mod lifecycle;
pub mod node;
pub mod poll;
pub mod ports;
pub mod runtime;
pub mod scenario;
pub mod topology;

pub use client::{NodeClient, NodeInfo, Peer, RelayMessage};
pub use config::HarnessConfig;
pub use error::{Error, Result};
pub use lifecycle::{LifecycleManager, NodeHandle, TeardownReport};
pub use node::{Identity, NodeSpec, NodeState};
pub use poll::{retry_on_exception, wait_for_condition, Probe, RetryPolicy};
pub use ports::PortSet;
pub use runtime::{ContainerRuntime, DockerCli};
pub use scenario::{AssertionMode, Outcome, Scenarios};
pub use topology::{Topology, TopologyKind};
