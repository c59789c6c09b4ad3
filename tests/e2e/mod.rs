//! E2E tests for waku-harness.
//!
//! These tests provision real nwaku containers on a local Docker daemon and
//! exercise the node REST APIs through the harness.
//!
//! ## Architecture
//!
//! ```text
//! E2eFixture
//!     ├── HarnessConfig (defaults + WAKU_HARNESS_* overrides)
//!     └── DockerCli
//!             ├── waku network (bridge, static addresses)
//!             └── waku_node_single | waku_node1 + waku_node2
//! ```
//!
//! ## Running
//!
//! Tests that need Docker are ignored by default:
//!
//! ```text
//! cargo test --test e2e -- --ignored
//! ```
//!
//! They share fixed container names and ports, so they run serially.

mod harness;
mod rig_tests;
mod scenarios;

pub use harness::{init_test_tracing, E2eFixture};
