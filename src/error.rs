//! Error types for waku-harness.

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, driving, or tearing down a topology.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (including using a network that was never created).
    #[error("configuration error: {0}")]
    Config(String),

    /// A node process could not be brought to a usable state.
    #[error("provisioning failed: {0}")]
    Provisioning(String),

    /// Host ports required by a node stayed bound past the retry bound.
    #[error("ports for {node} still in use after {waited_secs}s: {busy:?}")]
    PortsUnavailable {
        /// Node the ports were checked for.
        node: String,
        /// Ports that were still bound at the last check.
        busy: Vec<u16>,
        /// Total time spent waiting.
        waited_secs: u64,
    },

    /// The container runtime rejected a command.
    #[error("container runtime error: {0}")]
    Runtime(String),

    /// Transport-level HTTP failure talking to a node.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A node answered with a non-success status.
    #[error("{method} {url} returned {status}: {body}")]
    Api {
        /// HTTP method.
        method: &'static str,
        /// Request URL.
        url: String,
        /// Response status code.
        status: u16,
        /// Response body (possibly truncated).
        body: String,
    },

    /// A URL could not be built from the configured base address.
    #[error("invalid URL: {0}")]
    Url(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
