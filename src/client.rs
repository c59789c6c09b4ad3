//! HTTP client for one node's REST control plane.
//!
//! Every call is a single request/response against the node's base URL.
//! Node info and peer listing are wrapped in exponential-backoff retry
//! policies because a freshly started node answers them late. Waiting helpers
//! poll through [`crate::poll`] and never return errors.

use crate::config::ApiEndpoints;
use crate::error::{Error, Result};
use crate::node::Identity;
use crate::poll::{wait_until, RetryPolicy};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::{Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error bodies longer than this are truncated in error messages.
const MAX_ERROR_BODY: usize = 512;

/// Interval between peer checks while waiting for a connection.
const PEER_POLL_INTERVAL: Duration = Duration::from_secs(2);

// =============================================================================
// Records
// =============================================================================

/// Node debug info. Unknown fields are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    /// Multiaddresses the node listens on.
    #[serde(default)]
    pub listen_addresses: Vec<String>,
    /// Text-encoded node record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enr_uri: Option<String>,
    /// Remaining fields, verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A relayed message as returned by the messages endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayMessage {
    /// Base64 payload.
    #[serde(default)]
    pub payload: String,
    /// Content topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_topic: Option<String>,
    /// Sender-supplied timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Remaining fields, verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One protocol a peer was seen on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerProtocol {
    /// Protocol id.
    pub protocol: String,
    /// Whether the peer is currently connected on it.
    #[serde(default)]
    pub connected: bool,
}

/// A peer known to the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Peer {
    /// Peer multiaddress (includes the peer id).
    #[serde(default)]
    pub multiaddr: String,
    /// Protocols the peer was seen on.
    #[serde(default)]
    pub protocols: Vec<PeerProtocol>,
    /// Remaining fields, verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Peer {
    /// Whether `needle` occurs anywhere in the peer's serialized record.
    #[must_use]
    pub fn mentions(&self, needle: &str) -> bool {
        serde_json::to_string(self).map_or(false, |s| s.contains(needle))
    }

    /// Whether any protocol reports an active connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.protocols.iter().any(|p| p.connected)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishRequest<'a> {
    payload: &'a str,
    content_topic: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
}

// =============================================================================
// Client
// =============================================================================

/// Client bound to one node.
#[derive(Debug, Clone)]
pub struct NodeClient {
    base_url: String,
    endpoints: ApiEndpoints,
    http: reqwest::Client,
    info_policy: RetryPolicy,
    peers_policy: RetryPolicy,
}

impl NodeClient {
    /// Create a client for the node at `base_url` (a trailing `/` is ignored).
    #[must_use]
    pub fn new(base_url: &str, endpoints: ApiEndpoints) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .user_agent(concat!("waku-harness/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            endpoints,
            http,
            info_policy: RetryPolicy::node_info(),
            peers_policy: RetryPolicy::peers(),
        }
    }

    /// Replace the retry policies for node info and peer listing.
    #[must_use]
    pub fn with_policies(mut self, info: RetryPolicy, peers: RetryPolicy) -> Self {
        self.info_policy = info;
        self.peers_policy = peers;
        self
    }

    /// Base URL requests are made against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch node debug info, retrying with the node-info policy.
    ///
    /// # Errors
    ///
    /// Returns the last transport or status error once retries are exhausted.
    pub async fn get_node_info(&self) -> Result<NodeInfo> {
        self.info_policy
            .run("get node info", || self.get_json(&self.endpoints.debug_info))
            .await
    }

    /// The node's ENR, or an empty string if the node does not report one.
    ///
    /// # Errors
    ///
    /// Returns an error if node info cannot be fetched.
    pub async fn get_enr_uri(&self) -> Result<String> {
        Ok(self.get_node_info().await?.enr_uri.unwrap_or_default())
    }

    /// The node's identity, if it reports one.
    ///
    /// # Errors
    ///
    /// Returns an error if node info cannot be fetched.
    pub async fn identity(&self) -> Result<Option<Identity>> {
        let enr = self.get_enr_uri().await?;
        Ok((!enr.is_empty()).then(|| Identity::new(enr)))
    }

    /// Subscribe the node's relay to `topics`. Returns whether the node
    /// answered `200 OK`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn subscribe_to_topic(&self, topics: &[&str]) -> Result<bool> {
        let url = self.url(&self.endpoints.subscriptions);
        debug!("Subscribing {} to {:?}", self.base_url, topics);
        let response = self.http.post(&url).json(topics).send().await?;
        let response = check_status("POST", &url, response).await?;
        Ok(response.status() == reqwest::StatusCode::OK)
    }

    /// Publish `payload` (base64) on `content_topic`. The timestamp is sent
    /// only when given. Returns whether the node answered `200 OK`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-success status.
    pub async fn publish_message(
        &self,
        payload: &str,
        content_topic: &str,
        timestamp: Option<i64>,
    ) -> Result<bool> {
        let url = self.url(&self.endpoints.messages);
        let body = PublishRequest {
            payload,
            content_topic,
            timestamp,
        };
        debug!("Publishing to {} on {}", content_topic, self.base_url);
        let response = self.http.post(&url).json(&body).send().await?;
        let response = check_status("POST", &url, response).await?;
        Ok(response.status() == reqwest::StatusCode::OK)
    }

    /// Messages the node has cached for `content_topic`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, a non-success status, or an
    /// undecodable body.
    pub async fn get_messages(&self, content_topic: &str) -> Result<Vec<RelayMessage>> {
        let url = self.messages_url(content_topic)?;
        let response = self.http.get(url.clone()).send().await?;
        let response = check_status("GET", url.as_str(), response).await?;
        Ok(response.json().await?)
    }

    /// Peers known to the node, retrying with the peers policy.
    ///
    /// # Errors
    ///
    /// Returns the last transport or status error once retries are exhausted.
    pub async fn get_peers(&self) -> Result<Vec<Peer>> {
        self.peers_policy
            .run("get peers", || self.fetch_peers())
            .await
    }

    /// Wait until a peer whose record mentions `expected_peer_id` is listed.
    ///
    /// Each check is a single request; errors count as "not connected".
    pub async fn wait_for_peer_connection(&self, expected_peer_id: &str, timeout: Duration) -> bool {
        let description = format!("peer {expected_peer_id} connected to {}", self.base_url);
        let found = wait_until(&description, timeout, PEER_POLL_INTERVAL, || async move {
            let peers = self.fetch_peers().await?;
            Ok::<_, Error>(peers.iter().any(|p| p.mentions(expected_peer_id)))
        })
        .await;
        if found {
            info!("Peer connection established: {}", expected_peer_id);
        } else {
            warn!("Peer {} not seen by {}", expected_peer_id, self.base_url);
        }
        found
    }

    /// Wait until the node lists at least one peer.
    pub async fn wait_for_any_peer(&self, timeout: Duration, interval: Duration) -> bool {
        let description = format!("{} has at least one peer", self.base_url);
        wait_until(&description, timeout, interval, || async move {
            Ok::<_, Error>(!self.fetch_peers().await?.is_empty())
        })
        .await
    }

    /// Wait until a message on `content_topic` satisfies `predicate`.
    pub async fn wait_for_message<P>(
        &self,
        content_topic: &str,
        predicate: P,
        timeout: Duration,
        interval: Duration,
    ) -> bool
    where
        P: Fn(&RelayMessage) -> bool,
    {
        let description = format!("message on {content_topic} at {}", self.base_url);
        let predicate = &predicate;
        wait_until(&description, timeout, interval, || async move {
            Ok::<_, Error>(self.get_messages(content_topic).await?.iter().any(predicate))
        })
        .await
    }

    async fn fetch_peers(&self) -> Result<Vec<Peer>> {
        self.get_json(&self.endpoints.peers).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self.http.get(&url).send().await?;
        let response = check_status("GET", &url, response).await?;
        Ok(response.json().await?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Messages URL with `topic` percent-encoded as one path segment.
    fn messages_url(&self, topic: &str) -> Result<Url> {
        let raw = self.url(&self.endpoints.messages);
        let mut url = Url::parse(&raw).map_err(|e| Error::Url(format!("{raw}: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| Error::Url(format!("{raw}: cannot append path segments")))?
            .push(topic);
        Ok(url)
    }
}

/// Map a non-success response to `Error::Api`.
async fn check_status(method: &'static str, url: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    Err(Error::Api {
        method,
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}
