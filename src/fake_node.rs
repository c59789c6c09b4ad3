//! In-process stand-in for a node's REST control plane.
//!
//! [`install`] hooks a [`MockRuntime`] so every container it "runs" gets an
//! axum server on the container's REST port. Servers share a [`FakeRelay`],
//! so a message published on one node becomes visible on every node
//! subscribed to its topic.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::runtime::mock::MockRuntime;
use crate::runtime::ContainerSpec;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::net::{Ipv4Addr, TcpListener};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct RelayState {
    messages: Vec<Value>,
    subscriptions: HashMap<String, HashSet<String>>,
    drop_messages: bool,
}

/// Message bus shared by every fake node of a test.
#[derive(Clone, Default)]
pub(crate) struct FakeRelay {
    state: Arc<Mutex<RelayState>>,
}

impl FakeRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept publishes but never make them visible.
    pub fn drop_messages(&self) {
        self.state.lock().drop_messages = true;
    }

    pub fn subscriptions(&self, node: &str) -> HashSet<String> {
        self.state
            .lock()
            .subscriptions
            .get(node)
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Clone)]
struct FakeNode {
    name: String,
    tcp_port: u16,
    bootstrap: Option<String>,
    relay: FakeRelay,
}

fn flag<'a>(spec: &'a ContainerSpec, name: &str) -> Option<&'a str> {
    let prefix = format!("--{name}=");
    spec.args.iter().find_map(|a| a.strip_prefix(prefix.as_str()))
}

/// Serve a fake control plane for every container `runtime` starts.
pub(crate) fn install(runtime: &MockRuntime, relay: &FakeRelay) {
    let relay = relay.clone();
    runtime.on_run(move |spec| {
        let rest_port: u16 = flag(spec, "rest-port").unwrap().parse().unwrap();
        let node = FakeNode {
            name: spec.name.clone(),
            tcp_port: flag(spec, "tcp-port").unwrap().parse().unwrap(),
            bootstrap: flag(spec, "discv5-bootstrap-node").map(ToString::to_string),
            relay: relay.clone(),
        };
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, rest_port)).unwrap();
        listener.set_nonblocking(true).unwrap();
        let listener = tokio::net::TcpListener::from_std(listener).unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(node)).await.unwrap();
        });
    });
}

fn router(node: FakeNode) -> Router {
    Router::new()
        .route("/debug/v1/info", get(info))
        .route("/relay/v1/auto/subscriptions", post(subscribe))
        .route("/relay/v1/auto/messages", post(publish))
        .route("/relay/v1/auto/messages/:topic", get(messages))
        .route("/admin/v1/peers", get(peers))
        .with_state(node)
}

async fn info(State(node): State<FakeNode>) -> Json<Value> {
    Json(json!({
        "listenAddresses": [format!("/ip4/0.0.0.0/tcp/{}/p2p/16Uiu2HAm{}", node.tcp_port, node.name)],
        "enrUri": format!("enr:-fake-{}", node.name),
    }))
}

async fn subscribe(State(node): State<FakeNode>, Json(topics): Json<Vec<String>>) -> StatusCode {
    node.relay
        .state
        .lock()
        .subscriptions
        .entry(node.name.clone())
        .or_default()
        .extend(topics);
    StatusCode::OK
}

async fn publish(State(node): State<FakeNode>, Json(message): Json<Value>) -> StatusCode {
    if message.get("payload").is_none() || message.get("contentTopic").is_none() {
        return StatusCode::BAD_REQUEST;
    }
    let mut state = node.relay.state.lock();
    if !state.drop_messages {
        state.messages.push(message);
    }
    StatusCode::OK
}

async fn messages(State(node): State<FakeNode>, Path(topic): Path<String>) -> Json<Value> {
    let state = node.relay.state.lock();
    let subscribed = state
        .subscriptions
        .get(&node.name)
        .map_or(false, |topics| topics.contains(&topic));
    let visible: Vec<Value> = if subscribed {
        state
            .messages
            .iter()
            .filter(|m| m["contentTopic"] == topic)
            .cloned()
            .collect()
    } else {
        Vec::new()
    };
    Json(Value::Array(visible))
}

async fn peers(State(node): State<FakeNode>) -> Json<Value> {
    let peers = node
        .bootstrap
        .map(|enr| {
            vec![json!({
                "multiaddr": format!("/ip4/172.18.111.225/tcp/21162/p2p/{enr}"),
                "protocols": [{"protocol": "/vac/waku/relay/2.0.0", "connected": true}],
            })]
        })
        .unwrap_or_default();
    Json(Value::Array(peers))
}
