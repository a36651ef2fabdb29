// Copyright (c) 2026 Ledgerwatch
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

mod common;

use axum::{
    body::{to_bytes, Body},
    extract::ws::Message,
    http::{Request, StatusCode},
    Router,
};
use common::{RecordingTransport, ScriptedDialer};
use futures::StreamExt;
use ledgerwatch::{
    api::{self, push_statuses, ASSET_PRODUCER, CONTRACT_PRODUCER},
    config::NodeConfig,
    core::{
        clock::FixedClock,
        ledger::{miner::MineError, LedgerError},
        shutdown::{self, Shutdown},
    },
    networking::peer_registry::{PeerStatus, PeerStatusView},
    node::{Capabilities, Node, NodeError, MINING_REWARD_PAYLOAD},
};
use serde_json::Value;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{net::TcpListener, sync::broadcast};
use tokio_tungstenite::{tungstenite, MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

const CONFIG: &str = r#"{
    "difficulty": 1,
    "from_email": "node@x",
    "peers": [{ "address": "10.0.0.1:9000", "alert_email": "ops@x", "location": "eu" }]
}"#;

fn caps(dialer: Arc<ScriptedDialer>) -> Capabilities {
    Capabilities {
        dialer,
        transport: RecordingTransport::new(),
        clock: Arc::new(FixedClock::new(1_700_000_000_000)),
    }
}

async fn app() -> (Router, Arc<Node>, Arc<ScriptedDialer>) {
    let cfg = NodeConfig::from_json_str(CONFIG).unwrap();
    let dialer = ScriptedDialer::new(true);
    let node = Arc::new(Node::build(&cfg, caps(dialer.clone()), Shutdown::never()).await.unwrap());
    (api::router(node.clone()), node, dialer)
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = call(app, Request::get(uri).body(Body::empty()).unwrap()).await;
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_json(app: &Router, uri: &str, body: &str) -> (StatusCode, Value) {
    let req = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, body) = call(app, req).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn status_reports_genesis_chain_and_configured_peers() {
    let (app, _, _) = app().await;
    let (status, body) = get_json(&app, "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["height"], 0);
    assert_eq!(body["valid"], true);
    assert_eq!(body["chain"]["difficulty"], 1);
    assert_eq!(body["chain"]["blocks"][0]["payload"], "Genesis Block");
    assert_eq!(body["peers"][0]["address"], "10.0.0.1:9000");
    assert_eq!(body["peers"][0]["status"], "unknown");
    assert_eq!(body["peers"][0]["location"], "eu");
}

#[tokio::test]
async fn mine_appends_a_reward_block() {
    let (app, node, _) = app().await;
    let (status, block) = get_json(&app, "/mine?miner=alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(block["index"], 1);
    assert_eq!(block["payload"], MINING_REWARD_PAYLOAD);
    assert_eq!(block["producer"], "alice");
    assert!(block["hash"].as_str().unwrap().starts_with('0'));

    let req = Request::post("/mine?miner=bob").body(Body::empty()).unwrap();
    assert_eq!(call(&app, req).await.0, StatusCode::OK);
    assert_eq!(node.ledger.len().unwrap(), 3);
}

#[tokio::test]
async fn mine_without_miner_is_a_bad_request() {
    let (app, node, _) = app().await;
    for uri in ["/mine", "/mine?miner=", "/mine?miner=%20"] {
        let (status, body) = get_json(&app, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"], "miner required");
    }
    assert_eq!(node.ledger.len().unwrap(), 1);
}

#[tokio::test]
async fn contracts_and_assets_are_recorded_with_their_producers() {
    let (app, node, _) = app().await;
    let (status, block) = post_json(&app, "/contracts/execute", r#"{"data":"transfer 5"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(block["producer"], CONTRACT_PRODUCER);
    assert_eq!(block["payload"], "transfer 5");

    let (status, block) = post_json(&app, "/assets", r#"{"name":"gold"}"#).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(block["producer"], ASSET_PRODUCER);
    assert_eq!(block["index"], 2);

    let (status, _) = post_json(&app, "/assets", r#"{"name":"  "}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(node.ledger.len().unwrap(), 3);
}

#[tokio::test]
async fn verify_reports_validity_and_length() {
    let (app, node, _) = app().await;
    node.append("x".into(), "p".into()).await.unwrap();
    let (status, body) = get_json(&app, "/verify").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["length"], 2);
    assert!(body["error"].is_null());
}

#[tokio::test]
async fn add_node_registers_and_lists_peers() {
    let (app, node, _) = app().await;
    let (status, body) = get_json(&app, "/add-node?address=10.0.0.2:9000&location=us").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["address"], "10.0.0.2:9000");
    assert_eq!(body["status"]["status"], "unknown");
    assert_eq!(body["status"]["location"], "us");

    let rec = node.registry.get("10.0.0.2:9000").unwrap();
    assert_eq!(rec.lock().await.alert.recipient, "node@x");

    let (_, peers) = get_json(&app, "/peers").await;
    assert_eq!(peers.as_array().unwrap().len(), 2);

    let (status, _) = get_json(&app, "/add-node?address=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn peer_history_follows_monitor_passes() {
    let (app, node, dialer) = app().await;
    dialer.push(&[false]);
    node.monitor.run_pass().await;
    node.monitor.run_pass().await;

    let (status, body) = get_json(&app, "/peers/10.0.0.1:9000/history").await;
    assert_eq!(status, StatusCode::OK);
    let entries = body.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["status"], "degraded");
    assert_eq!(entries[0]["error_count"], 1);
    assert_eq!(entries[1]["status"], "healthy");
    assert_eq!(entries[1]["timestamp_ms"], 1_700_000_000_000u64);

    let (status, _) = get_json(&app, "/peers/10.9.9.9:1/history").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn metrics_expose_ledger_and_peer_counters() {
    let (app, node, _) = app().await;
    node.append("x".into(), "p".into()).await.unwrap();
    node.monitor.run_pass().await;

    let (status, body) = call(&app, Request::get("/metrics").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("ledger_block_height 1"));
    assert!(text.contains("ledger_blocks_mined_total 1"));
    assert!(text.contains("peers_registered 1"));
    assert!(text.contains("peer_checks_total 1"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn chain_reads_do_not_stall_the_runtime_while_mining() {
    // Difficulty 64 is never met, so the append holds the chain lock until halted.
    let cfg = NodeConfig::from_json_str(r#"{ "difficulty": 64 }"#).unwrap();
    let (trigger, halt) = shutdown::channel();
    let trigger = Arc::new(trigger);
    let node = Node::build(&cfg, caps(ScriptedDialer::new(true)), halt).await.unwrap();
    let node = Arc::new(node);
    let app = api::router(node.clone());

    // Release the miner even if the runtime wedges, so a regression fails instead of hanging.
    {
        let trigger = trigger.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(5));
            trigger.trigger();
        });
    }

    let mining = {
        let node = node.clone();
        tokio::spawn(async move { node.append("tx".into(), "alice".into()).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let status = {
        let app = app.clone();
        tokio::spawn(async move { get_json(&app, "/status").await })
    };
    let ticks = Arc::new(AtomicUsize::new(0));
    let heartbeat = {
        let ticks = ticks.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_millis(10)).await;
                ticks.fetch_add(1, Ordering::Relaxed);
            }
        })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!status.is_finished(), "status answered while the chain lock was held");
    assert!(ticks.load(Ordering::Relaxed) >= 5, "worker starved");

    trigger.trigger();
    let (code, body) = status.await.unwrap();
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["height"], 0);
    assert_eq!(body["valid"], true);
    heartbeat.abort();

    let err = mining.await.unwrap().unwrap_err();
    assert!(matches!(err, NodeError::Ledger(LedgerError::Mining(MineError::Halted))));
}

fn view(address: &str, error_count: u32) -> PeerStatusView {
    PeerStatusView {
        address: address.to_string(),
        status: PeerStatus::Degraded,
        last_check_ms: Some(1),
        error_count,
        location: None,
    }
}

fn error_counts(msg: Message) -> Vec<u64> {
    let text = match msg {
        Message::Text(text) => text,
        other => panic!("expected text frame, got {other:?}"),
    };
    let list: Value = serde_json::from_str(&text).unwrap();
    list.as_array().unwrap().iter().map(|p| p["error_count"].as_u64().unwrap()).collect()
}

#[tokio::test]
async fn status_feed_sends_initial_list_then_newest_updates() {
    let (tx, rx) = broadcast::channel(2);
    let (sink, out) = futures::channel::mpsc::unbounded::<Message>();

    // Three lists into a two-slot channel: the receiver lags past the first.
    for n in 1..=3 {
        tx.send(vec![view("10.0.0.1:1", n)]).unwrap();
    }
    drop(tx);
    push_statuses(sink, vec![view("10.0.0.1:1", 0)], rx).await;

    let frames: Vec<Vec<u64>> = out.map(error_counts).collect().await;
    assert_eq!(frames, vec![vec![0], vec![2], vec![3]]);
}

#[tokio::test]
async fn status_feed_stops_when_the_client_goes_away() {
    let (tx, rx) = broadcast::channel(4);
    let (sink, out) = futures::channel::mpsc::unbounded::<Message>();
    drop(out);

    tokio::time::timeout(Duration::from_secs(1), push_statuses(sink, vec![], rx))
        .await
        .expect("feed kept running without a client");
    assert_eq!(tx.receiver_count(), 0);
}

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn next_list(ws: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no frame within 5s")
            .expect("stream ended")
            .unwrap();
        if let tungstenite::Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn ws_feed_pushes_statuses_after_each_pass() {
    let (app, node, dialer) = app().await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let first = next_list(&mut ws).await;
    assert_eq!(first[0]["address"], "10.0.0.1:9000");
    assert_eq!(first[0]["status"], "unknown");

    dialer.push(&[false]);
    node.monitor.run_pass().await;
    let second = next_list(&mut ws).await;
    assert_eq!(second[0]["status"], "degraded");
    assert_eq!(second[0]["error_count"], 1);
    assert_eq!(second[0]["location"], "eu");

    node.monitor.run_pass().await;
    assert_eq!(next_list(&mut ws).await[0]["status"], "healthy");
    server.abort();
}
