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
#![warn(missing_docs)]

//! HTTP surface.
//!
//! | Route                          | Action                                      |
//! |--------------------------------|---------------------------------------------|
//! | `GET /status`                  | chain snapshot, validity and peer statuses  |
//! | `GET/POST /mine?miner=`        | append a "Mining Reward" block              |
//! | `GET /add-node?address=&location=` | register a peer                         |
//! | `GET /peers`                   | peer statuses                               |
//! | `GET /peers/:address/history`  | recent checks of one peer                   |
//! | `GET /ws`                      | WebSocket feed, one status list per pass    |
//! | `GET /verify`                  | full chain verification                     |
//! | `GET /metrics`                 | Prometheus exposition                       |
//! | `POST /contracts/execute`      | append a contract payload                   |
//! | `POST /assets`                 | append an asset creation                    |

use crate::core::{
    ledger::{ChainSnapshot, IntegrityError},
    types::Block,
};
use crate::networking::peer_registry::{HistoryEntry, PeerStatusView};
use crate::node::{Node, NodeError, MINING_REWARD_PAYLOAD};
use axum::{
    extract::{
        ws::{Message, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{Sink, SinkExt};
use serde::{Deserialize, Serialize};
use std::{pin::pin, sync::Arc};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Producer recorded on contract executions.
pub const CONTRACT_PRODUCER: &str = "SmartContract-Execution";
/// Producer recorded on asset creations.
pub const ASSET_PRODUCER: &str = "Asset-Creation";

type AppState = Arc<Node>;

/// Handler error mapped to a status code and a JSON body.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }
}

impl From<NodeError> for ApiError {
    fn from(e: NodeError) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: e.to_string() }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

/// `GET /status` body.
#[derive(Serialize)]
pub struct StatusResponse {
    /// Index of the tip.
    pub height: u64,
    /// Result of verifying the snapshot.
    pub valid: bool,
    /// Chain copy.
    pub chain: ChainSnapshot,
    /// Peer statuses.
    pub peers: Vec<PeerStatusView>,
}

/// `GET /verify` body.
#[derive(Serialize)]
pub struct VerifyResponse {
    /// True when the whole chain verifies.
    pub valid: bool,
    /// Number of blocks checked.
    pub length: usize,
    /// First broken position, if any.
    pub error: Option<IntegrityError>,
}

/// `GET /add-node` body.
#[derive(Serialize)]
pub struct AddNodeResponse {
    /// Registered address.
    pub address: String,
    /// Peer state after registration.
    pub status: PeerStatusView,
}

#[derive(Deserialize)]
struct MineQuery {
    miner: Option<String>,
}

#[derive(Deserialize)]
struct AddNodeQuery {
    address: String,
    location: Option<String>,
}

/// `POST /contracts/execute` body.
#[derive(Deserialize)]
pub struct ContractRequest {
    /// Contract payload recorded on chain.
    pub data: String,
}

/// `POST /assets` body.
#[derive(Deserialize)]
pub struct AssetRequest {
    /// Asset name recorded on chain.
    pub name: String,
}

/// Build the router over a shared node.
pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/mine", get(mine).post(mine))
        .route("/add-node", get(add_node))
        .route("/peers", get(peers))
        .route("/peers/:address/history", get(peer_history))
        .route("/ws", get(ws_feed))
        .route("/verify", get(verify))
        .route("/metrics", get(metrics))
        .route("/contracts/execute", post(execute_contract))
        .route("/assets", post(create_asset))
        .with_state(node)
}

async fn status(State(node): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let report = node.chain_report().await?;
    let valid = report.integrity.is_ok();
    let chain = report.chain;
    let height = chain.tip().map(|b| b.index).unwrap_or_default();
    let peers = node.registry.statuses().await;
    Ok(Json(StatusResponse { height, valid, chain, peers }))
}

async fn mine(
    State(node): State<AppState>,
    Query(q): Query<MineQuery>,
) -> Result<Json<Block>, ApiError> {
    let miner = q.miner.map(|m| m.trim().to_string()).unwrap_or_default();
    if miner.is_empty() {
        return Err(ApiError::bad_request("miner required"));
    }
    let block = node.append(MINING_REWARD_PAYLOAD.to_string(), miner).await?;
    Ok(Json(block))
}

async fn add_node(
    State(node): State<AppState>,
    Query(q): Query<AddNodeQuery>,
) -> Result<Json<AddNodeResponse>, ApiError> {
    let address = q.address.trim().to_string();
    if address.is_empty() {
        return Err(ApiError::bad_request("address required"));
    }
    let handle = node.registry.register_default(&address, q.location).await;
    let status = handle.lock().await.view();
    Ok(Json(AddNodeResponse { address, status }))
}

async fn peers(State(node): State<AppState>) -> Json<Vec<PeerStatusView>> {
    Json(node.registry.statuses().await)
}

async fn peer_history(
    State(node): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let Some(handle) = node.registry.get(&address) else {
        return Err(ApiError { status: StatusCode::NOT_FOUND, message: "unknown peer".into() });
    };
    let history = handle.lock().await.history.iter().cloned().collect();
    Ok(Json(history))
}

async fn verify(State(node): State<AppState>) -> Result<Json<VerifyResponse>, ApiError> {
    let report = node.chain_report().await?;
    let error = report.integrity.err();
    Ok(Json(VerifyResponse { valid: error.is_none(), length: report.chain.len(), error }))
}

async fn metrics(State(node): State<AppState>) -> Result<String, ApiError> {
    node.metrics.render().map_err(|e| ApiError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: e.to_string(),
    })
}

async fn execute_contract(
    State(node): State<AppState>,
    Json(req): Json<ContractRequest>,
) -> Result<Json<Block>, ApiError> {
    let block = node.append(req.data, CONTRACT_PRODUCER.to_string()).await?;
    Ok(Json(block))
}

async fn create_asset(
    State(node): State<AppState>,
    Json(req): Json<AssetRequest>,
) -> Result<Json<Block>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("name required"));
    }
    let block = node.append(req.name, ASSET_PRODUCER.to_string()).await?;
    Ok(Json(block))
}

async fn ws_feed(State(node): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let rx = node.monitor.subscribe();
    let initial = node.registry.statuses().await;
    ws.on_upgrade(move |socket| push_statuses(socket, initial, rx))
}

/// Forward status lists to `sink`, starting with `initial`. A lagging receiver skips to
/// the newest lists; the loop ends when the feed closes or the sink fails.
pub async fn push_statuses<S>(
    sink: S,
    initial: Vec<PeerStatusView>,
    mut rx: broadcast::Receiver<Vec<PeerStatusView>>,
) where
    S: Sink<Message>,
{
    let mut sink = pin!(sink);
    let mut next = Some(initial);
    loop {
        let statuses = match next.take() {
            Some(s) => s,
            None => match rx.recv().await {
                Ok(s) => s,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "status feed lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };
        let text = match serde_json::to_string(&statuses) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "status feed encode failed");
                break;
            }
        };
        if sink.send(Message::Text(text)).await.is_err() {
            debug!("status feed client gone");
            break;
        }
    }
}
