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
#![deny(missing_docs)]

//! Registry of watched peers.
//!
//! Each [`PeerRecord`] sits behind its own async mutex, so checks fan out across peers
//! while a single peer's check never overlaps itself. The map lock is held only to look
//! records up or insert them, never across I/O.
//!
//! Reachability is probed by a [`Dialer`]: a plain TCP connect with a bounded timeout in
//! production, a scripted stub in tests.

use crate::core::clock::{Clock, SystemClock};
use crate::monitoring::metrics::Metrics;
use crate::networking::alert::AlertSlot;
use async_trait::async_trait;
use serde::Serialize;
use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, RwLock},
    time::Duration,
};
use thiserror::Error;
use tokio::{net::TcpStream, sync::Mutex, time::Instant};
use tracing::{info, warn};

/// Entries kept per peer in the status history.
pub const HISTORY_LEN: usize = 64;

/// Dial failures. Never fatal; they feed the health state machine.
#[derive(Debug, Error)]
pub enum DialError {
    /// No answer within the timeout.
    #[error("dial timed out after {0:?}")]
    Timeout(Duration),
    /// Connect failed.
    #[error("dial failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Reachability probe.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Try to reach `address` within `timeout`.
    async fn dial(&self, address: &str, timeout: Duration) -> Result<(), DialError>;
}

/// TCP connect probe. The connection is dropped straight after it is established.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, address: &str, timeout: Duration) -> Result<(), DialError> {
        match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(DialError::Io(e)),
            Err(_) => Err(DialError::Timeout(timeout)),
        }
    }
}

/// Health state of a peer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerStatus {
    /// Not checked yet, or cool-down just expired.
    #[default]
    Unknown,
    /// Last check succeeded.
    Healthy,
    /// Failing, below threshold.
    Degraded,
    /// Tripped the threshold; skipped until the cool-down expires.
    Blacklisted,
}

/// One completed check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    /// Status after the check.
    pub status: PeerStatus,
    /// Wall-clock time of the check.
    pub timestamp_ms: u64,
    /// Counter after the check.
    pub error_count: u32,
}

/// Liveness bookkeeping for one peer.
#[derive(Clone, Debug)]
pub struct PeerRecord {
    /// `host:port`.
    pub address: String,
    /// Optional location tag.
    pub location: Option<String>,
    /// Consecutive failures that blacklist this peer.
    pub threshold: u32,
    /// State-machine position.
    pub status: PeerStatus,
    /// Outcome of the last dial.
    pub reachable: bool,
    /// Consecutive failed dials.
    pub error_count: u32,
    /// Alert recipient and last delivery.
    pub alert: AlertSlot,
    /// Set when the threshold trips.
    pub blacklisted: bool,
    /// When the blacklist was entered.
    pub blacklisted_at: Option<Instant>,
    /// Wall-clock time of the last completed check.
    pub last_check_ms: Option<u64>,
    /// Recent checks, oldest first.
    pub history: VecDeque<HistoryEntry>,
}

impl PeerRecord {
    /// Fresh record in `Unknown`.
    pub fn new(address: impl Into<String>, recipient: impl Into<String>, threshold: u32) -> Self {
        Self {
            address: address.into(),
            location: None,
            threshold: threshold.max(1),
            status: PeerStatus::Unknown,
            reachable: false,
            error_count: 0,
            alert: AlertSlot::new(recipient),
            blacklisted: false,
            blacklisted_at: None,
            last_check_ms: None,
            history: VecDeque::new(),
        }
    }

    /// Append to the bounded history.
    pub fn record_history(&mut self, timestamp_ms: u64) {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(HistoryEntry {
            status: self.status,
            timestamp_ms,
            error_count: self.error_count,
        });
    }

    /// Public view for status feeds.
    pub fn view(&self) -> PeerStatusView {
        PeerStatusView {
            address: self.address.clone(),
            status: self.status,
            last_check_ms: self.last_check_ms,
            error_count: self.error_count,
            location: self.location.clone(),
        }
    }
}

/// Externally visible peer state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PeerStatusView {
    /// `host:port`.
    pub address: String,
    /// State-machine position.
    pub status: PeerStatus,
    /// Wall-clock time of the last completed check.
    pub last_check_ms: Option<u64>,
    /// Consecutive failed dials.
    pub error_count: u32,
    /// Optional location tag.
    pub location: Option<String>,
}

/// Shared handle to one record.
pub type PeerHandle = Arc<Mutex<PeerRecord>>;

/// Values used when a caller registers a peer without specifying them.
#[derive(Clone, Debug)]
pub struct RegistryDefaults {
    /// Failure threshold.
    pub threshold: u32,
    /// Alert recipient.
    pub recipient: String,
}

/// Address-keyed peer registry.
pub struct PeerRegistry {
    peers: RwLock<BTreeMap<String, PeerHandle>>,
    dialer: Arc<dyn Dialer>,
    clock: Arc<dyn Clock>,
    defaults: RegistryDefaults,
    metrics: Option<Metrics>,
}

impl PeerRegistry {
    /// Registry probing through `dialer`.
    pub fn new(dialer: Arc<dyn Dialer>, defaults: RegistryDefaults) -> Self {
        Self {
            peers: RwLock::new(BTreeMap::new()),
            dialer,
            clock: Arc::new(SystemClock),
            defaults,
            metrics: None,
        }
    }

    /// Use `clock` for check timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Report into `metrics`.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Insert a peer in `Unknown`, or update recipient and threshold of an existing one.
    /// Health state of an existing peer is left alone.
    pub async fn register(&self, address: &str, recipient: &str, threshold: u32) -> PeerHandle {
        let (handle, fresh) = {
            let mut map = self.peers.write().unwrap_or_else(|e| e.into_inner());
            match map.get(address) {
                Some(h) => (h.clone(), false),
                None => {
                    let h = Arc::new(Mutex::new(PeerRecord::new(address, recipient, threshold)));
                    map.insert(address.to_string(), h.clone());
                    if let Some(m) = &self.metrics {
                        m.peers_registered.set(map.len() as i64);
                    }
                    (h, true)
                }
            }
        };
        if fresh {
            info!(peer = %address, threshold, "peer registered");
        } else {
            let mut rec = handle.lock().await;
            rec.alert.recipient = recipient.to_string();
            rec.threshold = threshold.max(1);
        }
        handle
    }

    /// Register with the default recipient and threshold, tagging a location if given.
    pub async fn register_default(&self, address: &str, location: Option<String>) -> PeerHandle {
        let handle = self
            .register(address, &self.defaults.recipient, self.defaults.threshold)
            .await;
        if location.is_some() {
            handle.lock().await.location = location;
        }
        handle
    }

    /// Look a peer up.
    pub fn get(&self, address: &str) -> Option<PeerHandle> {
        self.peers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(address)
            .cloned()
    }

    /// Every record, in address order.
    pub fn handles(&self) -> Vec<PeerHandle> {
        self.peers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect()
    }

    /// Number of registered peers.
    pub fn len(&self) -> usize {
        self.peers.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// True when no peer is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current view of every peer.
    pub async fn statuses(&self) -> Vec<PeerStatusView> {
        let mut out = Vec::new();
        for h in self.handles() {
            out.push(h.lock().await.view());
        }
        out
    }

    /// Dial the peer once. Success resets the counter and marks it reachable; failure
    /// bumps the counter and marks it unreachable. Returns the observed reachability.
    pub async fn check(&self, record: &mut PeerRecord, timeout: Duration) -> bool {
        if let Some(m) = &self.metrics {
            m.peer_checks_total.inc();
        }
        let res = self.dialer.dial(&record.address, timeout).await;
        record.last_check_ms = Some(self.clock.now_ms());
        match res {
            Ok(()) => {
                record.reachable = true;
                record.error_count = 0;
                true
            }
            Err(e) => {
                record.reachable = false;
                record.error_count = record.error_count.saturating_add(1);
                if let Some(m) = &self.metrics {
                    m.peer_check_failures_total.inc();
                }
                warn!(
                    peer = %record.address,
                    errors = record.error_count,
                    threshold = record.threshold,
                    error = %e,
                    "peer unreachable"
                );
                false
            }
        }
    }
}
