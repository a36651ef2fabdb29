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

//! Peer health monitor.
//!
//! ## State machine (per peer)
//! ```text
//! Unknown --ok--> Healthy <--ok-- Degraded
//! Unknown --fail--> Degraded      Healthy --fail--> Degraded (count = 1)
//! Degraded --fail, count < threshold--> Degraded
//! Degraded --fail, count == threshold--> Blacklisted (count = 0, alert)
//! Blacklisted --cool-down expired--> Unknown, then a fresh check
//! ```
//! While the cool-down runs the peer is skipped silently: no dial, no alert.
//! The blacklist flag is cleared only once the post-cool-down check has completed.
//!
//! ## Locking
//! The peer's record lock is held for the transition and the dial (bounded by the dial
//! timeout). Alert delivery runs after the lock is released, on a copy of the peer's
//! [`AlertSlot`](crate::networking::alert::AlertSlot) that is written back afterwards.

use crate::core::shutdown::Shutdown;
use crate::monitoring::metrics::Metrics;
use crate::networking::{
    alert::{Alerter, Dispatch},
    peer_registry::{PeerHandle, PeerRegistry, PeerStatus, PeerStatusView},
};
use futures::future::join_all;
use std::{sync::Arc, time::Duration};
use tokio::{sync::broadcast, task::JoinHandle, time::Instant};
use tracing::{debug, info, warn};

/// Capacity of the status feed channel.
pub const FEED_CAPACITY: usize = 64;

/// Monitor timing.
#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// Pause between passes.
    pub interval: Duration,
    /// Per-dial timeout.
    pub dial_timeout: Duration,
    /// How long a tripped peer is skipped.
    pub cooldown: Duration,
}

/// Result of one peer check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Blacklisted and still cooling down; not dialled.
    Skipped,
    /// Reachable.
    Healthy,
    /// Unreachable, below threshold.
    Degraded {
        /// Consecutive failures so far.
        errors: u32,
    },
    /// Threshold reached on this check.
    Blacklisted {
        /// What the alerter did, `None` if delivery failed.
        alert: Option<Dispatch>,
    },
}

/// Periodic driver over a [`PeerRegistry`].
pub struct HealthMonitor {
    registry: Arc<PeerRegistry>,
    alerter: Arc<Alerter>,
    cfg: MonitorConfig,
    feed: broadcast::Sender<Vec<PeerStatusView>>,
    metrics: Option<Metrics>,
}

impl HealthMonitor {
    /// Monitor over `registry`, alerting through `alerter`.
    pub fn new(registry: Arc<PeerRegistry>, alerter: Arc<Alerter>, cfg: MonitorConfig) -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self { registry, alerter, cfg, feed, metrics: None }
    }

    /// Report into `metrics`.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Registry being watched.
    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    /// Receive the full status list after every pass.
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<PeerStatusView>> {
        self.feed.subscribe()
    }

    /// Check one peer and apply the transition table.
    pub async fn check_peer(&self, peer: &PeerHandle) -> CheckOutcome {
        let (address, mut slot, threshold) = {
            let mut rec = peer.lock().await;

            if rec.blacklisted {
                let cooling = rec
                    .blacklisted_at
                    .map(|t| t.elapsed() < self.cfg.cooldown)
                    .unwrap_or(false);
                if cooling {
                    debug!(peer = %rec.address, "blacklisted, check skipped");
                    return CheckOutcome::Skipped;
                }
                rec.status = PeerStatus::Unknown;
            }

            let reachable = self.registry.check(&mut rec, self.cfg.dial_timeout).await;
            let was_blacklisted = rec.blacklisted;
            rec.blacklisted = false;
            rec.blacklisted_at = None;

            let tripped = !reachable && rec.error_count >= rec.threshold;
            if reachable {
                if rec.status != PeerStatus::Healthy {
                    info!(peer = %rec.address, after_blacklist = was_blacklisted, "peer healthy");
                }
                rec.status = PeerStatus::Healthy;
            } else if tripped {
                rec.error_count = 0;
                rec.status = PeerStatus::Blacklisted;
                rec.blacklisted = true;
                rec.blacklisted_at = Some(Instant::now());
                if let Some(m) = &self.metrics {
                    m.peer_blacklisted_total.inc();
                }
                warn!(peer = %rec.address, threshold = rec.threshold, "peer blacklisted");
            } else {
                rec.status = PeerStatus::Degraded;
            }

            let stamp = rec.last_check_ms.unwrap_or_default();
            rec.record_history(stamp);

            if !tripped {
                return if reachable {
                    CheckOutcome::Healthy
                } else {
                    CheckOutcome::Degraded { errors: rec.error_count }
                };
            }
            (rec.address.clone(), rec.alert.clone(), rec.threshold)
        };

        let reason = format!("{threshold} consecutive failed checks");
        let alert = match self.alerter.notify(&address, &mut slot, &reason).await {
            Ok(d) => Some(d),
            Err(_) => None,
        };
        peer.lock().await.alert.last_alert = slot.last_alert;
        CheckOutcome::Blacklisted { alert }
    }

    /// Check every registered peer concurrently, then publish the status list.
    pub async fn run_pass(&self) -> Vec<(String, CheckOutcome)> {
        let handles = self.registry.handles();
        let outcomes = join_all(handles.iter().map(|h| self.check_peer(h))).await;

        let mut out = Vec::with_capacity(handles.len());
        for (h, outcome) in handles.iter().zip(outcomes) {
            out.push((h.lock().await.address.clone(), outcome));
        }

        // No subscribers is fine.
        let _ = self.feed.send(self.registry.statuses().await);
        out
    }

    /// Run passes every `interval` until `shutdown` fires.
    pub async fn run(self: Arc<Self>, mut shutdown: Shutdown) {
        info!(
            peers = self.registry.len(),
            interval = ?self.cfg.interval,
            "health monitor started"
        );
        loop {
            if shutdown.is_triggered() {
                break;
            }
            self.run_pass().await;
            if !shutdown.sleep(self.cfg.interval).await {
                break;
            }
        }
        info!("health monitor stopped");
    }

    /// Spawn [`HealthMonitor::run`] on the current runtime.
    pub fn spawn(self: Arc<Self>, shutdown: Shutdown) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
