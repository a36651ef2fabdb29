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

//! Node wiring: one ledger, one peer registry, one monitor, built from a [`NodeConfig`]
//! and shared by reference with the HTTP layer. No process-wide globals.

use crate::config::{NodeConfig, SelfMiningConfig};
use crate::core::{
    clock::{Clock, SystemClock},
    ledger::{store::ChainStore, ChainSnapshot, IntegrityError, Ledger, LedgerError, LedgerOptions},
    shutdown::Shutdown,
    types::Block,
};
use crate::monitoring::metrics::{Metrics, MetricsError};
use crate::networking::{
    alert::{AlertPolicy, AlertTransport, Alerter, LogTransport, SmtpSettings, SmtpTransport},
    health::{HealthMonitor, MonitorConfig},
    peer_registry::{Dialer, PeerRegistry, RegistryDefaults, TcpDialer},
};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Payload of blocks produced by the mining endpoint and the self-mining loop.
pub const MINING_REWARD_PAYLOAD: &str = "Mining Reward";

/// Bound on one SMTP session.
const SMTP_SESSION_TIMEOUT: Duration = Duration::from_secs(30);

/// Node startup and runtime errors.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("metrics: {0}")]
    Metrics(#[from] MetricsError),
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
    #[error("mining task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Chain copy with the result of verifying it.
#[derive(Clone, Debug)]
pub struct ChainReport {
    /// Snapshot taken under the chain lock.
    pub chain: ChainSnapshot,
    /// First integrity failure, if any.
    pub integrity: Result<(), IntegrityError>,
}

/// Pluggable capabilities. Production uses TCP and SMTP; tests inject stubs.
pub struct Capabilities {
    /// Reachability probe.
    pub dialer: Arc<dyn Dialer>,
    /// Alert delivery.
    pub transport: Arc<dyn AlertTransport>,
    /// Block timestamp source.
    pub clock: Arc<dyn Clock>,
}

impl Capabilities {
    /// TCP dialer, system clock, and SMTP when a relay is configured (log-only otherwise).
    pub fn from_config(cfg: &NodeConfig) -> Self {
        let transport: Arc<dyn AlertTransport> = if cfg.smtp_server.trim().is_empty() {
            warn!("no smtp_server configured; alerts go to the log only");
            Arc::new(LogTransport)
        } else {
            Arc::new(SmtpTransport::new(SmtpSettings {
                server: cfg.smtp_server.clone(),
                port: cfg.smtp_port,
                username: cfg.username.clone(),
                password: cfg.password.clone(),
                timeout: SMTP_SESSION_TIMEOUT,
            }))
        };
        Self { dialer: Arc::new(TcpDialer), transport, clock: Arc::new(SystemClock) }
    }
}

/// A running node's shared state.
pub struct Node {
    /// The chain.
    pub ledger: Arc<Ledger>,
    /// Watched peers.
    pub registry: Arc<PeerRegistry>,
    /// Health driver.
    pub monitor: Arc<HealthMonitor>,
    /// Metrics.
    pub metrics: Metrics,
    self_mining: Option<SelfMiningConfig>,
}

impl Node {
    /// Build every component from `cfg`. `shutdown` halts mining, monitor and alert retry.
    pub async fn build(
        cfg: &NodeConfig,
        caps: Capabilities,
        shutdown: Shutdown,
    ) -> Result<Self, NodeError> {
        let metrics = Metrics::new()?;

        let store = match &cfg.data_dir {
            Some(dir) => Some(ChainStore::open(dir).map_err(LedgerError::from)?),
            None => None,
        };
        let mut opts = LedgerOptions::new(cfg.difficulty);
        if let Some(n) = cfg.max_mining_iterations {
            opts.miner.max_iterations = n;
        }
        opts.halt = shutdown.clone();
        opts.clock = caps.clock.clone();
        opts.store = store;
        opts.metrics = Some(metrics.clone());
        let ledger = Arc::new(Ledger::open(opts)?);

        let registry = Arc::new(
            PeerRegistry::new(
                caps.dialer,
                RegistryDefaults {
                    threshold: cfg.failure_threshold,
                    recipient: cfg.default_recipient().to_string(),
                },
            )
            .with_clock(caps.clock)
            .with_metrics(metrics.clone()),
        );
        for p in &cfg.peers {
            let handle = registry
                .register(&p.address, &p.alert_email, p.threshold.unwrap_or(cfg.failure_threshold))
                .await;
            if p.location.is_some() {
                handle.lock().await.location = p.location.clone();
            }
        }

        let alerter = Arc::new(
            Alerter::new(
                caps.transport,
                AlertPolicy {
                    retry_count: cfg.retry_count,
                    retry_delay: cfg.retry_delay(),
                    suppression: cfg.alert_suppression(),
                    from: cfg.from_email.clone(),
                },
                shutdown,
            )
            .with_metrics(metrics.clone()),
        );

        let monitor = Arc::new(
            HealthMonitor::new(
                registry.clone(),
                alerter,
                MonitorConfig {
                    interval: cfg.check_interval(),
                    dial_timeout: cfg.dial_timeout(),
                    cooldown: cfg.blacklist_cooldown(),
                },
            )
            .with_metrics(metrics.clone()),
        );

        Ok(Self { ledger, registry, monitor, metrics, self_mining: cfg.self_mining.clone() })
    }

    /// Append on the blocking pool so the async runtime keeps serving while mining.
    pub async fn append(&self, payload: String, producer: String) -> Result<Block, NodeError> {
        let ledger = self.ledger.clone();
        let block = tokio::task::spawn_blocking(move || ledger.append(payload, producer)).await??;
        Ok(block)
    }

    /// Snapshot and verify on the blocking pool. An append holds the chain lock for its
    /// whole search, so reads wait there rather than on an async worker.
    pub async fn chain_report(&self) -> Result<ChainReport, NodeError> {
        let ledger = self.ledger.clone();
        let report = tokio::task::spawn_blocking(move || {
            let chain = ledger.snapshot()?;
            let integrity = chain.verify();
            Ok::<_, LedgerError>(ChainReport { chain, integrity })
        })
        .await??;
        Ok(report)
    }

    /// Start the monitor loop.
    pub fn spawn_monitor(&self, shutdown: Shutdown) -> JoinHandle<()> {
        self.monitor.clone().spawn(shutdown)
    }

    /// Start periodic self-mining if configured.
    pub fn spawn_self_mining(self: &Arc<Self>, mut shutdown: Shutdown) -> Option<JoinHandle<()>> {
        let cfg = self.self_mining.clone()?;
        let node = self.clone();
        Some(tokio::spawn(async move {
            info!(
                producer = %cfg.producer,
                interval_secs = cfg.interval_secs,
                "self-mining started"
            );
            let interval = Duration::from_secs(cfg.interval_secs);
            loop {
                if shutdown.is_triggered() {
                    break;
                }
                if let Err(e) = node
                    .append(MINING_REWARD_PAYLOAD.to_string(), cfg.producer.clone())
                    .await
                {
                    warn!(error = %e, "self-mining append failed");
                }
                if !shutdown.sleep(interval).await {
                    break;
                }
            }
            info!("self-mining stopped");
        }))
    }
}
