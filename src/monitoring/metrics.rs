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

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Metrics errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus")]
    Prom,
}

/// Metrics container.
#[derive(Clone)]
pub struct Metrics {
    /// Registry.
    pub registry: Registry,

    /// Index of the chain tip.
    pub block_height: IntGauge,
    /// Blocks appended since start.
    pub blocks_mined_total: IntCounter,
    /// Hash attempts spent by the miner.
    pub mining_iterations_total: IntCounter,

    /// Registered peers gauge.
    pub peers_registered: IntGauge,
    /// Dial attempts.
    pub peer_checks_total: IntCounter,
    /// Failed dial attempts.
    pub peer_check_failures_total: IntCounter,
    /// Blacklist events.
    pub peer_blacklisted_total: IntCounter,
    /// Alerts delivered.
    pub peer_alerts_sent_total: IntCounter,
    /// Alerts that exhausted all retries.
    pub peer_alert_failures_total: IntCounter,
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter, MetricsError> {
    let c = IntCounter::new(name, help).map_err(|_| MetricsError::Prom)?;
    registry
        .register(Box::new(c.clone()))
        .map_err(|_| MetricsError::Prom)?;
    Ok(c)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge, MetricsError> {
    let g = IntGauge::new(name, help).map_err(|_| MetricsError::Prom)?;
    registry
        .register(Box::new(g.clone()))
        .map_err(|_| MetricsError::Prom)?;
    Ok(g)
}

impl Metrics {
    /// Create and register metrics.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let block_height = gauge(&registry, "ledger_block_height", "Index of the chain tip")?;
        let blocks_mined_total =
            counter(&registry, "ledger_blocks_mined_total", "Blocks appended")?;
        let mining_iterations_total = counter(
            &registry,
            "ledger_mining_iterations_total",
            "Hash attempts spent mining",
        )?;

        let peers_registered = gauge(&registry, "peers_registered", "Registered peers")?;
        let peer_checks_total = counter(&registry, "peer_checks_total", "Peer dial attempts")?;
        let peer_check_failures_total =
            counter(&registry, "peer_check_failures_total", "Failed peer dials")?;
        let peer_blacklisted_total =
            counter(&registry, "peer_blacklisted_total", "Peer blacklist events")?;
        let peer_alerts_sent_total =
            counter(&registry, "peer_alerts_sent_total", "Alerts delivered")?;
        let peer_alert_failures_total = counter(
            &registry,
            "peer_alert_failures_total",
            "Alerts that failed every retry",
        )?;

        Ok(Self {
            registry,
            block_height,
            blocks_mined_total,
            mining_iterations_total,
            peers_registered,
            peer_checks_total,
            peer_check_failures_total,
            peer_blacklisted_total,
            peer_alerts_sent_total,
            peer_alert_failures_total,
        })
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> Result<String, MetricsError> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .map_err(|_| MetricsError::Prom)?;
        String::from_utf8(buf).map_err(|_| MetricsError::Prom)
    }
}
