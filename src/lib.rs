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

//! Ledgerwatch - single-node proof-of-work ledger with peer health monitoring.
//!
//! This repository provides:
//! - A hash-linked chain with a single-writer, mutex-guarded append path and SHA-256
//!   proof-of-work mining over a canonical block encoding
//! - Full chain verification reporting the first broken block
//! - Optional durable chain storage on sled
//! - A per-peer reachability state machine with failure thresholds and timed blacklisting
//! - Rate-limited operator alerts over a pluggable transport (SMTP or log)
//! - Monitoring via Prometheus metrics and structured logging
//! - An HTTP/WebSocket surface over all of the above

/// HTTP routes.
pub mod api;
/// Startup configuration.
pub mod config;
/// Ledger engine and shared primitives.
pub mod core;
/// Observability (metrics, structured logging helpers).
pub mod monitoring;
/// Peer registry, health monitor and alerting.
pub mod networking;
/// Component wiring.
pub mod node;
