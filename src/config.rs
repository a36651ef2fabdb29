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

//! Node configuration.
//!
//! ## Format (JSON)
//! ```text
//! {
//!   "smtp_server": "smtp.example.com",
//!   "smtp_port": "587",
//!   "username": "alerts",
//!   "password": "...",
//!   "from_email": "alerts@example.com",
//!   "retry_count": 3,
//!   "retry_delay": 5,
//!   "blacklist_timeout": 10,
//!   "peers": [{ "address": "10.0.0.2:8080", "alert_email": "ops@example.com" }]
//! }
//! ```
//! `retry_delay` is in seconds and `blacklist_timeout` in minutes. Every other key is
//! optional. A path ending in `.toml` is parsed as TOML with the same keys.
//!
//! The document is read once at startup; a missing file, a parse error or a failed
//! validation is fatal.

use crate::core::types::MAX_DIFFICULTY;
use crate::monitoring::logging::LogFormat;
use serde::{Deserialize, Deserializer};
use std::{fmt, fs, path::Path, time::Duration};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Configuration errors. All of them abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Cannot read the file.
    #[error("read config {path}: {source}")]
    Read {
        /// Path that failed.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Cannot parse the document.
    #[error("parse config: {0}")]
    Parse(String),
    /// A value is out of range.
    #[error("invalid config field `{field}`: {reason}")]
    Invalid {
        /// Offending key.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Credential that is wiped from memory on drop and never printed.
#[derive(Clone, Default, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wrap a value.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Borrow the plaintext.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// True when no credential was supplied.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// A peer to watch from startup.
#[derive(Clone, Debug, Deserialize)]
pub struct PeerConfig {
    /// `host:port`.
    pub address: String,
    /// Recipient of alerts for this peer.
    pub alert_email: String,
    /// Free-form location tag.
    #[serde(default)]
    pub location: Option<String>,
    /// Overrides `failure_threshold` for this peer.
    #[serde(default)]
    pub threshold: Option<u32>,
}

/// Periodic self-mining.
#[derive(Clone, Debug, Deserialize)]
pub struct SelfMiningConfig {
    /// Producer recorded on self-mined blocks.
    pub producer: String,
    /// Seconds between blocks.
    #[serde(default = "default_self_mining_interval")]
    pub interval_secs: u64,
}

/// Configuration root.
#[derive(Clone, Debug, Deserialize)]
pub struct NodeConfig {
    /// SMTP relay host.
    #[serde(default)]
    pub smtp_server: String,
    /// SMTP relay port. Accepts `"587"` or `587`.
    #[serde(default = "default_smtp_port", deserialize_with = "port_from_str_or_int")]
    pub smtp_port: u16,
    /// SMTP login. Empty disables AUTH.
    #[serde(default)]
    pub username: String,
    /// SMTP password.
    #[serde(default)]
    pub password: Secret,
    /// Envelope and header sender.
    #[serde(default)]
    pub from_email: String,
    /// Delivery attempts per alert.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Seconds between delivery attempts.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
    /// Minutes a tripped peer stays blacklisted.
    #[serde(default = "default_blacklist_timeout")]
    pub blacklist_timeout: u64,

    /// Seconds between monitor passes.
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// Consecutive failures that blacklist a peer.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Minimum seconds between two alerts for the same peer.
    #[serde(default = "default_alert_suppression")]
    pub alert_suppression_secs: u64,
    /// Per-dial timeout in seconds.
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_secs: u64,

    /// Leading zero hex digits required of appended blocks.
    #[serde(default = "default_difficulty")]
    pub difficulty: u32,
    /// Hash attempts per block before mining gives up. Absent => unbounded.
    #[serde(default)]
    pub max_mining_iterations: Option<u64>,
    /// HTTP listen address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Chain store directory. Absent => in-memory chain.
    #[serde(default)]
    pub data_dir: Option<String>,
    /// Periodic self-mining. Absent => disabled.
    #[serde(default)]
    pub self_mining: Option<SelfMiningConfig>,
    /// Peers registered at startup.
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
    /// Recipient for peers added at runtime. Absent => `from_email`.
    #[serde(default)]
    pub default_alert_email: Option<String>,
    /// Log output format.
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_smtp_port() -> u16 {
    25
}
fn default_retry_count() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    5
}
fn default_blacklist_timeout() -> u64 {
    10
}
fn default_check_interval() -> u64 {
    10
}
fn default_failure_threshold() -> u32 {
    3
}
fn default_alert_suppression() -> u64 {
    600
}
fn default_dial_timeout() -> u64 {
    5
}
fn default_difficulty() -> u32 {
    4
}
fn default_listen_addr() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_self_mining_interval() -> u64 {
    5
}

fn port_from_str_or_int<'de, D: Deserializer<'de>>(d: D) -> Result<u16, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Num(u16),
        Text(String),
    }
    match Port::deserialize(d)? {
        Port::Num(n) => Ok(n),
        Port::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

impl NodeConfig {
    /// Read, parse and validate the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let is_toml = path.extension().and_then(|e| e.to_str()) == Some("toml");
        if is_toml {
            Self::from_toml_str(&raw)
        } else {
            Self::from_json_str(&raw)
        }
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Range checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });
        if self.retry_count == 0 {
            return invalid("retry_count", "must be at least 1");
        }
        if self.failure_threshold == 0 {
            return invalid("failure_threshold", "must be at least 1");
        }
        if self.peers.iter().any(|p| p.threshold == Some(0)) {
            return invalid("peers.threshold", "must be at least 1");
        }
        if self.difficulty > MAX_DIFFICULTY {
            return invalid("difficulty", "exceeds 64 hex digits");
        }
        if self.max_mining_iterations == Some(0) {
            return invalid("max_mining_iterations", "must be at least 1");
        }
        if self.check_interval_secs == 0 {
            return invalid("check_interval_secs", "must be positive");
        }
        if self.dial_timeout_secs == 0 {
            return invalid("dial_timeout_secs", "must be positive");
        }
        if self.peers.iter().any(|p| p.address.trim().is_empty()) {
            return invalid("peers.address", "must not be empty");
        }
        if matches!(&self.self_mining, Some(m) if m.interval_secs == 0) {
            return invalid("self_mining.interval_secs", "must be positive");
        }
        Ok(())
    }

    /// Delay between alert delivery attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay)
    }

    /// Blacklist cool-down.
    pub fn blacklist_cooldown(&self) -> Duration {
        Duration::from_secs(self.blacklist_timeout.saturating_mul(60))
    }

    /// Interval between monitor passes.
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Alert suppression window.
    pub fn alert_suppression(&self) -> Duration {
        Duration::from_secs(self.alert_suppression_secs)
    }

    /// Per-dial timeout.
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    /// Recipient for peers registered without one.
    pub fn default_recipient(&self) -> &str {
        self.default_alert_email.as_deref().unwrap_or(&self.from_email)
    }
}
