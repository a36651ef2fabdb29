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

//! Operator alerts with a per-peer suppression window and bounded retry.
//!
//! Delivery goes through an [`AlertTransport`]. [`SmtpTransport`] speaks plain SMTP
//! (EHLO, optional AUTH PLAIN, MAIL/RCPT/DATA); [`LogTransport`] only logs.
//!
//! The last-alert timestamp lives in the peer's [`AlertSlot`] and is updated only after a
//! successful delivery. A delivery that fails every attempt leaves it untouched.

use crate::core::shutdown::Shutdown;
use crate::monitoring::metrics::Metrics;
use async_trait::async_trait;
use data_encoding::BASE64;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
    time::Instant,
};
use tracing::{debug, error, info, warn};
use zeroize::Zeroize;

/// Longest reply line accepted from a relay, CRLF included.
const MAX_REPLY_LINE: u64 = 1024;

/// Alert delivery errors.
#[derive(Debug, Error)]
pub enum AlertDeliveryError {
    /// Relay unreachable.
    #[error("connect: {0}")]
    Connect(std::io::Error),
    /// Session broke mid-way.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// Relay answered with an unexpected code.
    #[error("server replied {code} to {stage}")]
    Rejected {
        /// Command being answered.
        stage: &'static str,
        /// Reply code.
        code: u16,
    },
    /// Reply could not be parsed.
    #[error("malformed server reply")]
    Protocol,
    /// Session exceeded its time bound.
    #[error("timed out")]
    Timeout,
    /// Shutdown fired during retry backoff.
    #[error("cancelled by shutdown")]
    Cancelled,
}

/// One plain-text message to one recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AlertMessage {
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Body text.
    pub body: String,
}

/// Delivery capability.
#[async_trait]
pub trait AlertTransport: Send + Sync {
    /// Deliver `msg` once.
    async fn deliver(&self, msg: &AlertMessage) -> Result<(), AlertDeliveryError>;
}

/// Per-peer alert bookkeeping.
#[derive(Clone, Debug)]
pub struct AlertSlot {
    /// Who gets alerts for this peer.
    pub recipient: String,
    /// Time of the last successful delivery.
    pub last_alert: Option<Instant>,
}

impl AlertSlot {
    /// Slot that has never alerted.
    pub fn new(recipient: impl Into<String>) -> Self {
        Self { recipient: recipient.into(), last_alert: None }
    }
}

/// Retry and suppression settings.
#[derive(Clone, Debug)]
pub struct AlertPolicy {
    /// Delivery attempts.
    pub retry_count: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// Minimum gap between deliveries for one peer.
    pub suppression: Duration,
    /// Sender address.
    pub from: String,
}

/// What a `notify` call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Inside the suppression window; nothing sent.
    Suppressed,
    /// Delivered on the given attempt.
    Delivered {
        /// 1-based attempt number.
        attempt: u32,
    },
}

/// Alert dispatcher.
pub struct Alerter {
    transport: Arc<dyn AlertTransport>,
    policy: AlertPolicy,
    shutdown: Shutdown,
    metrics: Option<Metrics>,
}

impl Alerter {
    /// Dispatcher over `transport`. `shutdown` cancels retry backoff.
    pub fn new(
        transport: Arc<dyn AlertTransport>,
        policy: AlertPolicy,
        shutdown: Shutdown,
    ) -> Self {
        Self { transport, policy, shutdown, metrics: None }
    }

    /// Report into `metrics`.
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Active policy.
    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    /// Message sent when `address` trips its threshold.
    pub fn message(&self, address: &str, recipient: &str, reason: &str) -> AlertMessage {
        AlertMessage {
            from: self.policy.from.clone(),
            to: recipient.to_string(),
            subject: "[ALERT] Node unreachable".to_string(),
            body: format!("Node {address} is unreachable: {reason}. Please check connectivity."),
        }
    }

    /// Alert about `address` unless the slot alerted within the suppression window.
    pub async fn notify(
        &self,
        address: &str,
        slot: &mut AlertSlot,
        reason: &str,
    ) -> Result<Dispatch, AlertDeliveryError> {
        if let Some(last) = slot.last_alert {
            if last.elapsed() < self.policy.suppression {
                debug!(peer = %address, "alert suppressed");
                return Ok(Dispatch::Suppressed);
            }
        }

        let msg = self.message(address, &slot.recipient, reason);
        let attempts = self.policy.retry_count.max(1);
        let mut shutdown = self.shutdown.clone();
        let mut last_err = AlertDeliveryError::Protocol;

        for attempt in 1..=attempts {
            match self.transport.deliver(&msg).await {
                Ok(()) => {
                    slot.last_alert = Some(Instant::now());
                    if let Some(m) = &self.metrics {
                        m.peer_alerts_sent_total.inc();
                    }
                    info!(peer = %address, to = %slot.recipient, attempt, "alert sent");
                    return Ok(Dispatch::Delivered { attempt });
                }
                Err(e) => {
                    warn!(peer = %address, attempt, attempts, error = %e, "alert delivery failed");
                    last_err = e;
                }
            }
            if attempt < attempts && !shutdown.sleep(self.policy.retry_delay).await {
                last_err = AlertDeliveryError::Cancelled;
                break;
            }
        }

        if let Some(m) = &self.metrics {
            m.peer_alert_failures_total.inc();
        }
        error!(peer = %address, error = %last_err, "alert not delivered");
        Err(last_err)
    }
}

/// Transport that only writes the alert to the log.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogTransport;

#[async_trait]
impl AlertTransport for LogTransport {
    async fn deliver(&self, msg: &AlertMessage) -> Result<(), AlertDeliveryError> {
        warn!(to = %msg.to, subject = %msg.subject, body = %msg.body, "alert");
        Ok(())
    }
}

/// Relay settings for [`SmtpTransport`].
#[derive(Clone)]
pub struct SmtpSettings {
    /// Relay host.
    pub server: String,
    /// Relay port.
    pub port: u16,
    /// AUTH PLAIN user; empty skips AUTH.
    pub username: String,
    /// AUTH PLAIN password.
    pub password: crate::config::Secret,
    /// Bound on the whole session.
    pub timeout: Duration,
}

/// Plain-text SMTP client. No STARTTLS.
pub struct SmtpTransport {
    settings: SmtpSettings,
}

impl SmtpTransport {
    /// Client for the given relay.
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    async fn session(&self, msg: &AlertMessage) -> Result<(), AlertDeliveryError> {
        let addr = format!("{}:{}", self.settings.server, self.settings.port);
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(AlertDeliveryError::Connect)?;
        let (rd, mut wr) = stream.into_split();
        let mut rd = BufReader::new(rd);

        expect(&mut rd, "greeting", &[220]).await?;
        command(&mut wr, &mut rd, "EHLO ledgerwatch", "EHLO", &[250]).await?;

        if !self.settings.username.is_empty() {
            let mut token = Vec::new();
            token.push(0u8);
            token.extend_from_slice(self.settings.username.as_bytes());
            token.push(0u8);
            token.extend_from_slice(self.settings.password.expose().as_bytes());
            let mut line = format!("AUTH PLAIN {}", BASE64.encode(&token));
            token.zeroize();
            let res = command(&mut wr, &mut rd, &line, "AUTH", &[235]).await;
            line.zeroize();
            res?;
        }

        command(&mut wr, &mut rd, &format!("MAIL FROM:<{}>", msg.from), "MAIL", &[250]).await?;
        command(&mut wr, &mut rd, &format!("RCPT TO:<{}>", msg.to), "RCPT", &[250, 251]).await?;
        command(&mut wr, &mut rd, "DATA", "DATA", &[354]).await?;

        wr.write_all(render_data(msg).as_bytes()).await?;
        expect(&mut rd, "message", &[250]).await?;

        // The message is accepted at this point; a failed QUIT is not a delivery failure.
        let _ = command(&mut wr, &mut rd, "QUIT", "QUIT", &[221]).await;
        Ok(())
    }
}

#[async_trait]
impl AlertTransport for SmtpTransport {
    async fn deliver(&self, msg: &AlertMessage) -> Result<(), AlertDeliveryError> {
        match tokio::time::timeout(self.settings.timeout, self.session(msg)).await {
            Ok(res) => res,
            Err(_) => Err(AlertDeliveryError::Timeout),
        }
    }
}

/// DATA section: headers, dot-stuffed body, terminator.
fn render_data(msg: &AlertMessage) -> String {
    let mut out = format!(
        "From: {}\r\nTo: {}\r\nSubject: {}\r\n\r\n",
        msg.from, msg.to, msg.subject
    );
    for line in msg.body.lines() {
        if line.starts_with('.') {
            out.push('.');
        }
        out.push_str(line);
        out.push_str("\r\n");
    }
    out.push_str(".\r\n");
    out
}

async fn command<W, R>(
    wr: &mut W,
    rd: &mut R,
    line: &str,
    stage: &'static str,
    ok: &[u16],
) -> Result<u16, AlertDeliveryError>
where
    W: AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
{
    wr.write_all(line.as_bytes()).await?;
    wr.write_all(b"\r\n").await?;
    wr.flush().await?;
    expect(rd, stage, ok).await
}

/// Read one (possibly multi-line) reply and check its code.
async fn expect<R>(rd: &mut R, stage: &'static str, ok: &[u16]) -> Result<u16, AlertDeliveryError>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut line = String::new();
        let n = (&mut *rd).take(MAX_REPLY_LINE).read_line(&mut line).await?;
        if n == 0 || !line.ends_with('\n') {
            return Err(AlertDeliveryError::Protocol);
        }
        let code: u16 = line
            .get(..3)
            .and_then(|c| c.parse().ok())
            .ok_or(AlertDeliveryError::Protocol)?;
        // "250-..." continues, "250 ..." (or a bare code) ends the reply.
        if line.as_bytes().get(3) == Some(&b'-') {
            continue;
        }
        if ok.contains(&code) {
            return Ok(code);
        }
        return Err(AlertDeliveryError::Rejected { stage, code });
    }
}
