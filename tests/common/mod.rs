// Copyright (c) 2026 Ledgerwatch
// Licensed under the Apache License, Version 2.0

#![allow(dead_code)]

use async_trait::async_trait;
use ledgerwatch::core::shutdown::Shutdown;
use ledgerwatch::networking::{
    alert::{AlertDeliveryError, AlertMessage, AlertPolicy, AlertTransport, Alerter},
    health::{HealthMonitor, MonitorConfig},
    peer_registry::{DialError, Dialer, PeerRegistry, RegistryDefaults},
};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

/// Dialer that replays a script of outcomes, then falls back to `default_ok`.
pub struct ScriptedDialer {
    script: Mutex<VecDeque<bool>>,
    default_ok: Mutex<bool>,
    dials: AtomicUsize,
}

impl ScriptedDialer {
    pub fn new(default_ok: bool) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            default_ok: Mutex::new(default_ok),
            dials: AtomicUsize::new(0),
        })
    }

    pub fn push(&self, outcomes: &[bool]) {
        self.script.lock().unwrap().extend(outcomes.iter().copied());
    }

    pub fn set_default(&self, ok: bool) {
        *self.default_ok.lock().unwrap() = ok;
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dialer for ScriptedDialer {
    async fn dial(&self, _address: &str, timeout: Duration) -> Result<(), DialError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        let ok = next.unwrap_or_else(|| *self.default_ok.lock().unwrap());
        if ok {
            Ok(())
        } else {
            Err(DialError::Timeout(timeout))
        }
    }
}

/// Transport that fails its first `failures` deliveries and records the rest.
pub struct RecordingTransport {
    failures: AtomicUsize,
    attempts: AtomicUsize,
    sent: Mutex<Vec<AlertMessage>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Self::failing(0)
    }

    pub fn failing(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<AlertMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertTransport for RecordingTransport {
    async fn deliver(&self, msg: &AlertMessage) -> Result<(), AlertDeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(AlertDeliveryError::Timeout);
        }
        self.sent.lock().unwrap().push(msg.clone());
        Ok(())
    }
}

pub fn policy(retry_count: u32, suppression: Duration) -> AlertPolicy {
    AlertPolicy {
        retry_count,
        retry_delay: Duration::from_secs(1),
        suppression,
        from: "node@ledgerwatch.test".to_string(),
    }
}

pub struct Harness {
    pub dialer: Arc<ScriptedDialer>,
    pub transport: Arc<RecordingTransport>,
    pub registry: Arc<PeerRegistry>,
    pub monitor: Arc<HealthMonitor>,
}

/// Monitor with a scripted dialer and recording transport.
pub fn harness(cooldown: Duration, suppression: Duration) -> Harness {
    let dialer = ScriptedDialer::new(true);
    let transport = RecordingTransport::new();
    let registry = Arc::new(PeerRegistry::new(
        dialer.clone(),
        RegistryDefaults { threshold: 3, recipient: "ops@ledgerwatch.test".to_string() },
    ));
    let alerter = Arc::new(Alerter::new(
        transport.clone(),
        policy(3, suppression),
        Shutdown::never(),
    ));
    let monitor = Arc::new(HealthMonitor::new(
        registry.clone(),
        alerter,
        MonitorConfig {
            interval: Duration::from_secs(10),
            dial_timeout: Duration::from_secs(5),
            cooldown,
        },
    ));
    Harness { dialer, transport, registry, monitor }
}
