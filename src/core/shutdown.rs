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

//! Process-wide shutdown signal.
//!
//! One [`ShutdownTrigger`] fans out to any number of [`Shutdown`] handles. Async loops
//! select on [`Shutdown::wait`]; the synchronous mining loop polls
//! [`Shutdown::is_triggered`].

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Sending side. Dropping it also counts as shutdown.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Receiving side, cheap to clone.
#[derive(Clone, Debug)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
    // Held only by handles from `never`, so their channel stays open.
    _keep: Option<Arc<watch::Sender<bool>>>,
}

/// Create a linked trigger/handle pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx, _keep: None })
}

impl ShutdownTrigger {
    /// Signal every handle.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// New handle bound to this trigger.
    pub fn subscribe(&self) -> Shutdown {
        Shutdown { rx: self.tx.subscribe(), _keep: None }
    }
}

impl Shutdown {
    /// A handle that never fires.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { rx, _keep: Some(Arc::new(tx)) }
    }

    /// Non-blocking check.
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown has been signalled or the trigger was dropped.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Sleep for `d`; returns false if shutdown interrupted the sleep.
    pub async fn sleep(&mut self, d: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(d) => true,
            _ = self.wait() => false,
        }
    }
}
