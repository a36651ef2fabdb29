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

mod common;

use common::harness;
use ledgerwatch::networking::{
    alert::Dispatch,
    health::CheckOutcome,
    peer_registry::{Dialer, PeerStatus, TcpDialer, HISTORY_LEN},
};
use std::time::Duration;

const MIN: Duration = Duration::from_secs(60);

#[tokio::test(start_paused = true)]
async fn failures_below_threshold_then_success_recovers() {
    let h = harness(10 * MIN, 10 * MIN);
    let peer = h.registry.register("10.0.0.1:9000", "ops@x", 3).await;
    h.dialer.push(&[false, false, true]);

    assert_eq!(h.monitor.check_peer(&peer).await, CheckOutcome::Degraded { errors: 1 });
    assert_eq!(h.monitor.check_peer(&peer).await, CheckOutcome::Degraded { errors: 2 });
    assert_eq!(h.monitor.check_peer(&peer).await, CheckOutcome::Healthy);

    let rec = peer.lock().await;
    assert_eq!(rec.status, PeerStatus::Healthy);
    assert_eq!(rec.error_count, 0);
    assert!(rec.reachable);
    assert!(!rec.blacklisted);
    assert!(h.transport.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn threshold_trips_blacklist_and_alerts_once() {
    let h = harness(10 * MIN, 10 * MIN);
    let peer = h.registry.register("10.0.0.2:9000", "ops@x", 3).await;
    h.dialer.set_default(false);

    h.monitor.check_peer(&peer).await;
    h.monitor.check_peer(&peer).await;
    let third = h.monitor.check_peer(&peer).await;
    assert_eq!(
        third,
        CheckOutcome::Blacklisted { alert: Some(Dispatch::Delivered { attempt: 1 }) }
    );
    {
        let rec = peer.lock().await;
        assert_eq!(rec.status, PeerStatus::Blacklisted);
        assert!(rec.blacklisted);
        assert_eq!(rec.error_count, 0);
        assert!(rec.alert.last_alert.is_some());
    }
    let sent = h.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "ops@x");
    assert_eq!(sent[0].subject, "[ALERT] Node unreachable");
    assert!(sent[0].body.contains("10.0.0.2:9000"));

    // Still cooling down: not dialled, nothing changes.
    let dials = h.dialer.dials();
    tokio::time::advance(MIN).await;
    assert_eq!(h.monitor.check_peer(&peer).await, CheckOutcome::Skipped);
    assert_eq!(h.dialer.dials(), dials);
    assert_eq!(peer.lock().await.status, PeerStatus::Blacklisted);
    assert_eq!(h.transport.sent().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn expired_cooldown_runs_a_fresh_check() {
    let h = harness(10 * MIN, 10 * MIN);
    let peer = h.registry.register("10.0.0.3:9000", "ops@x", 2).await;
    h.dialer.push(&[false, false]);
    h.monitor.check_peer(&peer).await;
    h.monitor.check_peer(&peer).await;
    assert!(peer.lock().await.blacklisted);

    tokio::time::advance(10 * MIN + Duration::from_secs(1)).await;
    let dials = h.dialer.dials();
    assert_eq!(h.monitor.check_peer(&peer).await, CheckOutcome::Healthy);
    assert_eq!(h.dialer.dials(), dials + 1);

    let rec = peer.lock().await;
    assert!(!rec.blacklisted);
    assert!(rec.blacklisted_at.is_none());
    assert_eq!(rec.status, PeerStatus::Healthy);
}

#[tokio::test(start_paused = true)]
async fn failed_check_after_cooldown_starts_counting_again() {
    let h = harness(MIN, 10 * MIN);
    let peer = h.registry.register("10.0.0.4:9000", "ops@x", 2).await;
    h.dialer.set_default(false);
    h.monitor.check_peer(&peer).await;
    h.monitor.check_peer(&peer).await;

    tokio::time::advance(MIN + Duration::from_secs(1)).await;
    assert_eq!(h.monitor.check_peer(&peer).await, CheckOutcome::Degraded { errors: 1 });
    let rec = peer.lock().await;
    assert!(!rec.blacklisted);
    assert_eq!(rec.status, PeerStatus::Degraded);
}

#[tokio::test(start_paused = true)]
async fn retrip_inside_suppression_window_does_not_alert() {
    let h = harness(MIN, 10 * MIN);
    let peer = h.registry.register("10.0.0.5:9000", "ops@x", 2).await;
    h.dialer.set_default(false);
    h.monitor.check_peer(&peer).await;
    h.monitor.check_peer(&peer).await;
    assert_eq!(h.transport.sent().len(), 1);

    tokio::time::advance(MIN + Duration::from_secs(1)).await;
    h.monitor.check_peer(&peer).await;
    let second = h.monitor.check_peer(&peer).await;
    assert_eq!(second, CheckOutcome::Blacklisted { alert: Some(Dispatch::Suppressed) });
    assert_eq!(h.transport.sent().len(), 1);

    // Once the window has passed the next trip alerts again.
    tokio::time::advance(10 * MIN).await;
    h.monitor.check_peer(&peer).await;
    let third = h.monitor.check_peer(&peer).await;
    assert_eq!(
        third,
        CheckOutcome::Blacklisted { alert: Some(Dispatch::Delivered { attempt: 1 }) }
    );
    assert_eq!(h.transport.sent().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn register_is_idempotent_and_keeps_health_state() {
    let h = harness(MIN, MIN);
    let peer = h.registry.register("10.0.0.6:9000", "a@x", 3).await;
    h.dialer.push(&[false]);
    h.monitor.check_peer(&peer).await;

    let again = h.registry.register("10.0.0.6:9000", "b@x", 5).await;
    assert_eq!(h.registry.len(), 1);
    let rec = again.lock().await;
    assert_eq!(rec.alert.recipient, "b@x");
    assert_eq!(rec.threshold, 5);
    assert_eq!(rec.error_count, 1);
    assert_eq!(rec.status, PeerStatus::Degraded);
}

#[tokio::test(start_paused = true)]
async fn register_default_applies_defaults_and_location() {
    let h = harness(MIN, MIN);
    let peer = h
        .registry
        .register_default("10.0.0.7:9000", Some("eu-west".to_string()))
        .await;
    let rec = peer.lock().await;
    assert_eq!(rec.threshold, 3);
    assert_eq!(rec.alert.recipient, "ops@ledgerwatch.test");
    assert_eq!(rec.location.as_deref(), Some("eu-west"));
    assert_eq!(rec.status, PeerStatus::Unknown);
}

#[tokio::test(start_paused = true)]
async fn run_pass_checks_every_peer_and_publishes_statuses() {
    let h = harness(MIN, MIN);
    h.registry.register("10.0.0.8:1", "ops@x", 3).await;
    h.registry.register("10.0.0.9:1", "ops@x", 3).await;
    let mut feed = h.monitor.subscribe();

    let outcomes = h.monitor.run_pass().await;
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|(_, o)| *o == CheckOutcome::Healthy));

    let statuses = feed.recv().await.unwrap();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().all(|s| s.status == PeerStatus::Healthy));
    assert!(statuses.iter().all(|s| s.last_check_ms.is_some()));
}

#[tokio::test(start_paused = true)]
async fn history_is_bounded() {
    let h = harness(MIN, MIN);
    let peer = h.registry.register("10.0.0.10:1", "ops@x", 3).await;
    for _ in 0..HISTORY_LEN + 5 {
        h.monitor.check_peer(&peer).await;
    }
    let rec = peer.lock().await;
    assert_eq!(rec.history.len(), HISTORY_LEN);
    assert!(rec.history.iter().all(|e| e.status == PeerStatus::Healthy));
}

#[tokio::test(start_paused = true)]
async fn monitor_loop_stops_on_shutdown() {
    let h = harness(MIN, MIN);
    h.registry.register("10.0.0.11:1", "ops@x", 3).await;
    let (trigger, shutdown) = ledgerwatch::core::shutdown::channel();
    let task = h.monitor.clone().spawn(shutdown);

    tokio::time::sleep(Duration::from_secs(25)).await;
    trigger.trigger();
    task.await.unwrap();
    // Passes at t=0, 10 and 20.
    assert_eq!(h.dialer.dials(), 3);
}

#[tokio::test]
async fn tcp_dialer_reports_open_and_closed_ports() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let open = listener.local_addr().unwrap().to_string();
    assert!(TcpDialer.dial(&open, Duration::from_secs(2)).await.is_ok());

    let closed = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().to_string()
    };
    assert!(TcpDialer.dial(&closed, Duration::from_secs(2)).await.is_err());
}
