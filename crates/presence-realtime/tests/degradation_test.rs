//! Behavior when the persistent store or the broadcast channel fails.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use presence_core::traits::broadcast::BroadcastChannel;
use presence_core::types::event::PresenceEvent;
use presence_realtime::StoreRead;

use helpers::{Cluster, FailingStore, HangingStore, settle, u};

#[tokio::test(start_paused = true)]
async fn test_store_timeout_still_sweeps_expired_records() {
    let cluster = Cluster::new(0);
    let watcher = cluster.node_with_store("watcher", Arc::new(HangingStore));
    watcher.query().track(&[u("u1")]);
    watcher.start().await.unwrap();

    cluster
        .broadcast
        .publish(&PresenceEvent::online(u("u1"), 0))
        .await
        .unwrap();
    settle().await;
    assert!(watcher.query().is_online(&u("u1")));

    cluster.clock.set(120_001);
    let started = tokio::time::Instant::now();
    let report = watcher.reconcile_now().await;

    assert_eq!(report.store_read, StoreRead::TimedOut);
    assert!(started.elapsed() <= Duration::from_millis(5_001));
    // u1 and the watcher's own record, both silent since 0
    assert_eq!(report.expired, 2);
    assert!(!watcher.query().is_online(&u("u1")));
    assert!(!watcher.health().store_reachable);
    assert!(watcher.metrics().reconciliation_failures >= 1);

    watcher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failing_store_degrades_to_broadcast_only() {
    let cluster = Cluster::new(1_000);
    let bob = cluster.node("bob");
    bob.start().await.unwrap();
    let alice = cluster.node_with_store("alice", Arc::new(FailingStore));
    alice.start().await.unwrap();
    settle().await;

    assert!(bob.query().is_online(&u("alice")));
    assert!(alice.query().is_online(&u("alice")));
    assert!(alice.metrics().store_write_failures >= 1);

    let health = alice.health();
    assert!(!health.store_reachable);
    assert!(health.broadcast_connected);
    assert_eq!(
        health.last_store_error.as_deref(),
        Some("STORE: connection refused")
    );

    alice.shutdown().await;
    bob.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_total_outage_reverts_to_offline_after_timeout() {
    let cluster = Cluster::new(0);
    let watcher = cluster.node_with_store("watcher", Arc::new(FailingStore));
    watcher.query().track(&[u("u1")]);
    watcher.start().await.unwrap();

    cluster
        .broadcast
        .publish(&PresenceEvent::online(u("u1"), 0))
        .await
        .unwrap();
    settle().await;
    cluster.broadcast.set_connected(false);
    settle().await;

    cluster.clock.set(100_000);
    assert!(watcher.query().is_online(&u("u1")));
    cluster.clock.set(120_001);
    assert!(!watcher.query().is_online(&u("u1")));
    assert!(
        watcher
            .query()
            .list_online_users(&[u("u1"), u("watcher")])
            .is_empty()
    );

    watcher.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_slow_store_does_not_block_heartbeat() {
    let cluster = Cluster::new(0);
    cluster.store.set_latency(Duration::from_secs(30));
    let alice = cluster.node("alice");
    let bob = cluster.node("bob");
    bob.start().await.unwrap();
    alice.start().await.unwrap();
    settle().await;

    // broadcast delivery does not wait on the pending store write
    assert!(bob.query().is_online(&u("alice")));
    assert_eq!(alice.metrics().store_write_failures, 0);

    tokio::time::sleep(Duration::from_secs(6)).await;
    settle().await;
    assert!(alice.metrics().store_write_failures >= 1);
    assert!(!alice.health().store_reachable);

    alice.shutdown().await;
    bob.shutdown().await;
}
