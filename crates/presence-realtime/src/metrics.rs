//! Presence engine metrics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Engine-level metrics counters.
#[derive(Debug, Default)]
pub struct PresenceMetrics {
    /// Broadcast messages received
    pub events_received: AtomicU64,
    /// Events that changed a record
    pub events_applied: AtomicU64,
    /// Events discarded as stale or duplicate
    pub events_discarded: AtomicU64,
    /// Events missing userId, status or sourceTimestamp
    pub malformed_events: AtomicU64,
    /// Online assertions emitted by the heartbeat
    pub heartbeats_sent: AtomicU64,
    /// Broadcast publishes that failed
    pub broadcast_failures: AtomicU64,
    /// Persistent store writes that failed or timed out
    pub store_write_failures: AtomicU64,
    /// Reconciliation runs started
    pub reconciliation_runs: AtomicU64,
    /// Reconciliation store reads that failed or timed out
    pub reconciliation_failures: AtomicU64,
    /// Records swept to offline after expiry
    pub records_expired: AtomicU64,
    /// Records removed by eviction
    pub records_evicted: AtomicU64,
}

impl PresenceMetrics {
    /// Create new zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment a counter by one
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment a counter by `n`
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_applied: self.events_applied.load(Ordering::Relaxed),
            events_discarded: self.events_discarded.load(Ordering::Relaxed),
            malformed_events: self.malformed_events.load(Ordering::Relaxed),
            heartbeats_sent: self.heartbeats_sent.load(Ordering::Relaxed),
            broadcast_failures: self.broadcast_failures.load(Ordering::Relaxed),
            store_write_failures: self.store_write_failures.load(Ordering::Relaxed),
            reconciliation_runs: self.reconciliation_runs.load(Ordering::Relaxed),
            reconciliation_failures: self.reconciliation_failures.load(Ordering::Relaxed),
            records_expired: self.records_expired.load(Ordering::Relaxed),
            records_evicted: self.records_evicted.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Broadcast messages received
    pub events_received: u64,
    /// Events that changed a record
    pub events_applied: u64,
    /// Events discarded as stale or duplicate
    pub events_discarded: u64,
    /// Malformed events dropped
    pub malformed_events: u64,
    /// Heartbeats emitted
    pub heartbeats_sent: u64,
    /// Failed broadcast publishes
    pub broadcast_failures: u64,
    /// Failed store writes
    pub store_write_failures: u64,
    /// Reconciliation runs
    pub reconciliation_runs: u64,
    /// Failed reconciliation reads
    pub reconciliation_failures: u64,
    /// Records swept to offline
    pub records_expired: u64,
    /// Records evicted
    pub records_evicted: u64,
}
