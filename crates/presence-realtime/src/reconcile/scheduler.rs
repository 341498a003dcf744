//! Periodic and on-demand reconciliation against the persistent store.
//!
//! Each run sweeps expired records to offline, re-reads the interest set
//! from the store in one batch, then evicts stale records. The store read
//! is bounded; its failure never prevents the sweep or the eviction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use presence_core::error::{AppError, ErrorKind};
use presence_core::result::AppResult;
use presence_core::traits::store::PresenceStore;
use presence_core::types::event::PresenceEvent;
use presence_core::types::status::PresenceStatus;

use super::interest::InterestSet;
use crate::context::PresenceContext;
use crate::metrics::PresenceMetrics;
use crate::query::observers::{ChangeSource, PresenceChange};

/// Requests an immediate reconciliation run.
#[derive(Debug, Clone, Default)]
pub struct ReconcileTrigger {
    shared: Arc<TriggerState>,
}

#[derive(Debug, Default)]
struct TriggerState {
    pending: AtomicBool,
    notify: Notify,
}

impl ReconcileTrigger {
    /// Create an idle trigger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a run. Requests made before the scheduler wakes coalesce.
    pub fn fire(&self) {
        self.shared.pending.store(true, Ordering::SeqCst);
        self.shared.notify.notify_one();
    }

    /// Whether a request is waiting to be served.
    pub fn is_pending(&self) -> bool {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// Wait for the next request and consume it.
    pub async fn fired(&self) {
        loop {
            let notified = self.shared.notify.notified();
            if self.shared.pending.swap(false, Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

/// Outcome of the batched store read in one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StoreRead {
    /// Nothing is tracked, so there was nothing to read.
    Skipped,
    /// The read returned `rows` rows, `refreshed` of which changed a record.
    Completed {
        /// Rows returned by the store.
        rows: usize,
        /// Rows that won the merge.
        refreshed: usize,
    },
    /// The store returned an error.
    Failed {
        /// Error message.
        error: String,
    },
    /// The store did not answer within the timeout.
    TimedOut,
}

impl StoreRead {
    /// Whether the read failed or timed out.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::TimedOut)
    }
}

/// Summary of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Records swept from online to offline.
    pub expired: usize,
    /// Batched store read outcome.
    pub store_read: StoreRead,
    /// Records removed by eviction.
    pub evicted: usize,
}

/// Reconciliation scheduler owning one timer task.
#[derive(Debug)]
pub struct ReconciliationScheduler {
    inner: Arc<SchedulerInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug)]
struct SchedulerInner {
    ctx: PresenceContext,
    store: Arc<dyn PresenceStore>,
    interest: Arc<InterestSet>,
    trigger: ReconcileTrigger,
    store_timeout: Duration,
    retention: Duration,
}

impl ReconciliationScheduler {
    /// Create a stopped scheduler.
    pub fn new(
        ctx: PresenceContext,
        store: Arc<dyn PresenceStore>,
        interest: Arc<InterestSet>,
        trigger: ReconcileTrigger,
        store_timeout: Duration,
        retention: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                ctx,
                store,
                interest,
                trigger,
                store_timeout,
                retention,
            }),
            task: Mutex::new(None),
        }
    }

    /// Run now and every `interval`, plus whenever the trigger fires. A
    /// triggered run restarts the interval. A zero interval is rejected.
    pub fn start(&self, interval: Duration) -> AppResult<()> {
        if interval.is_zero() {
            return Err(AppError::validation(
                "reconciliation interval must be greater than zero",
            ));
        }

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = inner.trigger.fired() => {
                        debug!("Reconciliation triggered");
                        ticker.reset();
                    }
                }
                inner.run_once().await;
            }
        });

        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = task.replace(handle) {
            previous.abort();
        }
        info!(
            interval_ms = interval.as_millis() as u64,
            "Reconciliation scheduler started"
        );
        Ok(())
    }

    /// Run one reconciliation pass immediately.
    pub async fn run_once(&self) -> ReconcileReport {
        self.inner.run_once().await
    }

    /// Request an immediate run from the background task.
    pub fn trigger(&self) {
        self.inner.trigger.fire();
    }

    /// Cancel the timer task. Returns `false` if it was not running.
    pub fn stop(&self) -> bool {
        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        match handle {
            Some(handle) => {
                handle.abort();
                info!("Reconciliation scheduler stopped");
                true
            }
            None => false,
        }
    }
}

impl Drop for ReconciliationScheduler {
    fn drop(&mut self) {
        let task = self.task.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }
}

impl SchedulerInner {
    async fn run_once(&self) -> ReconcileReport {
        let metrics = &self.ctx.metrics;
        PresenceMetrics::inc(&metrics.reconciliation_runs);

        let expired = self.sweep();
        let store_read = self.refresh().await;
        let evicted = self.ctx.records.evict_stale(self.retention);
        PresenceMetrics::add(&metrics.records_evicted, evicted as u64);

        let report = ReconcileReport {
            expired,
            store_read,
            evicted,
        };
        debug!(?report, "Reconciliation run complete");
        report
    }

    /// Mark every expired online record offline at its own timestamp,
    /// which wins the tie-break and keeps `last_seen_at`.
    fn sweep(&self) -> usize {
        let mut expired = 0usize;
        for record in self.ctx.records.expired_online() {
            let event = PresenceEvent::offline(record.user_id.clone(), record.source_timestamp);
            if !self.ctx.records.merge(&event).changed() {
                continue;
            }
            expired += 1;
            // Lazy expiry already reported the user offline to readers;
            // observers learn about it here.
            self.ctx.observers.notify(&PresenceChange {
                user_id: record.user_id,
                previous: PresenceStatus::Online,
                current: PresenceStatus::Offline,
                last_seen_at: record.last_seen_at,
                source: ChangeSource::Expiry,
            });
        }
        if expired > 0 {
            PresenceMetrics::add(&self.ctx.metrics.records_expired, expired as u64);
            debug!(expired, "Swept expired presence records");
        }
        expired
    }

    async fn refresh(&self) -> StoreRead {
        let user_ids = self.interest.snapshot();
        if user_ids.is_empty() {
            return StoreRead::Skipped;
        }

        let read = time::timeout(self.store_timeout, self.store.get_presence(&user_ids)).await;
        let err = match read {
            Ok(Ok(rows)) => {
                self.ctx.health.store_ok();
                let refreshed = rows
                    .iter()
                    .filter(|row| {
                        self.ctx
                            .apply(&row.to_event(), ChangeSource::Reconciliation)
                            .changed()
                    })
                    .count();
                debug!(
                    requested = user_ids.len(),
                    rows = rows.len(),
                    refreshed,
                    "Reconciled presence from store"
                );
                return StoreRead::Completed {
                    rows: rows.len(),
                    refreshed,
                };
            }
            Ok(Err(e)) => e,
            Err(_) => AppError::timeout(format!(
                "presence store read exceeded {}ms",
                self.store_timeout.as_millis()
            )),
        };

        warn!(error = %err, "Reconciliation store read failed, relying on lazy expiry");
        PresenceMetrics::inc(&self.ctx.metrics.reconciliation_failures);
        self.ctx.health.store_failed(&err);
        match err.kind {
            ErrorKind::Timeout => StoreRead::TimedOut,
            _ => StoreRead::Failed {
                error: err.to_string(),
            },
        }
    }
}
