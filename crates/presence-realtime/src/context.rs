//! State shared by every presence component of one engine.

use std::sync::Arc;

use presence_core::config::presence::PresenceConfig;
use presence_core::traits::clock::Clock;
use presence_core::types::event::PresenceEvent;

use crate::health::HealthMonitor;
use crate::metrics::PresenceMetrics;
use crate::query::observers::{ChangeSource, ObserverRegistry};
use crate::record::{MergeOutcome, PresenceRecordStore};

/// Handles to the record store and its side channels.
#[derive(Debug, Clone)]
pub struct PresenceContext {
    /// Local presence records.
    pub records: Arc<PresenceRecordStore>,
    /// Wall clock for timestamps and expiry.
    pub clock: Arc<dyn Clock>,
    /// Change callbacks.
    pub observers: Arc<ObserverRegistry>,
    /// Counters.
    pub metrics: Arc<PresenceMetrics>,
    /// Transport and store health.
    pub health: Arc<HealthMonitor>,
}

impl PresenceContext {
    /// Build a fresh context for `config`.
    pub fn new(config: &PresenceConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            records: Arc::new(PresenceRecordStore::new(
                clock.clone(),
                config.presence_timeout(),
                config.max_clock_skew(),
                config.max_records,
            )),
            clock,
            observers: Arc::new(ObserverRegistry::new()),
            metrics: Arc::new(PresenceMetrics::new()),
            health: Arc::new(HealthMonitor::new()),
        }
    }

    /// Merge an event, count the outcome, and notify observers of a flip.
    pub fn apply(&self, event: &PresenceEvent, source: ChangeSource) -> MergeOutcome {
        let outcome = self.records.merge(event);
        if outcome.changed() {
            PresenceMetrics::inc(&self.metrics.events_applied);
        } else {
            PresenceMetrics::inc(&self.metrics.events_discarded);
        }
        self.observers.notify_merge(outcome, event, source);
        outcome
    }
}
