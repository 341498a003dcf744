//! Presence record store: the single writer primitive for local presence.
//!
//! Both the broadcast subscriber and the reconciliation scheduler go
//! through [`PresenceRecordStore::merge`], so conflict resolution lives in
//! exactly one place. Merges are atomic per user via the dashmap entry
//! lock; records are independent, so no cross-record locking is needed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, warn};

use presence_core::traits::clock::Clock;
use presence_core::types::event::PresenceEvent;
use presence_core::types::id::UserId;
use presence_core::types::status::PresenceStatus;
use presence_core::types::time;

use super::entry::{MergeOutcome, PresenceRecord};

/// Thread-safe map of `user_id -> PresenceRecord` with lazy expiry.
#[derive(Debug)]
pub struct PresenceRecordStore {
    /// User ID → last accepted record
    records: DashMap<UserId, PresenceRecord>,
    /// Wall clock used for expiry decisions
    clock: Arc<dyn Clock>,
    /// Heartbeat deadline after `last_seen_at`
    timeout: Duration,
    /// Largest accepted lead of an event timestamp over the local clock
    max_skew: Duration,
    /// Soft capacity enforced by eviction
    max_records: usize,
}

impl PresenceRecordStore {
    /// Create an empty record store.
    pub fn new(
        clock: Arc<dyn Clock>,
        timeout: Duration,
        max_skew: Duration,
        max_records: usize,
    ) -> Self {
        Self {
            records: DashMap::new(),
            clock,
            timeout,
            max_skew,
            max_records,
        }
    }

    /// Apply an event under last-write-wins.
    ///
    /// Older events, and equal-timestamp `online` events against an
    /// `offline` record, are discarded, so replays and duplicates are
    /// harmless. Events stamped more than the skew tolerance ahead of the
    /// local clock are discarded too. An accepted record's `last_seen_at`
    /// is capped at the local time, so expiry always counts from when the
    /// event was observed here.
    pub fn merge(&self, event: &PresenceEvent) -> MergeOutcome {
        let now = self.clock.now_millis();

        if event.source_timestamp > time::add_duration(now, self.max_skew) {
            warn!(
                user_id = %event.user_id,
                incoming = event.source_timestamp,
                now,
                "Rejected presence event timestamped ahead of the local clock"
            );
            return MergeOutcome::Discarded;
        }

        match self.records.entry(event.user_id.clone()) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_superseded_by(event) {
                    debug!(
                        user_id = %event.user_id,
                        incoming = event.source_timestamp,
                        current = entry.get().source_timestamp,
                        "Discarded stale presence event"
                    );
                    return MergeOutcome::Discarded;
                }
                let previous = entry.get().effective_status(now, self.timeout);
                let mut record = PresenceRecord::from_event(event, now);
                // An offline tie-break at the same timestamp is the same
                // observation; it keeps the activity time it replaces.
                if entry.get().source_timestamp == event.source_timestamp {
                    record.last_seen_at = entry.get().last_seen_at;
                }
                let current = record.effective_status(now, self.timeout);
                let last_seen_at = record.last_seen_at;
                entry.insert(record);
                MergeOutcome::Applied {
                    previous: Some(previous),
                    current,
                    last_seen_at,
                }
            }
            Entry::Vacant(entry) => {
                let record = PresenceRecord::from_event(event, now);
                let current = record.effective_status(now, self.timeout);
                let last_seen_at = record.last_seen_at;
                entry.insert(record);
                MergeOutcome::Applied {
                    previous: None,
                    current,
                    last_seen_at,
                }
            }
        }
    }

    /// Copy of a user's raw record.
    pub fn get(&self, user_id: &UserId) -> Option<PresenceRecord> {
        self.records.get(user_id).map(|r| r.value().clone())
    }

    /// A user's status after lazy expiry. Unknown users are offline.
    pub fn effective_status(&self, user_id: &UserId) -> PresenceStatus {
        let now = self.clock.now_millis();
        self.records
            .get(user_id)
            .map(|r| r.value().effective_status(now, self.timeout))
            .unwrap_or(PresenceStatus::Offline)
    }

    /// Every user whose effective status is online. Scans the whole
    /// store; readers use a candidate set instead.
    pub fn list_online(&self) -> HashSet<UserId> {
        let now = self.clock.now_millis();
        self.records
            .iter()
            .filter(|r| r.value().effective_status(now, self.timeout).is_online())
            .map(|r| r.key().clone())
            .collect()
    }

    /// Records still marked online whose heartbeat deadline has passed.
    pub fn expired_online(&self) -> Vec<PresenceRecord> {
        let now = self.clock.now_millis();
        self.records
            .iter()
            .filter(|r| r.value().status.is_online() && r.value().is_expired(now, self.timeout))
            .map(|r| r.value().clone())
            .collect()
    }

    /// Remove records offline for longer than `retention`, then trim the
    /// least recently seen offline records down to capacity. Online
    /// records are never evicted. Returns the number removed.
    pub fn evict_stale(&self, retention: Duration) -> usize {
        let now = self.clock.now_millis();
        let timeout = self.timeout;
        let mut evicted = 0usize;

        self.records.retain(|_, record| {
            let stale = record
                .offline_since(now, timeout)
                .is_some_and(|since| time::add_duration(since, retention) < now);
            if stale {
                evicted += 1;
            }
            !stale
        });

        let len = self.records.len();
        if len > self.max_records {
            let mut offline: Vec<(i64, UserId)> = self
                .records
                .iter()
                .filter(|r| r.value().offline_since(now, timeout).is_some())
                .map(|r| (r.value().last_seen_at, r.key().clone()))
                .collect();
            offline.sort();

            let excess = len - self.max_records;
            for (_, user_id) in offline.into_iter().take(excess) {
                if self
                    .records
                    .remove_if(&user_id, |_, r| r.offline_since(now, timeout).is_some())
                    .is_some()
                {
                    evicted += 1;
                }
            }

            if self.records.len() > self.max_records {
                warn!(
                    records = self.records.len(),
                    max_records = self.max_records,
                    "Record store above capacity with only online users left"
                );
            }
        }

        if evicted > 0 {
            debug!(evicted, "Evicted stale presence records");
        }
        evicted
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records are held.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Heartbeat deadline used for lazy expiry.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
