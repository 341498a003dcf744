//! A single user's presence record and the last-write-wins rule.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use presence_core::types::event::PresenceEvent;
use presence_core::types::id::UserId;
use presence_core::types::status::PresenceStatus;
use presence_core::types::time::{self, EpochMillis};

/// Last accepted presence state for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// User identity.
    pub user_id: UserId,
    /// Status carried by the accepted event.
    pub status: PresenceStatus,
    /// Most recent confirmed activity, never later than the local time at
    /// which it was observed.
    pub last_seen_at: EpochMillis,
    /// Timestamp of the event that produced this record. Orders events
    /// only; expiry never reads it.
    pub source_timestamp: EpochMillis,
}

impl PresenceRecord {
    /// Build a record from an event accepted at local time `observed_at`.
    pub fn from_event(event: &PresenceEvent, observed_at: EpochMillis) -> Self {
        Self {
            user_id: event.user_id.clone(),
            status: event.status,
            last_seen_at: event.source_timestamp.min(observed_at),
            source_timestamp: event.source_timestamp,
        }
    }

    /// `last_seen_at + timeout`. Never stored.
    pub fn expires_at(&self, timeout: Duration) -> EpochMillis {
        time::add_duration(self.last_seen_at, timeout)
    }

    /// Whether the record has outlived its heartbeat deadline at `now`.
    pub fn is_expired(&self, now: EpochMillis, timeout: Duration) -> bool {
        now > self.expires_at(timeout)
    }

    /// Status after lazy expiry.
    pub fn effective_status(&self, now: EpochMillis, timeout: Duration) -> PresenceStatus {
        match self.status {
            PresenceStatus::Online if !self.is_expired(now, timeout) => PresenceStatus::Online,
            _ => PresenceStatus::Offline,
        }
    }

    /// Time since which the user has been effectively offline, if they are.
    pub fn offline_since(&self, now: EpochMillis, timeout: Duration) -> Option<EpochMillis> {
        match self.status {
            PresenceStatus::Offline => Some(self.last_seen_at),
            PresenceStatus::Online if self.is_expired(now, timeout) => {
                Some(self.expires_at(timeout))
            }
            PresenceStatus::Online => None,
        }
    }

    /// Last-write-wins: a strictly newer timestamp wins; on equal
    /// timestamps `offline` beats `online`.
    pub fn is_superseded_by(&self, event: &PresenceEvent) -> bool {
        if event.source_timestamp != self.source_timestamp {
            return event.source_timestamp > self.source_timestamp;
        }
        event.status == PresenceStatus::Offline && self.status == PresenceStatus::Online
    }
}

/// Result of merging one event into the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The event replaced (or created) the record. Statuses are effective
    /// statuses at merge time; an unknown user counts as `None`.
    Applied {
        /// Effective status before the merge.
        previous: Option<PresenceStatus>,
        /// Effective status after the merge.
        current: PresenceStatus,
        /// `last_seen_at` of the new record.
        last_seen_at: EpochMillis,
    },
    /// The event was older than, or tied and lost against, the record, or
    /// carried a timestamp too far ahead of the local clock.
    Discarded,
}

impl MergeOutcome {
    /// Whether the stored record changed.
    pub fn changed(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Whether the user's effective status flipped. Unknown users are
    /// treated as offline.
    pub fn status_changed(&self) -> bool {
        match self {
            Self::Applied {
                previous, current, ..
            } => {
                previous.unwrap_or(PresenceStatus::Offline) != *current
            }
            Self::Discarded => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_millis(120_000);

    fn record(status: PresenceStatus, ts: EpochMillis) -> PresenceRecord {
        PresenceRecord::from_event(
            &PresenceEvent {
                user_id: UserId::new("u1"),
                status,
                source_timestamp: ts,
            },
            ts,
        )
    }

    #[test]
    fn test_expiry_boundary() {
        let rec = record(PresenceStatus::Online, 0);
        assert_eq!(rec.expires_at(TIMEOUT), 120_000);
        assert_eq!(rec.effective_status(119_999, TIMEOUT), PresenceStatus::Online);
        assert_eq!(rec.effective_status(120_000, TIMEOUT), PresenceStatus::Online);
        assert_eq!(rec.effective_status(120_001, TIMEOUT), PresenceStatus::Offline);
    }

    #[test]
    fn test_future_timestamp_expires_from_observation_time() {
        let event = PresenceEvent::online(UserId::new("u1"), 86_400_000);
        let rec = PresenceRecord::from_event(&event, 1_000);
        assert_eq!(rec.source_timestamp, 86_400_000);
        assert_eq!(rec.last_seen_at, 1_000);
        assert_eq!(rec.effective_status(121_000, TIMEOUT), PresenceStatus::Online);
        assert_eq!(rec.effective_status(121_001, TIMEOUT), PresenceStatus::Offline);
    }

    #[test]
    fn test_offline_record_never_reports_online() {
        let rec = record(PresenceStatus::Offline, 100);
        assert_eq!(rec.effective_status(100, TIMEOUT), PresenceStatus::Offline);
        assert_eq!(rec.offline_since(500, TIMEOUT), Some(100));
    }

    #[test]
    fn test_offline_since_for_expired_online_is_expiry() {
        let rec = record(PresenceStatus::Online, 0);
        assert_eq!(rec.offline_since(10, TIMEOUT), None);
        assert_eq!(rec.offline_since(200_000, TIMEOUT), Some(120_000));
    }

    #[test]
    fn test_newer_timestamp_wins() {
        let rec = record(PresenceStatus::Online, 100);
        assert!(rec.is_superseded_by(&PresenceEvent::offline(UserId::new("u1"), 101)));
        assert!(!rec.is_superseded_by(&PresenceEvent::offline(UserId::new("u1"), 50)));
    }

    #[test]
    fn test_tie_prefers_offline() {
        let online = record(PresenceStatus::Online, 100);
        assert!(online.is_superseded_by(&PresenceEvent::offline(UserId::new("u1"), 100)));
        assert!(!online.is_superseded_by(&PresenceEvent::online(UserId::new("u1"), 100)));

        let offline = record(PresenceStatus::Offline, 100);
        assert!(!offline.is_superseded_by(&PresenceEvent::online(UserId::new("u1"), 100)));
        assert!(!offline.is_superseded_by(&PresenceEvent::offline(UserId::new("u1"), 100)));
    }

    #[test]
    fn test_status_changed_treats_unknown_as_offline() {
        let first_offline = MergeOutcome::Applied {
            previous: None,
            current: PresenceStatus::Offline,
            last_seen_at: 0,
        };
        assert!(first_offline.changed());
        assert!(!first_offline.status_changed());

        let came_online = MergeOutcome::Applied {
            previous: None,
            current: PresenceStatus::Online,
            last_seen_at: 0,
        };
        assert!(came_online.status_changed());
        assert!(!MergeOutcome::Discarded.changed());
    }
}
