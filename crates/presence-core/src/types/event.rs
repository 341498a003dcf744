//! Presence events as exchanged over the broadcast channel and the store.

use serde::{Deserialize, Serialize};

use super::id::UserId;
use super::status::PresenceStatus;
use super::time::EpochMillis;
use crate::error::AppError;

/// A validated presence assertion for one user.
///
/// Wire shape: `{"userId": "...", "status": "online", "sourceTimestamp": 1700000000000}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEvent {
    /// User the assertion is about.
    pub user_id: UserId,
    /// Asserted status.
    pub status: PresenceStatus,
    /// Producer's timestamp; decides last-write-wins.
    pub source_timestamp: EpochMillis,
}

impl PresenceEvent {
    /// Build an online assertion.
    pub fn online(user_id: UserId, source_timestamp: EpochMillis) -> Self {
        Self {
            user_id,
            status: PresenceStatus::Online,
            source_timestamp,
        }
    }

    /// Build an offline assertion.
    pub fn offline(user_id: UserId, source_timestamp: EpochMillis) -> Self {
        Self {
            user_id,
            status: PresenceStatus::Offline,
            source_timestamp,
        }
    }
}

/// A presence message exactly as received, before validation.
///
/// Every field is optional so that a malformed message decodes and can be
/// counted instead of failing the consumer loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPresenceEvent {
    /// Claimed user identity.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Claimed status.
    #[serde(default)]
    pub status: Option<PresenceStatus>,
    /// Producer's timestamp.
    #[serde(default)]
    pub source_timestamp: Option<EpochMillis>,
}

impl RawPresenceEvent {
    /// Check required fields and convert to a [`PresenceEvent`].
    pub fn validate(self) -> Result<PresenceEvent, AppError> {
        let user_id = match self.user_id {
            Some(id) if !id.trim().is_empty() => UserId::new(id),
            _ => return Err(AppError::validation("presence event is missing userId")),
        };
        let source_timestamp = self.source_timestamp.ok_or_else(|| {
            AppError::validation(format!(
                "presence event for {user_id} is missing sourceTimestamp"
            ))
        })?;
        let status = self.status.ok_or_else(|| {
            AppError::validation(format!("presence event for {user_id} is missing status"))
        })?;
        Ok(PresenceEvent {
            user_id,
            status,
            source_timestamp,
        })
    }
}

impl From<&PresenceEvent> for RawPresenceEvent {
    fn from(event: &PresenceEvent) -> Self {
        Self {
            user_id: Some(event.user_id.to_string()),
            status: Some(event.status),
            source_timestamp: Some(event.source_timestamp),
        }
    }
}

/// A row of the persistent presence store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPresence {
    /// User identity.
    pub user_id: UserId,
    /// Last written online flag.
    pub is_online: bool,
    /// Last written activity timestamp.
    pub last_seen: EpochMillis,
}

impl StoredPresence {
    /// Interpret the row as an event whose source timestamp is `last_seen`.
    pub fn to_event(&self) -> PresenceEvent {
        PresenceEvent {
            user_id: self.user_id.clone(),
            status: PresenceStatus::from_online(self.is_online),
            source_timestamp: self.last_seen,
        }
    }

    /// Whether a write of `(is_online, last_seen)` may replace this row.
    /// Newer writes win; at equal `last_seen` only an offline write does.
    pub fn accepts_write(&self, is_online: bool, last_seen: EpochMillis) -> bool {
        last_seen > self.last_seen || (last_seen == self.last_seen && !is_online)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_wire_message() {
        let raw: RawPresenceEvent = serde_json::from_str(
            r#"{"userId": "u1", "status": "online", "sourceTimestamp": 100}"#,
        )
        .unwrap();
        let event = raw.validate().unwrap();
        assert_eq!(event, PresenceEvent::online(UserId::new("u1"), 100));
    }

    #[test]
    fn test_missing_user_id_is_rejected() {
        let raw: RawPresenceEvent =
            serde_json::from_str(r#"{"status": "online", "sourceTimestamp": 100}"#).unwrap();
        assert!(raw.validate().is_err());

        let blank = RawPresenceEvent {
            user_id: Some(" ".into()),
            status: Some(PresenceStatus::Online),
            source_timestamp: Some(1),
        };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_missing_timestamp_is_rejected() {
        let raw: RawPresenceEvent =
            serde_json::from_str(r#"{"userId": "u1", "status": "offline"}"#).unwrap();
        let err = raw.validate().unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Validation);
    }

    #[test]
    fn test_encoded_event_uses_camel_case() {
        let event = PresenceEvent::offline(UserId::new("u2"), 7);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"userId": "u2", "status": "offline", "sourceTimestamp": 7})
        );
    }

    #[test]
    fn test_stored_row_maps_last_seen_to_source_timestamp() {
        let row = StoredPresence {
            user_id: UserId::new("u3"),
            is_online: true,
            last_seen: 42,
        };
        let event = row.to_event();
        assert_eq!(event.status, PresenceStatus::Online);
        assert_eq!(event.source_timestamp, 42);
    }

    #[test]
    fn test_row_only_accepts_newer_writes() {
        let row = StoredPresence {
            user_id: UserId::new("u1"),
            is_online: false,
            last_seen: 5_001,
        };
        assert!(!row.accepts_write(true, 5_000));
        assert!(!row.accepts_write(true, 5_001));
        assert!(row.accepts_write(false, 5_001));
        assert!(row.accepts_write(true, 5_002));
    }
}
