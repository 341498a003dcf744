//! Presence timing configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Heartbeat, expiry, reconciliation and eviction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Interval between self-asserted heartbeats in milliseconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,
    /// Time after the last confirmed activity before a user is presumed
    /// offline. Defaults to two heartbeat intervals.
    #[serde(default)]
    pub presence_timeout_ms: Option<u64>,
    /// Interval between reconciliation runs in milliseconds.
    #[serde(default = "default_reconciliation_interval")]
    pub reconciliation_interval_ms: u64,
    /// How long an offline record is retained before eviction.
    #[serde(default = "default_retention_window")]
    pub retention_window_ms: u64,
    /// Bound on persistent store calls in milliseconds.
    #[serde(default = "default_store_timeout")]
    pub store_timeout_ms: u64,
    /// Upper bound on records held in the local record store.
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    /// How far ahead of the local clock an event timestamp may be before
    /// the event is rejected.
    #[serde(default = "default_max_clock_skew")]
    pub max_clock_skew_ms: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval(),
            presence_timeout_ms: None,
            reconciliation_interval_ms: default_reconciliation_interval(),
            retention_window_ms: default_retention_window(),
            store_timeout_ms: default_store_timeout(),
            max_records: default_max_records(),
            max_clock_skew_ms: default_max_clock_skew(),
        }
    }
}

impl PresenceConfig {
    /// Heartbeat interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Effective presence timeout (explicit value or two heartbeats).
    pub fn presence_timeout(&self) -> Duration {
        Duration::from_millis(
            self.presence_timeout_ms
                .unwrap_or(self.heartbeat_interval_ms.saturating_mul(2)),
        )
    }

    /// Reconciliation interval.
    pub fn reconciliation_interval(&self) -> Duration {
        Duration::from_millis(self.reconciliation_interval_ms)
    }

    /// Retention window for offline records.
    pub fn retention_window(&self) -> Duration {
        Duration::from_millis(self.retention_window_ms)
    }

    /// Bound on store reads and the final offline write.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Tolerance for event timestamps ahead of the local clock.
    pub fn max_clock_skew(&self) -> Duration {
        Duration::from_millis(self.max_clock_skew_ms)
    }

    /// Reject settings under which presence could never be observed.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.heartbeat_interval_ms == 0 {
            return Err(AppError::configuration(
                "presence.heartbeat_interval_ms must be greater than zero",
            ));
        }
        if self.reconciliation_interval_ms == 0 {
            return Err(AppError::configuration(
                "presence.reconciliation_interval_ms must be greater than zero",
            ));
        }
        if self.store_timeout_ms == 0 {
            return Err(AppError::configuration(
                "presence.store_timeout_ms must be greater than zero",
            ));
        }
        if self.presence_timeout().as_millis() <= u128::from(self.heartbeat_interval_ms) {
            return Err(AppError::configuration(format!(
                "presence.presence_timeout_ms ({}) must exceed the heartbeat interval ({})",
                self.presence_timeout().as_millis(),
                self.heartbeat_interval_ms
            )));
        }
        Ok(())
    }
}

fn default_heartbeat_interval() -> u64 {
    60_000
}

fn default_reconciliation_interval() -> u64 {
    90_000
}

fn default_retention_window() -> u64 {
    6 * 60 * 60 * 1000
}

fn default_store_timeout() -> u64 {
    5_000
}

fn default_max_records() -> usize {
    10_000
}

fn default_max_clock_skew() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_defaults_to_two_heartbeats() {
        let config = PresenceConfig::default();
        assert_eq!(config.presence_timeout(), Duration::from_millis(120_000));
        assert_eq!(config.max_clock_skew(), Duration::from_millis(30_000));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_timeout_wins() {
        let config = PresenceConfig {
            presence_timeout_ms: Some(150_000),
            ..PresenceConfig::default()
        };
        assert_eq!(config.presence_timeout(), Duration::from_millis(150_000));
    }

    #[test]
    fn test_rejects_timeout_not_exceeding_heartbeat() {
        let config = PresenceConfig {
            presence_timeout_ms: Some(60_000),
            ..PresenceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_heartbeat() {
        let config = PresenceConfig {
            heartbeat_interval_ms: 0,
            ..PresenceConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
