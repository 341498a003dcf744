//! Background health signal for the transport and the persistent store.
//!
//! Store outages are never surfaced as user-visible errors; they only
//! show up here.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

use presence_core::error::AppError;

/// Point-in-time view of subsystem health.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Whether the broadcast channel reports a live connection.
    pub broadcast_connected: bool,
    /// Whether the last persistent store call succeeded.
    pub store_reachable: bool,
    /// Message of the most recent store failure, cleared on success.
    pub last_store_error: Option<String>,
}

impl Default for HealthSnapshot {
    fn default() -> Self {
        Self {
            broadcast_connected: false,
            store_reachable: true,
            last_store_error: None,
        }
    }
}

impl HealthSnapshot {
    /// Broadcast connected and store reachable.
    pub fn is_healthy(&self) -> bool {
        self.broadcast_connected && self.store_reachable
    }
}

/// Publishes [`HealthSnapshot`] changes over a watch channel.
#[derive(Debug)]
pub struct HealthMonitor {
    tx: watch::Sender<HealthSnapshot>,
}

impl HealthMonitor {
    /// Create a monitor with the default snapshot.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(HealthSnapshot::default());
        Self { tx }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> HealthSnapshot {
        self.tx.borrow().clone()
    }

    /// Receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<HealthSnapshot> {
        self.tx.subscribe()
    }

    /// Record the broadcast channel's connection state.
    pub fn set_broadcast_connected(&self, connected: bool) {
        self.tx.send_if_modified(|h| {
            if h.broadcast_connected == connected {
                return false;
            }
            h.broadcast_connected = connected;
            true
        });
    }

    /// Record a successful store call.
    pub fn store_ok(&self) {
        self.tx.send_if_modified(|h| {
            if h.store_reachable && h.last_store_error.is_none() {
                return false;
            }
            info!("Persistent presence store reachable again");
            h.store_reachable = true;
            h.last_store_error = None;
            true
        });
    }

    /// Record a failed store call.
    pub fn store_failed(&self, err: &AppError) {
        self.tx.send_if_modified(|h| {
            if h.store_reachable {
                warn!(error = %err, transient = err.is_transient(), "Persistent presence store unreachable, degrading to broadcast-only");
            }
            h.store_reachable = false;
            h.last_store_error = Some(err.to_string());
            true
        });
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_failure_and_recovery() {
        let monitor = HealthMonitor::new();
        monitor.set_broadcast_connected(true);
        assert!(monitor.snapshot().is_healthy());

        monitor.store_failed(&AppError::store("refused"));
        let snap = monitor.snapshot();
        assert!(!snap.store_reachable);
        assert_eq!(snap.last_store_error.as_deref(), Some("STORE: refused"));

        monitor.store_ok();
        assert!(monitor.snapshot().is_healthy());
    }

    #[tokio::test]
    async fn test_subscribers_see_changes() {
        let monitor = HealthMonitor::new();
        let mut rx = monitor.subscribe();
        monitor.set_broadcast_connected(true);
        rx.changed().await.unwrap();
        assert!(rx.borrow().broadcast_connected);
    }
}
