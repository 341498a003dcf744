//! Change observers notified when a user's effective status flips.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use presence_core::types::event::PresenceEvent;
use presence_core::types::id::UserId;
use presence_core::types::status::PresenceStatus;
use presence_core::types::time::EpochMillis;

use crate::record::MergeOutcome;

/// What caused a status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    /// This client's own heartbeat or lifecycle transition.
    Local,
    /// An event from another client over the broadcast channel.
    Broadcast,
    /// A persistent store read during reconciliation.
    Reconciliation,
    /// The expiry sweep marking a silent user offline.
    Expiry,
}

/// A flip in a user's effective status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceChange {
    /// User whose status changed.
    pub user_id: UserId,
    /// Effective status before the change.
    pub previous: PresenceStatus,
    /// Effective status after the change.
    pub current: PresenceStatus,
    /// Last confirmed activity of the record after the change.
    pub last_seen_at: EpochMillis,
    /// Origin of the change.
    pub source: ChangeSource,
}

type Callback = Arc<dyn Fn(&PresenceChange) + Send + Sync>;

/// Registry of presence change callbacks.
pub struct ObserverRegistry {
    /// Next subscription ID
    next_id: AtomicU64,
    /// Subscription ID → callback
    observers: DashMap<u64, Callback>,
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl ObserverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            observers: DashMap::new(),
        }
    }

    /// Register a callback. It stays registered until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> Subscription
    where
        F: Fn(&PresenceChange) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.insert(id, Arc::new(callback));
        debug!(subscription_id = id, "Presence observer registered");
        Subscription {
            id,
            registry: Some(Arc::downgrade(self)),
        }
    }

    /// Deliver a change to every registered callback.
    ///
    /// Callbacks are collected first so none runs while a map shard is
    /// locked; a callback may subscribe or unsubscribe freely.
    pub fn notify(&self, change: &PresenceChange) {
        let callbacks: Vec<Callback> = self.observers.iter().map(|e| e.value().clone()).collect();
        for callback in callbacks {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(change))).is_err() {
                warn!(user_id = %change.user_id, "Presence observer panicked");
            }
        }
    }

    /// Notify observers if `outcome` flipped the effective status of the
    /// user `event` is about. Returns whether a notification was sent.
    pub fn notify_merge(
        &self,
        outcome: MergeOutcome,
        event: &PresenceEvent,
        source: ChangeSource,
    ) -> bool {
        let MergeOutcome::Applied {
            previous,
            current,
            last_seen_at,
        } = outcome
        else {
            return false;
        };
        if !outcome.status_changed() {
            return false;
        }
        self.notify(&PresenceChange {
            user_id: event.user_id.clone(),
            previous: previous.unwrap_or(PresenceStatus::Offline),
            current,
            last_seen_at,
            source,
        });
        true
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Whether no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    fn remove(&self, id: u64) {
        if self.observers.remove(&id).is_some() {
            debug!(subscription_id = id, "Presence observer removed");
        }
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for a registered callback. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the callback"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Option<Weak<ObserverRegistry>>,
}

impl Subscription {
    /// Subscription ID.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the callback now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(registry) = self.registry.take().and_then(|w| w.upgrade()) {
            registry.remove(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn change(user: &str, current: PresenceStatus) -> PresenceChange {
        PresenceChange {
            user_id: UserId::new(user),
            previous: PresenceStatus::Offline,
            current,
            last_seen_at: 1,
            source: ChangeSource::Broadcast,
        }
    }

    #[test]
    fn test_notify_reaches_subscribers() {
        let registry = Arc::new(ObserverRegistry::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = registry.subscribe(move |c| sink.lock().unwrap().push(c.user_id.clone()));

        registry.notify(&change("u1", PresenceStatus::Online));
        assert_eq!(*seen.lock().unwrap(), vec![UserId::new("u1")]);
    }

    #[test]
    fn test_drop_and_unsubscribe_remove_callback() {
        let registry = Arc::new(ObserverRegistry::new());
        let a = registry.subscribe(|_| {});
        let b = registry.subscribe(|_| {});
        assert_eq!(registry.len(), 2);

        drop(a);
        assert_eq!(registry.len(), 1);
        b.unsubscribe();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_notify_merge_only_on_flip() {
        let registry = Arc::new(ObserverRegistry::new());
        let count = Arc::new(AtomicU64::new(0));
        let counter = count.clone();
        let _sub = registry.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let event = PresenceEvent::online(UserId::new("u1"), 5);
        let flipped = MergeOutcome::Applied {
            previous: None,
            current: PresenceStatus::Online,
            last_seen_at: 5,
        };
        let refreshed = MergeOutcome::Applied {
            previous: Some(PresenceStatus::Online),
            current: PresenceStatus::Online,
            last_seen_at: 5,
        };

        assert!(registry.notify_merge(flipped, &event, ChangeSource::Broadcast));
        assert!(!registry.notify_merge(refreshed, &event, ChangeSource::Broadcast));
        assert!(!registry.notify_merge(MergeOutcome::Discarded, &event, ChangeSource::Broadcast));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_observer_does_not_block_others() {
        let registry = Arc::new(ObserverRegistry::new());
        let count = Arc::new(AtomicU64::new(0));
        let counter = count.clone();
        let _bad = registry.subscribe(|_| panic!("observer failure"));
        let _good = registry.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        registry.notify(&change("u1", PresenceStatus::Online));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_outliving_registry_is_harmless() {
        let registry = Arc::new(ObserverRegistry::new());
        let sub = registry.subscribe(|_| {});
        drop(registry);
        sub.unsubscribe();
    }
}
