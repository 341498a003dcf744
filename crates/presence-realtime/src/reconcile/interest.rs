//! Reference-counted set of users whose presence this client cares about.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use presence_core::types::id::UserId;

/// Users to include in reconciliation reads.
///
/// Several views may track the same user; a user leaves the set only when
/// every `track` has been matched by an `untrack`.
#[derive(Debug, Default)]
pub struct InterestSet {
    /// User ID → number of active trackers
    refs: DashMap<UserId, usize>,
}

impl InterestSet {
    /// Create an empty interest set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one reference for each user.
    pub fn track(&self, user_ids: &[UserId]) {
        for user_id in user_ids {
            *self.refs.entry(user_id.clone()).or_insert(0) += 1;
        }
    }

    /// Drop one reference for each user, removing users that reach zero.
    pub fn untrack(&self, user_ids: &[UserId]) {
        for user_id in user_ids {
            if let Entry::Occupied(mut entry) = self.refs.entry(user_id.clone()) {
                if *entry.get() <= 1 {
                    entry.remove();
                } else {
                    *entry.get_mut() -= 1;
                }
            }
        }
    }

    /// Whether a user is tracked.
    pub fn contains(&self, user_id: &UserId) -> bool {
        self.refs.contains_key(user_id)
    }

    /// Sorted copy of the tracked users.
    pub fn snapshot(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.refs.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Number of tracked users.
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// Whether no users are tracked.
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}
