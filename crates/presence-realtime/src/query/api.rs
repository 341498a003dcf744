//! Read-side presence surface for UI and other consumers.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use presence_core::types::id::UserId;
use presence_core::types::status::PresenceStatus;
use presence_core::types::time::{self, EpochMillis};

use super::observers::{PresenceChange, Subscription};
use crate::context::PresenceContext;
use crate::reconcile::InterestSet;

/// A user's presence as seen by a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceView {
    /// Effective status after lazy expiry.
    pub status: PresenceStatus,
    /// Most recent confirmed activity.
    pub last_seen_at: EpochMillis,
}

impl PresenceView {
    /// `last_seen_at` as a UTC timestamp.
    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        time::to_datetime(self.last_seen_at)
    }
}

/// Cheap-to-clone handle to the presence read API.
///
/// Reads never touch the network; they reflect the local record store with
/// lazy expiry applied at call time.
#[derive(Debug, Clone)]
pub struct PresenceQuery {
    ctx: PresenceContext,
    interest: Arc<InterestSet>,
}

impl PresenceQuery {
    /// Create a query handle.
    pub fn new(ctx: PresenceContext, interest: Arc<InterestSet>) -> Self {
        Self { ctx, interest }
    }

    /// Whether `user_id` is effectively online. Unknown users are offline.
    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.ctx.records.effective_status(user_id).is_online()
    }

    /// Effective status and last activity, or `None` for an unknown user.
    pub fn get_presence(&self, user_id: &UserId) -> Option<PresenceView> {
        let record = self.ctx.records.get(user_id)?;
        let now = self.ctx.clock.now_millis();
        Some(PresenceView {
            status: record.effective_status(now, self.ctx.records.timeout()),
            last_seen_at: record.last_seen_at,
        })
    }

    /// Call `callback` whenever a user's effective status flips.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&PresenceChange) + Send + Sync + 'static,
    {
        self.ctx.observers.subscribe(callback)
    }

    /// The subset of `candidates` that is effectively online.
    pub fn list_online_users<'a, I>(&self, candidates: I) -> HashSet<UserId>
    where
        I: IntoIterator<Item = &'a UserId>,
    {
        candidates
            .into_iter()
            .filter(|id| self.is_online(id))
            .cloned()
            .collect()
    }

    /// Include users in reconciliation reads.
    pub fn track(&self, user_ids: &[UserId]) {
        self.interest.track(user_ids);
    }

    /// Release a previous [`track`](Self::track).
    pub fn untrack(&self, user_ids: &[UserId]) {
        self.interest.untrack(user_ids);
    }
}
