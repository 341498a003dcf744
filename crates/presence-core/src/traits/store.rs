//! Persistent presence store trait.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::event::StoredPresence;
use crate::types::id::UserId;
use crate::types::time::EpochMillis;

/// Authoritative, higher-latency store of last-known presence.
#[async_trait]
pub trait PresenceStore: Send + Sync + std::fmt::Debug + 'static {
    /// Write-through of a single user's presence.
    async fn set_presence(
        &self,
        user_id: &UserId,
        is_online: bool,
        last_seen: EpochMillis,
    ) -> AppResult<()>;

    /// Batched read. Users with no stored row are omitted from the result.
    async fn get_presence(&self, user_ids: &[UserId]) -> AppResult<Vec<StoredPresence>>;

    /// Check that the store is reachable.
    async fn health_check(&self) -> AppResult<bool>;
}
