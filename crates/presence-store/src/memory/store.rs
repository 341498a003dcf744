//! In-memory presence store using a dashmap.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use presence_core::error::AppError;
use presence_core::result::AppResult;
use presence_core::traits::store::PresenceStore;
use presence_core::types::event::StoredPresence;
use presence_core::types::id::UserId;
use presence_core::types::time::EpochMillis;

/// In-memory presence store.
///
/// Availability and latency can be switched at runtime so a single-node
/// deployment can rehearse store outages.
#[derive(Debug, Clone)]
pub struct MemoryPresenceStore {
    /// User ID → last written row.
    rows: Arc<DashMap<UserId, StoredPresence>>,
    /// When false every call fails with a store error.
    available: Arc<AtomicBool>,
    /// Artificial delay applied to every call, in milliseconds.
    latency_ms: Arc<AtomicU64>,
}

impl MemoryPresenceStore {
    /// Create an empty, available store.
    pub fn new() -> Self {
        Self {
            rows: Arc::new(DashMap::new()),
            available: Arc::new(AtomicBool::new(true)),
            latency_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Simulate the store going down or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Delay every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the store holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    async fn check(&self) -> AppResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(AppError::store("in-memory presence store is unavailable"));
        }
        Ok(())
    }
}

impl Default for MemoryPresenceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn set_presence(
        &self,
        user_id: &UserId,
        is_online: bool,
        last_seen: EpochMillis,
    ) -> AppResult<()> {
        self.check().await?;
        let row = StoredPresence {
            user_id: user_id.clone(),
            is_online,
            last_seen,
        };
        match self.rows.entry(user_id.clone()) {
            Entry::Occupied(mut entry) => {
                if !entry.get().accepts_write(is_online, last_seen) {
                    debug!(
                        user_id = %user_id,
                        last_seen,
                        stored = entry.get().last_seen,
                        "Ignored stale presence write"
                    );
                    return Ok(());
                }
                entry.insert(row);
            }
            Entry::Vacant(entry) => {
                entry.insert(row);
            }
        }
        debug!(user_id = %user_id, is_online, last_seen, "Stored presence row");
        Ok(())
    }

    async fn get_presence(&self, user_ids: &[UserId]) -> AppResult<Vec<StoredPresence>> {
        self.check().await?;
        Ok(user_ids
            .iter()
            .filter_map(|id| self.rows.get(id).map(|row| row.value().clone()))
            .collect())
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(self.check().await.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<UserId> {
        names.iter().map(|n| UserId::new(*n)).collect()
    }

    #[tokio::test]
    async fn test_set_get() {
        let store = MemoryPresenceStore::new();
        store
            .set_presence(&UserId::new("u1"), true, 100)
            .await
            .unwrap();
        let rows = store.get_presence(&ids(&["u1"])).await.unwrap();
        assert_eq!(
            rows,
            vec![StoredPresence {
                user_id: UserId::new("u1"),
                is_online: true,
                last_seen: 100,
            }]
        );
    }

    #[tokio::test]
    async fn test_late_heartbeat_write_does_not_overwrite_offline() {
        let store = MemoryPresenceStore::new();
        let me = UserId::new("me");
        store.set_presence(&me, false, 5_001).await.unwrap();
        // an online write from an earlier tick lands after the offline one
        store.set_presence(&me, true, 5_000).await.unwrap();
        store.set_presence(&me, true, 5_001).await.unwrap();

        let rows = store.get_presence(&ids(&["me"])).await.unwrap();
        assert!(!rows[0].is_online);
        assert_eq!(rows[0].last_seen, 5_001);

        store.set_presence(&me, true, 6_000).await.unwrap();
        let rows = store.get_presence(&ids(&["me"])).await.unwrap();
        assert!(rows[0].is_online);
    }

    #[tokio::test]
    async fn test_batched_read_omits_unknown_users() {
        let store = MemoryPresenceStore::new();
        store
            .set_presence(&UserId::new("u1"), false, 5)
            .await
            .unwrap();
        let rows = store.get_presence(&ids(&["u1", "u2"])).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, UserId::new("u1"));
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_calls() {
        let store = MemoryPresenceStore::new();
        store.set_available(false);
        assert!(
            store
                .set_presence(&UserId::new("u1"), true, 1)
                .await
                .is_err()
        );
        assert!(store.get_presence(&ids(&["u1"])).await.is_err());
        assert!(!store.health_check().await.unwrap());

        store.set_available(true);
        assert!(store.health_check().await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_delays_calls() {
        let store = MemoryPresenceStore::new();
        store.set_latency(Duration::from_secs(10));
        let started = tokio::time::Instant::now();
        store.get_presence(&ids(&["u1"])).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(10));
    }
}
