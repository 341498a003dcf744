//! Store manager that dispatches to the configured backend.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use presence_core::config::store::StoreConfig;
use presence_core::error::AppError;
use presence_core::result::AppResult;
use presence_core::traits::store::PresenceStore;
use presence_core::types::event::StoredPresence;
use presence_core::types::id::UserId;
use presence_core::types::time::EpochMillis;

/// Store manager that wraps the configured presence store.
///
/// The backend is selected at construction time based on configuration.
#[derive(Debug, Clone)]
pub struct StoreManager {
    /// The inner store.
    inner: Arc<dyn PresenceStore>,
}

impl StoreManager {
    /// Create a new store manager from configuration.
    pub async fn new(config: &StoreConfig) -> AppResult<Self> {
        let inner: Arc<dyn PresenceStore> = match config.provider.as_str() {
            #[cfg(feature = "redis-backend")]
            "redis" => {
                info!("Initializing Redis presence store");
                let client = crate::redis::RedisClient::connect(&config.redis).await?;
                Arc::new(crate::redis::RedisPresenceStore::new(client))
            }
            #[cfg(feature = "memory")]
            "memory" => {
                info!("Initializing in-memory presence store");
                Arc::new(crate::memory::MemoryPresenceStore::new())
            }
            other => {
                return Err(AppError::configuration(format!(
                    "Unknown presence store provider: '{other}'. Supported: memory, redis"
                )));
            }
        };

        Ok(Self { inner })
    }

    /// Create a store manager from an existing store (for testing).
    pub fn from_store(store: Arc<dyn PresenceStore>) -> Self {
        Self { inner: store }
    }
}

#[async_trait]
impl PresenceStore for StoreManager {
    async fn set_presence(
        &self,
        user_id: &UserId,
        is_online: bool,
        last_seen: EpochMillis,
    ) -> AppResult<()> {
        self.inner.set_presence(user_id, is_online, last_seen).await
    }

    async fn get_presence(&self, user_ids: &[UserId]) -> AppResult<Vec<StoredPresence>> {
        self.inner.get_presence(user_ids).await
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_provider_is_rejected() {
        let config = StoreConfig {
            provider: "cassandra".to_string(),
            ..StoreConfig::default()
        };
        let err = StoreManager::new(&config).await.unwrap_err();
        assert_eq!(err.kind, presence_core::error::ErrorKind::Configuration);
    }

    #[cfg(feature = "memory")]
    #[tokio::test]
    async fn test_memory_provider_round_trip() {
        let manager = StoreManager::new(&StoreConfig::default()).await.unwrap();
        let user = UserId::new("u1");
        manager.set_presence(&user, true, 10).await.unwrap();
        let rows = manager.get_presence(&[user]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(manager.health_check().await.unwrap());
    }
}
