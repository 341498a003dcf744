//! Broadcast channel implementations and provider selection.

pub mod memory_pubsub;
#[cfg(feature = "redis-pubsub")]
pub mod redis_pubsub;

use std::sync::Arc;

use tracing::info;

use presence_core::config::broadcast::BroadcastConfig;
use presence_core::error::AppError;
use presence_core::result::AppResult;
use presence_core::traits::broadcast::BroadcastChannel;

pub use memory_pubsub::MemoryBroadcast;
#[cfg(feature = "redis-pubsub")]
pub use redis_pubsub::RedisBroadcast;

/// Build the broadcast channel named by `config.provider`.
pub async fn connect(config: &BroadcastConfig) -> AppResult<Arc<dyn BroadcastChannel>> {
    match config.provider.as_str() {
        "memory" => {
            info!("Initializing in-memory presence broadcast");
            Ok(Arc::new(MemoryBroadcast::new(config.buffer_size)))
        }
        #[cfg(feature = "redis-pubsub")]
        "redis" => Ok(Arc::new(RedisBroadcast::connect(config).await?)),
        other => Err(AppError::configuration(format!(
            "Unknown broadcast provider: '{other}'. Supported: memory, redis"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_provider_is_rejected() {
        let config = BroadcastConfig {
            provider: "carrier-pigeon".to_string(),
            ..BroadcastConfig::default()
        };
        let err = connect(&config).await.unwrap_err();
        assert_eq!(err.kind, presence_core::error::ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_memory_provider_is_default() {
        assert!(connect(&BroadcastConfig::default()).await.is_ok());
    }
}
