//! Broadcast channel configuration.

use serde::{Deserialize, Serialize};

/// Broadcast channel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Channel provider type: `"memory"` or `"redis"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Buffer size of the in-process broadcast channel.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Redis pub/sub URL.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    /// Pub/sub channel name presence events are published on.
    #[serde(default = "default_channel")]
    pub channel: String,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            buffer_size: default_buffer_size(),
            redis_url: default_redis_url(),
            channel: default_channel(),
        }
    }
}

fn default_provider() -> String {
    "memory".to_string()
}

fn default_buffer_size() -> usize {
    256
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_channel() -> String {
    "presence:events".to_string()
}
