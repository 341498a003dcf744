//! Application configuration schemas.
//!
//! All configuration structs are deserialized via the `config` crate from
//! optional TOML files plus `PRESENCE__`-prefixed environment variables.
//! Each sub-module represents a logical configuration section.

pub mod broadcast;
pub mod logging;
pub mod presence;
pub mod store;

use serde::{Deserialize, Serialize};

pub use self::broadcast::BroadcastConfig;
pub use self::logging::LoggingConfig;
pub use self::presence::PresenceConfig;
pub use self::store::StoreConfig;

use crate::error::AppError;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Identity of the local client.
    #[serde(default)]
    pub node: NodeConfig,
    /// Heartbeat, expiry and reconciliation timing.
    #[serde(default)]
    pub presence: PresenceConfig,
    /// Persistent presence store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Broadcast channel settings.
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Local client identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// User identity this client asserts presence for. When unset the
    /// binary generates a random one at startup.
    #[serde(default)]
    pub user_id: Option<String>,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges `config/default`, an environment-specific overlay
    /// `config/{env}`, and environment variables prefixed with `PRESENCE`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("PRESENCE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        loaded.presence.validate()?;
        Ok(loaded)
    }
}
