//! Presence status definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// User presence status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    /// User is reachable.
    Online,
    /// User is not reachable, or presumed gone.
    Offline,
}

impl PresenceStatus {
    /// Map a persistent store `is_online` flag to a status.
    pub fn from_online(is_online: bool) -> Self {
        if is_online {
            Self::Online
        } else {
            Self::Offline
        }
    }

    /// Whether this is [`PresenceStatus::Online`].
    pub fn is_online(self) -> bool {
        self == Self::Online
    }

    /// Converts to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
