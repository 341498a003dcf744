//! Host lifecycle signals.

use serde::{Deserialize, Serialize};

/// Transitions reported by the hosting environment.
///
/// `Terminating` is best-effort: a process killed abruptly never sends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleSignal {
    /// The client entered the foreground.
    Foregrounded,
    /// The client was sent to the background or suspended.
    Backgrounded,
    /// The client is about to exit.
    Terminating,
}
