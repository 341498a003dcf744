//! Shared domain types.

pub mod event;
pub mod id;
pub mod lifecycle;
pub mod status;
pub mod time;

pub use event::{PresenceEvent, RawPresenceEvent, StoredPresence};
pub use id::UserId;
pub use lifecycle::LifecycleSignal;
pub use status::PresenceStatus;
pub use time::EpochMillis;
