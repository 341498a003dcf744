//! Presence query API and change observers.

pub mod api;
pub mod observers;

pub use api::{PresenceQuery, PresenceView};
pub use observers::{ChangeSource, ObserverRegistry, PresenceChange, Subscription};
