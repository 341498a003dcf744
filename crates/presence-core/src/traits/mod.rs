//! Core traits defined in `presence-core` and implemented by other crates.

pub mod broadcast;
pub mod clock;
pub mod store;

pub use broadcast::{BroadcastChannel, ChannelSignal, SignalStream};
pub use clock::{Clock, ManualClock, SystemClock};
pub use store::PresenceStore;
