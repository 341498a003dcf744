//! Writers of the local identity's own presence.

pub mod heartbeat;
pub mod lifecycle;

pub use heartbeat::HeartbeatEmitter;
pub use lifecycle::LifecycleMonitor;
