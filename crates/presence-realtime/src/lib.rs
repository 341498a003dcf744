//! # presence-realtime
//!
//! Real-time presence engine. Provides:
//!
//! - Local presence record store with last-write-wins merge and lazy expiry
//! - Heartbeat emitter and lifecycle monitor for the local identity
//! - Broadcast subscriber applying other clients' events
//! - Reconciliation scheduler backed by the persistent store
//! - Read-side query API with change subscriptions
//! - In-memory and Redis pub/sub broadcast bridges

pub mod bridge;
pub mod context;
pub mod emitter;
pub mod health;
pub mod metrics;
pub mod query;
pub mod reconcile;
pub mod record;
pub mod server;
pub mod subscriber;

pub use emitter::{HeartbeatEmitter, LifecycleMonitor};
pub use health::{HealthMonitor, HealthSnapshot};
pub use metrics::{MetricsSnapshot, PresenceMetrics};
pub use query::{ChangeSource, PresenceChange, PresenceQuery, PresenceView, Subscription};
pub use reconcile::{ReconcileReport, ReconciliationScheduler, StoreRead};
pub use record::{MergeOutcome, PresenceRecord, PresenceRecordStore};
pub use server::PresenceEngine;
pub use subscriber::BroadcastSubscriber;
