//! Periodic "I am online" assertions for the local identity.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use presence_core::error::AppError;
use presence_core::result::AppResult;
use presence_core::traits::broadcast::BroadcastChannel;
use presence_core::traits::store::PresenceStore;
use presence_core::types::event::PresenceEvent;
use presence_core::types::id::UserId;

use crate::context::PresenceContext;
use crate::metrics::PresenceMetrics;
use crate::query::observers::ChangeSource;

/// Heartbeat emitter for the local identity.
///
/// Owns at most one timer task. Each tick merges the self-record locally,
/// then publishes to the broadcast channel and writes through to the
/// persistent store on independent fire-and-forget tasks.
#[derive(Debug)]
pub struct HeartbeatEmitter {
    inner: Arc<EmitterInner>,
    task: Mutex<Option<Running>>,
}

#[derive(Debug)]
struct Running {
    identity: UserId,
    handle: JoinHandle<()>,
}

#[derive(Debug)]
struct EmitterInner {
    ctx: PresenceContext,
    broadcast: Arc<dyn BroadcastChannel>,
    store: Arc<dyn PresenceStore>,
    /// Bound on every publish and store write.
    op_timeout: Duration,
}

impl HeartbeatEmitter {
    /// Create a stopped emitter.
    pub fn new(
        ctx: PresenceContext,
        broadcast: Arc<dyn BroadcastChannel>,
        store: Arc<dyn PresenceStore>,
        op_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                ctx,
                broadcast,
                store,
                op_timeout,
            }),
            task: Mutex::new(None),
        }
    }

    /// Start emitting for `identity` every `interval`, the first assertion
    /// immediately. A running timer is replaced. A zero interval is
    /// rejected and leaves any running timer in place.
    pub fn start(&self, identity: UserId, interval: Duration) -> AppResult<()> {
        if interval.is_zero() {
            return Err(AppError::validation(
                "heartbeat interval must be greater than zero",
            ));
        }

        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = task.take() {
            previous.handle.abort();
            debug!(user_id = %previous.identity, "Replaced heartbeat timer");
        }

        let inner = self.inner.clone();
        let id = identity.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                inner.beat(&id);
            }
        });

        info!(
            user_id = %identity,
            interval_ms = interval.as_millis() as u64,
            "Heartbeat started"
        );
        *task = Some(Running { identity, handle });
        Ok(())
    }

    /// Stop emitting and assert `offline` once, bounded by the operation
    /// timeout. Returns `false` if the emitter was not running.
    pub async fn stop(&self) -> bool {
        let running = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(running) = running else {
            return false;
        };
        running.handle.abort();
        info!(user_id = %running.identity, "Heartbeat stopped");
        self.inner.assert_offline(&running.identity).await;
        true
    }

    /// Assert `offline` for `identity` without touching the timer.
    pub async fn assert_offline(&self, identity: &UserId) {
        self.inner.assert_offline(identity).await;
    }

    /// Whether a timer is active.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Identity of the active timer.
    pub fn identity(&self) -> Option<UserId> {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|r| r.identity.clone())
    }
}

impl Drop for HeartbeatEmitter {
    fn drop(&mut self) {
        let task = self.task.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(running) = task.take() {
            running.handle.abort();
        }
    }
}

impl EmitterInner {
    fn beat(self: &Arc<Self>, identity: &UserId) {
        let event = PresenceEvent::online(identity.clone(), self.ctx.clock.now_millis());
        self.ctx.apply(&event, ChangeSource::Local);
        PresenceMetrics::inc(&self.ctx.metrics.heartbeats_sent);
        debug!(user_id = %identity, ts = event.source_timestamp, "Heartbeat");

        let this = self.clone();
        let published = event.clone();
        tokio::spawn(async move { this.publish(&published).await });

        let this = self.clone();
        tokio::spawn(async move { this.write_through(&event).await });
    }

    async fn assert_offline(&self, identity: &UserId) {
        let event = PresenceEvent::offline(identity.clone(), self.ctx.clock.now_millis());
        self.ctx.apply(&event, ChangeSource::Local);
        tokio::join!(self.publish(&event), self.write_through(&event));
        debug!(user_id = %identity, "Offline asserted");
    }

    async fn publish(&self, event: &PresenceEvent) {
        let result = match time::timeout(self.op_timeout, self.broadcast.publish(event)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::timeout("presence publish timed out")),
        };
        if let Err(e) = result {
            debug!(user_id = %event.user_id, error = %e, "Presence publish dropped");
            PresenceMetrics::inc(&self.ctx.metrics.broadcast_failures);
        }
    }

    async fn write_through(&self, event: &PresenceEvent) {
        let write = self.store.set_presence(
            &event.user_id,
            event.status.is_online(),
            event.source_timestamp,
        );
        let result = match time::timeout(self.op_timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(AppError::timeout(format!(
                "presence store write exceeded {}ms",
                self.op_timeout.as_millis()
            ))),
        };
        match result {
            Ok(()) => self.ctx.health.store_ok(),
            Err(e) => {
                warn!(user_id = %event.user_id, error = %e, "Presence store write failed");
                PresenceMetrics::inc(&self.ctx.metrics.store_write_failures);
                self.ctx.health.store_failed(&e);
            }
        }
    }
}
