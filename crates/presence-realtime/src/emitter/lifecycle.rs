//! Maps host lifecycle signals onto the heartbeat emitter.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use presence_core::types::id::UserId;
use presence_core::types::lifecycle::LifecycleSignal;

use super::heartbeat::HeartbeatEmitter;

/// Turns foreground/background/terminate transitions into immediate
/// online/offline assertions.
#[derive(Debug)]
pub struct LifecycleMonitor {
    emitter: Arc<HeartbeatEmitter>,
    identity: UserId,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LifecycleMonitor {
    /// Create a monitor driving `emitter` for `identity`.
    pub fn new(emitter: Arc<HeartbeatEmitter>, identity: UserId, interval: Duration) -> Self {
        Self {
            emitter,
            identity,
            interval,
            task: Mutex::new(None),
        }
    }

    /// React to one signal.
    ///
    /// Leaving the foreground asserts `offline` even when the emitter was
    /// already stopped.
    pub async fn handle(&self, signal: LifecycleSignal) {
        info!(user_id = %self.identity, ?signal, "Lifecycle transition");
        match signal {
            LifecycleSignal::Foregrounded => {
                if let Err(e) = self.emitter.start(self.identity.clone(), self.interval) {
                    warn!(user_id = %self.identity, "Heartbeat not started: {e}");
                }
            }
            LifecycleSignal::Backgrounded | LifecycleSignal::Terminating => {
                if !self.emitter.stop().await {
                    self.emitter.assert_offline(&self.identity).await;
                }
            }
        }
    }

    /// Consume `signals` on a background task until the sender closes or
    /// [`stop`](Self::stop) is called. Replaces a previous consumer.
    pub fn spawn(self: &Arc<Self>, mut signals: mpsc::Receiver<LifecycleSignal>) {
        let monitor: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            while let Some(signal) = signals.recv().await {
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };
                monitor.handle(signal).await;
            }
            debug!("Lifecycle signal stream ended");
        });

        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = task.replace(handle) {
            previous.abort();
        }
    }

    /// Cancel the signal consumer. Returns `false` if none was running.
    pub fn stop(&self) -> bool {
        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        match handle {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Identity the monitor asserts presence for.
    pub fn identity(&self) -> &UserId {
        &self.identity
    }
}

impl Drop for LifecycleMonitor {
    fn drop(&mut self) {
        let task = self.task.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::MemoryBroadcast;
    use crate::context::PresenceContext;
    use presence_core::config::presence::PresenceConfig;
    use presence_core::traits::clock::ManualClock;
    use presence_core::traits::store::PresenceStore;
    use presence_core::types::status::PresenceStatus;
    use presence_store::memory::MemoryPresenceStore;

    fn setup() -> (Arc<LifecycleMonitor>, PresenceContext, MemoryPresenceStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(5_000));
        let ctx = PresenceContext::new(&PresenceConfig::default(), clock.clone());
        let store = MemoryPresenceStore::new();
        let emitter = Arc::new(HeartbeatEmitter::new(
            ctx.clone(),
            Arc::new(MemoryBroadcast::new(16)),
            Arc::new(store.clone()),
            Duration::from_secs(5),
        ));
        let monitor = Arc::new(LifecycleMonitor::new(
            emitter,
            UserId::new("me"),
            Duration::from_secs(60),
        ));
        (monitor, ctx, store, clock)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreground_then_background() {
        let (monitor, ctx, store, clock) = setup();
        let me = UserId::new("me");

        monitor.handle(LifecycleSignal::Foregrounded).await;
        settle().await;
        assert!(ctx.records.effective_status(&me).is_online());

        clock.advance(1);
        monitor.handle(LifecycleSignal::Backgrounded).await;
        assert_eq!(ctx.records.effective_status(&me), PresenceStatus::Offline);
        let rows = store.get_presence(&[me]).await.unwrap();
        assert!(!rows[0].is_online);
        assert_eq!(rows[0].last_seen, 5_001);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminating_while_stopped_still_asserts_offline() {
        let (monitor, ctx, store, _clock) = setup();
        let me = UserId::new("me");

        monitor.handle(LifecycleSignal::Terminating).await;
        assert_eq!(
            ctx.records.get(&me).map(|r| r.status),
            Some(PresenceStatus::Offline)
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_consumer_and_stop() {
        let (monitor, ctx, _store, _clock) = setup();
        let (tx, rx) = mpsc::channel(4);
        monitor.spawn(rx);

        tx.send(LifecycleSignal::Foregrounded).await.unwrap();
        settle().await;
        assert!(ctx.records.effective_status(&UserId::new("me")).is_online());

        assert!(monitor.stop());
        assert!(!monitor.stop());
    }
}
