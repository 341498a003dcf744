//! Applies other clients' presence events from the broadcast channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use presence_core::result::AppResult;
use presence_core::traits::broadcast::{BroadcastChannel, ChannelSignal};
use presence_core::types::event::RawPresenceEvent;

use crate::context::PresenceContext;
use crate::metrics::PresenceMetrics;
use crate::query::observers::ChangeSource;
use crate::reconcile::ReconcileTrigger;
use crate::record::MergeOutcome;

/// Broadcast subscriber feeding the record store.
#[derive(Debug)]
pub struct BroadcastSubscriber {
    inner: Arc<SubscriberInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug)]
struct SubscriberInner {
    ctx: PresenceContext,
    trigger: ReconcileTrigger,
    /// Cleared by `stop`; no event is applied once false.
    active: AtomicBool,
    /// Last connection state reported by the channel.
    connected: AtomicBool,
}

impl BroadcastSubscriber {
    /// Create an idle subscriber. Reconnects fire `trigger`.
    pub fn new(ctx: PresenceContext, trigger: ReconcileTrigger) -> Self {
        Self {
            inner: Arc::new(SubscriberInner {
                ctx,
                trigger,
                active: AtomicBool::new(false),
                connected: AtomicBool::new(false),
            }),
            task: Mutex::new(None),
        }
    }

    /// Subscribe to `channel` and consume it on a background task.
    pub async fn start(&self, channel: Arc<dyn BroadcastChannel>) -> AppResult<()> {
        let mut stream = channel.subscribe().await?;

        self.inner.active.store(true, Ordering::SeqCst);
        self.inner.connected.store(true, Ordering::SeqCst);
        self.inner.ctx.health.set_broadcast_connected(true);

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            while let Some(signal) = stream.next().await {
                if !inner.active.load(Ordering::SeqCst) {
                    break;
                }
                match signal {
                    ChannelSignal::Message(raw) => {
                        inner.on_event(raw);
                    }
                    ChannelSignal::Connected => inner.on_channel_state_change(true),
                    ChannelSignal::Disconnected => inner.on_channel_state_change(false),
                }
            }
            if inner.active.load(Ordering::SeqCst) {
                warn!("Presence broadcast stream ended");
                inner.on_channel_state_change(false);
            }
        });

        let mut task = self.task.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = task.replace(handle) {
            previous.abort();
        }
        info!("Broadcast subscriber started");
        Ok(())
    }

    /// Validate and merge one raw event. Returns `None` if the event was
    /// malformed or the subscriber is stopped.
    pub fn on_event(&self, raw: RawPresenceEvent) -> Option<MergeOutcome> {
        self.inner.on_event(raw)
    }

    /// Record a transport state change; reconnects trigger reconciliation.
    pub fn on_channel_state_change(&self, connected: bool) {
        self.inner.on_channel_state_change(connected);
    }

    /// Unsubscribe. Once this returns no further event reaches the record
    /// store. Returns `false` if the subscriber was not running.
    pub async fn stop(&self) -> bool {
        self.inner.active.store(false, Ordering::SeqCst);
        let handle = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(handle) = handle else {
            return false;
        };
        handle.abort();
        let _ = handle.await;

        self.inner.connected.store(false, Ordering::SeqCst);
        self.inner.ctx.health.set_broadcast_connected(false);
        info!("Broadcast subscriber stopped");
        true
    }

    /// Whether events are currently being applied.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst)
    }
}

impl Drop for BroadcastSubscriber {
    fn drop(&mut self) {
        self.inner.active.store(false, Ordering::SeqCst);
        let task = self.task.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = task.take() {
            handle.abort();
        }
    }
}

impl SubscriberInner {
    fn on_event(&self, raw: RawPresenceEvent) -> Option<MergeOutcome> {
        if !self.active.load(Ordering::SeqCst) {
            return None;
        }
        let metrics = &self.ctx.metrics;
        PresenceMetrics::inc(&metrics.events_received);

        match raw.validate() {
            Ok(event) => Some(self.ctx.apply(&event, ChangeSource::Broadcast)),
            Err(e) => {
                PresenceMetrics::inc(&metrics.malformed_events);
                debug!(error = %e, "Discarded malformed presence event");
                None
            }
        }
    }

    fn on_channel_state_change(&self, connected: bool) {
        let was = self.connected.swap(connected, Ordering::SeqCst);
        self.ctx.health.set_broadcast_connected(connected);
        match (was, connected) {
            (false, true) => {
                info!("Broadcast channel reconnected, triggering reconciliation");
                self.trigger.fire();
            }
            (true, false) => warn!("Broadcast channel disconnected"),
            _ => {}
        }
    }
}
