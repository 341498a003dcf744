//! Top-level presence engine that ties together all subsystems.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tracing::info;

use presence_core::config::presence::PresenceConfig;
use presence_core::error::AppError;
use presence_core::result::AppResult;
use presence_core::traits::broadcast::BroadcastChannel;
use presence_core::traits::clock::{Clock, SystemClock};
use presence_core::traits::store::PresenceStore;
use presence_core::types::id::UserId;
use presence_core::types::lifecycle::LifecycleSignal;

use crate::context::PresenceContext;
use crate::emitter::{HeartbeatEmitter, LifecycleMonitor};
use crate::health::HealthSnapshot;
use crate::metrics::MetricsSnapshot;
use crate::query::PresenceQuery;
use crate::reconcile::{InterestSet, ReconcileReport, ReconcileTrigger, ReconciliationScheduler};
use crate::subscriber::BroadcastSubscriber;

/// One client's presence engine.
///
/// Every instance owns its own record store and tasks; nothing is global.
pub struct PresenceEngine {
    config: PresenceConfig,
    identity: UserId,
    ctx: PresenceContext,
    broadcast: Arc<dyn BroadcastChannel>,
    interest: Arc<InterestSet>,
    emitter: Arc<HeartbeatEmitter>,
    lifecycle: Arc<LifecycleMonitor>,
    subscriber: BroadcastSubscriber,
    reconciler: ReconciliationScheduler,
    started: AtomicBool,
}

impl std::fmt::Debug for PresenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceEngine")
            .field("identity", &self.identity)
            .field("records", &self.ctx.records.len())
            .finish()
    }
}

impl PresenceEngine {
    /// Build an engine for `identity` on the system clock.
    pub fn new(
        config: &PresenceConfig,
        identity: UserId,
        broadcast: Arc<dyn BroadcastChannel>,
        store: Arc<dyn PresenceStore>,
    ) -> AppResult<Self> {
        Self::with_clock(config, identity, broadcast, store, Arc::new(SystemClock))
    }

    /// Build an engine with an explicit clock.
    pub fn with_clock(
        config: &PresenceConfig,
        identity: UserId,
        broadcast: Arc<dyn BroadcastChannel>,
        store: Arc<dyn PresenceStore>,
        clock: Arc<dyn Clock>,
    ) -> AppResult<Self> {
        config.validate()?;
        if identity.is_blank() {
            return Err(AppError::validation("presence identity must not be blank"));
        }

        let ctx = PresenceContext::new(config, clock);
        let interest = Arc::new(InterestSet::new());
        let trigger = ReconcileTrigger::new();

        let emitter = Arc::new(HeartbeatEmitter::new(
            ctx.clone(),
            broadcast.clone(),
            store.clone(),
            config.store_timeout(),
        ));
        let lifecycle = Arc::new(LifecycleMonitor::new(
            emitter.clone(),
            identity.clone(),
            config.heartbeat_interval(),
        ));
        let subscriber = BroadcastSubscriber::new(ctx.clone(), trigger.clone());
        let reconciler = ReconciliationScheduler::new(
            ctx.clone(),
            store,
            interest.clone(),
            trigger,
            config.store_timeout(),
            config.retention_window(),
        );

        info!(
            user_id = %identity,
            heartbeat_ms = config.heartbeat_interval_ms,
            timeout_ms = config.presence_timeout().as_millis() as u64,
            "Presence engine initialized"
        );

        Ok(Self {
            config: config.clone(),
            identity,
            ctx,
            broadcast,
            interest,
            emitter,
            lifecycle,
            subscriber,
            reconciler,
            started: AtomicBool::new(false),
        })
    }

    /// Subscribe to the broadcast channel, start reconciliation, and go
    /// online. Calling it again while started is a no-op.
    pub async fn start(&self) -> AppResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.subscriber.start(self.broadcast.clone()).await {
            self.started.store(false, Ordering::SeqCst);
            return Err(e);
        }
        if let Err(e) = self.reconciler.start(self.config.reconciliation_interval()) {
            self.subscriber.stop().await;
            self.started.store(false, Ordering::SeqCst);
            return Err(e);
        }
        self.lifecycle.handle(LifecycleSignal::Foregrounded).await;
        info!(user_id = %self.identity, "Presence engine started");
        Ok(())
    }

    /// Stop every task and assert offline. Idempotent.
    pub async fn shutdown(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        info!(user_id = %self.identity, "Shutting down presence engine");
        self.lifecycle.stop();
        self.emitter.stop().await;
        self.reconciler.stop();
        self.subscriber.stop().await;
        info!("Presence engine shut down");
    }

    /// Read API handle.
    pub fn query(&self) -> PresenceQuery {
        PresenceQuery::new(self.ctx.clone(), self.interest.clone())
    }

    /// Lifecycle monitor, for feeding host signals.
    pub fn lifecycle(&self) -> &Arc<LifecycleMonitor> {
        &self.lifecycle
    }

    /// Forward one host lifecycle signal.
    pub async fn handle_lifecycle(&self, signal: LifecycleSignal) {
        self.lifecycle.handle(signal).await;
    }

    /// Run a reconciliation pass now and wait for it.
    pub async fn reconcile_now(&self) -> ReconcileReport {
        self.reconciler.run_once().await
    }

    /// Broadcast subscriber, for injecting transport events.
    pub fn subscriber(&self) -> &BroadcastSubscriber {
        &self.subscriber
    }

    /// Local identity.
    pub fn identity(&self) -> &UserId {
        &self.identity
    }

    /// Whether the heartbeat is running.
    pub fn is_emitting(&self) -> bool {
        self.emitter.is_running()
    }

    /// Counter snapshot.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    /// Current health.
    pub fn health(&self) -> HealthSnapshot {
        self.ctx.health.snapshot()
    }

    /// Receiver notified on every health change.
    pub fn watch_health(&self) -> watch::Receiver<HealthSnapshot> {
        self.ctx.health.subscribe()
    }
}
