//! Shared fixtures for presence engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use presence_core::config::presence::PresenceConfig;
use presence_core::error::AppError;
use presence_core::result::AppResult;
use presence_core::traits::clock::ManualClock;
use presence_core::traits::store::PresenceStore;
use presence_core::types::event::StoredPresence;
use presence_core::types::id::UserId;
use presence_core::types::time::EpochMillis;
use presence_realtime::PresenceEngine;
use presence_realtime::bridge::MemoryBroadcast;
use presence_store::memory::MemoryPresenceStore;

/// Broadcast channel, store and clock shared by every simulated client.
pub struct Cluster {
    pub clock: Arc<ManualClock>,
    pub broadcast: Arc<MemoryBroadcast>,
    pub store: MemoryPresenceStore,
}

impl Cluster {
    /// Shared infrastructure with the clock at `now`.
    pub fn new(now: EpochMillis) -> Self {
        Self {
            clock: Arc::new(ManualClock::new(now)),
            broadcast: Arc::new(MemoryBroadcast::new(256)),
            store: MemoryPresenceStore::new(),
        }
    }

    /// A node for `identity` using the shared memory store.
    pub fn node(&self, identity: &str) -> PresenceEngine {
        self.node_with_store(identity, Arc::new(self.store.clone()))
    }

    /// A node for `identity` using a custom persistent store.
    pub fn node_with_store(&self, identity: &str, store: Arc<dyn PresenceStore>) -> PresenceEngine {
        PresenceEngine::with_clock(
            &config(),
            UserId::new(identity),
            self.broadcast.clone(),
            store,
            self.clock.clone(),
        )
        .expect("Failed to build presence engine")
    }
}

/// 60 s heartbeat, 120 s timeout, 90 s reconciliation.
pub fn config() -> PresenceConfig {
    PresenceConfig {
        heartbeat_interval_ms: 60_000,
        presence_timeout_ms: Some(120_000),
        reconciliation_interval_ms: 90_000,
        ..PresenceConfig::default()
    }
}

/// Let spawned tasks run without advancing time.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

pub fn u(id: &str) -> UserId {
    UserId::new(id)
}

/// Store that rejects every call.
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl PresenceStore for FailingStore {
    async fn set_presence(&self, _: &UserId, _: bool, _: EpochMillis) -> AppResult<()> {
        Err(AppError::store("connection refused"))
    }

    async fn get_presence(&self, _: &[UserId]) -> AppResult<Vec<StoredPresence>> {
        Err(AppError::store("connection refused"))
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(false)
    }
}

/// Store whose calls never complete.
#[derive(Debug, Default)]
pub struct HangingStore;

#[async_trait]
impl PresenceStore for HangingStore {
    async fn set_presence(&self, _: &UserId, _: bool, _: EpochMillis) -> AppResult<()> {
        std::future::pending().await
    }

    async fn get_presence(&self, _: &[UserId]) -> AppResult<Vec<StoredPresence>> {
        std::future::pending().await
    }

    async fn health_check(&self) -> AppResult<bool> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(false)
    }
}
