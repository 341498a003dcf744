//! Presence node: runs one client's presence engine until interrupted.
//!
//! On Unix, `SIGUSR1` and `SIGUSR2` stand in for the host sending the
//! client to the background and back to the foreground.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

use presence_core::config::AppConfig;
use presence_core::error::AppError;
use presence_core::traits::store::PresenceStore;
use presence_core::types::id::UserId;
use presence_core::types::lifecycle::LifecycleSignal;
use presence_realtime::PresenceEngine;
use presence_store::StoreManager;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Presence node error: {e}");
        std::process::exit(1);
    }
}

/// Load configuration from `config/` and the environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("PRESENCE_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting presence node v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Persistent store ─────────────────────────────────
    tracing::info!(
        "Initializing presence store (provider: {})...",
        config.store.provider
    );
    let store = StoreManager::new(&config.store).await?;
    match store.health_check().await {
        Ok(true) => tracing::info!("Presence store reachable"),
        Ok(false) => tracing::warn!("Presence store unhealthy, starting broadcast-only"),
        Err(e) => tracing::warn!("Presence store check failed, starting broadcast-only: {e}"),
    }

    // ── Step 2: Broadcast channel ────────────────────────────────
    tracing::info!(
        "Initializing presence broadcast (provider: {})...",
        config.broadcast.provider
    );
    let broadcast = presence_realtime::bridge::connect(&config.broadcast).await?;

    // ── Step 3: Engine ───────────────────────────────────────────
    let identity = config
        .node
        .user_id
        .clone()
        .map(UserId::new)
        .unwrap_or_else(|| UserId::new(Uuid::new_v4().to_string()));
    let engine = PresenceEngine::new(&config.presence, identity, broadcast, Arc::new(store))?;
    engine.start().await?;

    let mut health = engine.watch_health();
    let health_task = tokio::spawn(async move {
        while health.changed().await.is_ok() {
            let snapshot = health.borrow_and_update().clone();
            tracing::info!(
                broadcast_connected = snapshot.broadcast_connected,
                store_reachable = snapshot.store_reachable,
                "Presence health changed"
            );
        }
    });

    // ── Step 4: Host lifecycle signals ───────────────────────────
    let (signal_tx, signal_rx) = mpsc::channel(8);
    engine.lifecycle().spawn(signal_rx);
    let signal_task = tokio::spawn(forward_host_signals(signal_tx));

    tracing::info!(user_id = %engine.identity(), "Presence node running");

    // ── Step 5: Graceful shutdown ────────────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, going offline...");

    signal_task.abort();
    engine.handle_lifecycle(LifecycleSignal::Terminating).await;
    engine.shutdown().await;
    health_task.abort();

    let metrics = engine.metrics();
    tracing::info!(
        heartbeats = metrics.heartbeats_sent,
        events_applied = metrics.events_applied,
        reconciliation_runs = metrics.reconciliation_runs,
        "Presence node stopped"
    );
    Ok(())
}

/// Map `SIGUSR1`/`SIGUSR2` onto background/foreground transitions
#[cfg(unix)]
async fn forward_host_signals(tx: mpsc::Sender<LifecycleSignal>) {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut background, mut foreground) = match (
        signal(SignalKind::user_defined1()),
        signal(SignalKind::user_defined2()),
    ) {
        (Ok(b), Ok(f)) => (b, f),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!("Lifecycle signal handlers unavailable: {e}");
            return;
        }
    };

    loop {
        let lifecycle = tokio::select! {
            Some(()) = background.recv() => LifecycleSignal::Backgrounded,
            Some(()) = foreground.recv() => LifecycleSignal::Foregrounded,
            else => break,
        };
        if tx.send(lifecycle).await.is_err() {
            break;
        }
    }
}

#[cfg(not(unix))]
async fn forward_host_signals(_tx: mpsc::Sender<LifecycleSignal>) {
    std::future::pending::<()>().await
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
