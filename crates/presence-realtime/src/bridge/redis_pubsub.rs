//! Redis pub/sub broadcast channel for multi-node deployments.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use redis::Client;
use redis::aio::ConnectionManager;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use presence_core::config::broadcast::BroadcastConfig;
use presence_core::error::{AppError, ErrorKind};
use presence_core::result::AppResult;
use presence_core::traits::broadcast::{BroadcastChannel, ChannelSignal, SignalStream};
use presence_core::types::event::{PresenceEvent, RawPresenceEvent};

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Presence broadcast over a Redis pub/sub channel.
#[derive(Clone)]
pub struct RedisBroadcast {
    /// Client used to open subscriber connections.
    client: Client,
    /// Multiplexed connection for PUBLISH.
    publisher: ConnectionManager,
    /// Pub/sub channel name.
    channel: String,
    /// Signal buffer per subscription.
    buffer_size: usize,
}

impl std::fmt::Debug for RedisBroadcast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBroadcast")
            .field("channel", &self.channel)
            .finish()
    }
}

impl RedisBroadcast {
    /// Connect the publisher side to the configured Redis server.
    pub async fn connect(config: &BroadcastConfig) -> AppResult<Self> {
        info!(channel = %config.channel, "Connecting Redis presence broadcast");

        let client = Client::open(config.redis_url.as_str()).map_err(|e| {
            AppError::with_source(ErrorKind::Broadcast, "Failed to create Redis client", e)
        })?;
        let publisher = ConnectionManager::new(client.clone()).await.map_err(|e| {
            AppError::with_source(ErrorKind::Broadcast, "Failed to connect to Redis", e)
        })?;

        Ok(Self {
            client,
            publisher,
            channel: config.channel.clone(),
            buffer_size: config.buffer_size.max(1),
        })
    }
}

#[async_trait]
impl BroadcastChannel for RedisBroadcast {
    async fn publish(&self, event: &PresenceEvent) -> AppResult<()> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.publisher.clone();

        redis::cmd("PUBLISH")
            .arg(&self.channel)
            .arg(payload)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Broadcast, "Redis PUBLISH failed", e))?;

        Ok(())
    }

    async fn subscribe(&self) -> AppResult<SignalStream> {
        let (tx, rx) = mpsc::channel(self.buffer_size);
        tokio::spawn(forward(self.client.clone(), self.channel.clone(), tx));

        Ok(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|signal| (signal, rx))
        })
        .boxed())
    }
}

/// Relay one Redis subscription into `tx`, reopening it with backoff
/// until the receiving side goes away.
async fn forward(client: Client, channel: String, tx: mpsc::Sender<ChannelSignal>) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        match open(&client, &channel).await {
            Ok(mut pubsub) => {
                backoff = INITIAL_BACKOFF;
                if tx.send(ChannelSignal::Connected).await.is_err() {
                    return;
                }

                let mut messages = std::pin::pin!(pubsub.on_message());
                loop {
                    tokio::select! {
                        msg = messages.next() => match msg {
                            Some(msg) => {
                                if tx.send(ChannelSignal::Message(decode(&msg))).await.is_err() {
                                    return;
                                }
                            }
                            None => break,
                        },
                        _ = tx.closed() => return,
                    }
                }

                warn!(channel = %channel, "Redis pub/sub connection lost");
            }
            Err(e) => {
                warn!(channel = %channel, error = %e, "Redis pub/sub subscribe failed");
            }
        }

        if tx.send(ChannelSignal::Disconnected).await.is_err() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = tx.closed() => return,
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

async fn open(client: &Client, channel: &str) -> redis::RedisResult<redis::aio::PubSub> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(channel).await?;
    debug!(channel, "Subscribed to Redis presence channel");
    Ok(pubsub)
}

/// Undecodable payloads become an empty raw event so the subscriber
/// counts them as malformed.
fn decode(msg: &redis::Msg) -> RawPresenceEvent {
    msg.get_payload::<String>()
        .ok()
        .and_then(|payload| serde_json::from_str(&payload).ok())
        .unwrap_or_else(|| {
            debug!(channel = msg.get_channel_name(), "Undecodable presence payload");
            RawPresenceEvent::default()
        })
}
