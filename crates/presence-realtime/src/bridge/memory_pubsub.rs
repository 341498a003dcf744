//! In-memory broadcast channel for single-node deployments and tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use presence_core::error::AppError;
use presence_core::result::AppResult;
use presence_core::traits::broadcast::{BroadcastChannel, ChannelSignal, SignalStream};
use presence_core::types::event::{PresenceEvent, RawPresenceEvent};

/// In-process presence broadcast over a `tokio::sync::broadcast` channel.
///
/// The connection flag lets a single process rehearse transport loss:
/// while disconnected, publishes fail and subscribers observe
/// [`ChannelSignal::Disconnected`] followed by
/// [`ChannelSignal::Connected`] on recovery.
#[derive(Debug)]
pub struct MemoryBroadcast {
    /// Signal fan-out
    tx: broadcast::Sender<ChannelSignal>,
    /// Simulated transport state
    connected: AtomicBool,
}

impl MemoryBroadcast {
    /// Create a connected channel buffering up to `buffer_size` signals
    /// per subscriber.
    pub fn new(buffer_size: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer_size.max(1));
        Self {
            tx,
            connected: AtomicBool::new(true),
        }
    }

    /// Simulate the transport dropping or recovering.
    pub fn set_connected(&self, connected: bool) {
        let was = self.connected.swap(connected, Ordering::SeqCst);
        if was == connected {
            return;
        }
        info!(connected, "Memory broadcast channel state changed");
        let signal = if connected {
            ChannelSignal::Connected
        } else {
            ChannelSignal::Disconnected
        };
        let _ = self.tx.send(signal);
    }

    /// Whether the simulated transport is up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Deliver a message exactly as given, without validation.
    pub fn publish_raw(&self, raw: RawPresenceEvent) {
        let _ = self.tx.send(ChannelSignal::Message(raw));
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl BroadcastChannel for MemoryBroadcast {
    async fn publish(&self, event: &PresenceEvent) -> AppResult<()> {
        if !self.is_connected() {
            return Err(AppError::broadcast("memory broadcast channel is disconnected"));
        }
        // No receivers is not a failure
        let _ = self.tx.send(ChannelSignal::Message(event.into()));
        Ok(())
    }

    async fn subscribe(&self) -> AppResult<SignalStream> {
        Ok(signal_stream(self.tx.subscribe()))
    }
}

/// Adapt a broadcast receiver into a signal stream. Lagging behind the
/// buffer loses messages, which is reported as a disconnect/reconnect pair
/// so the subscriber reconciles.
fn signal_stream(rx: broadcast::Receiver<ChannelSignal>) -> SignalStream {
    stream::unfold((rx, None::<ChannelSignal>), |(mut rx, pending)| async move {
        if let Some(signal) = pending {
            return Some((signal, (rx, None)));
        }
        match rx.recv().await {
            Ok(signal) => Some((signal, (rx, None))),
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "Broadcast subscriber lagged, messages lost");
                Some((
                    ChannelSignal::Disconnected,
                    (rx, Some(ChannelSignal::Connected)),
                ))
            }
            Err(RecvError::Closed) => None,
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use presence_core::types::id::UserId;

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let channel = MemoryBroadcast::new(16);
        let mut stream = channel.subscribe().await.unwrap();
        let event = PresenceEvent::online(UserId::new("u1"), 10);
        channel.publish(&event).await.unwrap();

        assert_eq!(
            stream.next().await,
            Some(ChannelSignal::Message(RawPresenceEvent::from(&event)))
        );
    }

    #[tokio::test]
    async fn test_disconnected_channel_rejects_publish() {
        let channel = MemoryBroadcast::new(16);
        let mut stream = channel.subscribe().await.unwrap();
        channel.set_connected(false);
        assert!(
            channel
                .publish(&PresenceEvent::online(UserId::new("u1"), 1))
                .await
                .is_err()
        );
        channel.set_connected(true);

        assert_eq!(stream.next().await, Some(ChannelSignal::Disconnected));
        assert_eq!(stream.next().await, Some(ChannelSignal::Connected));
    }

    #[tokio::test]
    async fn test_lag_surfaces_as_reconnect() {
        let channel = MemoryBroadcast::new(1);
        let mut stream = channel.subscribe().await.unwrap();
        for ts in 0..3 {
            channel
                .publish(&PresenceEvent::online(UserId::new("u1"), ts))
                .await
                .unwrap();
        }

        assert_eq!(stream.next().await, Some(ChannelSignal::Disconnected));
        assert_eq!(stream.next().await, Some(ChannelSignal::Connected));
        assert!(matches!(stream.next().await, Some(ChannelSignal::Message(_))));
    }
}
