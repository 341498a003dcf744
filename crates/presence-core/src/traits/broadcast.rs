//! Broadcast channel trait for low-latency presence fan-out.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::result::AppResult;
use crate::types::event::{PresenceEvent, RawPresenceEvent};

/// Something observed on a subscribed broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSignal {
    /// A presence message from another client, not yet validated.
    Message(RawPresenceEvent),
    /// The transport (re)established its connection.
    Connected,
    /// The transport lost its connection; messages may be missed.
    Disconnected,
}

/// Stream of channel signals returned by [`BroadcastChannel::subscribe`].
pub type SignalStream = BoxStream<'static, ChannelSignal>;

/// Best-effort, unordered, possibly lossy pub/sub transport.
///
/// Implementations must not retry internally; the heartbeat cadence and
/// the reconciliation backstop cover dropped messages.
#[async_trait]
pub trait BroadcastChannel: Send + Sync + std::fmt::Debug + 'static {
    /// Publish a presence event to every subscriber.
    async fn publish(&self, event: &PresenceEvent) -> AppResult<()>;

    /// Open a subscription. The stream ends when the channel is closed.
    async fn subscribe(&self) -> AppResult<SignalStream>;
}
