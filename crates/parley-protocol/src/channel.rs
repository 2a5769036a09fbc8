//! The event-channel seam between the orchestrator and the transport.
//!
//! The concrete implementation in `parley-transport` wraps the WebRTC data
//! channel; tests substitute recording doubles. The orchestrator never sees
//! anything below this trait.

use async_trait::async_trait;
use thiserror::Error;

use crate::events::ClientEvent;

#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel is not open. The dispatcher stashes the result and
    /// retries at the next proof-of-open observation point.
    #[error("event channel is not open")]
    Closed,

    #[error("failed to serialize outbound event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("transport send failed: {0}")]
    Transport(String),
}

/// Bidirectional side-channel for protocol events.
///
/// Inbound events are not part of this trait: the transport pumps them into
/// an mpsc channel handed over at connect time, so receiving never blocks
/// sending.
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Whether the underlying channel is currently open for sending.
    fn is_open(&self) -> bool;

    /// Serializes and sends one event. Returns [`ChannelError::Closed`]
    /// when the channel is not open.
    async fn send(&self, event: &ClientEvent) -> Result<(), ChannelError>;
}
