//! Transport negotiation for the Parley voice-session orchestrator.
//!
//! Establishes the peer connection carrying both the audio media and the
//! event channel. The negotiation sequence is strict:
//!
//! 1. build the peer with at least one public STUN server,
//! 2. attach the local microphone track through an explicit send-and-receive
//!    transceiver (implicit track addition negotiates unreliably against
//!    some remote configurations),
//! 3. create the event channel **before** generating the offer, so the
//!    tool-call wiring exists before any data can arrive,
//! 4. fetch a short-lived credential from the trusted backend,
//! 5. exchange the local offer for the remote answer using that credential,
//! 6. apply the remote answer.
//!
//! Any failure rolls the peer back so a retry can start from scratch. The
//! orchestrator core never touches this crate's internals: it sees the
//! [`Transport`] / [`TransportFactory`] traits and a stream of
//! [`TransportEvent`]s.

pub mod channel;
pub mod credential;
pub mod error;
pub mod negotiator;
pub mod peer;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use parley_audio::PlaybackSink;
use parley_protocol::{EventChannel, InboundEvent};

pub use channel::WebRtcEventChannel;
pub use credential::{CredentialClient, CredentialGrant, CredentialRequest};
pub use error::TransportError;
pub use negotiator::{NegotiationSettings, WebRtcConnector};

/// Events surfaced by a transport to the session driver.
#[derive(Debug)]
pub enum TransportEvent {
    /// The event channel opened and can carry protocol frames.
    ChannelOpen,
    /// The event channel closed.
    ChannelClosed,
    /// One inbound protocol event.
    Inbound(InboundEvent),
    /// Remote audio started arriving at the playback sink.
    PlaybackStarted,
    /// The remote audio track ended or stalled.
    PlaybackStopped,
    /// The peer connection failed or disconnected.
    Failed(String),
}

/// A live transport: the session owns exactly one at a time.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The event channel multiplexed over this transport.
    fn channel(&self) -> Arc<dyn EventChannel>;

    /// Closes the transport. Idempotent; must complete before a successor
    /// transport is wired.
    async fn close(&self) -> Result<(), TransportError>;

    fn is_closed(&self) -> bool;
}

/// Builds transports. The WebRTC implementation is [`WebRtcConnector`];
/// tests substitute recording factories.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Runs the full negotiation. `events` receives channel/inbound/playback
    /// events; `sink` is where remote audio lands; `mic` feeds captured PCM
    /// into the local track.
    async fn connect(
        &self,
        settings: &NegotiationSettings,
        events: mpsc::Sender<TransportEvent>,
        sink: Arc<dyn PlaybackSink>,
        mic: mpsc::Receiver<Vec<i16>>,
    ) -> Result<Arc<dyn Transport>, TransportError>;
}
