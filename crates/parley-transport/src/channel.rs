//! Event channel over the WebRTC data channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;

use parley_protocol::{ChannelError, ClientEvent, EventChannel, InboundEvent};

use crate::TransportEvent;

/// [`EventChannel`] backed by a WebRTC data channel.
pub struct WebRtcEventChannel {
    dc: Arc<RTCDataChannel>,
    open: Arc<AtomicBool>,
}

impl WebRtcEventChannel {
    /// Wraps the data channel and wires its lifecycle and message callbacks
    /// into the transport event stream.
    pub fn wire(dc: Arc<RTCDataChannel>, events: mpsc::Sender<TransportEvent>) -> Arc<Self> {
        let open = Arc::new(AtomicBool::new(false));

        let open_flag = Arc::clone(&open);
        let open_events = events.clone();
        dc.on_open(Box::new(move || {
            open_flag.store(true, Ordering::SeqCst);
            let events = open_events.clone();
            Box::pin(async move {
                debug!("event channel open");
                let _ = events.send(TransportEvent::ChannelOpen).await;
            })
        }));

        let close_flag = Arc::clone(&open);
        let close_events = events.clone();
        dc.on_close(Box::new(move || {
            close_flag.store(false, Ordering::SeqCst);
            let events = close_events.clone();
            Box::pin(async move {
                debug!("event channel closed");
                let _ = events.send(TransportEvent::ChannelClosed).await;
            })
        }));

        let message_events = events;
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            let events = message_events.clone();
            Box::pin(async move {
                if msg.is_string {
                    let text = String::from_utf8_lossy(&msg.data);
                    match InboundEvent::parse(&text) {
                        Some(event) => {
                            let _ = events.send(TransportEvent::Inbound(event)).await;
                        }
                        None => {
                            warn!(bytes = msg.data.len(), "dropping unparseable event frame");
                        }
                    }
                } else {
                    debug!(bytes = msg.data.len(), "ignoring binary frame on event channel");
                }
            })
        }));

        Arc::new(Self { dc, open })
    }
}

#[async_trait]
impl EventChannel for WebRtcEventChannel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && self.dc.ready_state() == RTCDataChannelState::Open
    }

    async fn send(&self, event: &ClientEvent) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }
        let json = serde_json::to_string(event)?;
        self.dc
            .send_text(json)
            .await
            .map_err(|e| ChannelError::Transport(e.to_string()))?;
        Ok(())
    }
}
