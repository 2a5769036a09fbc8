//! Peer connection construction.
//!
//! Thin wrappers over the `webrtc` crate, kept separate from the
//! negotiation sequencing so each step can fail (and be rolled back)
//! independently.

use std::sync::Arc;

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::APIBuilder;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::error::TransportError;

/// Label of the data channel carrying protocol events.
pub const EVENT_CHANNEL_LABEL: &str = "events";

/// Default public STUN server, used when configuration supplies none.
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Opus clock rate used for the local microphone track.
const OPUS_CLOCK_RATE: u32 = 48_000;

/// Creates the peer connection with default codecs and interceptors and at
/// least one STUN server.
pub async fn new_peer(ice_servers: &[String]) -> Result<Arc<RTCPeerConnection>, TransportError> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;
    let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;

    let api = APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build();

    let urls = if ice_servers.is_empty() {
        vec![DEFAULT_STUN_SERVER.to_string()]
    } else {
        ice_servers.to_vec()
    };

    let config = RTCConfiguration {
        ice_servers: vec![RTCIceServer {
            urls,
            ..Default::default()
        }],
        ..Default::default()
    };

    Ok(Arc::new(api.new_peer_connection(config).await?))
}

/// Attaches the local microphone track through an explicit send-and-receive
/// transceiver. Implicit track addition negotiates unreliably against some
/// remote configurations, so the direction is always stated.
pub async fn attach_microphone(
    pc: &Arc<RTCPeerConnection>,
) -> Result<Arc<TrackLocalStaticSample>, TransportError> {
    let track = Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_OPUS.to_owned(),
            clock_rate: OPUS_CLOCK_RATE,
            channels: 1,
            ..Default::default()
        },
        "audio".to_owned(),
        "parley-mic".to_owned(),
    ));

    pc.add_transceiver_from_track(
        Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>,
        Some(RTCRtpTransceiverInit {
            direction: RTCRtpTransceiverDirection::Sendrecv,
            send_encodings: vec![],
        }),
    )
    .await?;

    Ok(track)
}

/// Creates the event channel. Must run before the offer is generated so the
/// channel is part of the negotiated description.
pub async fn create_event_channel(
    pc: &Arc<RTCPeerConnection>,
) -> Result<Arc<RTCDataChannel>, TransportError> {
    Ok(pc.create_data_channel(EVENT_CHANNEL_LABEL, None).await?)
}

/// Generates the local offer and waits for ICE gathering to complete so the
/// SDP shipped to the remote service carries all candidates.
pub async fn local_offer(pc: &Arc<RTCPeerConnection>) -> Result<String, TransportError> {
    let offer = pc.create_offer(None).await?;
    let mut gather_complete = pc.gathering_complete_promise().await;
    pc.set_local_description(offer).await?;
    let _ = gather_complete.recv().await;

    let local = pc
        .local_description()
        .await
        .ok_or_else(|| TransportError::SdpExchange("no local description".to_string()))?;
    Ok(local.sdp)
}

/// Applies the remote answer.
pub async fn apply_answer(
    pc: &Arc<RTCPeerConnection>,
    answer_sdp: String,
) -> Result<(), TransportError> {
    let answer = RTCSessionDescription::answer(answer_sdp)?;
    pc.set_remote_description(answer).await?;
    Ok(())
}
