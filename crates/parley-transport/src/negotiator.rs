//! The negotiation sequence and the live WebRTC transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use webrtc::media::Sample;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

use parley_audio::PlaybackSink;
use parley_protocol::EventChannel;

use crate::channel::WebRtcEventChannel;
use crate::credential::{CredentialClient, CredentialRequest};
use crate::error::TransportError;
use crate::peer;
use crate::{Transport, TransportEvent, TransportFactory};

/// Timeout for the SDP exchange request.
const SDP_TIMEOUT: Duration = Duration::from_secs(15);

/// Decoded remote audio sample rate (opus full-band).
const REMOTE_SAMPLE_RATE: u32 = 48_000;

/// Maximum decoded samples per opus frame (120 ms at 48 kHz, mono).
const MAX_OPUS_FRAME: usize = 5_760;

/// Everything the negotiator needs to bring a session up.
#[derive(Debug, Clone)]
pub struct NegotiationSettings {
    /// Trusted backend endpoint minting ephemeral credentials.
    pub credential_endpoint: String,
    /// Remote realtime endpoint accepting SDP offers.
    pub realtime_endpoint: String,
    /// Protocol version header sent with the SDP exchange.
    pub protocol_header: (String, String),
    pub model: String,
    pub voice: String,
    pub language: String,
    /// STUN/TURN URLs; a public STUN default is applied when empty.
    pub ice_servers: Vec<String>,
    /// Sample rate of captured microphone PCM.
    pub capture_sample_rate: u32,
    /// Preferred playback device, re-bound on every inbound track event.
    pub preferred_output_device: Option<String>,
}

impl Default for NegotiationSettings {
    fn default() -> Self {
        Self {
            credential_endpoint: String::new(),
            realtime_endpoint: String::new(),
            protocol_header: ("OpenAI-Beta".to_string(), "realtime=v1".to_string()),
            model: "gpt-realtime".to_string(),
            voice: "marin".to_string(),
            language: "en".to_string(),
            ice_servers: Vec::new(),
            capture_sample_rate: 24_000,
            preferred_output_device: None,
        }
    }
}

/// The production [`TransportFactory`].
#[derive(Debug, Default)]
pub struct WebRtcConnector;

#[async_trait]
impl TransportFactory for WebRtcConnector {
    async fn connect(
        &self,
        settings: &NegotiationSettings,
        events: mpsc::Sender<TransportEvent>,
        sink: Arc<dyn PlaybackSink>,
        mic: mpsc::Receiver<Vec<i16>>,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let pc = peer::new_peer(&settings.ice_servers).await?;

        // Every step after peer construction rolls the peer back on failure
        // so a retry starts clean.
        match Self::negotiate(&pc, settings, events, sink, mic).await {
            Ok(transport) => Ok(transport),
            Err(e) => {
                warn!(error = %e, "negotiation failed, rolling back peer");
                if let Err(close_err) = pc.close().await {
                    warn!(error = %close_err, "rollback close failed");
                }
                Err(e)
            }
        }
    }
}

impl WebRtcConnector {
    async fn negotiate(
        pc: &Arc<RTCPeerConnection>,
        settings: &NegotiationSettings,
        events: mpsc::Sender<TransportEvent>,
        sink: Arc<dyn PlaybackSink>,
        mic: mpsc::Receiver<Vec<i16>>,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let mic_track = peer::attach_microphone(pc).await?;

        // The event channel must exist before the offer so tool-call wiring
        // is negotiated into the session description.
        let dc = peer::create_event_channel(pc).await?;
        let channel = WebRtcEventChannel::wire(dc, events.clone());

        wire_remote_audio(pc, settings, events.clone(), sink);
        wire_peer_state(pc, events.clone());

        let offer_sdp = peer::local_offer(pc).await?;

        let credential = CredentialClient::new(&settings.credential_endpoint)
            .fetch(&CredentialRequest {
                model: settings.model.clone(),
                voice: settings.voice.clone(),
                language: settings.language.clone(),
            })
            .await?;
        let model = credential.effective_model(&settings.model);

        let answer_sdp = exchange_sdp(
            &settings.realtime_endpoint,
            &settings.protocol_header,
            &model,
            &credential.client_secret.value,
            offer_sdp,
        )
        .await?;

        peer::apply_answer(pc, answer_sdp).await?;

        let mic_task = spawn_mic_pump(mic_track, mic, settings.capture_sample_rate);

        info!(model = %model, "transport negotiated");

        Ok(Arc::new(WebRtcTransport {
            pc: Arc::clone(pc),
            channel,
            closed: AtomicBool::new(false),
            mic_task: Mutex::new(Some(mic_task)),
        }))
    }
}

/// Posts the local offer to the realtime endpoint and returns the answer.
pub async fn exchange_sdp(
    endpoint: &str,
    protocol_header: &(String, String),
    model: &str,
    secret: &str,
    offer_sdp: String,
) -> Result<String, TransportError> {
    let url = format!("{endpoint}?model={model}");
    let response = reqwest::Client::new()
        .post(&url)
        .timeout(SDP_TIMEOUT)
        .bearer_auth(secret)
        .header("Content-Type", "application/sdp")
        .header(protocol_header.0.as_str(), protocol_header.1.as_str())
        .body(offer_sdp)
        .send()
        .await?;

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        let excerpt: String = body.chars().take(200).collect();
        return Err(TransportError::SdpExchange(format!("{status}: {excerpt}")));
    }
    if body.trim().is_empty() {
        return Err(TransportError::SdpExchange("empty answer body".to_string()));
    }
    Ok(body)
}

/// Binds the playback sink on each inbound track event and pumps decoded
/// audio into it.
fn wire_remote_audio(
    pc: &Arc<RTCPeerConnection>,
    settings: &NegotiationSettings,
    events: mpsc::Sender<TransportEvent>,
    sink: Arc<dyn PlaybackSink>,
) {
    let preferred = settings.preferred_output_device.clone();
    pc.on_track(Box::new(move |track: Arc<TrackRemote>, _receiver, _transceiver| {
        let events = events.clone();
        let sink = Arc::clone(&sink);
        let preferred = preferred.clone();
        Box::pin(async move {
            debug!(id = %track.id(), "remote track arrived");
            if let Err(e) = sink.rebind_output(preferred.as_deref()) {
                warn!(error = %e, "failed to re-bind playback device, keeping previous output");
            }
            tokio::spawn(pump_remote_track(track, events, sink));
        })
    }));
}

async fn pump_remote_track(
    track: Arc<TrackRemote>,
    events: mpsc::Sender<TransportEvent>,
    sink: Arc<dyn PlaybackSink>,
) {
    let mut decoder = match opus::Decoder::new(REMOTE_SAMPLE_RATE, opus::Channels::Mono) {
        Ok(d) => d,
        Err(e) => {
            warn!(error = %e, "failed to create opus decoder; remote audio muted");
            return;
        }
    };

    let mut pcm = vec![0i16; MAX_OPUS_FRAME];
    let mut started = false;

    while let Ok((packet, _)) = track.read_rtp().await {
        if packet.payload.is_empty() {
            continue;
        }
        match decoder.decode(&packet.payload, &mut pcm, false) {
            Ok(samples) if samples > 0 => {
                if !started {
                    started = true;
                    let _ = events.send(TransportEvent::PlaybackStarted).await;
                }
                sink.append_pcm(&pcm[..samples], REMOTE_SAMPLE_RATE, 1);
            }
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "dropping undecodable audio packet");
            }
        }
    }

    if started {
        let _ = events.send(TransportEvent::PlaybackStopped).await;
    }
    debug!("remote track ended");
}

/// Surfaces terminal peer states to the session driver.
fn wire_peer_state(pc: &Arc<RTCPeerConnection>, events: mpsc::Sender<TransportEvent>) {
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let events = events.clone();
        Box::pin(async move {
            debug!(state = %state, "peer state changed");
            if matches!(
                state,
                RTCPeerConnectionState::Failed | RTCPeerConnectionState::Disconnected
            ) {
                let _ = events
                    .send(TransportEvent::Failed(state.to_string()))
                    .await;
            }
        })
    }));
}

/// Encodes captured PCM into 20 ms opus frames and writes them to the
/// local track.
fn spawn_mic_pump(
    track: Arc<TrackLocalStaticSample>,
    mut mic: mpsc::Receiver<Vec<i16>>,
    sample_rate: u32,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut encoder =
            match opus::Encoder::new(sample_rate, opus::Channels::Mono, opus::Application::Voip) {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, rate = sample_rate, "failed to create opus encoder; microphone muted");
                    return;
                }
            };

        let frame_samples = (sample_rate / 50) as usize; // 20 ms
        let frame_duration = Duration::from_millis(20);
        let mut pending: Vec<i16> = Vec::with_capacity(frame_samples * 2);
        let mut encoded = vec![0u8; 1500];

        while let Some(chunk) = mic.recv().await {
            pending.extend_from_slice(&chunk);
            while pending.len() >= frame_samples {
                let frame: Vec<i16> = pending.drain(..frame_samples).collect();
                match encoder.encode(&frame, &mut encoded) {
                    Ok(len) if len > 0 => {
                        let sample = Sample {
                            data: Bytes::copy_from_slice(&encoded[..len]),
                            duration: frame_duration,
                            ..Default::default()
                        };
                        if let Err(e) = track.write_sample(&sample).await {
                            debug!(error = %e, "dropping microphone frame");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!(error = %e, "opus encode failed for one frame");
                    }
                }
            }
        }
        debug!("microphone pump ended");
    })
}

/// A live WebRTC transport.
pub struct WebRtcTransport {
    pc: Arc<RTCPeerConnection>,
    channel: Arc<WebRtcEventChannel>,
    closed: AtomicBool,
    mic_task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl Transport for WebRtcTransport {
    fn channel(&self) -> Arc<dyn EventChannel> {
        Arc::clone(&self.channel) as Arc<dyn EventChannel>
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(task) = self.mic_task.lock().await.take() {
            task.abort();
        }
        self.pc.close().await?;
        info!("transport closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
