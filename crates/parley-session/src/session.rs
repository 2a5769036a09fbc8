//! Session lifecycle: start, event routing, teardown.
//!
//! Start order is fixed: take the start lock, close any previous transport,
//! claim focus, acquire the microphone (fatal on failure), negotiate the
//! transport (full rollback on failure), then hand the event stream to the
//! driver task. Teardown is idempotent because it runs from several exit
//! points: explicit end, transport failure, spoken stop intent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use parley_audio::{FocusClaim, MicCapture, MicConstraints, Microphone, PlaybackSink};
use parley_protocol::{
    kinds, ChannelError, ClientEvent, EventChannel, InboundEvent, ResponseOptions, SessionUpdate,
    ToolSpec, TranscriptionConfig,
};
use parley_transport::{
    NegotiationSettings, Transport, TransportEvent, TransportFactory,
};
use parley_types::{ConversationTurn, SessionPhase, StoreError, TranscriptStore};

use crate::arbiter::SessionArbiter;
use crate::dispatch::{HandlerMap, ToolCallDispatcher};
use crate::error::SessionError;
use crate::instructions::{self, InstructionSources};
use crate::notices::SessionNotice;
use crate::readiness::ReadinessGate;
use crate::transcript::TranscriptRecorder;
use crate::turns::{TurnTakingController, DEFAULT_STOP_PATTERN};

/// How long the readiness gate waits for the session-update acknowledgement
/// before opening on its own. Generous: large instruction payloads take a
/// while to apply remotely.
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_millis(1_500);

/// Per-session configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub negotiation: NegotiationSettings,
    pub instructions: InstructionSources,
    pub transcription_model: String,
    /// Opt-out flag for the synthetic greeting after readiness.
    pub greeting_enabled: bool,
    pub barge_in_enabled: bool,
    /// Stop-intent regex, matched only against user transcripts.
    pub stop_pattern: String,
    pub readiness_timeout: Duration,
    pub mic: MicConstraints,
    /// Whether to claim platform audio focus for this session.
    pub claim_focus: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            negotiation: NegotiationSettings::default(),
            instructions: InstructionSources::default(),
            transcription_model: "whisper-1".to_string(),
            greeting_enabled: true,
            barge_in_enabled: true,
            stop_pattern: DEFAULT_STOP_PATTERN.to_string(),
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            mic: MicConstraints::default(),
            claim_focus: true,
        }
    }
}

/// Owns arbitration and the injected components; builds sessions.
pub struct SessionManager {
    arbiter: SessionArbiter,
    factory: Arc<dyn TransportFactory>,
    microphone: Arc<dyn Microphone>,
    sink: Arc<dyn PlaybackSink>,
    handlers: Arc<dyn HandlerMap>,
    store: Arc<dyn TranscriptStore>,
    notices: broadcast::Sender<SessionNotice>,
}

impl SessionManager {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        microphone: Arc<dyn Microphone>,
        sink: Arc<dyn PlaybackSink>,
        handlers: Arc<dyn HandlerMap>,
        store: Arc<dyn TranscriptStore>,
    ) -> Self {
        let (notices, _) = broadcast::channel(64);
        Self {
            arbiter: SessionArbiter::new(),
            factory,
            microphone,
            sink,
            handlers,
            store,
            notices,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.notices.subscribe()
    }

    pub fn arbiter(&self) -> &SessionArbiter {
        &self.arbiter
    }

    /// Starts a session. At most one start runs at a time; the previous
    /// transport is closed before the new one is wired.
    pub async fn start(&self, settings: SessionSettings) -> Result<SessionHandle, SessionError> {
        let _permit = self.arbiter.begin_start()?;

        // Configuration errors surface before any resource is touched.
        let turns = TurnTakingController::new(settings.barge_in_enabled, &settings.stop_pattern)?;

        // The previous transport must be fully closed before the new one
        // exists; a late callback from session N-1 must never find session
        // N's objects.
        if let Some(previous) = self.arbiter.take_current().await {
            debug!(seq = previous.seq(), "closing superseded session");
            previous.end().await;
        }

        let seq = self.arbiter.next_seq();
        self.notify(SessionNotice::PhaseChanged(SessionPhase::Acquiring));
        info!(seq, "session start: acquiring");

        let focus = settings
            .claim_focus
            .then(|| FocusClaim::claim("parley voice session"));

        let (mic_tx, mic_rx) = mpsc::channel::<Vec<i16>>(64);
        let capture = match self.microphone.acquire(&settings.mic, mic_tx) {
            Ok(capture) => capture,
            Err(e) => {
                warn!(seq, error = %e, "microphone acquisition failed");
                drop(focus);
                self.notify(SessionNotice::Error(format!("microphone unavailable: {e}")));
                return Err(SessionError::Acquisition(e));
            }
        };

        self.notify(SessionNotice::PhaseChanged(SessionPhase::Negotiating));
        info!(seq, "session start: negotiating");

        let (event_tx, mut event_rx) = mpsc::channel::<TransportEvent>(256);
        let transport = match self
            .factory
            .connect(&settings.negotiation, event_tx, Arc::clone(&self.sink), mic_rx)
            .await
        {
            Ok(transport) => transport,
            Err(e) => {
                warn!(seq, error = %e, "negotiation failed, rolling back");
                let mut capture = capture;
                capture.stop();
                drop(focus);
                self.notify(SessionNotice::Error(format!("connection failed: {e}")));
                return Err(SessionError::Negotiation(e));
            }
        };

        let channel = transport.channel();
        let manifest = self.handlers.manifest();
        let dispatcher = Arc::new(ToolCallDispatcher::new(
            Arc::clone(&self.handlers),
            Arc::clone(&channel),
            self.notices.clone(),
        ));

        let inner = Arc::new(SessionInner {
            seq,
            settings,
            phase: StdMutex::new(SessionPhase::Negotiating),
            transport,
            channel,
            manifest,
            dispatcher,
            turns,
            recorder: TranscriptRecorder::new(Arc::clone(&self.store)),
            gate: ReadinessGate::new(),
            capture: StdMutex::new(Some(capture)),
            sink: Arc::clone(&self.sink),
            focus: StdMutex::new(focus),
            notices: self.notices.clone(),
            active_response: StdMutex::new(None),
            torn_down: AtomicBool::new(false),
        });

        inner.set_phase(SessionPhase::Ready);

        // The conversation record is created lazily at session start;
        // persistence is best-effort and must not delay the start path.
        {
            let inner = Arc::clone(&inner);
            tokio::spawn(async move { inner.recorder.ensure_record().await });
        }

        // Driver: one logical thread routing transport callbacks, channel
        // messages and timers.
        {
            let inner = Arc::clone(&inner);
            tokio::spawn(async move {
                while let Some(event) = event_rx.recv().await {
                    if inner.is_ended() {
                        break;
                    }
                    inner.handle_event(event).await;
                }
                debug!(seq = inner.seq, "session driver finished");
            });
        }

        let handle = SessionHandle { inner };
        self.arbiter.set_current(handle.clone()).await;
        Ok(handle)
    }

    /// Ends the current session, if any.
    pub async fn end_current(&self) {
        if let Some(current) = self.arbiter.take_current().await {
            current.end().await;
        }
    }

    fn notify(&self, notice: SessionNotice) {
        let _ = self.notices.send(notice);
    }
}

/// A handle to a running (or ended) session.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

impl SessionHandle {
    pub async fn end(&self) {
        self.inner.teardown().await;
    }

    pub fn seq(&self) -> u64 {
        self.inner.seq
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.phase()
    }

    pub fn is_ended(&self) -> bool {
        self.inner.is_ended()
    }

    pub fn is_ready(&self) -> bool {
        self.inner.gate.is_ready()
    }

    /// Waits until the readiness gate opens (acknowledgement or timeout).
    pub async fn wait_ready(&self) {
        self.inner.gate.wait_ready().await;
    }

    /// Sends a voice-change update on the live channel.
    pub async fn change_voice(&self, voice: &str) -> Result<(), ChannelError> {
        self.inner
            .channel
            .send(&ClientEvent::voice_change(voice))
            .await
    }
}

struct SessionInner {
    seq: u64,
    settings: SessionSettings,
    phase: StdMutex<SessionPhase>,
    transport: Arc<dyn Transport>,
    channel: Arc<dyn EventChannel>,
    manifest: Vec<ToolSpec>,
    dispatcher: Arc<ToolCallDispatcher>,
    turns: TurnTakingController,
    recorder: TranscriptRecorder,
    gate: ReadinessGate,
    capture: StdMutex<Option<Box<dyn MicCapture>>>,
    sink: Arc<dyn PlaybackSink>,
    focus: StdMutex<Option<FocusClaim>>,
    notices: broadcast::Sender<SessionNotice>,
    /// Identifier of the in-flight response, when one is known.
    active_response: StdMutex<Option<String>>,
    torn_down: AtomicBool,
}

impl SessionInner {
    fn phase(&self) -> SessionPhase {
        *self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: SessionPhase) {
        let changed = {
            let mut current = self.phase.lock().unwrap_or_else(PoisonError::into_inner);
            if *current == phase {
                false
            } else {
                info!(seq = self.seq, from = %current, to = %phase, "session phase transition");
                *current = phase;
                true
            }
        };
        if changed {
            self.notify(SessionNotice::PhaseChanged(phase));
        }
    }

    fn is_ended(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Replaces the tracked in-flight response id, returning the previous
    /// one.
    fn set_active_response(&self, response_id: Option<String>) -> Option<String> {
        let mut active = self
            .active_response
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *active, response_id)
    }

    fn notify(&self, notice: SessionNotice) {
        let _ = self.notices.send(notice);
    }

    async fn handle_event(self: &Arc<Self>, event: TransportEvent) {
        match event {
            TransportEvent::ChannelOpen => self.on_channel_open().await,
            TransportEvent::ChannelClosed => {
                debug!(seq = self.seq, "event channel closed");
            }
            TransportEvent::PlaybackStarted => self.turns.set_assistant_speaking(true),
            TransportEvent::PlaybackStopped => self.turns.set_assistant_speaking(false),
            TransportEvent::Failed(reason) => {
                warn!(seq = self.seq, reason = %reason, "transport failed");
                self.notify(SessionNotice::Error(format!("transport failed: {reason}")));
                self.teardown().await;
            }
            TransportEvent::Inbound(event) => self.on_inbound(event).await,
        }
    }

    /// Channel open: compose and send the session update carrying
    /// instructions, the tool manifest and the transcription directive, arm
    /// the readiness timeout, and flush any results the dispatcher computed
    /// while the channel was closed.
    async fn on_channel_open(self: &Arc<Self>) {
        let update = ClientEvent::SessionUpdate {
            session: SessionUpdate {
                instructions: Some(instructions::compose(&self.settings.instructions)),
                tools: Some(self.manifest.clone()),
                input_audio_transcription: Some(TranscriptionConfig {
                    model: self.settings.transcription_model.clone(),
                }),
                voice: Some(self.settings.negotiation.voice.clone()),
            },
        };
        if let Err(e) = self.channel.send(&update).await {
            warn!(seq = self.seq, error = %e, "failed to send session update");
        }

        let inner = Arc::clone(self);
        let timeout = self.settings.readiness_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            inner.mark_ready(false).await;
        });

        self.dispatcher.flush_open().await;
    }

    /// Both readiness paths converge here; only the first caller wins.
    async fn mark_ready(self: &Arc<Self>, via_ack: bool) {
        if self.is_ended() || !self.gate.mark_ready() {
            return;
        }
        info!(seq = self.seq, via_ack, "session ready");
        self.notify(SessionNotice::Ready { via_ack });
        self.set_phase(SessionPhase::Active);

        if self.settings.greeting_enabled {
            let greeting = ClientEvent::ResponseCreate {
                response: Some(ResponseOptions {
                    instructions: Some(instructions::greeting_instructions(
                        &self.settings.instructions,
                    )),
                }),
            };
            if let Err(e) = self.channel.send(&greeting).await {
                warn!(seq = self.seq, error = %e, "failed to request greeting");
            }
        }
    }

    async fn on_inbound(self: &Arc<Self>, event: InboundEvent) {
        match event.kind.as_str() {
            kinds::SESSION_UPDATED => self.mark_ready(true).await,
            kinds::SESSION_CREATED => {
                debug!(seq = self.seq, "remote session created");
            }
            kinds::OUTPUT_AUDIO_STARTED => {
                // A sink paused by an earlier barge-in must resume for the
                // next assistant utterance.
                self.sink.resume();
                self.turns.set_assistant_speaking(true);
            }
            kinds::OUTPUT_AUDIO_STOPPED => self.turns.set_assistant_speaking(false),
            kinds::SPEECH_STARTED | kinds::SPEECH_COMMITTED => {
                if !self.gate.is_ready() {
                    // Acting on user speech before the instruction update is
                    // acknowledged would have the model answer with stale
                    // defaults.
                    debug!(seq = self.seq, kind = %event.kind, "ignoring user speech before readiness");
                    return;
                }
                if event.kind == kinds::SPEECH_STARTED && self.turns.should_barge_in() {
                    // Cancellation runs before any tool-call or transcript
                    // handling for this event, and does not wait for an ack.
                    if let Err(e) = self.channel.send(&ClientEvent::ResponseCancel).await {
                        debug!(seq = self.seq, error = %e, "response cancel send failed");
                    }
                    self.sink.pause();
                    self.turns.set_assistant_speaking(false);
                    let cancelled = self.set_active_response(None);
                    info!(
                        seq = self.seq,
                        response = cancelled.as_deref().unwrap_or("<unknown>"),
                        "barge-in: cancelled in-flight response"
                    );
                    self.notify(SessionNotice::BargeIn);
                }
            }
            kinds::INPUT_TRANSCRIPTION_COMPLETED => {
                let text = event.input_transcript().unwrap_or("").to_string();
                // Stop intent is only ever matched against user-sourced
                // text; assistant transcripts never reach this path.
                if let Some(matched) = self.turns.match_stop_intent(&text) {
                    info!(seq = self.seq, matched, "spoken stop intent");
                    if let Err(e) = self.channel.send(&ClientEvent::ResponseCancel).await {
                        debug!(seq = self.seq, error = %e, "response cancel send failed");
                    }
                    self.sink.pause();
                    self.notify(SessionNotice::StopIntent {
                        matched: matched.to_string(),
                    });
                    self.recorder.record_user(&text).await;
                    self.teardown().await;
                    return;
                }
                self.recorder.record_user(&text).await;
            }
            kinds::RESPONSE_TRANSCRIPT_DELTA => {
                if let Some(delta) = event.transcript_delta() {
                    self.recorder.push_assistant_delta(delta);
                }
            }
            kinds::RESPONSE_TRANSCRIPT_DONE => {
                self.recorder.flush_assistant(event.transcript_done()).await;
            }
            kinds::RESPONSE_CREATED | kinds::RESPONSE_OUTPUT_ITEM_ADDED => {
                if event.kind == kinds::RESPONSE_CREATED {
                    self.set_active_response(event.response_id().map(str::to_string));
                }
                self.dispatcher.flush_for_event(&event).await;
            }
            kinds::RESPONSE_OUTPUT_ITEM_DONE => {
                self.dispatcher.flush_for_event(&event).await;
                self.dispatcher.observe(&event);
            }
            kinds::FUNCTION_CALL_ARGUMENTS_DONE => {
                self.dispatcher.observe(&event);
            }
            kinds::RESPONSE_DONE => {
                self.set_active_response(None);
                self.recorder.flush_assistant(None).await;
                self.dispatcher.flush_for_event(&event).await;
                self.dispatcher.observe(&event);
            }
            kinds::ERROR => {
                let message = event
                    .payload
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(Value::as_str)
                    .or_else(|| event.payload.get("message").and_then(Value::as_str))
                    .unwrap_or("unknown remote error")
                    .to_string();
                warn!(seq = self.seq, message = %message, "remote error event");
                self.notify(SessionNotice::Error(message));
            }
            _ => {
                // Unknown shapes still run the dispatcher's recursive scan.
                self.dispatcher.observe(&event);
            }
        }
    }

    /// Tears the session down. Safe to call from every exit point.
    async fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.set_phase(SessionPhase::Ending);

        if let Ok(mut guard) = self.capture.lock() {
            if let Some(mut capture) = guard.take() {
                capture.stop();
            }
        }

        if let Err(e) = self.transport.close().await {
            warn!(seq = self.seq, error = %e, "transport close failed during teardown");
        }

        self.sink.pause();
        self.sink.detach();

        if let Ok(mut guard) = self.focus.lock() {
            if let Some(mut focus) = guard.take() {
                focus.release();
            }
        }

        self.notify(SessionNotice::Ended);
        info!(seq = self.seq, "session torn down");
    }
}

/// In-memory transcript store: the test double, also the CLI fallback when
/// no transcript service is configured.
#[derive(Default)]
pub struct MemoryTranscriptStore {
    records: StdMutex<HashMap<String, Vec<ConversationTurn>>>,
}

impl MemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self, record_id: &str) -> Vec<ConversationTurn> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(record_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn record_ids(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl TranscriptStore for MemoryTranscriptStore {
    async fn create_record(&self) -> Result<String, StoreError> {
        let id = format!("conv-{}", uuid::Uuid::new_v4());
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn append_turn(&self, record_id: &str, turn: ConversationTurn) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        match records.get_mut(record_id) {
            Some(turns) => {
                turns.push(turn);
                Ok(())
            }
            None => Err(StoreError::NotFound(record_id.to_string())),
        }
    }
}
