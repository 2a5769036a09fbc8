//! Shared test doubles: transport, channel, microphone, playback sink and
//! tool handlers, all recording enough to assert ordering and counts.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use parley_audio::{AudioError, MicCapture, MicConstraints, Microphone, PlaybackSink};
use parley_protocol::{ChannelError, ClientEvent, EventChannel, ToolName, ToolSpec};
use parley_session::{HandlerMap, MemoryTranscriptStore, SessionManager, SessionSettings};
use parley_tools::{ToolError, ToolHandler};
use parley_transport::{
    NegotiationSettings, Transport, TransportError, TransportEvent, TransportFactory,
};

// ---------------------------------------------------------------------------
// Event channel
// ---------------------------------------------------------------------------

pub struct MockChannel {
    pub open: AtomicBool,
    pub sent: StdMutex<Vec<Value>>,
}

impl MockChannel {
    pub fn new(open: bool) -> Arc<Self> {
        Arc::new(Self {
            open: AtomicBool::new(open),
            sent: StdMutex::new(Vec::new()),
        })
    }

    pub fn sent_kinds(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|v| v["type"].as_str().unwrap_or("").to_string())
            .collect()
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.sent_kinds().iter().filter(|k| *k == kind).count()
    }
}

#[async_trait]
impl EventChannel for MockChannel {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn send(&self, event: &ClientEvent) -> Result<(), ChannelError> {
        if !self.is_open() {
            return Err(ChannelError::Closed);
        }
        self.sent
            .lock()
            .unwrap()
            .push(serde_json::to_value(event).expect("event serializes"));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transport and factory
// ---------------------------------------------------------------------------

pub struct MockTransport {
    pub id: u64,
    pub channel: Arc<MockChannel>,
    pub closed: AtomicBool,
    order: Arc<StdMutex<Vec<String>>>,
}

#[async_trait]
impl Transport for MockTransport {
    fn channel(&self) -> Arc<dyn EventChannel> {
        Arc::clone(&self.channel) as Arc<dyn EventChannel>
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.order.lock().unwrap().push(format!("close:{}", self.id));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub struct MockFactory {
    next_id: AtomicU64,
    pub fail_connect: AtomicBool,
    /// Whether channels start open. Tests for pending-result flushing start
    /// them closed.
    pub open_on_connect: AtomicBool,
    /// Interleaved connect/close records, e.g. `connect:2`, `close:1`.
    pub order: Arc<StdMutex<Vec<String>>>,
    pub transports: StdMutex<Vec<Arc<MockTransport>>>,
    pub event_senders: StdMutex<Vec<mpsc::Sender<TransportEvent>>>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(0),
            fail_connect: AtomicBool::new(false),
            open_on_connect: AtomicBool::new(true),
            order: Arc::new(StdMutex::new(Vec::new())),
            transports: StdMutex::new(Vec::new()),
            event_senders: StdMutex::new(Vec::new()),
        })
    }

    pub fn last_transport(&self) -> Arc<MockTransport> {
        self.transports.lock().unwrap().last().cloned().expect("a transport was connected")
    }

    pub fn last_events(&self) -> mpsc::Sender<TransportEvent> {
        self.event_senders.lock().unwrap().last().cloned().expect("a transport was connected")
    }

    pub fn order_log(&self) -> Vec<String> {
        self.order.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransportFactory for MockFactory {
    async fn connect(
        &self,
        _settings: &NegotiationSettings,
        events: mpsc::Sender<TransportEvent>,
        _sink: Arc<dyn PlaybackSink>,
        _mic: mpsc::Receiver<Vec<i16>>,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::SdpExchange("mock refusal".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.order.lock().unwrap().push(format!("connect:{id}"));
        let transport = Arc::new(MockTransport {
            id,
            channel: MockChannel::new(self.open_on_connect.load(Ordering::SeqCst)),
            closed: AtomicBool::new(false),
            order: Arc::clone(&self.order),
        });
        self.transports.lock().unwrap().push(Arc::clone(&transport));
        self.event_senders.lock().unwrap().push(events);
        Ok(transport as Arc<dyn Transport>)
    }
}

// ---------------------------------------------------------------------------
// Microphone
// ---------------------------------------------------------------------------

pub struct MockMicrophone {
    pub fail: AtomicBool,
    /// Number of captures currently live (acquired and not stopped).
    pub active: Arc<AtomicUsize>,
}

impl MockMicrophone {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail: AtomicBool::new(false),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }
}

pub struct MockCapture {
    active: Arc<AtomicUsize>,
    stopped: bool,
}

impl MicCapture for MockCapture {
    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl Microphone for MockMicrophone {
    fn acquire(
        &self,
        _constraints: &MicConstraints,
        _chunks: mpsc::Sender<Vec<i16>>,
    ) -> Result<Box<dyn MicCapture>, AudioError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AudioError::NoInputDevice);
        }
        self.active.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockCapture {
            active: Arc::clone(&self.active),
            stopped: false,
        }))
    }
}

// ---------------------------------------------------------------------------
// Playback sink
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MockSink {
    pub pauses: AtomicUsize,
    pub detached: AtomicBool,
}

impl MockSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl PlaybackSink for MockSink {
    fn append_pcm(&self, _samples: &[i16], _sample_rate: u32, _channels: u16) {}

    fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
    }

    fn resume(&self) {}

    fn is_playing(&self) -> bool {
        false
    }

    fn rebind_output(&self, _device: Option<&str>) -> Result<(), AudioError> {
        Ok(())
    }

    fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Tool handlers
// ---------------------------------------------------------------------------

pub struct CountingHandler {
    pub invocations: AtomicUsize,
    pub last_arguments: StdMutex<Option<Value>>,
    pub output: String,
}

impl CountingHandler {
    pub fn new(output: &str) -> Arc<Self> {
        Arc::new(Self {
            invocations: AtomicUsize::new(0),
            last_arguments: StdMutex::new(None),
            output: output.to_string(),
        })
    }
}

#[async_trait]
impl ToolHandler for CountingHandler {
    async fn call(&self, arguments: &Value) -> Result<String, ToolError> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        *self.last_arguments.lock().unwrap() = Some(arguments.clone());
        Ok(self.output.clone())
    }
}

pub struct MockHandlers {
    pub handler: Arc<CountingHandler>,
}

impl HandlerMap for MockHandlers {
    fn handler(&self, _name: ToolName) -> Option<Arc<dyn ToolHandler>> {
        Some(Arc::clone(&self.handler) as Arc<dyn ToolHandler>)
    }

    fn manifest(&self) -> Vec<ToolSpec> {
        parley_protocol::manifest()
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

pub struct Rig {
    pub manager: SessionManager,
    pub factory: Arc<MockFactory>,
    pub microphone: Arc<MockMicrophone>,
    pub sink: Arc<MockSink>,
    pub handler: Arc<CountingHandler>,
    pub store: Arc<MemoryTranscriptStore>,
}

pub fn rig() -> Rig {
    let factory = MockFactory::new();
    let microphone = MockMicrophone::new();
    let sink = MockSink::new();
    let handler = CountingHandler::new("handler output");
    let store = Arc::new(MemoryTranscriptStore::new());
    let manager = SessionManager::new(
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
        Arc::clone(&microphone) as Arc<dyn Microphone>,
        Arc::clone(&sink) as Arc<dyn PlaybackSink>,
        Arc::new(MockHandlers {
            handler: Arc::clone(&handler),
        }),
        Arc::clone(&store) as Arc<dyn parley_types::TranscriptStore>,
    );
    Rig {
        manager,
        factory,
        microphone,
        sink,
        handler,
        store,
    }
}

/// Session settings tuned for tests: no focus claim, no greeting, short
/// readiness timeout.
pub fn test_settings() -> SessionSettings {
    SessionSettings {
        claim_focus: false,
        greeting_enabled: false,
        readiness_timeout: std::time::Duration::from_millis(100),
        ..Default::default()
    }
}

/// Lets driver and handler tasks run to completion.
pub async fn settle() {
    tokio::task::yield_now().await;
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
}

/// Injects one inbound protocol event into the current session.
pub async fn inject(factory: &MockFactory, payload: Value) {
    let event = parley_protocol::InboundEvent::from_value(payload).expect("payload carries type");
    factory
        .last_events()
        .send(TransportEvent::Inbound(event))
        .await
        .expect("driver is alive");
}

pub async fn inject_raw(factory: &MockFactory, event: TransportEvent) {
    factory
        .last_events()
        .send(event)
        .await
        .expect("driver is alive");
}
