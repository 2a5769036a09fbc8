//! Remote-audio playback sink.
//!
//! A dedicated thread owns the output stream (not `Send`); the `rodio::Sink`
//! itself is thread-safe and shared directly. Rebinding the preferred output
//! device rebuilds the stream on that thread, which happens on every inbound
//! track event so a device preference applied mid-session takes effect.

use cpal::traits::{DeviceTrait, HostTrait};
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{debug, warn};

use crate::error::AudioError;

/// Playback control surface for the remote audio track.
pub trait PlaybackSink: Send + Sync {
    /// Queues decoded PCM for playback.
    fn append_pcm(&self, samples: &[i16], sample_rate: u32, channels: u16);

    /// Pauses playback immediately (barge-in path).
    fn pause(&self);

    fn resume(&self);

    /// Whether samples are queued and not paused.
    fn is_playing(&self) -> bool;

    /// Re-binds the output to the preferred device (or the default).
    fn rebind_output(&self, device: Option<&str>) -> Result<(), AudioError>;

    /// Stops playback and releases the device. Idempotent.
    fn detach(&self);
}

enum SinkCmd {
    Rebind(Option<String>, std_mpsc::Sender<Result<Arc<Sink>, String>>),
    Shutdown,
}

/// The rodio-backed sink.
///
/// The command sender lives behind a mutex: `std::sync::mpsc` senders are
/// not `Sync`, and the sink is shared as `Arc<dyn PlaybackSink>`.
pub struct RodioPlayback {
    sink: Mutex<Option<Arc<Sink>>>,
    cmd_tx: Mutex<std_mpsc::Sender<SinkCmd>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl RodioPlayback {
    pub fn new() -> Result<Self, AudioError> {
        let (cmd_tx, cmd_rx) = std_mpsc::channel::<SinkCmd>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<Arc<Sink>, String>>();

        let join = std::thread::Builder::new()
            .name("parley-playback".to_string())
            .spawn(move || playback_thread(cmd_rx, ready_tx))
            .map_err(|e| AudioError::Playback(format!("failed to spawn playback thread: {e}")))?;

        let sink = ready_rx
            .recv()
            .map_err(|_| AudioError::Playback("playback thread exited during startup".to_string()))?
            .map_err(AudioError::Playback)?;

        Ok(Self {
            sink: Mutex::new(Some(sink)),
            cmd_tx: Mutex::new(cmd_tx),
            join: Mutex::new(Some(join)),
        })
    }

    fn send_cmd(&self, cmd: SinkCmd) -> Result<(), AudioError> {
        let tx = self
            .cmd_tx
            .lock()
            .map_err(|_| AudioError::Playback("playback command lock poisoned".to_string()))?;
        tx.send(cmd)
            .map_err(|_| AudioError::Playback("playback thread is gone".to_string()))
    }

    fn with_sink<T>(&self, f: impl FnOnce(&Sink) -> T) -> Option<T> {
        match self.sink.lock() {
            Ok(guard) => guard.as_ref().map(|s| f(s)),
            Err(_) => {
                warn!("playback sink lock poisoned");
                None
            }
        }
    }
}

impl PlaybackSink for RodioPlayback {
    fn append_pcm(&self, samples: &[i16], sample_rate: u32, channels: u16) {
        self.with_sink(|sink| {
            sink.append(SamplesBuffer::new(channels, sample_rate, samples.to_vec()));
        });
    }

    fn pause(&self) {
        self.with_sink(Sink::pause);
    }

    fn resume(&self) {
        self.with_sink(Sink::play);
    }

    fn is_playing(&self) -> bool {
        self.with_sink(|sink| !sink.is_paused() && !sink.empty())
            .unwrap_or(false)
    }

    fn rebind_output(&self, device: Option<&str>) -> Result<(), AudioError> {
        let (reply_tx, reply_rx) = std_mpsc::channel();
        self.send_cmd(SinkCmd::Rebind(device.map(str::to_string), reply_tx))?;

        let sink = reply_rx
            .recv()
            .map_err(|_| AudioError::Playback("playback thread dropped rebind reply".to_string()))?
            .map_err(AudioError::Playback)?;

        match self.sink.lock() {
            Ok(mut guard) => {
                if let Some(old) = guard.replace(sink) {
                    old.stop();
                }
                Ok(())
            }
            Err(_) => Err(AudioError::Playback("playback sink lock poisoned".to_string())),
        }
    }

    fn detach(&self) {
        if let Ok(mut guard) = self.sink.lock() {
            if let Some(sink) = guard.take() {
                sink.stop();
            }
        }
        let _ = self.send_cmd(SinkCmd::Shutdown);
        if let Ok(mut join) = self.join.lock() {
            if let Some(handle) = join.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for RodioPlayback {
    fn drop(&mut self) {
        self.detach();
    }
}

fn playback_thread(
    cmd_rx: std_mpsc::Receiver<SinkCmd>,
    ready_tx: std_mpsc::Sender<Result<Arc<Sink>, String>>,
) {
    let mut current_stream = match open_output(None) {
        Ok((stream, sink)) => {
            let _ = ready_tx.send(Ok(sink));
            Some(stream)
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            SinkCmd::Rebind(device, reply_tx) => match open_output(device.as_deref()) {
                Ok((stream, sink)) => {
                    current_stream = Some(stream);
                    let _ = reply_tx.send(Ok(sink));
                }
                Err(e) => {
                    let _ = reply_tx.send(Err(e));
                }
            },
            SinkCmd::Shutdown => break,
        }
    }

    drop(current_stream);
    debug!("playback stream released");
}

fn open_output(device_name: Option<&str>) -> Result<(OutputStream, Arc<Sink>), String> {
    let (stream, handle) = match device_name {
        Some(wanted) => {
            let device = find_output_device(wanted)?;
            OutputStream::try_from_device(&device).map_err(|e| e.to_string())?
        }
        None => OutputStream::try_default().map_err(|e| e.to_string())?,
    };
    let sink = Sink::try_new(&handle).map_err(|e| e.to_string())?;
    Ok((stream, Arc::new(sink)))
}

fn find_output_device(wanted: &str) -> Result<cpal::Device, String> {
    let host = cpal::default_host();
    let devices = host.output_devices().map_err(|e| e.to_string())?;
    for device in devices {
        if device.name().map(|n| n == wanted).unwrap_or(false) {
            return Ok(device);
        }
    }
    Err(format!("output device not found: {wanted}"))
}
