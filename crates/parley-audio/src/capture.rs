//! Microphone acquisition and capture.
//!
//! The cpal input stream is not `Send`, so a dedicated thread owns it
//! (stream construction and teardown both happen there) and forwards
//! fixed-size PCM chunks over an mpsc channel. The handle returned to the
//! caller is `Send` and its `stop()` is idempotent: teardown runs from
//! multiple exit paths.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::AudioError;

/// Default capture sample rate when voice-optimized mode is on.
pub const DEFAULT_VOICE_SAMPLE_RATE: u32 = 24_000;

/// Floor below which a requested sample rate is clamped.
pub const MIN_SAMPLE_RATE: u32 = 8_000;

/// Samples per forwarded chunk (20 ms at 24 kHz).
const CHUNK_SAMPLES: usize = 480;

/// Negotiable constraints for microphone acquisition.
///
/// The processing hints (echo cancellation, noise suppression, auto gain)
/// are "ideal on": platforms that cannot honor them still yield a usable
/// stream, and the unhonored hints are logged.
#[derive(Debug, Clone)]
pub struct MicConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain: bool,
    /// Mono channel + target sample rate when enabled.
    pub voice_optimized: bool,
    /// Target sample rate in Hz; clamped to [`MIN_SAMPLE_RATE`].
    pub sample_rate: u32,
    /// Exact input device name, or `None` for the platform default.
    pub input_device: Option<String>,
}

impl Default for MicConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain: true,
            voice_optimized: true,
            sample_rate: DEFAULT_VOICE_SAMPLE_RATE,
            input_device: None,
        }
    }
}

impl MicConstraints {
    /// The effective capture rate after clamping.
    pub fn effective_sample_rate(&self) -> u32 {
        self.sample_rate.max(MIN_SAMPLE_RATE)
    }
}

/// A running capture. Dropping it also stops the stream.
pub trait MicCapture: Send {
    /// Stops capture and releases the device. Idempotent.
    fn stop(&mut self);

    fn is_stopped(&self) -> bool;
}

/// Acquires microphone input.
pub trait Microphone: Send + Sync {
    /// Opens a capture stream and forwards PCM chunks (i16, interleaved)
    /// into `chunks`. Failure is fatal to session start.
    fn acquire(
        &self,
        constraints: &MicConstraints,
        chunks: mpsc::Sender<Vec<i16>>,
    ) -> Result<Box<dyn MicCapture>, AudioError>;
}

/// The cpal-backed microphone.
#[derive(Debug, Default)]
pub struct CpalMicrophone;

impl Microphone for CpalMicrophone {
    fn acquire(
        &self,
        constraints: &MicConstraints,
        chunks: mpsc::Sender<Vec<i16>>,
    ) -> Result<Box<dyn MicCapture>, AudioError> {
        if !constraints.echo_cancellation || !constraints.noise_suppression || !constraints.auto_gain
        {
            debug!(
                echo_cancellation = constraints.echo_cancellation,
                noise_suppression = constraints.noise_suppression,
                auto_gain = constraints.auto_gain,
                "non-default processing hints requested"
            );
        }

        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), AudioError>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let constraints = constraints.clone();

        let join = std::thread::Builder::new()
            .name("parley-capture".to_string())
            .spawn(move || capture_thread(constraints, chunks, ready_tx, stop_rx))
            .map_err(|e| AudioError::Capture(format!("failed to spawn capture thread: {e}")))?;

        // Wait for the thread to report stream construction success/failure.
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(CpalCapture {
                stop_tx: Some(stop_tx),
                join: Some(join),
            })),
            Ok(Err(e)) => {
                let _ = join.join();
                Err(e)
            }
            Err(_) => {
                let _ = join.join();
                Err(AudioError::Capture(
                    "capture thread exited before reporting readiness".to_string(),
                ))
            }
        }
    }
}

fn capture_thread(
    constraints: MicConstraints,
    chunks: mpsc::Sender<Vec<i16>>,
    ready_tx: std_mpsc::Sender<Result<(), AudioError>>,
    stop_rx: std_mpsc::Receiver<()>,
) {
    let device = match select_input_device(constraints.input_device.as_deref()) {
        Ok(d) => d,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    info!(
        device = %device.name().unwrap_or_else(|_| "<unknown>".to_string()),
        "acquired input device"
    );

    let config = match stream_config(&device, &constraints) {
        Ok(c) => c,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let mut pending: Vec<i16> = Vec::with_capacity(CHUNK_SAMPLES);
    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            for &sample in data {
                let clamped = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                pending.push(clamped);
                if pending.len() >= CHUNK_SAMPLES {
                    let chunk = std::mem::replace(&mut pending, Vec::with_capacity(CHUNK_SAMPLES));
                    if chunks.try_send(chunk).is_err() {
                        // Consumer is behind; dropping is preferable to
                        // blocking the audio callback.
                        debug!("dropping capture chunk for slow consumer");
                    }
                }
            }
        },
        |err| warn!("capture stream error: {err}"),
        None,
    );

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(AudioError::Capture(e.to_string())));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(AudioError::Capture(e.to_string())));
        return;
    }

    let _ = ready_tx.send(Ok(()));

    // Keep the stream alive until stop is signaled or the handle is dropped.
    let _ = stop_rx.recv();
    drop(stream);
    debug!("capture stream released");
}

fn select_input_device(name: Option<&str>) -> Result<cpal::Device, AudioError> {
    let host = cpal::default_host();
    match name {
        Some(wanted) => {
            let devices = host
                .input_devices()
                .map_err(|e| AudioError::Capture(e.to_string()))?;
            for device in devices {
                if device.name().map(|n| n == wanted).unwrap_or(false) {
                    return Ok(device);
                }
            }
            Err(AudioError::InputDeviceNotFound(wanted.to_string()))
        }
        None => host.default_input_device().ok_or(AudioError::NoInputDevice),
    }
}

fn stream_config(
    device: &cpal::Device,
    constraints: &MicConstraints,
) -> Result<StreamConfig, AudioError> {
    if constraints.voice_optimized {
        Ok(StreamConfig {
            channels: 1,
            sample_rate: SampleRate(constraints.effective_sample_rate()),
            buffer_size: cpal::BufferSize::Default,
        })
    } else {
        let default = device
            .default_input_config()
            .map_err(|e| AudioError::Capture(e.to_string()))?;
        Ok(default.config())
    }
}

struct CpalCapture {
    stop_tx: Option<std_mpsc::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl MicCapture for CpalCapture {
    fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }

    fn is_stopped(&self) -> bool {
        self.stop_tx.is_none()
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
