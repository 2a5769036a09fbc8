//! Best-effort audio focus claim.
//!
//! Some platforms only yield audio focus to a source that is actually
//! playing, not to a raw capture graph. The claim therefore keeps a looped
//! near-silent tone on the output device for the lifetime of the session,
//! alongside a voice-chat session hint where the platform supports one.
//! Every step here is non-fatal: a session runs fine without focus, it just
//! competes with other audio sources.

use rodio::source::SineWave;
use rodio::{OutputStream, Sink, Source};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Amplitude of the keepalive tone. Inaudible but nonzero, so platforms
/// that gate focus on "is producing samples" count it as playing.
const KEEPALIVE_AMPLITUDE: f32 = 0.0004;

/// Frequency of the keepalive tone in Hz.
const KEEPALIVE_FREQ: f32 = 220.0;

/// Session-scoped audio focus. Dropping the claim releases it.
pub struct FocusClaim {
    stop_tx: Option<std_mpsc::Sender<()>>,
    join: Option<JoinHandle<()>>,
    /// Whether the keepalive loop actually started.
    pub keepalive_active: bool,
}

impl FocusClaim {
    /// Claims audio focus: applies the platform voice-chat hint, publishes
    /// session metadata where supported, and starts the keepalive loop.
    /// Never fails; individual steps log on failure.
    pub fn claim(session_label: &str) -> FocusClaim {
        apply_voice_chat_hint();
        publish_media_metadata(session_label);

        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (ready_tx, ready_rx) = std_mpsc::channel::<bool>();

        let join = std::thread::Builder::new()
            .name("parley-focus".to_string())
            .spawn(move || keepalive_thread(ready_tx, stop_rx))
            .ok();

        let keepalive_active = match (&join, ready_rx.recv()) {
            (Some(_), Ok(true)) => true,
            _ => {
                warn!("audio focus keepalive did not start; continuing without focus");
                false
            }
        };

        FocusClaim {
            stop_tx: Some(stop_tx),
            join,
            keepalive_active,
        }
    }

    /// Releases the claim. Idempotent; also runs on drop.
    pub fn release(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
        self.keepalive_active = false;
    }
}

impl Drop for FocusClaim {
    fn drop(&mut self) {
        self.release();
    }
}

fn keepalive_thread(ready_tx: std_mpsc::Sender<bool>, stop_rx: std_mpsc::Receiver<()>) {
    let Ok((_stream, handle)) = OutputStream::try_default() else {
        let _ = ready_tx.send(false);
        return;
    };
    let Ok(sink) = Sink::try_new(&handle) else {
        let _ = ready_tx.send(false);
        return;
    };

    sink.append(SineWave::new(KEEPALIVE_FREQ).amplify(KEEPALIVE_AMPLITUDE));
    sink.play();
    let _ = ready_tx.send(true);
    debug!("audio focus keepalive running");

    // Hold the stream and sink until released.
    let _ = stop_rx.recv();
    sink.stop();
    debug!("audio focus released");
}

/// Platform audio-session hint. No desktop backend currently exposes a
/// voice-chat mode through cpal, so this records the attempt and moves on.
fn apply_voice_chat_hint() {
    debug!("voice-chat audio session hint not supported on this platform");
}

/// OS media-UI metadata and transport controls. Same situation as the
/// session hint: recorded, not fatal.
fn publish_media_metadata(session_label: &str) {
    debug!(label = session_label, "media-session metadata not supported on this platform");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_is_idempotent() {
        // On machines without an output device the keepalive fails to start;
        // the claim must still construct and release cleanly.
        let mut claim = FocusClaim::claim("test-session");
        claim.release();
        claim.release();
        assert!(!claim.keepalive_active);
    }
}
