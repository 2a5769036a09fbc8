//! Audio capture, focus claim and playback for the Parley orchestrator.
//!
//! Capture and playback run on dedicated threads because the underlying
//! platform streams are not `Send`; the rest of the workspace talks to them
//! through `Send + Sync` handles and channels. Microphone acquisition
//! failure is fatal to session start; every audio-focus step is best-effort
//! and merely logged.

pub mod capture;
pub mod error;
pub mod focus;
pub mod playback;

pub use capture::{CpalMicrophone, MicCapture, MicConstraints, Microphone};
pub use error::AudioError;
pub use focus::FocusClaim;
pub use playback::{PlaybackSink, RodioPlayback};
