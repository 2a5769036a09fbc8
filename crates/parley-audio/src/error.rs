use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("no input device available")]
    NoInputDevice,

    #[error("input device not found: {0}")]
    InputDeviceNotFound(String),

    #[error("capture stream error: {0}")]
    Capture(String),

    #[error("playback error: {0}")]
    Playback(String),
}
