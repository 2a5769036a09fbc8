use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    /// Another session start is in flight. The caller may retry once it
    /// completes or fails; the lock is released on every exit path.
    #[error("a session start is already in progress")]
    StartInProgress,

    /// Microphone acquisition failed. Fatal for this start; user-visible.
    #[error("microphone acquisition failed: {0}")]
    Acquisition(#[from] parley_audio::AudioError),

    /// Transport negotiation failed after full rollback. Retry permitted.
    #[error("transport negotiation failed: {0}")]
    Negotiation(#[from] parley_transport::TransportError),

    /// The configured stop-intent pattern is not a valid regex.
    #[error("invalid stop-intent pattern: {0}")]
    StopPattern(#[from] regex::Error),
}
