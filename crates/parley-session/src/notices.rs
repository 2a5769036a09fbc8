//! Session notices: the observable surface a UI subscribes to.

use parley_types::SessionPhase;

/// Broadcast to observers as the session progresses. Consumers that lag
/// simply miss notices; nothing in the protocol path depends on delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    PhaseChanged(SessionPhase),
    /// The readiness gate opened, either by acknowledgement or by timeout.
    Ready { via_ack: bool },
    /// Assistant speech was cancelled because the user spoke over it.
    BargeIn,
    /// A slow search is in flight for this call id. Recorded at most once
    /// per call; carries no payload beyond the id.
    SearchInProgress { call_id: String },
    /// A spoken stop intent ended the session.
    StopIntent { matched: String },
    Error(String),
    Ended,
}
