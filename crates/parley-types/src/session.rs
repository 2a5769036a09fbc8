//! Session and tool-call lifecycle states.
//!
//! Both state machines are deliberately explicit enums rather than scattered
//! boolean flags: every transition is logged by the owning component and can
//! be asserted in tests.

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a voice session.
///
/// A session moves strictly forward through these phases; there are no
/// backward transitions. `Ending` is terminal and reachable from every
/// other phase (explicit end, error, or drop).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Requesting microphone access and audio focus.
    Acquiring,
    /// Exchanging credentials and session descriptions with the remote service.
    Negotiating,
    /// Connected; waiting for the session-update acknowledgement (or timeout).
    Ready,
    /// Fully interactive: audio flowing, tool calls being dispatched.
    Active,
    /// Tearing down transport and audio resources.
    Ending,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Acquiring => "acquiring",
            SessionPhase::Negotiating => "negotiating",
            SessionPhase::Ready => "ready",
            SessionPhase::Active => "active",
            SessionPhase::Ending => "ending",
        }
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dispatch state of a single tool call, keyed by call identifier.
///
/// The `unseen` state is represented by absence from the dispatcher's map;
/// once a call id is inserted it can never be dispatched again, which is
/// what makes duplicate observations across event shapes harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// A handler has been started for this call id.
    Processing,
    /// The result (success or textual error) has been produced.
    Completed,
}
