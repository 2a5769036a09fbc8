//! Turn-taking: barge-in detection and spoken stop intent.
//!
//! The assistant-speaking flag is fed from two sources, protocol
//! audio-buffer lifecycle events and playback activity on the local sink,
//! because either can arrive without the other depending on platform
//! autoplay behavior. Both call [`TurnTakingController::set_assistant_speaking`].
//!
//! Stop intent is matched only against user-sourced transcripts. Assistant
//! text is never scanned; an assistant uttering "stop" must not end its own
//! session.

use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use crate::error::SessionError;

/// Default stop phrases. Overridable per session.
pub const DEFAULT_STOP_PATTERN: &str =
    r"(?i)\b(stop|end)\s+(the\s+)?(session|call|conversation)\b|\bgoodbye\b";

pub struct TurnTakingController {
    barge_in_enabled: bool,
    assistant_speaking: AtomicBool,
    stop_re: Regex,
}

impl TurnTakingController {
    pub fn new(barge_in_enabled: bool, stop_pattern: &str) -> Result<Self, SessionError> {
        Ok(Self {
            barge_in_enabled,
            assistant_speaking: AtomicBool::new(false),
            stop_re: Regex::new(stop_pattern)?,
        })
    }

    pub fn set_assistant_speaking(&self, speaking: bool) {
        let was = self.assistant_speaking.swap(speaking, Ordering::SeqCst);
        if was != speaking {
            debug!(speaking, "assistant speaking state changed");
        }
    }

    pub fn assistant_speaking(&self) -> bool {
        self.assistant_speaking.load(Ordering::SeqCst)
    }

    /// Whether a user-speech-started event should cancel the in-flight
    /// response right now.
    pub fn should_barge_in(&self) -> bool {
        self.barge_in_enabled && self.assistant_speaking()
    }

    /// Matches a user transcript against the stop phrases. Returns the
    /// matched text when the session should terminate.
    pub fn match_stop_intent<'a>(&self, user_text: &'a str) -> Option<&'a str> {
        self.stop_re.find(user_text).map(|m| m.as_str())
    }
}
