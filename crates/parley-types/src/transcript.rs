//! Conversation turns and the transcript persistence contract.
//!
//! The transcript store is an external collaborator; the recorder treats it
//! as an opaque async service. Both implementations (in-memory for tests and
//! the HTTP-backed store in `parley-tools`) satisfy the same trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which side of the conversation produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One finalized conversational turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// Errors from a transcript store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transcript service error: {0}")]
    Service(String),

    #[error("no such conversation record: {0}")]
    NotFound(String),
}

/// Append-only persistence for conversation records.
///
/// Callers treat every operation as best-effort: failures are logged and
/// absorbed, never surfaced to the user and never allowed to block the
/// protocol.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Creates a new conversation record and returns its identifier.
    async fn create_record(&self) -> Result<String, StoreError>;

    /// Appends one turn to an existing record.
    async fn append_turn(&self, record_id: &str, turn: ConversationTurn) -> Result<(), StoreError>;
}
