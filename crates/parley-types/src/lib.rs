//! Shared types for the Parley voice-session orchestrator.
//!
//! This crate holds the small, dependency-light contracts the rest of the
//! workspace agrees on: session lifecycle phases, per-call dispatch states,
//! conversation turns and the transcript persistence contract.

pub mod session;
pub mod transcript;

pub use session::{CallState, SessionPhase};
pub use transcript::{ConversationTurn, StoreError, TranscriptStore, TurnRole};
