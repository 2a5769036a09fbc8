//! The Parley session core: a single-client, single-session state machine
//! driving a realtime voice conversation.
//!
//! One [`SessionManager`] owns the process-wide arbitration (start lock,
//! session sequence, current-transport slot) and builds sessions from
//! injected components: a microphone, a playback sink, a transport factory,
//! tool handlers and a transcript store. Everything below those seams is
//! mockable, which is how the exactly-once and ordering properties in
//! `tests/` are asserted without a network or audio hardware.
//!
//! # Event flow
//!
//! The transport pumps [`parley_transport::TransportEvent`]s into a driver
//! task that routes each event in a fixed order: readiness gating, then
//! turn-taking (barge-in first, always), then stop-intent, then transcript
//! recording, then tool-call dispatch. Tool handlers run as spawned tasks;
//! the dispatcher's processed-call map is what keeps duplicate observations
//! of the same call harmless.

pub mod arbiter;
pub mod dispatch;
pub mod error;
pub mod instructions;
pub mod notices;
pub mod readiness;
pub mod session;
pub mod transcript;
pub mod turns;

pub use arbiter::{SessionArbiter, StartPermit};
pub use dispatch::{HandlerMap, ToolCallDispatcher};
pub use error::SessionError;
pub use instructions::InstructionSources;
pub use notices::SessionNotice;
pub use session::{MemoryTranscriptStore, SessionHandle, SessionManager, SessionSettings};
pub use turns::TurnTakingController;
