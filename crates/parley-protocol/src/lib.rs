//! Event-channel protocol for the Parley voice-session orchestrator.
//!
//! The event channel is a side-band data transport multiplexed over the same
//! peer connection as the audio media. It carries JSON text frames in both
//! directions: structured [`ClientEvent`]s outbound, and loosely-shaped
//! server events inbound.
//!
//! The remote service emits several structurally different representations
//! of the same logical tool-call event, so extraction runs as an ordered
//! chain of typed extractors (see [`extract`]) instead of trusting any
//! single shape, and malformed frames are dropped rather than failing the
//! session.
//!
//! # Core pieces
//!
//! - [`ClientEvent`] — tagged outbound events (session update, response
//!   create/cancel, function-result items)
//! - [`InboundEvent`] — lenient envelope over inbound frames
//! - [`extract::extract_tool_calls`] — the four-path extraction chain
//! - [`ToolName`] / [`manifest`] — the closed function set and its manifest
//! - [`EventChannel`] — the transport seam the orchestrator sends through

pub mod channel;
pub mod events;
pub mod extract;
pub mod manifest;

pub use channel::{ChannelError, EventChannel};
pub use events::{
    kinds, ClientEvent, ConversationItem, InboundEvent, ResponseOptions, SessionUpdate,
    TranscriptionConfig,
};
pub use extract::{extract_tool_calls, ToolCallRequest};
pub use manifest::{manifest, ToolName, ToolSpec};
