//! Tool handlers for the Parley voice-session orchestrator.
//!
//! Every callable function the remote model can invoke resolves to exactly
//! one handler here. Handlers are thin request/response HTTP wrappers: they
//! parse the argument object, call one external service, and render a
//! human-readable text result. The dispatcher treats each as an opaque
//! async function returning text or an error.
//!
//! The registry is built from the same [`parley_protocol::ToolName`] list
//! the manifest is generated from, so the advertised function set and the
//! handler set cannot drift apart.

pub mod calendar;
pub mod error;
pub mod handler;
pub mod macros;
pub mod mail;
pub mod memory;
pub mod registry;
pub mod search;
pub mod transcripts;

pub use error::ToolError;
pub use handler::{ServiceClient, ToolHandler};
pub use registry::{ServiceEndpoints, ToolRegistry};
pub use transcripts::HttpTranscriptStore;
