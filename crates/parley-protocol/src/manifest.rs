//! The closed set of callable functions and the manifest sent to the remote
//! service.
//!
//! The manifest and the dispatcher's handler set must stay in lock-step: a
//! function advertised without a handler silently never completes, which
//! stalls the conversation. Both sides are generated from [`ToolName::ALL`],
//! and `parley-tools` carries a test asserting the correspondence.

use serde::Serialize;
use serde_json::{json, Value};

/// Every function the remote model may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    MemoryRead,
    MemoryWrite,
    MacroLookup,
    WebSearch,
    ConversationSearch,
    CodeSearch,
    CalendarListEvents,
    CalendarCreateEvent,
    CalendarUpdateEvent,
    CalendarDeleteEvent,
    MailList,
    MailRead,
}

impl ToolName {
    /// All functions, in manifest order.
    pub const ALL: &'static [ToolName] = &[
        ToolName::MemoryRead,
        ToolName::MemoryWrite,
        ToolName::MacroLookup,
        ToolName::WebSearch,
        ToolName::ConversationSearch,
        ToolName::CodeSearch,
        ToolName::CalendarListEvents,
        ToolName::CalendarCreateEvent,
        ToolName::CalendarUpdateEvent,
        ToolName::CalendarDeleteEvent,
        ToolName::MailList,
        ToolName::MailRead,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::MemoryRead => "memory_read",
            ToolName::MemoryWrite => "memory_write",
            ToolName::MacroLookup => "macro_lookup",
            ToolName::WebSearch => "web_search",
            ToolName::ConversationSearch => "conversation_search",
            ToolName::CodeSearch => "code_search",
            ToolName::CalendarListEvents => "calendar_list_events",
            ToolName::CalendarCreateEvent => "calendar_create_event",
            ToolName::CalendarUpdateEvent => "calendar_update_event",
            ToolName::CalendarDeleteEvent => "calendar_delete_event",
            ToolName::MailList => "mail_list",
            ToolName::MailRead => "mail_read",
        }
    }

    /// Parses a wire function name. Unrecognized names yield `None` and are
    /// ignored upstream.
    pub fn parse(name: &str) -> Option<ToolName> {
        ToolName::ALL.iter().copied().find(|t| t.as_str() == name)
    }

    /// Whether this function is a multi-second operation for which an
    /// in-flight placeholder is recorded when its arguments finalize.
    pub fn is_slow(&self) -> bool {
        matches!(self, ToolName::WebSearch)
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One manifest entry: a named function with a JSON-schema-style parameter
/// description.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

fn spec(name: ToolName) -> ToolSpec {
    let (description, parameters) = match name {
        ToolName::MemoryRead => (
            "Read stored long-term memory entries, optionally filtered by topic.",
            json!({
                "type": "object",
                "properties": {
                    "topic": {"type": "string", "description": "Optional topic filter"}
                }
            }),
        ),
        ToolName::MemoryWrite => (
            "Store a fact or preference in long-term memory.",
            json!({
                "type": "object",
                "properties": {
                    "content": {"type": "string", "description": "The fact to remember"}
                },
                "required": ["content"]
            }),
        ),
        ToolName::MacroLookup => (
            "Look up a canned protocol or macro text by name.",
            json!({
                "type": "object",
                "properties": {
                    "name": {"type": "string", "description": "Macro name"}
                },
                "required": ["name"]
            }),
        ),
        ToolName::WebSearch => (
            "Search the web. Slow; results take several seconds.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query"}
                },
                "required": ["query"]
            }),
        ),
        ToolName::ConversationSearch => (
            "Search past conversation transcripts.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query"}
                },
                "required": ["query"]
            }),
        ),
        ToolName::CodeSearch => (
            "Search the source repository for symbols or text.",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query"}
                },
                "required": ["query"]
            }),
        ),
        ToolName::CalendarListEvents => (
            "List calendar events in a date range.",
            json!({
                "type": "object",
                "properties": {
                    "start": {"type": "string", "description": "Range start (RFC 3339)"},
                    "end": {"type": "string", "description": "Range end (RFC 3339)"}
                }
            }),
        ),
        ToolName::CalendarCreateEvent => (
            "Create a calendar event.",
            json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "start": {"type": "string", "description": "Start time (RFC 3339)"},
                    "end": {"type": "string", "description": "End time (RFC 3339)"}
                },
                "required": ["title", "start"]
            }),
        ),
        ToolName::CalendarUpdateEvent => (
            "Update an existing calendar event.",
            json!({
                "type": "object",
                "properties": {
                    "event_id": {"type": "string"},
                    "title": {"type": "string"},
                    "start": {"type": "string"},
                    "end": {"type": "string"}
                },
                "required": ["event_id"]
            }),
        ),
        ToolName::CalendarDeleteEvent => (
            "Delete a calendar event.",
            json!({
                "type": "object",
                "properties": {
                    "event_id": {"type": "string"}
                },
                "required": ["event_id"]
            }),
        ),
        ToolName::MailList => (
            "List recent mail messages.",
            json!({
                "type": "object",
                "properties": {
                    "limit": {"type": "integer", "description": "Max messages to list"}
                }
            }),
        ),
        ToolName::MailRead => (
            "Read one mail message by id.",
            json!({
                "type": "object",
                "properties": {
                    "message_id": {"type": "string"}
                },
                "required": ["message_id"]
            }),
        ),
    };

    ToolSpec {
        kind: "function",
        name: name.as_str(),
        description,
        parameters,
    }
}

/// The full tool manifest, in [`ToolName::ALL`] order.
pub fn manifest() -> Vec<ToolSpec> {
    ToolName::ALL.iter().copied().map(spec).collect()
}
