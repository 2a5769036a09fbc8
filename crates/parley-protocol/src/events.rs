//! Outbound and inbound event shapes for the event channel.
//!
//! Outbound events are a closed, typed set serialized with a `type` tag.
//! Inbound events keep the raw payload alongside the extracted `type`
//! string: the server's event vocabulary evolves faster than ours, and the
//! orchestrator must ignore shapes it does not recognize rather than reject
//! the frame.

use serde::Serialize;
use serde_json::Value;

use crate::manifest::ToolSpec;

/// Wire names for the inbound event kinds the orchestrator reacts to.
pub mod kinds {
    pub const SESSION_CREATED: &str = "session.created";
    pub const SESSION_UPDATED: &str = "session.updated";
    pub const INPUT_TRANSCRIPTION_COMPLETED: &str =
        "conversation.item.input_audio_transcription.completed";
    pub const RESPONSE_TRANSCRIPT_DELTA: &str = "response.audio_transcript.delta";
    pub const RESPONSE_TRANSCRIPT_DONE: &str = "response.audio_transcript.done";
    pub const RESPONSE_CREATED: &str = "response.created";
    pub const RESPONSE_OUTPUT_ITEM_ADDED: &str = "response.output_item.added";
    pub const RESPONSE_OUTPUT_ITEM_DONE: &str = "response.output_item.done";
    pub const RESPONSE_DONE: &str = "response.done";
    pub const FUNCTION_CALL_ARGUMENTS_DONE: &str = "response.function_call_arguments.done";
    pub const OUTPUT_AUDIO_STARTED: &str = "output_audio_buffer.started";
    pub const OUTPUT_AUDIO_STOPPED: &str = "output_audio_buffer.stopped";
    pub const SPEECH_STARTED: &str = "input_audio_buffer.speech_started";
    pub const SPEECH_COMMITTED: &str = "input_audio_buffer.committed";
    pub const ERROR: &str = "error";
}

/// Session-level fields carried by a `session.update` event.
///
/// All fields are optional on the wire; a voice-change update carries only
/// the `voice` field while the readiness update carries everything.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<TranscriptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
}

/// Directive telling the remote service to transcribe inbound user audio.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionConfig {
    pub model: String,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: "whisper-1".to_string(),
        }
    }
}

/// Override options for a synthetic `response.create`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResponseOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// A conversation item created by the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    /// The textual result of a completed tool call.
    FunctionCallOutput { call_id: String, output: String },
}

/// Outbound protocol events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Updates session instructions, tool manifest, transcription config
    /// and/or voice. Also used for the voice-change operation.
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionUpdate },

    /// Requests generation of a new response, optionally with override
    /// instructions (used for the greeting's identity priming).
    #[serde(rename = "response.create")]
    ResponseCreate {
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<ResponseOptions>,
    },

    /// Cancels the in-flight response. Fire-and-forget.
    #[serde(rename = "response.cancel")]
    ResponseCancel,

    /// Creates a conversation item (function-call result).
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
}

impl ClientEvent {
    /// Convenience constructor for a voice-change update.
    pub fn voice_change(voice: impl Into<String>) -> Self {
        ClientEvent::SessionUpdate {
            session: SessionUpdate {
                voice: Some(voice.into()),
                ..Default::default()
            },
        }
    }

    /// Convenience constructor for a function-result item.
    pub fn function_result(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: call_id.into(),
                output: output.into(),
            },
        }
    }
}

/// An inbound event: the extracted `type` string plus the raw payload.
///
/// The payload is kept whole so the tool-call extraction chain can run its
/// recursive catch-all scan over shapes the typed accessors do not cover.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub kind: String,
    pub payload: Value,
}

impl InboundEvent {
    /// Parses a text frame. Returns `None` (never an error) for frames that
    /// are not JSON objects or carry no string `type` field.
    pub fn parse(text: &str) -> Option<Self> {
        let payload: Value = serde_json::from_str(text).ok()?;
        let kind = payload.get("type")?.as_str()?.to_string();
        Some(Self { kind, payload })
    }

    /// Builds an event directly from a payload value (tests, replay).
    pub fn from_value(payload: Value) -> Option<Self> {
        let kind = payload.get("type")?.as_str()?.to_string();
        Some(Self { kind, payload })
    }

    /// The `transcript` field of a finalized input transcription.
    pub fn input_transcript(&self) -> Option<&str> {
        self.payload.get("transcript").and_then(Value::as_str)
    }

    /// The `delta` (or `text`) fragment of a streamed assistant transcript.
    pub fn transcript_delta(&self) -> Option<&str> {
        self.payload
            .get("delta")
            .and_then(Value::as_str)
            .or_else(|| self.payload.get("text").and_then(Value::as_str))
    }

    /// The finalized `transcript` of an assistant transcript-done event.
    pub fn transcript_done(&self) -> Option<&str> {
        self.payload.get("transcript").and_then(Value::as_str)
    }

    /// The response identifier this event belongs to, if any.
    pub fn response_id(&self) -> Option<&str> {
        self.payload
            .get("response_id")
            .and_then(Value::as_str)
            .or_else(|| {
                self.payload
                    .get("response")
                    .and_then(|r| r.get("id"))
                    .and_then(Value::as_str)
            })
    }
}
