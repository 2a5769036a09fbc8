//! Tool-call extraction: unifies the event shapes that can carry a
//! function-call request into one normalized record.
//!
//! The same logical call can appear in up to four places: an
//! arguments-complete event, a finalized output item, the full
//! response-done payload, and arbitrary nested shapes caught by a recursive
//! scan. Extractors are tried in priority order; each tolerates absent or
//! wrong-typed fields and returns nothing rather than failing. Exactly-once
//! execution is the dispatcher's job, not this module's: extraction is
//! intentionally happy to report the same call several times.

use serde_json::Value;

use crate::events::{kinds, InboundEvent};
use crate::manifest::ToolName;

/// A normalized tool-call request.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    /// Opaque call identifier, unique per invocation.
    pub call_id: String,
    /// The recognized function name.
    pub name: ToolName,
    /// Parsed argument object.
    pub arguments: Value,
    /// Originating response id, when the shape carries one. Best-effort.
    pub response_id: Option<String>,
}

/// Runs the extraction chain against one inbound event.
///
/// Order: arguments-done, output-item-done, response-done, recursive scan.
/// The scan is a catch-all for shapes the typed extractors do not cover and
/// only runs when they all come up empty.
pub fn extract_tool_calls(event: &InboundEvent) -> Vec<ToolCallRequest> {
    if let Some(call) = from_arguments_done(event) {
        return vec![call];
    }
    if let Some(call) = from_output_item(event) {
        return vec![call];
    }
    let from_done = from_response_done(event);
    if !from_done.is_empty() {
        return from_done;
    }
    scan_payload(&event.payload, event.response_id().map(str::to_string))
}

/// Path 1: `response.function_call_arguments.done` carrying call id, name
/// and raw arguments at the top level.
fn from_arguments_done(event: &InboundEvent) -> Option<ToolCallRequest> {
    if event.kind != kinds::FUNCTION_CALL_ARGUMENTS_DONE {
        return None;
    }
    call_from_fields(&event.payload, event.response_id().map(str::to_string))
}

/// Path 2: `response.output_item.done` whose `item` is a function call.
fn from_output_item(event: &InboundEvent) -> Option<ToolCallRequest> {
    if event.kind != kinds::RESPONSE_OUTPUT_ITEM_DONE {
        return None;
    }
    let item = event.payload.get("item")?;
    if item.get("type").and_then(Value::as_str) != Some("function_call") {
        return None;
    }
    call_from_fields(item, event.response_id().map(str::to_string))
}

/// Path 3: `response.done` whose `response.output` array may contain calls.
fn from_response_done(event: &InboundEvent) -> Vec<ToolCallRequest> {
    if event.kind != kinds::RESPONSE_DONE {
        return Vec::new();
    }
    let response_id = event.response_id().map(str::to_string);
    let Some(output) = event
        .payload
        .get("response")
        .and_then(|r| r.get("output"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    output
        .iter()
        .filter(|item| item.get("type").and_then(Value::as_str) == Some("function_call"))
        .filter_map(|item| call_from_fields(item, response_id.clone()))
        .collect()
}

/// Path 4: recursive depth-first scan over the whole payload.
///
/// Recognizes any object that looks like a function call, including the
/// legacy `id` spelling of the call identifier.
fn scan_payload(value: &Value, response_id: Option<String>) -> Vec<ToolCallRequest> {
    let mut found = Vec::new();
    scan_into(value, &response_id, &mut found);
    found
}

fn scan_into(value: &Value, response_id: &Option<String>, out: &mut Vec<ToolCallRequest>) {
    match value {
        Value::Object(map) => {
            let is_call = map.get("type").and_then(Value::as_str) == Some("function_call")
                || (call_id_of(value).is_some()
                    && map.contains_key("name")
                    && map.contains_key("arguments"));
            if is_call {
                if let Some(call) = call_from_fields(value, response_id.clone()) {
                    if !out.iter().any(|c: &ToolCallRequest| c.call_id == call.call_id) {
                        out.push(call);
                    }
                }
            }
            for child in map.values() {
                scan_into(child, response_id, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                scan_into(item, response_id, out);
            }
        }
        _ => {}
    }
}

/// Reads the call identifier, accepting the legacy `id` field name.
fn call_id_of(value: &Value) -> Option<&str> {
    value
        .get("call_id")
        .and_then(Value::as_str)
        .or_else(|| value.get("id").and_then(Value::as_str))
}

/// Builds a normalized record from an object carrying call id, name and
/// arguments. Returns `None` on any missing field, unrecognized name, or
/// unparseable argument string.
fn call_from_fields(value: &Value, response_id: Option<String>) -> Option<ToolCallRequest> {
    let call_id = call_id_of(value)?.to_string();
    let raw_name = value.get("name")?.as_str()?;
    let Some(name) = ToolName::parse(raw_name) else {
        tracing::debug!(name = raw_name, call_id = %call_id, "ignoring unrecognized function name");
        return None;
    };
    let arguments = parse_arguments(value.get("arguments")?)?;
    Some(ToolCallRequest {
        call_id,
        name,
        arguments,
        response_id,
    })
}

/// Arguments arrive either as an object or as a JSON-encoded string. A
/// string that fails to parse is an extraction failure, not a crash.
fn parse_arguments(raw: &Value) -> Option<Value> {
    match raw {
        Value::Object(_) => Some(raw.clone()),
        Value::String(s) => serde_json::from_str::<Value>(s)
            .ok()
            .filter(Value::is_object),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(payload: Value) -> InboundEvent {
        InboundEvent::from_value(payload).expect("test payload must carry a type")
    }

    // -----------------------------------------------------------------------
    // Path 1: arguments-done
    // -----------------------------------------------------------------------

    #[test]
    fn arguments_done_with_string_arguments() {
        let calls = extract_tool_calls(&event(json!({
            "type": "response.function_call_arguments.done",
            "response_id": "resp_1",
            "call_id": "call_1",
            "name": "web_search",
            "arguments": "{\"query\":\"weather\"}"
        })));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].call_id, "call_1");
        assert_eq!(calls[0].name, ToolName::WebSearch);
        assert_eq!(calls[0].arguments["query"], "weather");
        assert_eq!(calls[0].response_id.as_deref(), Some("resp_1"));
    }

    #[test]
    fn arguments_done_with_object_arguments() {
        let calls = extract_tool_calls(&event(json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_2",
            "name": "memory_write",
            "arguments": {"content": "likes tea"}
        })));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments["content"], "likes tea");
        assert_eq!(calls[0].response_id, None);
    }

    #[test]
    fn arguments_done_with_malformed_argument_string_fails_cleanly() {
        let calls = extract_tool_calls(&event(json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_3",
            "name": "web_search",
            "arguments": "{not valid json"
        })));
        assert!(calls.is_empty());
    }

    #[test]
    fn arguments_done_with_missing_name_fails_cleanly() {
        let calls = extract_tool_calls(&event(json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_4",
            "arguments": "{}"
        })));
        assert!(calls.is_empty());
    }

    // -----------------------------------------------------------------------
    // Path 2: output-item-done
    // -----------------------------------------------------------------------

    #[test]
    fn output_item_done_function_call() {
        let calls = extract_tool_calls(&event(json!({
            "type": "response.output_item.done",
            "response_id": "resp_2",
            "item": {
                "type": "function_call",
                "call_id": "call_5",
                "name": "mail_list",
                "arguments": "{\"limit\":5}"
            }
        })));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].call_id, "call_5");
        assert_eq!(calls[0].name, ToolName::MailList);
        assert_eq!(calls[0].arguments["limit"], 5);
    }

    #[test]
    fn output_item_done_ignores_non_call_items() {
        let calls = extract_tool_calls(&event(json!({
            "type": "response.output_item.done",
            "item": {"type": "message", "content": []}
        })));
        assert!(calls.is_empty());
    }

    // -----------------------------------------------------------------------
    // Path 3: response-done
    // -----------------------------------------------------------------------

    #[test]
    fn response_done_yields_every_call_in_output() {
        let calls = extract_tool_calls(&event(json!({
            "type": "response.done",
            "response": {
                "id": "resp_3",
                "output": [
                    {"type": "message", "content": []},
                    {
                        "type": "function_call",
                        "call_id": "call_6",
                        "name": "calendar_list_events",
                        "arguments": "{}"
                    },
                    {
                        "type": "function_call",
                        "call_id": "call_7",
                        "name": "memory_read",
                        "arguments": "{\"topic\":\"tea\"}"
                    }
                ]
            }
        })));
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].call_id, "call_6");
        assert_eq!(calls[1].call_id, "call_7");
        assert!(calls.iter().all(|c| c.response_id.as_deref() == Some("resp_3")));
    }

    #[test]
    fn response_done_without_output_array_is_empty() {
        let calls = extract_tool_calls(&event(json!({
            "type": "response.done",
            "response": {"id": "resp_4", "status": "completed"}
        })));
        assert!(calls.is_empty());
    }

    // -----------------------------------------------------------------------
    // Path 4: recursive scan
    // -----------------------------------------------------------------------

    #[test]
    fn scan_finds_call_in_unknown_shape() {
        let calls = extract_tool_calls(&event(json!({
            "type": "conversation.item.created",
            "item": {
                "nested": {
                    "type": "function_call",
                    "call_id": "call_8",
                    "name": "code_search",
                    "arguments": "{\"query\":\"Dispatcher\"}"
                }
            }
        })));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].call_id, "call_8");
        assert_eq!(calls[0].name, ToolName::CodeSearch);
    }

    #[test]
    fn scan_recognizes_legacy_id_field() {
        let calls = extract_tool_calls(&event(json!({
            "type": "tool.call",
            "id": "legacy_1",
            "name": "macro_lookup",
            "arguments": {"name": "handoff"}
        })));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].call_id, "legacy_1");
        assert_eq!(calls[0].name, ToolName::MacroLookup);
    }

    #[test]
    fn scan_deduplicates_repeated_ids_within_one_payload() {
        let calls = extract_tool_calls(&event(json!({
            "type": "some.event",
            "a": {"type": "function_call", "call_id": "dup", "name": "mail_read",
                  "arguments": "{\"message_id\":\"m1\"}"},
            "b": {"type": "function_call", "call_id": "dup", "name": "mail_read",
                  "arguments": "{\"message_id\":\"m1\"}"}
        })));
        assert_eq!(calls.len(), 1);
    }

    #[test]
    fn scan_ignores_unrecognized_function_names() {
        let calls = extract_tool_calls(&event(json!({
            "type": "some.event",
            "call": {"type": "function_call", "call_id": "x", "name": "format_disk",
                     "arguments": "{}"}
        })));
        assert!(calls.is_empty());
    }

    #[test]
    fn scan_tolerates_wrong_typed_fields() {
        let calls = extract_tool_calls(&event(json!({
            "type": "some.event",
            "call": {"type": "function_call", "call_id": 42, "name": ["web_search"],
                     "arguments": 3.14}
        })));
        assert!(calls.is_empty());
    }

    #[test]
    fn typed_paths_win_over_scan() {
        // An arguments-done event also matches the scan heuristics; the
        // typed extractor must claim it first so response_id is attached.
        let calls = extract_tool_calls(&event(json!({
            "type": "response.function_call_arguments.done",
            "response_id": "resp_5",
            "call_id": "call_9",
            "name": "web_search",
            "arguments": "{\"query\":\"tides\"}"
        })));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].response_id.as_deref(), Some("resp_5"));
    }
}
