//! The tool-call dispatcher.
//!
//! Per call identifier the state machine is `unseen → processing →
//! completed`, where `unseen` is absence from the call map. The
//! `unseen → processing` transition is a synchronous check-then-insert
//! under one lock with no intervening await, which closes the race between
//! the four observation paths that can all report the same call.
//!
//! Completion contract, uniform across handlers: produce text (handler
//! errors become error text; a tool call is never left unanswered), send a
//! function-result item referencing the call id, then unconditionally
//! request response generation; the remote model will not keep speaking
//! after a tool call unless told to. Results computed while the channel is
//! closed are stashed and flushed exactly once when a later event proves
//! the channel usable.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex as StdMutex;
use std::sync::{Arc, PoisonError};

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use parley_protocol::{
    extract_tool_calls, kinds, ClientEvent, EventChannel, InboundEvent, ToolCallRequest, ToolName,
    ToolSpec,
};
use parley_tools::{ToolHandler, ToolRegistry};
use parley_types::CallState;

use crate::notices::SessionNotice;

/// Handler lookup seam. [`ToolRegistry`] is the production implementation;
/// tests use counting mocks.
pub trait HandlerMap: Send + Sync {
    fn handler(&self, name: ToolName) -> Option<Arc<dyn ToolHandler>>;
    fn manifest(&self) -> Vec<ToolSpec>;
}

impl HandlerMap for ToolRegistry {
    fn handler(&self, name: ToolName) -> Option<Arc<dyn ToolHandler>> {
        ToolRegistry::handler(self, name)
    }

    fn manifest(&self) -> Vec<ToolSpec> {
        ToolRegistry::manifest(self)
    }
}

pub struct ToolCallDispatcher {
    handlers: Arc<dyn HandlerMap>,
    channel: Arc<dyn EventChannel>,
    /// Processed call ids. Monotonic: entries are never removed during a
    /// session, which is what makes duplicate observations harmless.
    calls: StdMutex<HashMap<String, CallState>>,
    /// Results awaiting delivery, keyed by call id.
    pending: StdMutex<HashMap<String, String>>,
    /// Call ids for which a search-in-progress marker was recorded.
    placeholders: StdMutex<HashSet<String>>,
    notices: broadcast::Sender<SessionNotice>,
}

impl ToolCallDispatcher {
    pub fn new(
        handlers: Arc<dyn HandlerMap>,
        channel: Arc<dyn EventChannel>,
        notices: broadcast::Sender<SessionNotice>,
    ) -> Self {
        Self {
            handlers,
            channel,
            calls: StdMutex::new(HashMap::new()),
            pending: StdMutex::new(HashMap::new()),
            placeholders: StdMutex::new(HashSet::new()),
            notices,
        }
    }

    /// Feeds one inbound event through the extraction chain and starts a
    /// handler for every call not seen before.
    pub fn observe(self: &Arc<Self>, event: &InboundEvent) {
        for call in extract_tool_calls(event) {
            if call.name.is_slow() && event.kind == kinds::FUNCTION_CALL_ARGUMENTS_DONE {
                // Argument finalization is the in-flight signal for slow
                // operations; it is distinct from completion and no interim
                // result is ever sent on the wire.
                self.mark_placeholder(&call.call_id);
            }
            self.begin(call);
        }
    }

    /// The `unseen → processing` transition. Check-then-insert happens
    /// synchronously under the lock; the handler itself runs spawned.
    fn begin(self: &Arc<Self>, call: ToolCallRequest) {
        {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            if calls.contains_key(&call.call_id) {
                debug!(call_id = %call.call_id, "duplicate call observation suppressed");
                return;
            }
            calls.insert(call.call_id.clone(), CallState::Processing);
        }
        info!(call_id = %call.call_id, name = %call.name, "tool call: unseen -> processing");

        let dispatcher = Arc::clone(self);
        tokio::spawn(async move {
            dispatcher.run_call(call).await;
        });
    }

    async fn run_call(self: Arc<Self>, call: ToolCallRequest) {
        let output = match self.handlers.handler(call.name) {
            Some(handler) => match handler.call(&call.arguments).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(call_id = %call.call_id, name = %call.name, error = %e, "tool handler failed");
                    format!("The {} tool failed: {e}", call.name)
                }
            },
            None => {
                warn!(name = %call.name, "no handler registered for manifest function");
                format!("The {} tool is not available.", call.name)
            }
        };

        {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            calls.insert(call.call_id.clone(), CallState::Completed);
        }
        info!(call_id = %call.call_id, "tool call: processing -> completed");

        self.deliver(call.call_id, output).await;
    }

    /// Sends one result through the completion contract, or stashes it when
    /// the channel cannot take it yet.
    async fn deliver(&self, call_id: String, output: String) {
        if !self.channel.is_open() {
            self.stash(call_id, output);
            return;
        }

        match self
            .channel
            .send(&ClientEvent::function_result(call_id.as_str(), output.as_str()))
            .await
        {
            Ok(()) => {
                debug!(call_id = %call_id, "tool result delivered");
                if let Err(e) = self
                    .channel
                    .send(&ClientEvent::ResponseCreate { response: None })
                    .await
                {
                    warn!(call_id = %call_id, error = %e, "response creation after tool result failed");
                }
            }
            Err(e) => {
                debug!(call_id = %call_id, error = %e, "channel refused tool result, stashing");
                self.stash(call_id, output);
            }
        }
    }

    fn stash(&self, call_id: String, output: String) {
        debug!(call_id = %call_id, "stashing tool result until the channel can take it");
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(call_id, output);
    }

    fn take_pending(&self, call_id: &str) -> Option<String> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(call_id)
    }

    /// Flushes everything pending. Called when the channel opens.
    pub async fn flush_open(&self) {
        let drained: Vec<(String, String)> = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.drain().collect()
        };
        for (call_id, output) in drained {
            self.deliver(call_id, output).await;
        }
    }

    /// Flushes pending results whose call ids this event mentions (the
    /// "response now contains this call" observation points).
    pub async fn flush_for_event(&self, event: &InboundEvent) {
        if !self.channel.is_open() {
            return;
        }
        for call_id in mentioned_call_ids(&event.payload) {
            if let Some(output) = self.take_pending(&call_id) {
                self.deliver(call_id, output).await;
            }
        }
    }

    fn mark_placeholder(&self, call_id: &str) {
        let inserted = self
            .placeholders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(call_id.to_string());
        if inserted {
            info!(call_id = %call_id, "search in progress");
            let _ = self.notices.send(SessionNotice::SearchInProgress {
                call_id: call_id.to_string(),
            });
        }
    }

    pub fn call_state(&self, call_id: &str) -> Option<CallState> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(call_id)
            .copied()
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn has_placeholder(&self, call_id: &str) -> bool {
        self.placeholders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(call_id)
    }
}

/// Collects call ids mentioned anywhere in a payload: `call_id` fields, and
/// `id` fields on objects typed as function calls.
fn mentioned_call_ids(value: &Value) -> HashSet<String> {
    let mut ids = HashSet::new();
    collect_ids(value, &mut ids);
    ids
}

fn collect_ids(value: &Value, ids: &mut HashSet<String>) {
    match value {
        Value::Object(map) => {
            if let Some(id) = map.get("call_id").and_then(Value::as_str) {
                ids.insert(id.to_string());
            }
            if map.get("type").and_then(Value::as_str) == Some("function_call") {
                if let Some(id) = map.get("id").and_then(Value::as_str) {
                    ids.insert(id.to_string());
                }
            }
            for child in map.values() {
                collect_ids(child, ids);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_ids(item, ids);
            }
        }
        _ => {}
    }
}
