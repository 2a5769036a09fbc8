//! End-to-end dispatcher scenarios through the full session event loop.

mod support;

use serde_json::json;
use std::sync::atomic::Ordering;

use parley_session::SessionNotice;
use parley_transport::TransportEvent;
use support::{inject, inject_raw, rig, settle, test_settings};

async fn ready_session(rig: &support::Rig) -> parley_session::SessionHandle {
    let handle = rig.manager.start(test_settings()).await.expect("start");
    inject_raw(&rig.factory, TransportEvent::ChannelOpen).await;
    inject(&rig.factory, json!({"type": "session.updated"})).await;
    handle.wait_ready().await;
    handle
}

#[tokio::test]
async fn weather_question_runs_web_search_once() {
    let rig = rig();
    let mut notices = rig.manager.subscribe();
    ready_session(&rig).await;

    // The user asks; the model transcribes, then requests the tool.
    inject(
        &rig.factory,
        json!({
            "type": "conversation.item.input_audio_transcription.completed",
            "transcript": "what's the weather like today"
        }),
    )
    .await;
    inject(
        &rig.factory,
        json!({
            "type": "response.function_call_arguments.done",
            "response_id": "resp_1",
            "call_id": "call_w",
            "name": "web_search",
            "arguments": "{\"query\":\"weather today\"}"
        }),
    )
    .await;
    // The same call shows up again in later lifecycle events.
    inject(
        &rig.factory,
        json!({
            "type": "response.output_item.done",
            "response_id": "resp_1",
            "item": {"type": "function_call", "call_id": "call_w",
                     "name": "web_search", "arguments": "{\"query\":\"weather today\"}"}
        }),
    )
    .await;
    inject(
        &rig.factory,
        json!({
            "type": "response.done",
            "response": {"id": "resp_1", "output": [
                {"type": "function_call", "call_id": "call_w",
                 "name": "web_search", "arguments": "{\"query\":\"weather today\"}"}
            ]}
        }),
    )
    .await;
    settle().await;

    // Exactly one handler invocation, with the parsed query.
    assert_eq!(rig.handler.invocations.load(Ordering::SeqCst), 1);
    let args = rig.handler.last_arguments.lock().unwrap().clone().unwrap();
    assert_eq!(args["query"], "weather today");

    // Placeholder marked exactly once.
    let mut placeholder_count = 0;
    while let Ok(notice) = notices.try_recv() {
        if let SessionNotice::SearchInProgress { call_id } = notice {
            assert_eq!(call_id, "call_w");
            placeholder_count += 1;
        }
    }
    assert_eq!(placeholder_count, 1);

    // One function-result item, followed by exactly one response creation.
    let channel = &rig.factory.last_transport().channel;
    assert_eq!(channel.count_kind("conversation.item.create"), 1);
    assert_eq!(channel.count_kind("response.create"), 1);

    let sent = channel.sent.lock().unwrap().clone();
    let result = sent
        .iter()
        .find(|v| v["type"] == "conversation.item.create")
        .expect("result item");
    assert_eq!(result["item"]["call_id"], "call_w");
    assert_eq!(result["item"]["output"], "handler output");
}

#[tokio::test]
async fn duplicate_delivery_of_one_call_id_executes_once() {
    let rig = rig();
    ready_session(&rig).await;

    let event = json!({
        "type": "response.function_call_arguments.done",
        "call_id": "call_dup",
        "name": "memory_read",
        "arguments": "{}"
    });
    inject(&rig.factory, event.clone()).await;
    inject(&rig.factory, event).await;
    settle().await;

    assert_eq!(rig.handler.invocations.load(Ordering::SeqCst), 1);
    let channel = &rig.factory.last_transport().channel;
    assert_eq!(channel.count_kind("conversation.item.create"), 1);
    assert_eq!(channel.count_kind("response.create"), 1);
}

#[tokio::test]
async fn result_computed_on_closed_channel_delivers_once_after_open() {
    let rig = rig();
    rig.factory.open_on_connect.store(false, Ordering::SeqCst);
    rig.manager.start(test_settings()).await.expect("start");

    inject(
        &rig.factory,
        json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_late",
            "name": "web_search",
            "arguments": "{\"query\":\"tides\"}"
        }),
    )
    .await;
    settle().await;

    // Handler ran, but nothing could be sent.
    assert_eq!(rig.handler.invocations.load(Ordering::SeqCst), 1);
    let channel = &rig.factory.last_transport().channel;
    assert_eq!(channel.sent.lock().unwrap().len(), 0);

    // The channel opens: the stashed result flushes exactly once.
    channel.open.store(true, Ordering::SeqCst);
    inject_raw(&rig.factory, TransportEvent::ChannelOpen).await;
    settle().await;

    assert_eq!(channel.count_kind("conversation.item.create"), 1);
    // session.update also went out on open, plus exactly one
    // response.create for the flushed result.
    assert_eq!(channel.count_kind("session.update"), 1);
    assert_eq!(channel.count_kind("response.create"), 1);

    // Another open must not re-deliver.
    inject_raw(&rig.factory, TransportEvent::ChannelOpen).await;
    settle().await;
    assert_eq!(channel.count_kind("conversation.item.create"), 1);
}

#[tokio::test]
async fn pending_result_flushes_when_response_claims_the_call() {
    let rig = rig();
    rig.factory.open_on_connect.store(false, Ordering::SeqCst);
    rig.manager.start(test_settings()).await.expect("start");

    inject(
        &rig.factory,
        json!({
            "type": "response.function_call_arguments.done",
            "call_id": "call_claim",
            "name": "code_search",
            "arguments": "{\"query\":\"Dispatcher\"}"
        }),
    )
    .await;
    settle().await;

    let channel = &rig.factory.last_transport().channel;
    assert_eq!(channel.sent.lock().unwrap().len(), 0);

    // The channel silently becomes usable; the next event proving the
    // active response contains the call flushes the stash.
    channel.open.store(true, Ordering::SeqCst);
    inject(
        &rig.factory,
        json!({
            "type": "response.output_item.added",
            "item": {"type": "function_call", "call_id": "call_claim", "name": "code_search"}
        }),
    )
    .await;
    settle().await;

    assert_eq!(channel.count_kind("conversation.item.create"), 1);
    assert_eq!(channel.count_kind("response.create"), 1);
}

#[tokio::test]
async fn unknown_event_shape_still_dispatches_via_scan() {
    let rig = rig();
    ready_session(&rig).await;

    inject(
        &rig.factory,
        json!({
            "type": "conversation.item.created",
            "item": {
                "wrapped": {"type": "function_call", "call_id": "call_scan",
                            "name": "macro_lookup", "arguments": "{\"name\":\"handoff\"}"}
            }
        }),
    )
    .await;
    settle().await;

    assert_eq!(rig.handler.invocations.load(Ordering::SeqCst), 1);
    let channel = &rig.factory.last_transport().channel;
    assert_eq!(channel.count_kind("conversation.item.create"), 1);
}
