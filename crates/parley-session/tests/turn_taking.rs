//! Barge-in and stop-intent properties, driven through the full session
//! event loop.

mod support;

use serde_json::json;
use std::sync::atomic::Ordering;

use parley_transport::{Transport, TransportEvent};
use support::{inject, inject_raw, rig, settle, test_settings};

async fn ready_session(rig: &support::Rig) -> parley_session::SessionHandle {
    let handle = rig.manager.start(test_settings()).await.expect("start");
    inject_raw(&rig.factory, TransportEvent::ChannelOpen).await;
    inject(&rig.factory, json!({"type": "session.updated"})).await;
    handle.wait_ready().await;
    handle
}

#[tokio::test]
async fn barge_in_cancels_when_assistant_is_speaking() {
    let rig = rig();
    ready_session(&rig).await;

    inject(&rig.factory, json!({"type": "output_audio_buffer.started"})).await;
    inject(&rig.factory, json!({"type": "input_audio_buffer.speech_started"})).await;
    settle().await;

    let channel = &rig.factory.last_transport().channel;
    assert_eq!(channel.count_kind("response.cancel"), 1);
    assert!(rig.sink.pauses.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn no_barge_in_when_assistant_is_silent() {
    let rig = rig();
    ready_session(&rig).await;

    inject(&rig.factory, json!({"type": "input_audio_buffer.speech_started"})).await;
    settle().await;

    let channel = &rig.factory.last_transport().channel;
    assert_eq!(channel.count_kind("response.cancel"), 0);
    assert_eq!(rig.sink.pauses.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn no_barge_in_after_buffer_stopped() {
    let rig = rig();
    ready_session(&rig).await;

    inject(&rig.factory, json!({"type": "output_audio_buffer.started"})).await;
    inject(&rig.factory, json!({"type": "output_audio_buffer.stopped"})).await;
    inject(&rig.factory, json!({"type": "input_audio_buffer.speech_started"})).await;
    settle().await;

    let channel = &rig.factory.last_transport().channel;
    assert_eq!(channel.count_kind("response.cancel"), 0);
}

#[tokio::test]
async fn playback_events_also_feed_the_speaking_flag() {
    let rig = rig();
    ready_session(&rig).await;

    // No protocol buffer event fires here; the playback-started signal from
    // the transport must be enough on its own.
    inject_raw(&rig.factory, TransportEvent::PlaybackStarted).await;
    inject(&rig.factory, json!({"type": "input_audio_buffer.speech_started"})).await;
    settle().await;

    let channel = &rig.factory.last_transport().channel;
    assert_eq!(channel.count_kind("response.cancel"), 1);
}

#[tokio::test]
async fn barge_in_disabled_by_configuration() {
    let rig = rig();
    let settings = parley_session::SessionSettings {
        barge_in_enabled: false,
        ..test_settings()
    };
    let handle = rig.manager.start(settings).await.expect("start");
    inject_raw(&rig.factory, TransportEvent::ChannelOpen).await;
    inject(&rig.factory, json!({"type": "session.updated"})).await;
    handle.wait_ready().await;

    inject(&rig.factory, json!({"type": "output_audio_buffer.started"})).await;
    inject(&rig.factory, json!({"type": "input_audio_buffer.speech_started"})).await;
    settle().await;

    let channel = &rig.factory.last_transport().channel;
    assert_eq!(channel.count_kind("response.cancel"), 0);
}

#[tokio::test]
async fn user_stop_phrase_terminates_the_session() {
    let rig = rig();
    let handle = ready_session(&rig).await;

    inject(
        &rig.factory,
        json!({
            "type": "conversation.item.input_audio_transcription.completed",
            "transcript": "okay, please stop the session now"
        }),
    )
    .await;
    settle().await;

    assert!(handle.is_ended());
    let channel = &rig.factory.last_transport().channel;
    assert_eq!(channel.count_kind("response.cancel"), 1);
    assert!(rig.factory.last_transport().is_closed());
}

#[tokio::test]
async fn assistant_saying_stop_never_terminates() {
    let rig = rig();
    let handle = ready_session(&rig).await;

    inject(
        &rig.factory,
        json!({
            "type": "response.audio_transcript.delta",
            "delta": "you can say stop the session whenever you like"
        }),
    )
    .await;
    inject(
        &rig.factory,
        json!({
            "type": "response.audio_transcript.done",
            "transcript": "you can say stop the session whenever you like"
        }),
    )
    .await;
    settle().await;

    assert!(!handle.is_ended());
    let channel = &rig.factory.last_transport().channel;
    assert_eq!(channel.count_kind("response.cancel"), 0);
}

#[tokio::test]
async fn transcripts_are_recorded_for_both_sides() {
    let rig = rig();
    ready_session(&rig).await;

    inject(
        &rig.factory,
        json!({
            "type": "conversation.item.input_audio_transcription.completed",
            "transcript": "what time is high tide"
        }),
    )
    .await;
    inject(
        &rig.factory,
        json!({"type": "response.audio_transcript.delta", "delta": "High tide "}),
    )
    .await;
    inject(
        &rig.factory,
        json!({"type": "response.audio_transcript.delta", "delta": "is at noon."}),
    )
    .await;
    inject(&rig.factory, json!({"type": "response.done", "response": {"id": "r1"}})).await;
    settle().await;

    let records = rig.store.record_ids();
    assert_eq!(records.len(), 1);
    let turns = rig.store.turns(&records[0]);
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0].text, "what time is high tide");
    assert_eq!(turns[1].text, "High tide is at noon.");
}
