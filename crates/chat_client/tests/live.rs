mod support;

use std::time::Duration;

use chat_api::{ChatApiError, LiveEvent, LiveNotification, ReconnectPolicy};
use chat_client::{BackendError, RuntimeOptions};
use convo_stream::{ContentPart, Message, MessageStatus};
use pretty_assertions::assert_eq;
use serde_json::json;

use support::{open_conversation, settle, spawn_runtime, wait_for_view, ScriptedBackend};

fn notification(conversation_id: &str) -> LiveEvent {
    let notification: LiveNotification = serde_json::from_value(json!({
        "internal_id": 7,
        "timestamp": "2026-03-01T10:00:00Z",
        "new_messages": 1,
        "conversation_id": conversation_id,
    }))
    .expect("notification");
    LiveEvent::Message(notification)
}

fn live_options() -> RuntimeOptions {
    RuntimeOptions {
        live: ReconnectPolicy::default()
            .with_connect_delay(Duration::from_millis(1000))
            .with_reconnect_delay(Duration::from_millis(3000)),
        ..RuntimeOptions::default()
    }
}

#[tokio::test(start_paused = true)]
async fn subscription_connects_late_and_reconnects_with_fixed_delay() {
    let backend = ScriptedBackend::new();
    let mut connects = backend.live_connects();
    let dropped = backend.script_live();
    dropped.end(Err(BackendError::Api(ChatApiError::Unknown(
        "connection reset".to_string(),
    ))));
    let ended = backend.script_live();
    ended.end(Ok(()));

    let (handle, _runtime) = spawn_runtime(&backend, live_options());
    let started = tokio::time::Instant::now();
    handle.switch_conversation("c-1").expect("switch");

    let mut offsets = Vec::new();
    for _ in 0..3 {
        let at = connects.recv().await.expect("connect attempt");
        offsets.push(at.duration_since(started));
    }

    assert_eq!(
        offsets,
        vec![
            Duration::from_millis(1000),
            Duration::from_millis(4000),
            Duration::from_millis(7000),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn notification_during_stream_is_suppressed_then_reloads_after_completion() {
    let backend = ScriptedBackend::new();
    let mut connects = backend.live_connects();
    let live = backend.script_live();
    let (handle, _runtime) = spawn_runtime(&backend, live_options());

    open_conversation(&handle, "c-1").await;
    connects.recv().await.expect("live connected");
    live.event(LiveEvent::Connected);
    assert_eq!(backend.history_loads(), 1);

    let stream = backend.script_stream();
    handle.send_message("hello", Vec::new()).expect("send");
    wait_for_view(&handle, |view| view.streaming).await;

    live.event(notification("c-1"));
    settle().await;
    assert_eq!(backend.history_loads(), 1);

    stream.text("hi");
    stream.complete();
    wait_for_view(&handle, |view| !view.streaming && view.messages.len() == 2).await;

    let stored = vec![
        Message::user("hello", Vec::new()).with_id("1"),
        Message::new(
            convo_stream::Role::Assistant,
            vec![ContentPart::text("hi, from storage")],
        )
        .with_id("2")
        .with_status(MessageStatus::Complete),
    ];
    backend.set_history("c-1", stored.clone());

    live.event(notification("c-1"));
    let view = wait_for_view(&handle, |view| {
        view.messages.iter().any(|message| message.id == "2")
    })
    .await;

    assert_eq!(backend.history_loads(), 2);
    assert_eq!(view.messages, stored);
    assert!(!view.loading);
}

#[tokio::test(start_paused = true)]
async fn reload_fetched_before_a_turn_never_replaces_it() {
    let backend = ScriptedBackend::new();
    let mut connects = backend.live_connects();
    let live = backend.script_live();
    let (handle, _runtime) = spawn_runtime(&backend, live_options());

    open_conversation(&handle, "c-1").await;
    connects.recv().await.expect("live connected");

    let gate = backend.gate_history();
    live.event(notification("c-1"));
    settle().await;
    assert_eq!(backend.history_loads(), 2);

    let stream = backend.script_stream();
    handle.send_message("hello", Vec::new()).expect("send");
    stream.text("hi");
    stream.complete();
    let finished =
        wait_for_view(&handle, |view| !view.streaming && view.messages.len() == 2).await;

    gate.release();
    settle().await;

    let view = handle.view();
    assert_eq!(view.messages, finished.messages);
    assert_eq!(view.messages[1].text(), "hi");
    assert!(!view.loading);
}

#[tokio::test(start_paused = true)]
async fn notification_for_other_conversation_is_ignored() {
    let backend = ScriptedBackend::new();
    let mut connects = backend.live_connects();
    let live = backend.script_live();
    let (handle, _runtime) = spawn_runtime(&backend, live_options());

    open_conversation(&handle, "c-1").await;
    connects.recv().await.expect("live connected");

    live.event(LiveEvent::Heartbeat);
    live.event(notification("c-2"));
    settle().await;

    assert_eq!(backend.history_loads(), 1);
}

#[tokio::test(start_paused = true)]
async fn switching_conversation_restarts_the_subscription() {
    let backend = ScriptedBackend::new();
    let mut connects = backend.live_connects();
    let first = backend.script_live();
    let (handle, _runtime) = spawn_runtime(&backend, live_options());

    open_conversation(&handle, "c-1").await;
    connects.recv().await.expect("first connect");

    let second = backend.script_live();
    open_conversation(&handle, "c-2").await;
    let switched_at = tokio::time::Instant::now();
    let reconnected = connects.recv().await.expect("second connect");
    assert_eq!(
        reconnected.duration_since(switched_at),
        Duration::from_millis(1000)
    );

    first.event(notification("c-1"));
    settle().await;
    assert_eq!(backend.history_loads(), 2);

    second.event(notification("c-2"));
    settle().await;
    assert_eq!(backend.history_loads(), 3);
}
