use chatwire::test_utils::{create_test_client, text_message, two_member_chat};
use chatwire::wire::{ClientFrame, ServerFrame, StartedTypingPayload};
use chatwire::{Chat, ChatId, UserId};
use std::time::Duration;

/// Lets spawned tasks drain under paused time.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn typing_from(sender: &str, chat: &str) -> ServerFrame {
    ServerFrame::StartedTyping(StartedTypingPayload {
        chat: ChatId::from(chat),
        sender: UserId::from(sender),
    })
}

/// Chat whose last message is Alice's own, so opening it stays quiet.
fn quiet_chat(gateway: &chatwire::test_utils::MemoryGateway) -> Chat {
    let mut chat = two_member_chat("c1", "alice", "bob");
    chat.last_message = Some(text_message("m0", "c1", "alice", "earlier"));
    gateway.insert_chat(chat.clone());
    chat
}

#[tokio::test(start_paused = true)]
async fn indicator_turns_on_with_a_single_event() {
    let (client, handle, gateway) = create_test_client("alice").await;
    let chat = quiet_chat(&gateway);
    let view = client.view();
    view.select(&chat).await;
    assert!(!view.is_recipient_typing().await);

    handle.push_frame(&typing_from("bob", "c1")).await;
    settle().await;

    assert!(view.is_recipient_typing().await);
}

#[tokio::test(start_paused = true)]
async fn indicator_expires_after_the_idle_window() {
    let (client, handle, gateway) = create_test_client("alice").await;
    let chat = quiet_chat(&gateway);
    let view = client.view();
    view.select(&chat).await;

    handle.push_frame(&typing_from("bob", "c1")).await;
    settle().await;

    // Well inside the 1.5s window.
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(view.is_recipient_typing().await);

    // Past it.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(!view.is_recipient_typing().await);
}

#[tokio::test(start_paused = true)]
async fn fresh_activity_extends_the_indicator() {
    let (client, handle, gateway) = create_test_client("alice").await;
    let chat = quiet_chat(&gateway);
    let view = client.view();
    view.select(&chat).await;

    handle.push_frame(&typing_from("bob", "c1")).await;
    settle().await;

    tokio::time::sleep(Duration::from_millis(1000)).await;
    handle.push_frame(&typing_from("bob", "c1")).await;
    settle().await;

    // 1.6s after the first event but only 0.6s after the second: the second
    // burst must win, not the first event's expiry.
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(view.is_recipient_typing().await);

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(!view.is_recipient_typing().await);
}

#[tokio::test(start_paused = true)]
async fn own_and_foreign_chat_activity_is_ignored() {
    let (client, handle, gateway) = create_test_client("alice").await;
    let chat = quiet_chat(&gateway);
    let view = client.view();
    view.select(&chat).await;

    // Our own echo must not turn the indicator on.
    handle.push_frame(&typing_from("alice", "c1")).await;
    // Neither does activity in a chat we do not have open.
    handle.push_frame(&typing_from("bob", "c2")).await;
    settle().await;

    assert!(!view.is_recipient_typing().await);
}

#[tokio::test(start_paused = true)]
async fn keystrokes_are_announced_at_most_once_per_second() {
    let (client, handle, gateway) = create_test_client("alice").await;
    let chat = quiet_chat(&gateway);
    let view = client.view();
    view.select(&chat).await;
    handle.clear_sent();

    view.input_changed("h").await;
    view.input_changed("he").await;
    view.input_changed("hel").await;
    assert_eq!(typing_frames(&handle.sent_raw()), 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    view.input_changed("hell").await;
    assert_eq!(typing_frames(&handle.sent_raw()), 2);
}

#[tokio::test(start_paused = true)]
async fn sending_rearms_the_typing_announcement() {
    let (client, handle, gateway) = create_test_client("alice").await;
    let chat = quiet_chat(&gateway);
    let view = client.view();
    view.select(&chat).await;
    handle.clear_sent();

    view.input_changed("hi").await;
    assert_eq!(typing_frames(&handle.sent_raw()), 1);

    view.send(None).await.unwrap();

    // A new draft right after the send announces again without waiting out
    // the interval.
    view.input_changed("again").await;
    assert_eq!(typing_frames(&handle.sent_raw()), 2);
}

fn typing_frames(raw: &[String]) -> usize {
    raw.iter()
        .filter(|raw| matches!(ClientFrame::decode(raw), Ok(ClientFrame::Typing(_))))
        .count()
}
