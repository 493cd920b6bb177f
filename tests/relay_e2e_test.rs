//! Full-stack exercise: two clients, a real relay on a loopback socket and a
//! shared in-memory gateway standing in for the REST server.

use chatwire::relay::RelayServer;
use chatwire::test_utils::{MemoryGateway, two_member_chat};
use chatwire::transport::WebSocketTransportFactory;
use chatwire::{ChatClient, RealtimeChannel, UserId};
use std::sync::Arc;
use std::time::Duration;

async fn spawn_relay() -> String {
    let relay = RelayServer::bind("127.0.0.1:0").await.unwrap();
    let addr = relay.local_addr().unwrap();
    tokio::spawn(relay.run());
    format!("ws://{addr}/")
}

async fn connect_client(user: &str, url: &str, gateway: Arc<MemoryGateway>) -> Arc<ChatClient> {
    let factory = Arc::new(WebSocketTransportFactory::new(url));
    let channel = RealtimeChannel::new(UserId::from(user), factory);
    let client = ChatClient::new(channel, gateway);
    client.connect().await.unwrap();
    client
}

async fn eventually<F>(mut check: F, what: &str)
where
    F: AsyncFnMut() -> bool,
{
    for _ in 0..300 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn message_roundtrip_with_read_acknowledgement() {
    let url = spawn_relay().await;
    let gateway = Arc::new(MemoryGateway::new());
    let chat = two_member_chat("c1", "alice", "bob");
    gateway.insert_chat(chat.clone());

    let alice = connect_client("alice", &url, gateway.clone()).await;
    let bob = connect_client("bob", &url, gateway.clone()).await;
    alice.set_chats(vec![chat.clone()]).await;
    bob.set_chats(vec![chat.clone()]).await;

    let alice_view = alice.view();
    let bob_view = bob.view();
    alice_view.select(&chat).await;
    bob_view.select(&chat).await;

    // Give the relay a moment to process both join frames.
    tokio::time::sleep(Duration::from_millis(200)).await;

    bob_view.input_changed("hello alice").await;
    let sent = bob_view.send(None).await.unwrap();

    // 1. The stored record reaches Alice's open view over the wire.
    eventually(
        async || {
            alice_view
                .messages()
                .await
                .iter()
                .any(|m| m.id == sent.id && m.text == "hello alice")
        },
        "bob's message to arrive at alice",
    )
    .await;

    // 2. Alice's automatic acknowledgement travels back and flips Bob's
    // local copy to read.
    eventually(
        async || bob_view.messages().await.iter().all(|m| m.read),
        "alice's acknowledgement to reach bob",
    )
    .await;

    assert_eq!(gateway.chat_row(&chat.id).unwrap().unread_messages, 0);
}

#[tokio::test]
async fn typing_reaches_the_peer_but_never_echoes() {
    let url = spawn_relay().await;
    let gateway = Arc::new(MemoryGateway::new());
    let chat = two_member_chat("c1", "alice", "bob");
    gateway.insert_chat(chat.clone());

    let alice = connect_client("alice", &url, gateway.clone()).await;
    let bob = connect_client("bob", &url, gateway.clone()).await;
    alice.set_chats(vec![chat.clone()]).await;
    bob.set_chats(vec![chat.clone()]).await;

    let alice_view = alice.view();
    let bob_view = bob.view();
    alice_view.select(&chat).await;
    bob_view.select(&chat).await;

    tokio::time::sleep(Duration::from_millis(200)).await;

    bob_view.input_changed("h").await;

    eventually(
        async || alice_view.is_recipient_typing().await,
        "typing indicator at alice",
    )
    .await;
    // The relay must not have echoed the frame back at Bob.
    assert!(!bob_view.is_recipient_typing().await);
}

#[tokio::test]
async fn disconnected_peer_just_misses_frames() {
    let url = spawn_relay().await;
    let gateway = Arc::new(MemoryGateway::new());
    let chat = two_member_chat("c1", "alice", "bob");
    gateway.insert_chat(chat.clone());

    // Bob never connects. Alice's sends still persist and succeed.
    let alice = connect_client("alice", &url, gateway.clone()).await;
    alice.set_chats(vec![chat.clone()]).await;
    let alice_view = alice.view();
    alice_view.select(&chat).await;

    tokio::time::sleep(Duration::from_millis(100)).await;

    alice_view.input_changed("anyone there?").await;
    alice_view.send(None).await.unwrap();

    assert_eq!(gateway.stored_messages(&chat.id).len(), 1);
    assert_eq!(alice_view.messages().await.len(), 1);
}
