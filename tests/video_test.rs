//! Integration tests for video-call signaling relay and teardown.

mod common;

use serde_json::json;

use common::*;

async fn video_fixture() -> (String, String, i64, WsClient, WsClient) {
    let (base_url, addr) = start_test_server().await;
    let alice = create_user(&base_url, "alice", "USER").await;
    let bob = create_user(&base_url, "bob", "USER").await;
    let group_id = create_group(&base_url, "Calls", &alice).await;
    let channel_id = create_channel(&base_url, group_id, "Standup", &alice).await;

    let mut alice_ws = connect(addr).await;
    send_event(
        &mut alice_ws,
        "joinChannel",
        json!({ "channelId": channel_id, "userId": alice }),
    )
    .await;
    // Alice's own echoed message proves her join landed before bob arrives.
    send_event(
        &mut alice_ws,
        "sendMessage",
        json!({
            "channelId": channel_id,
            "senderId": alice,
            "content": "sync",
            "type": "text",
        }),
    )
    .await;
    recv_event(&mut alice_ws, "receiveMessage").await;

    let mut bob_ws = connect(addr).await;
    send_event(
        &mut bob_ws,
        "joinChannel",
        json!({ "channelId": channel_id, "userId": bob }),
    )
    .await;
    recv_event(&mut alice_ws, "userJoined").await;

    (alice, bob, channel_id, alice_ws, bob_ws)
}

#[tokio::test]
async fn call_join_and_peer_id_are_relayed_to_the_room() {
    let (_alice, bob, channel_id, mut alice_ws, mut bob_ws) = video_fixture().await;

    send_event(
        &mut bob_ws,
        "joinVideo",
        json!({ "channelId": channel_id, "userId": bob }),
    )
    .await;
    let joined = recv_event(&mut alice_ws, "userJoinedVideo").await;
    assert_eq!(joined["channelId"], channel_id);
    assert_eq!(joined["userId"], bob.as_str());
    assert_eq!(joined["displayName"], "bob");

    send_event(
        &mut bob_ws,
        "peerIdReady",
        json!({ "channelId": channel_id, "userId": bob, "peerId": "peer-bob-1" }),
    )
    .await;
    let ready = recv_event(&mut alice_ws, "peerIdReady").await;
    assert_eq!(ready["peerId"], "peer-bob-1");
    assert_eq!(ready["displayName"], "bob");

    // The announcer never hears their own signals back.
    assert_no_event(&mut bob_ws, "peerIdReady").await;
}

#[tokio::test]
async fn leaving_a_call_is_relayed_once() {
    let (_alice, bob, channel_id, mut alice_ws, mut bob_ws) = video_fixture().await;

    send_event(
        &mut bob_ws,
        "joinVideo",
        json!({ "channelId": channel_id, "userId": bob }),
    )
    .await;
    recv_event(&mut alice_ws, "userJoinedVideo").await;

    send_event(
        &mut bob_ws,
        "leaveVideo",
        json!({ "channelId": channel_id, "userId": bob }),
    )
    .await;
    let left = recv_event(&mut alice_ws, "userLeftVideo").await;
    assert_eq!(left["userId"], bob.as_str());

    // A second leave for someone no longer in the call says nothing.
    send_event(
        &mut bob_ws,
        "leaveVideo",
        json!({ "channelId": channel_id, "userId": bob }),
    )
    .await;
    assert_no_event(&mut alice_ws, "userLeftVideo").await;
}

#[tokio::test]
async fn disconnect_tears_down_call_participation() {
    let (_alice, bob, channel_id, mut alice_ws, mut bob_ws) = video_fixture().await;

    send_event(
        &mut bob_ws,
        "joinVideo",
        json!({ "channelId": channel_id, "userId": bob }),
    )
    .await;
    recv_event(&mut alice_ws, "userJoinedVideo").await;

    drop(bob_ws);

    // Room teardown precedes call teardown in the cleanup path.
    let left_room = recv_event(&mut alice_ws, "userLeft").await;
    assert_eq!(left_room["userId"], bob.as_str());
    let left_call = recv_event(&mut alice_ws, "userLeftVideo").await;
    assert_eq!(left_call["channelId"], channel_id);
    assert_eq!(left_call["userId"], bob.as_str());
}
