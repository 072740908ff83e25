//! Integration tests for group and channel CRUD and their realtime
//! announcements.

mod common;

use serde_json::{json, Value};

use common::*;

#[tokio::test]
async fn creating_a_group_promotes_the_creator_and_seats_super_admins() {
    let (base_url, _addr) = start_test_server().await;
    let root = create_user(&base_url, "root", "SUPER_ADMIN").await;
    let alice = create_user(&base_url, "alice", "USER").await;

    let group_id = create_group(&base_url, "Garden", &alice).await;

    let user: Value = reqwest::get(format!("{}/api/users/{}", base_url, alice))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(user["role"], "GROUP_ADMIN");

    let users: Value = reqwest::get(format!("{}/api/groups/{}/users", base_url, group_id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let ids: Vec<&str> = users
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&alice.as_str()));
    assert!(ids.contains(&root.as_str()));
}

#[tokio::test]
async fn group_mutations_are_broadcast_platform_wide() {
    let (base_url, addr) = start_test_server().await;
    let alice = create_user(&base_url, "alice", "USER").await;
    let observer = create_user(&base_url, "observer", "USER").await;

    let mut ws = connect(addr).await;
    send_event(
        &mut ws,
        "updateStatus",
        json!({ "userId": observer, "status": "online" }),
    )
    .await;
    recv_event(&mut ws, "statusChanged").await;

    let group_id = create_group(&base_url, "Garden", &alice).await;
    let created = recv_event(&mut ws, "groupCreated").await;
    assert_eq!(created["group"]["id"], group_id);
    assert_eq!(created["group"]["name"], "Garden");

    let client = reqwest::Client::new();
    let status = client
        .put(format!("{}/api/groups/{}", base_url, group_id))
        .json(&json!({ "name": "Greenhouse", "actingUserId": alice }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 200);
    let modified = recv_event(&mut ws, "groupModified").await;
    assert_eq!(modified["group"]["name"], "Greenhouse");

    let status = client
        .delete(format!("{}/api/groups/{}", base_url, group_id))
        .json(&json!({ "actingUserId": alice }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 204);
    let deleted = recv_event(&mut ws, "groupDeleted").await;
    assert_eq!(deleted["groupId"], group_id);

    let status = reqwest::get(format!("{}/api/groups/{}", base_url, group_id))
        .await
        .unwrap()
        .status();
    assert_eq!(status, 404);
}

#[tokio::test]
async fn deleting_a_user_is_broadcast_platform_wide() {
    let (base_url, addr) = start_test_server().await;
    let observer = create_user(&base_url, "observer", "USER").await;
    let casey = create_user(&base_url, "casey", "USER").await;

    let mut ws = connect(addr).await;
    send_event(
        &mut ws,
        "updateStatus",
        json!({ "userId": observer, "status": "online" }),
    )
    .await;
    recv_event(&mut ws, "statusChanged").await;

    let client = reqwest::Client::new();
    let status = client
        .delete(format!("{}/api/users/{}", base_url, casey))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 204);

    let deleted = recv_event(&mut ws, "userDeleted").await;
    assert_eq!(deleted["userId"], casey.as_str());

    let status = reqwest::get(format!("{}/api/users/{}", base_url, casey))
        .await
        .unwrap()
        .status();
    assert_eq!(status, 404);

    // Deleting an unknown account is a 404, not a silent success.
    let status = client
        .delete(format!("{}/api/users/{}", base_url, casey))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 404);
}

#[tokio::test]
async fn group_management_is_scoped() {
    let (base_url, _addr) = start_test_server().await;
    let alice = create_user(&base_url, "alice", "USER").await;
    let mallory = create_user(&base_url, "mallory", "USER").await;
    let group_id = create_group(&base_url, "Garden", &alice).await;

    let client = reqwest::Client::new();
    let status = client
        .put(format!("{}/api/groups/{}", base_url, group_id))
        .json(&json!({ "name": "Hijacked", "actingUserId": mallory }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 403);

    let status = client
        .delete(format!("{}/api/groups/{}", base_url, group_id))
        .json(&json!({ "actingUserId": mallory }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 403);
}

#[tokio::test]
async fn channel_lifecycle_is_announced_to_the_group_room() {
    let (base_url, addr) = start_test_server().await;
    let alice = create_user(&base_url, "alice", "USER").await;
    let bob = create_user(&base_url, "bob", "USER").await;
    let group_id = create_group(&base_url, "Garden", &alice).await;

    let mut bob_ws = connect(addr).await;
    send_event(
        &mut bob_ws,
        "joinGroup",
        json!({ "groupId": group_id, "userId": bob }),
    )
    .await;
    // Bind confirmed once presence lands.
    recv_event(&mut bob_ws, "statusChanged").await;

    let channel_id = create_channel(&base_url, group_id, "Seedlings", &alice).await;
    let created = recv_event(&mut bob_ws, "channelCreated").await;
    assert_eq!(created["channel"]["id"], channel_id);
    assert_eq!(created["channel"]["groupId"], group_id);
    assert_eq!(created["channel"]["name"], "Seedlings");

    // Deletion requires authority over the owning group.
    let client = reqwest::Client::new();
    let status = client
        .delete(format!(
            "{}/api/channels/{}?actingUserId={}",
            base_url, channel_id, bob
        ))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 403);

    let status = client
        .delete(format!(
            "{}/api/channels/{}?actingUserId={}",
            base_url, channel_id, alice
        ))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 204);
    let deleted = recv_event(&mut bob_ws, "channelDeleted").await;
    assert_eq!(deleted["channelId"], channel_id);

    let status = reqwest::get(format!("{}/api/channels/{}", base_url, channel_id))
        .await
        .unwrap()
        .status();
    assert_eq!(status, 404);
}

#[tokio::test]
async fn deleting_a_group_cascades_to_its_channels() {
    let (base_url, _addr) = start_test_server().await;
    let alice = create_user(&base_url, "alice", "USER").await;
    let group_id = create_group(&base_url, "Garden", &alice).await;
    let channel_id = create_channel(&base_url, group_id, "Seedlings", &alice).await;

    let client = reqwest::Client::new();
    client
        .delete(format!("{}/api/groups/{}", base_url, group_id))
        .json(&json!({ "actingUserId": alice }))
        .send()
        .await
        .unwrap();

    let status = reqwest::get(format!("{}/api/channels/{}", base_url, channel_id))
        .await
        .unwrap()
        .status();
    assert_eq!(status, 404);
}

#[tokio::test]
async fn channel_creation_requires_group_authority() {
    let (base_url, _addr) = start_test_server().await;
    let alice = create_user(&base_url, "alice", "USER").await;
    let mallory = create_user(&base_url, "mallory", "USER").await;
    let group_id = create_group(&base_url, "Garden", &alice).await;

    let status = reqwest::Client::new()
        .post(format!("{}/api/groups/{}/channels", base_url, group_id))
        .json(&json!({ "name": "Sneaky", "actingUserId": mallory }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 403);
}
