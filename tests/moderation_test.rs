//! Integration tests for bans, promotion, and the join-request workflow.

mod common;

use serde_json::{json, Value};

use common::*;

struct Fixture {
    base_url: String,
    addr: std::net::SocketAddr,
    admin: String,
    member: String,
    group_id: i64,
    channel_id: i64,
}

/// An admin-owned group with a channel and one regular member.
async fn moderation_fixture() -> Fixture {
    let (base_url, addr) = start_test_server().await;
    let admin = create_user(&base_url, "admin", "USER").await;
    let member = create_user(&base_url, "member", "USER").await;
    let group_id = create_group(&base_url, "Moderated", &admin).await;
    let channel_id = create_channel(&base_url, group_id, "General", &admin).await;
    Fixture {
        base_url,
        addr,
        admin,
        member,
        group_id,
        channel_id,
    }
}

async fn ban(base_url: &str, channel_id: i64, user_id: &str, acting: &str) -> reqwest::StatusCode {
    reqwest::Client::new()
        .post(format!("{}/api/channels/{}/ban", base_url, channel_id))
        .json(&json!({ "userId": user_id, "actingUserId": acting }))
        .send()
        .await
        .unwrap()
        .status()
}

#[tokio::test]
async fn ban_requires_a_group_admin() {
    let fx = moderation_fixture().await;
    let outsider = create_user(&fx.base_url, "outsider", "USER").await;

    let status = ban(&fx.base_url, fx.channel_id, &fx.member, &outsider).await;
    assert_eq!(status, 403);

    // A group admin of a *different* group has no authority here either.
    let other_admin = create_user(&fx.base_url, "other_admin", "USER").await;
    create_group(&fx.base_url, "Elsewhere", &other_admin).await;
    let status = ban(&fx.base_url, fx.channel_id, &fx.member, &other_admin).await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn super_admins_cannot_be_banned() {
    let fx = moderation_fixture().await;
    let root = create_user(&fx.base_url, "root", "SUPER_ADMIN").await;

    let status = ban(&fx.base_url, fx.channel_id, &root, &fx.admin).await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn ban_notifies_evicts_and_blocks_rejoin() {
    let fx = moderation_fixture().await;

    let mut admin_ws = connect(fx.addr).await;
    let mut member_ws = connect(fx.addr).await;
    send_event(
        &mut admin_ws,
        "joinChannel",
        json!({ "channelId": fx.channel_id, "userId": fx.admin }),
    )
    .await;
    // The admin's own echoed message proves the join landed.
    send_event(
        &mut admin_ws,
        "sendMessage",
        json!({
            "channelId": fx.channel_id,
            "senderId": fx.admin,
            "content": "sync",
            "type": "text",
        }),
    )
    .await;
    recv_event(&mut admin_ws, "receiveMessage").await;

    send_event(
        &mut member_ws,
        "joinChannel",
        json!({ "channelId": fx.channel_id, "userId": fx.member }),
    )
    .await;
    recv_event(&mut admin_ws, "userJoined").await;

    // Moderation over the live socket: the admin's connection identity acts.
    send_event(
        &mut admin_ws,
        "banUser",
        json!({ "channelId": fx.channel_id, "userId": fx.member }),
    )
    .await;

    let banned = recv_event(&mut member_ws, "userBanned").await;
    assert_eq!(banned["channelId"], fx.channel_id);
    assert_eq!(banned["userId"], fx.member.as_str());
    let announce = recv_event(&mut admin_ws, "userBannedFromChannel").await;
    assert_eq!(announce["userId"], fx.member.as_str());

    // The persisted view agrees: banned, no longer a member.
    let detail: Value = reqwest::get(format!("{}/api/channels/{}", fx.base_url, fx.channel_id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let banned_users: Vec<&str> = detail["bannedUsers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(banned_users.contains(&fx.member.as_str()));
    let members: Vec<&str> = detail["members"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert!(!members.contains(&fx.member.as_str()));

    // Re-join is silently refused and messages no longer reach the room.
    send_event(
        &mut member_ws,
        "joinChannel",
        json!({ "channelId": fx.channel_id, "userId": fx.member }),
    )
    .await;
    assert_no_event(&mut admin_ws, "userJoined").await;

    send_event(
        &mut member_ws,
        "sendMessage",
        json!({
            "channelId": fx.channel_id,
            "senderId": fx.member,
            "content": "let me back in",
            "type": "text",
        }),
    )
    .await;
    let err = recv_event(&mut member_ws, "error").await;
    assert_eq!(err["code"], 403);
    assert_no_event(&mut admin_ws, "receiveMessage").await;
}

#[tokio::test]
async fn only_super_admins_promote() {
    let fx = moderation_fixture().await;
    let root = create_user(&fx.base_url, "root", "SUPER_ADMIN").await;
    let client = reqwest::Client::new();

    // A group admin cannot hand out roles.
    let status = client
        .post(format!(
            "{}/api/groups/{}/users/{}/promote",
            fx.base_url, fx.group_id, fx.member
        ))
        .json(&json!({ "role": "GROUP_ADMIN", "actingUserId": fx.admin }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 403);

    let status = client
        .post(format!(
            "{}/api/groups/{}/users/{}/promote",
            fx.base_url, fx.group_id, fx.member
        ))
        .json(&json!({ "role": "GROUP_ADMIN", "actingUserId": root }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 204);

    let user: Value = reqwest::get(format!("{}/api/users/{}", fx.base_url, fx.member))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(user["role"], "GROUP_ADMIN");

    // Promotion made them a member of the target group.
    let users: Value = reqwest::get(format!("{}/api/groups/{}/users", fx.base_url, fx.group_id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(users
        .as_array()
        .unwrap()
        .iter()
        .any(|u| u["id"] == fx.member.as_str()));
}

#[tokio::test]
async fn promotion_is_announced_to_the_group_room() {
    let fx = moderation_fixture().await;
    let root = create_user(&fx.base_url, "root", "SUPER_ADMIN").await;

    let mut admin_ws = connect(fx.addr).await;
    send_event(
        &mut admin_ws,
        "joinGroup",
        json!({ "groupId": fx.group_id, "userId": fx.admin }),
    )
    .await;

    let mut root_ws = connect(fx.addr).await;
    send_event(
        &mut root_ws,
        "promoteUser",
        json!({ "userId": fx.member, "role": "GROUP_ADMIN", "groupId": fx.group_id }),
    )
    .await;
    // Identity binds from prior traffic; promoteUser carries the target, so
    // the actor must have self-identified first.
    assert_no_event(&mut admin_ws, "userPromoted").await;

    send_event(
        &mut root_ws,
        "updateStatus",
        json!({ "userId": root, "status": "online" }),
    )
    .await;
    send_event(
        &mut root_ws,
        "promoteUser",
        json!({ "userId": fx.member, "role": "GROUP_ADMIN", "groupId": fx.group_id }),
    )
    .await;

    let promoted = recv_event(&mut admin_ws, "userPromoted").await;
    assert_eq!(promoted["userId"], fx.member.as_str());
    assert_eq!(promoted["role"], "GROUP_ADMIN");
    assert_eq!(promoted["groupId"], fx.group_id);
}

#[tokio::test]
async fn join_request_lifecycle_approve() {
    let fx = moderation_fixture().await;
    let client = reqwest::Client::new();

    let status = client
        .post(format!(
            "{}/api/groups/{}/join-requests",
            fx.base_url, fx.group_id
        ))
        .json(&json!({ "userId": fx.member }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 201);

    // Duplicate requests are rejected.
    let status = client
        .post(format!(
            "{}/api/groups/{}/join-requests",
            fx.base_url, fx.group_id
        ))
        .json(&json!({ "userId": fx.member }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 400);

    let pending: Value = reqwest::get(format!(
        "{}/api/groups/{}/join-requests",
        fx.base_url, fx.group_id
    ))
    .await
    .unwrap()
    .json()
    .await
    .unwrap();
    assert_eq!(pending.as_array().unwrap().len(), 1);

    let status = client
        .post(format!(
            "{}/api/groups/{}/join-requests/{}/approve",
            fx.base_url, fx.group_id, fx.member
        ))
        .json(&json!({ "actingUserId": fx.admin }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 204);

    // Consumed: a second approval finds nothing.
    let status = client
        .post(format!(
            "{}/api/groups/{}/join-requests/{}/approve",
            fx.base_url, fx.group_id, fx.member
        ))
        .json(&json!({ "actingUserId": fx.admin }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 404);

    let users: Value = reqwest::get(format!("{}/api/groups/{}/users", fx.base_url, fx.group_id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(users
        .as_array()
        .unwrap()
        .iter()
        .any(|u| u["id"] == fx.member.as_str()));
}

#[tokio::test]
async fn join_request_lifecycle_reject() {
    let fx = moderation_fixture().await;
    let client = reqwest::Client::new();

    client
        .post(format!(
            "{}/api/groups/{}/join-requests",
            fx.base_url, fx.group_id
        ))
        .json(&json!({ "userId": fx.member }))
        .send()
        .await
        .unwrap();

    let status = client
        .post(format!(
            "{}/api/groups/{}/join-requests/{}/reject",
            fx.base_url, fx.group_id, fx.member
        ))
        .json(&json!({ "actingUserId": fx.admin }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 204);

    // Rejection grants nothing.
    let users: Value = reqwest::get(format!("{}/api/groups/{}/users", fx.base_url, fx.group_id))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!users
        .as_array()
        .unwrap()
        .iter()
        .any(|u| u["id"] == fx.member.as_str()));
    // But the slate is clean for a fresh request.
    let status = client
        .post(format!(
            "{}/api/groups/{}/join-requests",
            fx.base_url, fx.group_id
        ))
        .json(&json!({ "userId": fx.member }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 201);
}

#[tokio::test]
async fn admins_and_members_do_not_file_requests() {
    let fx = moderation_fixture().await;
    let client = reqwest::Client::new();

    // The group admin is an admin: no request path for them.
    let status = client
        .post(format!(
            "{}/api/groups/{}/join-requests",
            fx.base_url, fx.group_id
        ))
        .json(&json!({ "userId": fx.admin }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 403);

    // Existing members cannot re-request.
    let member2 = create_user(&fx.base_url, "member2", "USER").await;
    client
        .post(format!(
            "{}/api/groups/{}/join-requests",
            fx.base_url, fx.group_id
        ))
        .json(&json!({ "userId": member2 }))
        .send()
        .await
        .unwrap();
    client
        .post(format!(
            "{}/api/groups/{}/join-requests/{}/approve",
            fx.base_url, fx.group_id, member2
        ))
        .json(&json!({ "actingUserId": fx.admin }))
        .send()
        .await
        .unwrap();
    let status = client
        .post(format!(
            "{}/api/groups/{}/join-requests",
            fx.base_url, fx.group_id
        ))
        .json(&json!({ "userId": member2 }))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 400);
}

#[tokio::test]
async fn filed_requests_are_broadcast() {
    let fx = moderation_fixture().await;

    let mut admin_ws = connect(fx.addr).await;
    send_event(
        &mut admin_ws,
        "updateStatus",
        json!({ "userId": fx.admin, "status": "online" }),
    )
    .await;
    recv_event(&mut admin_ws, "statusChanged").await;

    let mut member_ws = connect(fx.addr).await;
    send_event(
        &mut member_ws,
        "requestJoinGroup",
        json!({ "userId": fx.member, "groupId": fx.group_id }),
    )
    .await;

    let request = recv_event(&mut admin_ws, "groupRequest").await;
    assert_eq!(request["userId"], fx.member.as_str());
    assert_eq!(request["groupId"], fx.group_id);

    // Approval over the socket reaches the requester directly.
    send_event(
        &mut admin_ws,
        "approveRequest",
        json!({ "userId": fx.member, "groupId": fx.group_id }),
    )
    .await;
    let approved = recv_event(&mut member_ws, "requestApproved").await;
    assert_eq!(approved["groupId"], fx.group_id);

    let users: serde_json::Value =
        reqwest::get(format!("{}/api/groups/{}/users", fx.base_url, fx.group_id))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
    assert!(users
        .as_array()
        .unwrap()
        .iter()
        .any(|u| u["id"] == fx.member.as_str()));
}
