//! Shared test scaffolding: spin up a real server on a random port against
//! a temp-dir database, provision entities over REST, and talk realtime
//! over tokio-tungstenite.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Start the server on a random port and return (base_url, addr).
pub async fn start_test_server() -> (String, SocketAddr) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = huddle_server::db::init_db(&data_dir).expect("Failed to init DB");
    let state = huddle_server::state::AppState::new(db);
    let app = huddle_server::routes::build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
        let _keep = tmp_dir;
    });

    (format!("http://{}", addr), addr)
}

/// Provision a user over REST and return their id.
pub async fn create_user(base_url: &str, username: &str, role: &str) -> String {
    let resp = reqwest::Client::new()
        .post(format!("{}/api/users", base_url))
        .json(&json!({ "username": username, "role": role }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201, "user creation failed for {}", username);
    let body: Value = resp.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

/// Create a group as `acting_user_id` and return its id.
pub async fn create_group(base_url: &str, name: &str, acting_user_id: &str) -> i64 {
    let resp = reqwest::Client::new()
        .post(format!("{}/api/groups", base_url))
        .json(&json!({ "name": name, "actingUserId": acting_user_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201, "group creation failed for {}", name);
    let body: Value = resp.json().await.unwrap();
    body["id"].as_i64().unwrap()
}

/// Create a channel in a group and return its id.
pub async fn create_channel(base_url: &str, group_id: i64, name: &str, acting_user_id: &str) -> i64 {
    let resp = reqwest::Client::new()
        .post(format!("{}/api/groups/{}/channels", base_url, group_id))
        .json(&json!({ "name": name, "actingUserId": acting_user_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201, "channel creation failed for {}", name);
    let body: Value = resp.json().await.unwrap();
    body["id"].as_i64().unwrap()
}

/// Open a realtime connection.
pub async fn connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
        .await
        .expect("Failed to connect to WebSocket");
    ws
}

/// Send one client event frame.
pub async fn send_event(ws: &mut WsClient, event: &str, data: Value) {
    let frame = json!({ "event": event, "data": data }).to_string();
    ws.send(Message::Text(frame.into()))
        .await
        .expect("Failed to send event");
}

/// Receive the next event named `name`, skipping unrelated traffic such as
/// presence churn. Panics if it does not arrive within the timeout.
pub async fn recv_event(ws: &mut WsClient, name: &str) -> Value {
    let deadline = Duration::from_secs(3);
    loop {
        let msg = tokio::time::timeout(deadline, ws.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {}", name))
            .unwrap_or_else(|| panic!("socket closed waiting for {}", name))
            .expect("socket error");
        if let Message::Text(text) = msg {
            let value: Value = serde_json::from_str(&text).expect("invalid frame");
            if value["event"] == name {
                return value["data"].clone();
            }
        }
    }
}

/// Assert that no event named `name` arrives within a short window.
pub async fn assert_no_event(ws: &mut WsClient, name: &str) {
    let window = Duration::from_millis(500);
    let start = tokio::time::Instant::now();
    while start.elapsed() < window {
        let remaining = window - start.elapsed();
        match tokio::time::timeout(remaining, ws.next()).await {
            Err(_) => return,
            Ok(None) => return,
            Ok(Some(Ok(Message::Text(text)))) => {
                let value: Value = serde_json::from_str(&text).expect("invalid frame");
                assert_ne!(value["event"], name, "unexpected {} event: {}", name, value);
            }
            Ok(Some(_)) => continue,
        }
    }
}
