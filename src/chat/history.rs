//! Channel history paging over the persisted message log.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::{self, store};
use crate::error::CoreError;
use crate::state::AppState;
use crate::ws::protocol::MessageKind;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Return messages strictly older than this sequence number.
    pub before: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub id: i64,
    pub channel_id: i64,
    pub sender_id: String,
    pub sender_name: String,
    pub profile_img: Option<String>,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub timestamp: i64,
    pub seq: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub messages: Vec<MessageResponse>,
    pub has_more: bool,
}

/// GET /api/channels/{id}/messages — page backwards through a channel's
/// history, newest first. `before` points at a seq; omit it for the tail.
pub async fn channel_history(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryResponse>, (StatusCode, String)> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE) as u32;
    let before = query.before.unwrap_or(i64::MAX);

    // Fetch one extra row to learn whether an older page exists.
    let rows = db::query(&state.db, move |conn| {
        store::get_channel(conn, channel_id)?
            .ok_or_else(|| CoreError::not_found(format!("channel {}", channel_id)))?;
        store::channel_messages(conn, channel_id, before, limit + 1)
    })
    .await
    .map_err(|e| e.into_http())?;

    let has_more = rows.len() as u32 > limit;
    let messages = rows
        .into_iter()
        .take(limit as usize)
        .map(|row| MessageResponse {
            id: row.id,
            channel_id: row.channel_id,
            sender_id: row.sender_id,
            sender_name: row.sender_name,
            profile_img: row.avatar,
            kind: MessageKind::from_str(&row.kind).unwrap_or(MessageKind::Text),
            content: row.content,
            timestamp: row.ts_millis,
            seq: row.seq,
        })
        .collect();

    Ok(Json(HistoryResponse { messages, has_more }))
}
