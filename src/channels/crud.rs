//! Channel endpoints. Channels always belong to a group; creating or
//! deleting one is announced into the owning group's room.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::{self, store};
use crate::error::CoreError;
use crate::roles::{authorize, Action};
use crate::rooms::RoomKey;
use crate::state::AppState;
use crate::ws::broadcast;
use crate::ws::protocol::{ChannelInfo, ServerEvent};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelResponse {
    pub id: i64,
    pub group_id: i64,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDetailResponse {
    pub id: i64,
    pub group_id: i64,
    pub name: String,
    pub members: Vec<String>,
    pub banned_users: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannelRequest {
    pub name: String,
    pub acting_user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActingUserQuery {
    pub acting_user_id: String,
}

/// GET /api/channels
pub async fn list_channels(
    State(state): State<AppState>,
) -> Result<Json<Vec<ChannelResponse>>, (StatusCode, String)> {
    let rows = db::query(&state.db, |conn| store::list_channels(conn, None))
        .await
        .map_err(|e| e.into_http())?;
    Ok(Json(rows.into_iter().map(into_response).collect()))
}

/// GET /api/groups/{id}/channels
pub async fn list_group_channels(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
) -> Result<Json<Vec<ChannelResponse>>, (StatusCode, String)> {
    let rows = db::query(&state.db, move |conn| {
        store::get_group(conn, group_id)?
            .ok_or_else(|| CoreError::not_found(format!("group {}", group_id)))?;
        store::list_channels(conn, Some(group_id))
    })
    .await
    .map_err(|e| e.into_http())?;
    Ok(Json(rows.into_iter().map(into_response).collect()))
}

/// GET /api/channels/{id} — includes the persisted member set and ban list.
pub async fn get_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
) -> Result<Json<ChannelDetailResponse>, (StatusCode, String)> {
    let detail = db::query(&state.db, move |conn| {
        let channel = store::get_channel(conn, channel_id)?
            .ok_or_else(|| CoreError::not_found(format!("channel {}", channel_id)))?;
        let members = store::channel_members(conn, channel_id)?;
        let banned_users = store::channel_banned(conn, channel_id)?;
        Ok(ChannelDetailResponse {
            id: channel.id,
            group_id: channel.group_id,
            name: channel.name,
            members,
            banned_users,
        })
    })
    .await
    .map_err(|e| e.into_http())?;
    Ok(Json(detail))
}

/// POST /api/groups/{id}/channels
pub async fn create_channel(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<(StatusCode, Json<ChannelResponse>), (StatusCode, String)> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "channel name cannot be empty".to_string(),
        ));
    }

    let actor = req.acting_user_id.clone();
    let row = db::query(&state.db, move |conn| {
        store::get_group(conn, group_id)?
            .ok_or_else(|| CoreError::not_found(format!("group {}", group_id)))?;
        authorize_channel_op(conn, &actor, group_id, Action::CreateChannel)?;
        store::create_channel(conn, group_id, &name)
    })
    .await
    .map_err(|e| e.into_http())?;

    let event = ServerEvent::ChannelCreated {
        channel: ChannelInfo {
            id: row.id,
            group_id: row.group_id,
            name: row.name.clone(),
        },
    };
    broadcast::emit_to_room(&state.rooms, RoomKey::Group(group_id), &event, None);
    tracing::info!(channel_id = row.id, group_id, name = %row.name, "Channel created");

    Ok((StatusCode::CREATED, Json(into_response(row))))
}

/// DELETE /api/channels/{id} — cascades to messages, membership, and bans.
pub async fn delete_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
    Query(query): Query<ActingUserQuery>,
) -> Result<StatusCode, (StatusCode, String)> {
    let actor = query.acting_user_id.clone();
    let group_id = db::query(&state.db, move |conn| {
        let channel = store::get_channel(conn, channel_id)?
            .ok_or_else(|| CoreError::not_found(format!("channel {}", channel_id)))?;
        authorize_channel_op(conn, &actor, channel.group_id, Action::DeleteChannel)?;
        store::delete_channel(conn, channel_id)?;
        Ok(channel.group_id)
    })
    .await
    .map_err(|e| e.into_http())?;

    let event = ServerEvent::ChannelDeleted {
        channel_id,
        group_id,
    };
    broadcast::emit_to_room(&state.rooms, RoomKey::Group(group_id), &event, None);
    tracing::info!(channel_id, group_id, "Channel deleted");

    Ok(StatusCode::NO_CONTENT)
}

fn authorize_channel_op(
    conn: &rusqlite::Connection,
    acting_user_id: &str,
    group_id: i64,
    action: Action,
) -> Result<(), CoreError> {
    let acting = store::get_user(conn, acting_user_id)?
        .ok_or_else(|| CoreError::forbidden(format!("unknown acting user {}", acting_user_id)))?;
    let in_scope = store::user_in_group(conn, &acting.id, group_id)?;
    if !authorize(action, acting.role, in_scope) {
        return Err(CoreError::forbidden(format!(
            "user {} may not manage channels in group {}",
            acting.id, group_id
        )));
    }
    Ok(())
}

fn into_response(row: store::ChannelRow) -> ChannelResponse {
    ChannelResponse {
        id: row.id,
        group_id: row.group_id,
        name: row.name,
    }
}
