//! Channel bans. A ban removes persisted membership, blocks future joins
//! and sends, and evicts the target's live connections from the room.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::db::{self, store};
use crate::error::CoreError;
use crate::roles::{authorize, Action, Role};
use crate::rooms::{ConnectionId, RoomKey};
use crate::state::AppState;
use crate::ws::broadcast;
use crate::ws::protocol::ServerEvent;

/// Ban a user from a channel on behalf of `acting_user_id`.
///
/// Authorization is scoped to the channel's owning group: the actor must be
/// an admin of that group (or a super admin). Super admins can never be
/// banned. The ban row and the membership removal commit atomically before
/// any event goes out.
pub async fn ban_user(
    state: &AppState,
    channel_id: i64,
    target_user_id: &str,
    acting_user_id: &str,
) -> Result<(), CoreError> {
    let target = target_user_id.to_string();
    let actor = acting_user_id.to_string();
    let group_id = db::query(&state.db, move |conn| {
        let channel = store::get_channel(conn, channel_id)?
            .ok_or_else(|| CoreError::not_found(format!("channel {}", channel_id)))?;
        let acting = store::get_user(conn, &actor)?
            .ok_or_else(|| CoreError::forbidden(format!("unknown acting user {}", actor)))?;
        let in_scope = store::user_in_group(conn, &acting.id, channel.group_id)?;
        if !authorize(Action::BanUser, acting.role, in_scope) {
            return Err(CoreError::forbidden(format!(
                "user {} may not ban in group {}",
                acting.id, channel.group_id
            )));
        }
        let target_row = store::get_user(conn, &target)?
            .ok_or_else(|| CoreError::not_found(format!("user {}", target)))?;
        if target_row.role == Role::SuperAdmin {
            return Err(CoreError::forbidden("super admins cannot be banned"));
        }
        store::ban_channel_member(conn, channel_id, &target_row.id, &acting.id)?;
        Ok(channel.group_id)
    })
    .await?;

    // Tell the target directly first, then everyone watching the channel
    // or its group, then cut the target's live presence in the room.
    let banned = ServerEvent::UserBanned {
        channel_id,
        user_id: target_user_id.to_string(),
    };
    broadcast::emit_to_user(&state.rooms, target_user_id, &banned);

    let announce = ServerEvent::UserBannedFromChannel {
        channel_id,
        user_id: target_user_id.to_string(),
    };
    broadcast::emit_to_room(&state.rooms, RoomKey::Channel(channel_id), &announce, None);
    broadcast::emit_to_room(&state.rooms, RoomKey::Group(group_id), &announce, None);

    let evicted = state
        .rooms
        .evict_user_from_room(target_user_id, RoomKey::Channel(channel_id));
    tracing::info!(
        channel_id,
        target = target_user_id,
        actor = acting_user_id,
        evicted_connections = evicted.len(),
        "User banned from channel"
    );

    Ok(())
}

/// WS entry point. The acting identity is whatever user this connection has
/// bound itself to; an unbound connection cannot moderate.
pub async fn handle_ban_event(
    state: &AppState,
    conn_id: ConnectionId,
    channel_id: i64,
    target_user_id: &str,
) {
    let Some(acting) = state.rooms.bound_user(conn_id) else {
        tracing::warn!(%conn_id, channel_id, "Ban from unidentified connection dropped");
        return;
    };
    if let Err(e) = ban_user(state, channel_id, target_user_id, &acting).await {
        tracing::warn!(channel_id, target = target_user_id, actor = %acting, error = %e, "Ban rejected");
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanRequest {
    pub user_id: String,
    pub acting_user_id: String,
}

/// POST /api/channels/{id}/ban
pub async fn ban_user_handler(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
    Json(req): Json<BanRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    ban_user(&state, channel_id, &req.user_id, &req.acting_user_id)
        .await
        .map_err(|e| e.into_http())?;
    Ok(StatusCode::NO_CONTENT)
}
