//! Video signaling relay: the server forwards call join/leave and peer-id
//! announcements between a channel's occupants and keeps the transient
//! participant set current. Media itself flows peer to peer.

use crate::db::{self, store};
use crate::error::CoreError;
use crate::rooms::{ConnectionId, RoomKey};
use crate::state::AppState;
use crate::ws::broadcast;
use crate::ws::protocol::ServerEvent;

/// A client's media stack is ready; relay its peer id to everyone else in
/// the channel so they can dial it.
pub async fn peer_id_ready(
    state: &AppState,
    conn_id: ConnectionId,
    channel_id: i64,
    user_id: &str,
    peer_id: &str,
) {
    crate::rooms::membership::bind_identity(state, conn_id, user_id).await;

    let user = match lookup_user(state, user_id).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(channel_id, user_id, error = %e, "Peer announcement dropped");
            return;
        }
    };

    state
        .video
        .announce_peer(channel_id, &user.id, peer_id, &user.username, user.avatar.clone());

    let event = ServerEvent::PeerIdReady {
        channel_id,
        user_id: user.id,
        peer_id: peer_id.to_string(),
        display_name: user.username,
        avatar: user.avatar,
    };
    broadcast::emit_to_room(&state.rooms, RoomKey::Channel(channel_id), &event, Some(conn_id));
}

pub async fn join_video(state: &AppState, conn_id: ConnectionId, channel_id: i64, user_id: &str) {
    crate::rooms::membership::bind_identity(state, conn_id, user_id).await;

    let user = match lookup_user(state, user_id).await {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(channel_id, user_id, error = %e, "Video join dropped");
            return;
        }
    };

    state
        .video
        .join(channel_id, &user.id, &user.username, user.avatar);

    let event = ServerEvent::UserJoinedVideo {
        channel_id,
        user_id: user.id,
        display_name: user.username,
    };
    broadcast::emit_to_room(&state.rooms, RoomKey::Channel(channel_id), &event, Some(conn_id));
}

pub async fn leave_video(state: &AppState, conn_id: ConnectionId, channel_id: i64, user_id: &str) {
    crate::rooms::membership::bind_identity(state, conn_id, user_id).await;

    if !state.video.leave(channel_id, user_id) {
        return;
    }

    let event = ServerEvent::UserLeftVideo {
        channel_id,
        user_id: user_id.to_string(),
    };
    broadcast::emit_to_room(&state.rooms, RoomKey::Channel(channel_id), &event, Some(conn_id));
}

async fn lookup_user(state: &AppState, user_id: &str) -> Result<store::UserRow, CoreError> {
    let uid = user_id.to_string();
    db::query(&state.db, move |conn| {
        store::get_user(conn, &uid)?.ok_or_else(|| CoreError::not_found(format!("user {}", uid)))
    })
    .await
}
