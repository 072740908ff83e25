//! Join/leave/disconnect handling: the per-(connection, room) state machine.
//!
//! In-memory membership is mutated synchronously at the moment an event is
//! handled, before any persistence write is issued, so broadcast targets
//! computed by later events always reflect the latest join/leave. Membership
//! writes to the store are fire-and-forget; failures land in the log, and
//! the in-memory state remains authoritative for realtime traffic.

use crate::chat::presence;
use crate::db::{self, store};
use crate::error::CoreError;
use crate::rooms::{ConnectionId, RoomKey};
use crate::state::AppState;
use crate::ws::broadcast;
use crate::ws::protocol::{PublicProfile, ServerEvent};

/// Bind the connection to its claimed identity, marking the user online if
/// this is their first live connection.
pub async fn bind_identity(state: &AppState, conn_id: ConnectionId, user_id: &str) {
    let outcome = state.rooms.bind(conn_id, user_id);
    if outcome.newly_bound && outcome.first_for_user {
        presence::mark_online(state, user_id);
    }
}

/// Join a group room. Group joins are silent: no announcement is broadcast
/// and no membership write is issued (group membership is managed by the
/// join-request workflow, not by room presence).
pub async fn join_group(state: &AppState, conn_id: ConnectionId, group_id: i64, user_id: &str) {
    bind_identity(state, conn_id, user_id).await;
    state.rooms.join(conn_id, RoomKey::Group(group_id));
    tracing::debug!(%conn_id, group_id, user_id, "Joined group room");
}

pub async fn leave_group(state: &AppState, conn_id: ConnectionId, group_id: i64, user_id: &str) {
    bind_identity(state, conn_id, user_id).await;
    state.rooms.leave(conn_id, RoomKey::Group(group_id));
    tracing::debug!(%conn_id, group_id, user_id, "Left group room");
}

/// Join a channel room.
///
/// The ban check runs against the store on every join, including re-joins of
/// an already-occupied room. A banned user's join is dropped without
/// admitting the connection; a fresh join reconciles the persisted member
/// set fire-and-forget and announces the arrival to the rest of the room.
pub async fn join_channel(state: &AppState, conn_id: ConnectionId, channel_id: i64, user_id: &str) {
    bind_identity(state, conn_id, user_id).await;

    let uid = user_id.to_string();
    let lookup = db::query(&state.db, move |conn| {
        store::get_channel(conn, channel_id)?
            .ok_or_else(|| CoreError::not_found(format!("channel {}", channel_id)))?;
        let user = store::get_user(conn, &uid)?
            .ok_or_else(|| CoreError::not_found(format!("user {}", uid)))?;
        if store::is_channel_banned(conn, channel_id, &user.id)? {
            return Err(CoreError::forbidden(format!(
                "user {} is banned from channel {}",
                user.id, channel_id
            )));
        }
        Ok(user)
    })
    .await;

    let user = match lookup {
        Ok(user) => user,
        Err(e) => {
            tracing::warn!(%conn_id, channel_id, user_id, error = %e, "Channel join rejected");
            return;
        }
    };

    admit(state, conn_id, channel_id, user).await;
}

/// Second half of a channel join, entered with a "not banned" verdict from
/// the admission lookup.
async fn admit(state: &AppState, conn_id: ConnectionId, channel_id: i64, user: store::UserRow) {
    // In-memory membership first; the persisted member set follows
    // fire-and-forget.
    let newly_joined = state.rooms.join(conn_id, RoomKey::Channel(channel_id));

    // A ban can commit between the admission lookup and the in-memory join
    // above, after the moderation path has already swept the room for
    // connections to evict. Re-check now that the join is visible: a ban
    // that raced it either evicted this connection or is observed here.
    let uid = user.id.clone();
    let banned = db::query(&state.db, move |conn| {
        store::is_channel_banned(conn, channel_id, &uid)
    })
    .await;
    match banned {
        Ok(false) => {}
        Ok(true) => {
            state.rooms.leave(conn_id, RoomKey::Channel(channel_id));
            tracing::warn!(%conn_id, channel_id, user_id = %user.id, "Channel join revoked: banned during admission");
            return;
        }
        Err(e) => {
            state.rooms.leave(conn_id, RoomKey::Channel(channel_id));
            tracing::error!(%conn_id, channel_id, user_id = %user.id, error = %e, "Channel join dropped: ban re-check failed");
            return;
        }
    }

    let uid = user.id.clone();
    db::write_detached(&state.db, "channel_member_add", move |conn| {
        store::add_channel_member(conn, channel_id, &uid)
    });

    if newly_joined {
        let user_id = user.id.clone();
        let event = ServerEvent::UserJoined {
            channel_id,
            user: PublicProfile {
                id: user.id,
                username: user.username,
                avatar: user.avatar,
                role: user.role,
                status: user.status,
            },
        };
        broadcast::emit_to_room(&state.rooms, RoomKey::Channel(channel_id), &event, Some(conn_id));
        tracing::debug!(%conn_id, channel_id, %user_id, "Joined channel room");
    }
}

/// Leave a channel room: remove from the in-memory set, issue the persisted
/// member removal fire-and-forget, and announce the departure to whoever
/// remains. Leaving a room not currently joined is a no-op.
pub async fn leave_channel(state: &AppState, conn_id: ConnectionId, channel_id: i64, user_id: &str) {
    bind_identity(state, conn_id, user_id).await;

    if !state.rooms.leave(conn_id, RoomKey::Channel(channel_id)) {
        return;
    }

    let uid = user_id.to_string();
    db::write_detached(&state.db, "channel_member_remove", move |conn| {
        store::remove_channel_member(conn, channel_id, &uid)
    });

    let event = ServerEvent::UserLeft {
        channel_id,
        user_id: user_id.to_string(),
    };
    broadcast::emit_to_room(&state.rooms, RoomKey::Channel(channel_id), &event, Some(conn_id));
    tracing::debug!(%conn_id, channel_id, user_id, "Left channel room");
}

/// Tear down a vanished connection: purge it from every room it occupied,
/// announcing the departure and removing durable membership only where no
/// other connection of the same user remains. On the user's last link,
/// also discard any video participation and flip presence to offline.
/// This is the sole cleanup path for ungraceful drops.
pub async fn disconnect(state: &AppState, conn_id: ConnectionId) {
    let (user_id, rooms) = state.rooms.disconnect(conn_id);
    let Some(user_id) = user_id else {
        // Connection never identified itself; nothing to clean up.
        return;
    };

    for room in rooms {
        if let RoomKey::Channel(channel_id) = room {
            // Durable membership and the departure announcement are
            // user-level; another tab still holding the room keeps both.
            if state.rooms.user_in_room(&user_id, room) {
                continue;
            }
            let uid = user_id.clone();
            db::write_detached(&state.db, "channel_member_remove", move |conn| {
                store::remove_channel_member(conn, channel_id, &uid)
            });
            let event = ServerEvent::UserLeft {
                channel_id,
                user_id: user_id.clone(),
            };
            broadcast::emit_to_room(&state.rooms, room, &event, None);
        }
    }

    if !state.rooms.user_has_connections(&user_id) {
        // Abandoned calls simply stop receiving signals; nothing is
        // persisted.
        for channel_id in state.video.leave_all(&user_id) {
            let event = ServerEvent::UserLeftVideo {
                channel_id,
                user_id: user_id.clone(),
            };
            broadcast::emit_to_room(&state.rooms, RoomKey::Channel(channel_id), &event, None);
        }
        presence::mark_offline(state, &user_id);
    }

    tracing::debug!(%conn_id, user_id, "Connection torn down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{migrations, DbPool};
    use crate::roles::Role;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn test_state() -> AppState {
        let mut conn = rusqlite::Connection::open_in_memory().unwrap();
        migrations::migrations().to_latest(&mut conn).unwrap();
        let db: DbPool = Arc::new(Mutex::new(conn));
        AppState::new(db)
    }

    #[tokio::test]
    async fn admission_rechecks_bans_after_the_join_lands() {
        let state = test_state();
        let (channel_id, user) = {
            let conn = state.db.lock().unwrap();
            let group = store::create_group(&conn, "ops", None).unwrap();
            let channel = store::create_channel(&conn, group.id, "general").unwrap();
            let user = store::create_user(&conn, "u1", "casey", None, None, Role::User).unwrap();
            (channel.id, user)
        };

        let conn_id = Uuid::now_v7();
        let (tx, _rx) = mpsc::unbounded_channel();
        state.rooms.register(conn_id, tx);
        state.rooms.bind(conn_id, &user.id);

        // The admission lookup has already produced its "not banned"
        // verdict; the ban commits before the join resumes.
        {
            let conn = state.db.lock().unwrap();
            store::ban_channel_member(&conn, channel_id, &user.id, "mod").unwrap();
        }

        admit(&state, conn_id, channel_id, user).await;

        assert!(!state.rooms.is_joined(conn_id, RoomKey::Channel(channel_id)));
        assert!(state.rooms.targets(RoomKey::Channel(channel_id)).is_empty());
        let conn = state.db.lock().unwrap();
        assert!(store::channel_members(&conn, channel_id).unwrap().is_empty());
    }
}
