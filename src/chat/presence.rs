//! Presence propagation: online/offline transitions broadcast platform-wide.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::db::{self, store};
use crate::rooms::ConnectionId;
use crate::state::AppState;
use crate::ws::broadcast;
use crate::ws::protocol::ServerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Offline => "offline",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "online" => Some(PresenceStatus::Online),
            "offline" => Some(PresenceStatus::Offline),
            _ => None,
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit status update from a client. Persisted before the broadcast so
/// late-connecting clients observe the same status via the user listing.
pub async fn update_status(
    state: &AppState,
    conn_id: ConnectionId,
    user_id: &str,
    status: PresenceStatus,
) {
    crate::rooms::membership::bind_identity(state, conn_id, user_id).await;

    let uid = user_id.to_string();
    let persisted = db::query(&state.db, move |conn| {
        store::set_user_status(conn, &uid, status.as_str())
    })
    .await;

    if let Err(e) = persisted {
        tracing::warn!(user_id, %status, error = %e, "Status update dropped");
        return;
    }

    broadcast_status(state, user_id, status);
}

/// First live connection for a user: flip them online. Fire-and-forget
/// persistence; the broadcast goes out regardless.
pub fn mark_online(state: &AppState, user_id: &str) {
    let uid = user_id.to_string();
    db::write_detached(&state.db, "status_online", move |conn| {
        store::set_user_status(conn, &uid, PresenceStatus::Online.as_str())
    });
    broadcast_status(state, user_id, PresenceStatus::Online);
}

/// Last connection for a user is gone: flip them offline.
pub fn mark_offline(state: &AppState, user_id: &str) {
    let uid = user_id.to_string();
    db::write_detached(&state.db, "status_offline", move |conn| {
        store::set_user_status(conn, &uid, PresenceStatus::Offline.as_str())
    });
    broadcast_status(state, user_id, PresenceStatus::Offline);
}

fn broadcast_status(state: &AppState, user_id: &str, status: PresenceStatus) {
    let event = ServerEvent::StatusChanged {
        user_id: user_id.to_string(),
        status,
    };
    broadcast::emit_to_all(&state.rooms, &event);
    tracing::debug!(user_id, %status, "Presence changed");
}
