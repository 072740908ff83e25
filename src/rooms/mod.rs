//! Connection registry and room membership.
//!
//! One `RoomRegistry` instance is constructed at process start and shared
//! through `AppState`; it is the single source of truth for "who receives
//! broadcasts for this room". All mutations are synchronous — handlers
//! update membership here before touching storage, so broadcast targets
//! always reflect the latest join/leave regardless of in-flight writes.

pub mod membership;

use dashmap::DashMap;
use std::collections::HashSet;
use uuid::Uuid;

use crate::ws::ConnectionSender;

pub type ConnectionId = Uuid;

/// A logical broadcast scope: per-group or per-channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomKey {
    Group(i64),
    Channel(i64),
}

impl std::fmt::Display for RoomKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomKey::Group(id) => write!(f, "group-{}", id),
            RoomKey::Channel(id) => write!(f, "channel-{}", id),
        }
    }
}

struct ConnectionEntry {
    user_id: Option<String>,
    sender: ConnectionSender,
    rooms: HashSet<RoomKey>,
}

/// Outcome of binding a user identity to a connection.
pub struct BindOutcome {
    /// The connection had no identity before this call.
    pub newly_bound: bool,
    /// No other live connection is bound to this user.
    pub first_for_user: bool,
}

/// Tracks live connections, their bound identities, and per-room
/// membership sets.
pub struct RoomRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
    rooms: DashMap<RoomKey, HashSet<ConnectionId>>,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    /// Register a new live connection. Called once when the socket is
    /// established, before any event is dispatched for it.
    pub fn register(&self, conn_id: ConnectionId, sender: ConnectionSender) {
        self.connections.insert(
            conn_id,
            ConnectionEntry {
                user_id: None,
                sender,
                rooms: HashSet::new(),
            },
        );
    }

    /// Bind (or rebind) a user identity to a connection. Idempotent; a
    /// rebind on the same link is tolerated.
    pub fn bind(&self, conn_id: ConnectionId, user_id: &str) -> BindOutcome {
        let newly_bound = match self.connections.get_mut(&conn_id) {
            Some(mut entry) => {
                let was_unbound = entry.user_id.as_deref() != Some(user_id);
                entry.user_id = Some(user_id.to_string());
                was_unbound
            }
            None => false,
        };
        let first_for_user = newly_bound
            && !self
                .connections
                .iter()
                .any(|e| e.key() != &conn_id && e.value().user_id.as_deref() == Some(user_id));
        BindOutcome {
            newly_bound,
            first_for_user,
        }
    }

    pub fn bound_user(&self, conn_id: ConnectionId) -> Option<String> {
        self.connections.get(&conn_id)?.user_id.clone()
    }

    /// Add a connection to a room. Returns true if it was not already a
    /// member (joins are idempotent).
    pub fn join(&self, conn_id: ConnectionId, room: RoomKey) -> bool {
        let newly = match self.connections.get_mut(&conn_id) {
            Some(mut entry) => entry.rooms.insert(room),
            None => return false,
        };
        if newly {
            self.rooms.entry(room).or_default().insert(conn_id);
        }
        newly
    }

    /// Remove a connection from a room. Returns true if it was a member;
    /// leaving a room not currently joined is a no-op.
    pub fn leave(&self, conn_id: ConnectionId, room: RoomKey) -> bool {
        let was_member = match self.connections.get_mut(&conn_id) {
            Some(mut entry) => entry.rooms.remove(&room),
            None => false,
        };
        if was_member {
            if let Some(mut set) = self.rooms.get_mut(&room) {
                set.remove(&conn_id);
            }
            self.rooms.remove_if(&room, |_, set| set.is_empty());
        }
        was_member
    }

    pub fn is_joined(&self, conn_id: ConnectionId, room: RoomKey) -> bool {
        self.connections
            .get(&conn_id)
            .map(|entry| entry.rooms.contains(&room))
            .unwrap_or(false)
    }

    /// Purge a connection entirely, returning its bound user and every room
    /// it occupied. This is the sole cleanup mechanism when a client
    /// disappears without explicit leave events.
    pub fn disconnect(&self, conn_id: ConnectionId) -> (Option<String>, Vec<RoomKey>) {
        let Some((_, entry)) = self.connections.remove(&conn_id) else {
            return (None, Vec::new());
        };
        let rooms: Vec<RoomKey> = entry.rooms.into_iter().collect();
        for room in &rooms {
            if let Some(mut set) = self.rooms.get_mut(room) {
                set.remove(&conn_id);
            }
            self.rooms.remove_if(room, |_, set| set.is_empty());
        }
        (entry.user_id, rooms)
    }

    /// Whether any live connection bound to this user is in the room.
    pub fn user_in_room(&self, user_id: &str, room: RoomKey) -> bool {
        self.targets(room).into_iter().any(|conn_id| {
            self.connections
                .get(&conn_id)
                .map(|e| e.user_id.as_deref() == Some(user_id))
                .unwrap_or(false)
        })
    }

    /// Whether any live connection is bound to this user.
    pub fn user_has_connections(&self, user_id: &str) -> bool {
        self.connections
            .iter()
            .any(|e| e.value().user_id.as_deref() == Some(user_id))
    }

    /// Snapshot of the connections currently in a room.
    pub fn targets(&self, room: RoomKey) -> Vec<ConnectionId> {
        self.rooms
            .get(&room)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn sender_for(&self, conn_id: ConnectionId) -> Option<ConnectionSender> {
        self.connections.get(&conn_id).map(|e| e.sender.clone())
    }

    /// Fan out a message to every connection in a room, optionally excluding
    /// one (the triggering connection).
    pub fn send_to_room(
        &self,
        room: RoomKey,
        msg: axum::extract::ws::Message,
        except: Option<ConnectionId>,
    ) {
        for conn_id in self.targets(room) {
            if Some(conn_id) == except {
                continue;
            }
            if let Some(entry) = self.connections.get(&conn_id) {
                let _ = entry.sender.send(msg.clone());
            }
        }
    }

    /// Push to every connection bound to a user (a user may have multiple
    /// tabs/devices).
    pub fn send_to_user(&self, user_id: &str, msg: axum::extract::ws::Message) {
        for entry in self.connections.iter() {
            if entry.value().user_id.as_deref() == Some(user_id) {
                let _ = entry.value().sender.send(msg.clone());
            }
        }
    }

    pub fn send_to_connection(&self, conn_id: ConnectionId, msg: axum::extract::ws::Message) {
        if let Some(entry) = self.connections.get(&conn_id) {
            let _ = entry.sender.send(msg);
        }
    }

    /// Platform-wide broadcast (status changes, group lifecycle events).
    pub fn send_to_all(&self, msg: axum::extract::ws::Message) {
        for entry in self.connections.iter() {
            let _ = entry.value().sender.send(msg.clone());
        }
    }

    /// Force a user's connections out of a room without their cooperation
    /// (moderation). Returns the connections that were removed.
    pub fn evict_user_from_room(&self, user_id: &str, room: RoomKey) -> Vec<ConnectionId> {
        let conn_ids: Vec<ConnectionId> = self
            .connections
            .iter()
            .filter(|e| e.value().user_id.as_deref() == Some(user_id))
            .map(|e| *e.key())
            .collect();
        let mut evicted = Vec::new();
        for conn_id in conn_ids {
            if self.leave(conn_id, room) {
                evicted.push(conn_id);
            }
        }
        evicted
    }
}
