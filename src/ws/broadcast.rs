//! Fan-out helpers: serialize a `ServerEvent` once, then deliver through
//! the room registry's send primitives.

use axum::extract::ws::Message;

use crate::rooms::{ConnectionId, RoomKey, RoomRegistry};
use crate::ws::protocol::ServerEvent;

/// Serialize an event to a WS text frame. Serialization of our own enums
/// cannot realistically fail; a failure is logged and the event dropped.
pub fn to_message(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize server event");
            None
        }
    }
}

/// Deliver an event to every connection in a room, optionally excluding the
/// triggering connection.
pub fn emit_to_room(
    registry: &RoomRegistry,
    room: RoomKey,
    event: &ServerEvent,
    except: Option<ConnectionId>,
) {
    if let Some(msg) = to_message(event) {
        registry.send_to_room(room, msg, except);
    }
}

/// Deliver an event to all of a user's live connections.
pub fn emit_to_user(registry: &RoomRegistry, user_id: &str, event: &ServerEvent) {
    if let Some(msg) = to_message(event) {
        registry.send_to_user(user_id, msg);
    }
}

/// Deliver an event to one connection.
pub fn emit_to_connection(registry: &RoomRegistry, conn_id: ConnectionId, event: &ServerEvent) {
    if let Some(msg) = to_message(event) {
        registry.send_to_connection(conn_id, msg);
    }
}

/// Platform-wide broadcast.
pub fn emit_to_all(registry: &RoomRegistry, event: &ServerEvent) {
    if let Some(msg) = to_message(event) {
        registry.send_to_all(msg);
    }
}
