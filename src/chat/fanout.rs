//! Message fan-out: validate, enrich, persist, broadcast — in that order.
//!
//! Persistence is synchronous on this path. A message is never broadcast
//! until its row (with the channel-scoped sequence number and the server
//! timestamp) is committed, so every receiver and every later history read
//! agree on ordering.

use crate::db::{self, store};
use crate::error::CoreError;
use crate::rooms::{ConnectionId, RoomKey};
use crate::state::AppState;
use crate::ws::broadcast;
use crate::ws::protocol::{self, MessageKind, ServerEvent};

/// Upper bound on text message content, in bytes.
pub const MAX_TEXT_LENGTH: usize = 4000;
/// Upper bound on image payloads (data URLs), in bytes.
pub const MAX_IMAGE_LENGTH: usize = 2 * 1024 * 1024;

/// Handle an inbound sendMessage event end to end. Failures are reported to
/// the sending connection only; the room never sees a rejected message.
pub async fn send_message(
    state: &AppState,
    conn_id: ConnectionId,
    channel_id: i64,
    sender_id: &str,
    kind: MessageKind,
    content: String,
    profile_img: Option<String>,
) {
    crate::rooms::membership::bind_identity(state, conn_id, sender_id).await;

    match deliver(state, channel_id, sender_id, kind, content, profile_img).await {
        Ok(event) => {
            broadcast::emit_to_room(&state.rooms, RoomKey::Channel(channel_id), &event, None);
        }
        Err(e) => {
            tracing::warn!(%conn_id, channel_id, sender_id, error = %e, "Message rejected");
            broadcast::emit_to_connection(&state.rooms, conn_id, &protocol::error_event(&e));
        }
    }
}

async fn deliver(
    state: &AppState,
    channel_id: i64,
    sender_id: &str,
    kind: MessageKind,
    content: String,
    profile_img: Option<String>,
) -> Result<ServerEvent, CoreError> {
    let content = validate_content(kind, content)?;

    let sender = sender_id.to_string();
    let row = db::query(&state.db, move |conn| {
        store::get_channel(conn, channel_id)?
            .ok_or_else(|| CoreError::not_found(format!("channel {}", channel_id)))?;
        let user = store::get_user(conn, &sender)?
            .ok_or_else(|| CoreError::not_found(format!("user {}", sender)))?;
        if store::is_channel_banned(conn, channel_id, &user.id)? {
            return Err(CoreError::forbidden(format!(
                "user {} is banned from channel {}",
                user.id, channel_id
            )));
        }
        // The store profile is authoritative for the display name; the
        // client-supplied image is only a fallback for users without one.
        let avatar = user.avatar.clone().or(profile_img);
        store::append_message(
            conn,
            channel_id,
            &user.id,
            &user.username,
            avatar.as_deref(),
            kind.as_str(),
            &content,
        )
    })
    .await?;

    Ok(ServerEvent::ReceiveMessage {
        id: row.id,
        channel_id: row.channel_id,
        sender_id: row.sender_id,
        sender_name: row.sender_name,
        profile_img: row.avatar,
        content: row.content,
        kind,
        timestamp: row.ts_millis,
        seq: row.seq,
    })
}

fn validate_content(kind: MessageKind, content: String) -> Result<String, CoreError> {
    match kind {
        MessageKind::Text => {
            let trimmed = content.trim();
            if trimmed.is_empty() {
                return Err(CoreError::invalid("message content is empty"));
            }
            if trimmed.len() > MAX_TEXT_LENGTH {
                return Err(CoreError::invalid(format!(
                    "message content exceeds {} bytes",
                    MAX_TEXT_LENGTH
                )));
            }
            Ok(trimmed.to_string())
        }
        MessageKind::Image => {
            if content.is_empty() {
                return Err(CoreError::invalid("image payload is empty"));
            }
            if content.len() > MAX_IMAGE_LENGTH {
                return Err(CoreError::invalid(format!(
                    "image payload exceeds {} bytes",
                    MAX_IMAGE_LENGTH
                )));
            }
            Ok(content)
        }
    }
}
