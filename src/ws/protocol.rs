//! The realtime wire contract: JSON text frames of the shape
//! `{"event": "<name>", "data": {...}}`, and the dispatch from inbound
//! client events to the core's handlers.

use serde::{Deserialize, Serialize};

use crate::chat::presence::PresenceStatus;
use crate::chat::{fanout, presence};
use crate::error::CoreError;
use crate::moderation::{ban, promote, requests};
use crate::roles::Role;
use crate::rooms::membership;
use crate::rooms::ConnectionId;
use crate::state::AppState;
use crate::video::signaling;

/// Message content discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            _ => None,
        }
    }
}

/// A user's public profile as carried on presence events.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicProfile {
    pub id: String,
    pub username: String,
    pub avatar: Option<String>,
    pub role: Role,
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupInfo {
    pub id: i64,
    pub name: String,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
    pub id: i64,
    pub group_id: i64,
    pub name: String,
}

/// Inbound client intents.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    #[serde(rename_all = "camelCase")]
    JoinGroup { group_id: i64, user_id: String },
    #[serde(rename_all = "camelCase")]
    LeaveGroup { group_id: i64, user_id: String },
    #[serde(rename_all = "camelCase")]
    JoinChannel { channel_id: i64, user_id: String },
    #[serde(rename_all = "camelCase")]
    LeaveChannel { channel_id: i64, user_id: String },
    #[serde(rename_all = "camelCase")]
    SendMessage {
        channel_id: i64,
        sender_id: String,
        #[serde(default)]
        sender_name: Option<String>,
        content: String,
        #[serde(rename = "type")]
        kind: MessageKind,
        #[serde(default)]
        profile_img: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    BanUser {
        channel_id: i64,
        user_id: String,
        #[serde(default)]
        group_id: Option<i64>,
    },
    #[serde(rename_all = "camelCase")]
    PromoteUser {
        user_id: String,
        role: Role,
        group_id: i64,
    },
    #[serde(rename_all = "camelCase")]
    RequestJoinGroup { user_id: String, group_id: i64 },
    #[serde(rename_all = "camelCase")]
    ApproveRequest { user_id: String, group_id: i64 },
    #[serde(rename_all = "camelCase")]
    RejectRequest { user_id: String, group_id: i64 },
    #[serde(rename_all = "camelCase")]
    UpdateStatus {
        user_id: String,
        status: PresenceStatus,
    },
    #[serde(rename_all = "camelCase")]
    PeerIdReady {
        channel_id: i64,
        user_id: String,
        peer_id: String,
    },
    #[serde(rename_all = "camelCase")]
    JoinVideo { channel_id: i64, user_id: String },
    #[serde(rename_all = "camelCase")]
    LeaveVideo { channel_id: i64, user_id: String },
}

/// Outbound server events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    UserJoined { channel_id: i64, user: PublicProfile },
    #[serde(rename_all = "camelCase")]
    UserLeft { channel_id: i64, user_id: String },
    #[serde(rename_all = "camelCase")]
    ReceiveMessage {
        id: i64,
        channel_id: i64,
        sender_id: String,
        sender_name: String,
        profile_img: Option<String>,
        content: String,
        #[serde(rename = "type")]
        kind: MessageKind,
        timestamp: i64,
        seq: i64,
    },
    #[serde(rename_all = "camelCase")]
    UserBanned { channel_id: i64, user_id: String },
    #[serde(rename_all = "camelCase")]
    UserBannedFromChannel { channel_id: i64, user_id: String },
    #[serde(rename_all = "camelCase")]
    GroupRequest { user_id: String, group_id: i64 },
    #[serde(rename_all = "camelCase")]
    RequestApproved { user_id: String, group_id: i64 },
    #[serde(rename_all = "camelCase")]
    RequestRejected { user_id: String, group_id: i64 },
    #[serde(rename_all = "camelCase")]
    UserPromoted {
        user_id: String,
        role: Role,
        group_id: i64,
    },
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        user_id: String,
        status: PresenceStatus,
    },
    #[serde(rename_all = "camelCase")]
    PeerIdReady {
        channel_id: i64,
        user_id: String,
        peer_id: String,
        display_name: String,
        avatar: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    UserJoinedVideo {
        channel_id: i64,
        user_id: String,
        display_name: String,
    },
    #[serde(rename_all = "camelCase")]
    UserLeftVideo { channel_id: i64, user_id: String },
    #[serde(rename_all = "camelCase")]
    ChannelCreated { channel: ChannelInfo },
    #[serde(rename_all = "camelCase")]
    ChannelDeleted { channel_id: i64, group_id: i64 },
    #[serde(rename_all = "camelCase")]
    GroupCreated { group: GroupInfo },
    #[serde(rename_all = "camelCase")]
    GroupModified { group: GroupInfo },
    #[serde(rename_all = "camelCase")]
    GroupDeleted { group_id: i64 },
    #[serde(rename_all = "camelCase")]
    UserDeleted { user_id: String },
    #[serde(rename_all = "camelCase")]
    Error { code: u16, message: String },
}

/// Handle one inbound text frame: decode the event and dispatch it.
/// A frame that fails to decode is answered with an `error` event; there is
/// no other response channel back to the emitter.
pub async fn handle_text(text: &str, conn_id: ConnectionId, state: &AppState) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(%conn_id, error = %e, "Failed to decode client event");
            crate::ws::broadcast::emit_to_connection(
                &state.rooms,
                conn_id,
                &error_event(&CoreError::invalid(format!("malformed event: {}", e))),
            );
            return;
        }
    };
    dispatch(event, conn_id, state).await;
}

async fn dispatch(event: ClientEvent, conn_id: ConnectionId, state: &AppState) {
    match event {
        ClientEvent::JoinGroup { group_id, user_id } => {
            membership::join_group(state, conn_id, group_id, &user_id).await;
        }
        ClientEvent::LeaveGroup { group_id, user_id } => {
            membership::leave_group(state, conn_id, group_id, &user_id).await;
        }
        ClientEvent::JoinChannel {
            channel_id,
            user_id,
        } => {
            membership::join_channel(state, conn_id, channel_id, &user_id).await;
        }
        ClientEvent::LeaveChannel {
            channel_id,
            user_id,
        } => {
            membership::leave_channel(state, conn_id, channel_id, &user_id).await;
        }
        ClientEvent::SendMessage {
            channel_id,
            sender_id,
            sender_name: _,
            content,
            kind,
            profile_img,
        } => {
            fanout::send_message(state, conn_id, channel_id, &sender_id, kind, content, profile_img)
                .await;
        }
        ClientEvent::BanUser {
            channel_id,
            user_id,
            group_id: _,
        } => {
            ban::handle_ban_event(state, conn_id, channel_id, &user_id).await;
        }
        ClientEvent::PromoteUser {
            user_id,
            role,
            group_id,
        } => {
            promote::handle_promote_event(state, conn_id, &user_id, role, group_id).await;
        }
        ClientEvent::RequestJoinGroup { user_id, group_id } => {
            requests::handle_request_event(state, conn_id, &user_id, group_id).await;
        }
        ClientEvent::ApproveRequest { user_id, group_id } => {
            requests::handle_approve_event(state, conn_id, &user_id, group_id).await;
        }
        ClientEvent::RejectRequest { user_id, group_id } => {
            requests::handle_reject_event(state, conn_id, &user_id, group_id).await;
        }
        ClientEvent::UpdateStatus { user_id, status } => {
            presence::update_status(state, conn_id, &user_id, status).await;
        }
        ClientEvent::PeerIdReady {
            channel_id,
            user_id,
            peer_id,
        } => {
            signaling::peer_id_ready(state, conn_id, channel_id, &user_id, &peer_id).await;
        }
        ClientEvent::JoinVideo {
            channel_id,
            user_id,
        } => {
            signaling::join_video(state, conn_id, channel_id, &user_id).await;
        }
        ClientEvent::LeaveVideo {
            channel_id,
            user_id,
        } => {
            signaling::leave_video(state, conn_id, channel_id, &user_id).await;
        }
    }
}

/// Build the client-visible `error` event for a dropped intent.
pub fn error_event(err: &CoreError) -> ServerEvent {
    ServerEvent::Error {
        code: err.code(),
        message: err.to_string(),
    }
}
