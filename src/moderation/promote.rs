//! Role promotion. Only super admins may promote, promotion never
//! downgrades, and promoting someone into a group's admin seat also makes
//! them a member and clears any pending join request for that group.

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

pub async fn promote_user(
    state: &AppState,
    target_user_id: &str,
    role: Role,
    group_id: i64,
    acting_user_id: &str,
) -> Result<(), CoreError> {
    if role == Role::User {
        return Err(CoreError::invalid("cannot promote to a non-elevated role"));
    }

    let target = target_user_id.to_string();
    let actor = acting_user_id.to_string();
    db::query(&state.db, move |conn| {
        let acting = store::get_user(conn, &actor)?
            .ok_or_else(|| CoreError::forbidden(format!("unknown acting user {}", actor)))?;
        if !authorize(Action::PromoteUser, acting.role, true) {
            return Err(CoreError::forbidden(format!(
                "user {} may not promote",
                acting.id
            )));
        }
        store::get_group(conn, group_id)?
            .ok_or_else(|| CoreError::not_found(format!("group {}", group_id)))?;
        let target_row = store::get_user(conn, &target)?
            .ok_or_else(|| CoreError::not_found(format!("user {}", target)))?;
        store::promote_user_role(conn, &target_row.id, role)?;
        store::add_user_to_group(conn, &target_row.id, group_id)?;
        // An elevated user no longer needs a pending request for the group.
        store::take_join_request(conn, &target_row.id, group_id)?;
        Ok(())
    })
    .await?;

    let event = ServerEvent::UserPromoted {
        user_id: target_user_id.to_string(),
        role,
        group_id,
    };
    broadcast::emit_to_room(&state.rooms, RoomKey::Group(group_id), &event, None);
    broadcast::emit_to_user(&state.rooms, target_user_id, &event);
    tracing::info!(
        target = target_user_id,
        ?role,
        group_id,
        actor = acting_user_id,
        "User promoted"
    );
    Ok(())
}

pub async fn handle_promote_event(
    state: &AppState,
    conn_id: ConnectionId,
    target_user_id: &str,
    role: Role,
    group_id: i64,
) {
    let Some(acting) = state.rooms.bound_user(conn_id) else {
        tracing::warn!(%conn_id, group_id, "Promotion from unidentified connection dropped");
        return;
    };
    if let Err(e) = promote_user(state, target_user_id, role, group_id, &acting).await {
        tracing::warn!(target = target_user_id, actor = %acting, error = %e, "Promotion rejected");
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoteRequest {
    pub role: Role,
    pub acting_user_id: String,
}

/// POST /api/groups/{id}/users/{userId}/promote
pub async fn promote_user_handler(
    State(state): State<AppState>,
    Path((group_id, user_id)): Path<(i64, String)>,
    Json(req): Json<PromoteRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    promote_user(&state, &user_id, req.role, group_id, &req.acting_user_id)
        .await
        .map_err(|e| e.into_http())?;
    Ok(StatusCode::NO_CONTENT)
}
