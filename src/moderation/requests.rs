//! Group join requests: a user asks to join a group, a group admin (or
//! super admin) approves or rejects. Requests are unique per (user, group)
//! and consumed exactly once on resolution.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::{self, store};
use crate::error::CoreError;
use crate::roles::{authorize, Action};
use crate::rooms::{ConnectionId, RoomKey};
use crate::state::AppState;
use crate::ws::broadcast;
use crate::ws::protocol::ServerEvent;

/// File a join request. Admin-role users never need one (they can be placed
/// directly), existing members cannot re-request, and duplicates are
/// rejected. On success the request is announced platform-wide so any
/// admin's view picks it up.
pub async fn request_join(state: &AppState, user_id: &str, group_id: i64) -> Result<(), CoreError> {
    let uid = user_id.to_string();
    db::query(&state.db, move |conn| {
        let user = store::get_user(conn, &uid)?
            .ok_or_else(|| CoreError::not_found(format!("user {}", uid)))?;
        if user.role.is_admin() {
            return Err(CoreError::forbidden(
                "admin users do not file join requests",
            ));
        }
        store::get_group(conn, group_id)?
            .ok_or_else(|| CoreError::not_found(format!("group {}", group_id)))?;
        if store::user_in_group(conn, &user.id, group_id)? {
            return Err(CoreError::invalid(format!(
                "user {} is already a member of group {}",
                user.id, group_id
            )));
        }
        if !store::create_join_request(conn, &user.id, group_id)? {
            return Err(CoreError::invalid(format!(
                "user {} already has a pending request for group {}",
                user.id, group_id
            )));
        }
        Ok(())
    })
    .await?;

    let event = ServerEvent::GroupRequest {
        user_id: user_id.to_string(),
        group_id,
    };
    broadcast::emit_to_all(&state.rooms, &event);
    tracing::info!(user_id, group_id, "Join request filed");
    Ok(())
}

/// Approve a pending request: consume it, add the membership, and notify
/// both the group room and the requester's own connections.
pub async fn approve_request(
    state: &AppState,
    target_user_id: &str,
    group_id: i64,
    acting_user_id: &str,
) -> Result<(), CoreError> {
    resolve_request(state, target_user_id, group_id, acting_user_id, true).await
}

/// Reject a pending request: consume it without granting membership.
pub async fn reject_request(
    state: &AppState,
    target_user_id: &str,
    group_id: i64,
    acting_user_id: &str,
) -> Result<(), CoreError> {
    resolve_request(state, target_user_id, group_id, acting_user_id, false).await
}

async fn resolve_request(
    state: &AppState,
    target_user_id: &str,
    group_id: i64,
    acting_user_id: &str,
    approve: bool,
) -> Result<(), CoreError> {
    let target = target_user_id.to_string();
    let actor = acting_user_id.to_string();
    db::query(&state.db, move |conn| {
        let acting = store::get_user(conn, &actor)?
            .ok_or_else(|| CoreError::forbidden(format!("unknown acting user {}", actor)))?;
        let in_scope = store::user_in_group(conn, &acting.id, group_id)?;
        if !authorize(Action::ApproveRequest, acting.role, in_scope) {
            return Err(CoreError::forbidden(format!(
                "user {} may not resolve requests for group {}",
                acting.id, group_id
            )));
        }
        if !store::take_join_request(conn, &target, group_id)? {
            return Err(CoreError::not_found(format!(
                "no pending request for user {} in group {}",
                target, group_id
            )));
        }
        if approve {
            store::add_user_to_group(conn, &target, group_id)?;
        }
        Ok(())
    })
    .await?;

    let event = if approve {
        ServerEvent::RequestApproved {
            user_id: target_user_id.to_string(),
            group_id,
        }
    } else {
        ServerEvent::RequestRejected {
            user_id: target_user_id.to_string(),
            group_id,
        }
    };
    broadcast::emit_to_room(&state.rooms, RoomKey::Group(group_id), &event, None);
    broadcast::emit_to_user(&state.rooms, target_user_id, &event);
    tracing::info!(
        target = target_user_id,
        group_id,
        actor = acting_user_id,
        approved = approve,
        "Join request resolved"
    );
    Ok(())
}

// --- WS entry points ---

pub async fn handle_request_event(
    state: &AppState,
    conn_id: ConnectionId,
    user_id: &str,
    group_id: i64,
) {
    crate::rooms::membership::bind_identity(state, conn_id, user_id).await;
    if let Err(e) = request_join(state, user_id, group_id).await {
        tracing::warn!(user_id, group_id, error = %e, "Join request rejected");
    }
}

pub async fn handle_approve_event(
    state: &AppState,
    conn_id: ConnectionId,
    target_user_id: &str,
    group_id: i64,
) {
    let Some(acting) = state.rooms.bound_user(conn_id) else {
        tracing::warn!(%conn_id, group_id, "Approval from unidentified connection dropped");
        return;
    };
    if let Err(e) = approve_request(state, target_user_id, group_id, &acting).await {
        tracing::warn!(target = target_user_id, actor = %acting, error = %e, "Approval rejected");
    }
}

pub async fn handle_reject_event(
    state: &AppState,
    conn_id: ConnectionId,
    target_user_id: &str,
    group_id: i64,
) {
    let Some(acting) = state.rooms.bound_user(conn_id) else {
        tracing::warn!(%conn_id, group_id, "Rejection from unidentified connection dropped");
        return;
    };
    if let Err(e) = reject_request(state, target_user_id, group_id, &acting).await {
        tracing::warn!(target = target_user_id, actor = %acting, error = %e, "Rejection failed");
    }
}

// --- REST surface ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequestResponse {
    pub user_id: String,
    pub group_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJoinRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub acting_user_id: String,
}

/// GET /api/join-requests — every pending request, platform-wide.
pub async fn list_all_requests(
    State(state): State<AppState>,
) -> Result<Json<Vec<JoinRequestResponse>>, (StatusCode, String)> {
    let rows = db::query(&state.db, |conn| store::list_join_requests(conn, None))
        .await
        .map_err(|e| e.into_http())?;
    Ok(Json(rows.into_iter().map(into_response).collect()))
}

/// GET /api/groups/{id}/join-requests
pub async fn list_group_requests(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
) -> Result<Json<Vec<JoinRequestResponse>>, (StatusCode, String)> {
    let rows = db::query(&state.db, move |conn| {
        store::get_group(conn, group_id)?
            .ok_or_else(|| CoreError::not_found(format!("group {}", group_id)))?;
        store::list_join_requests(conn, Some(group_id))
    })
    .await
    .map_err(|e| e.into_http())?;
    Ok(Json(rows.into_iter().map(into_response).collect()))
}

/// POST /api/groups/{id}/join-requests
pub async fn create_request_handler(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    Json(req): Json<CreateJoinRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    request_join(&state, &req.user_id, group_id)
        .await
        .map_err(|e| e.into_http())?;
    Ok(StatusCode::CREATED)
}

/// POST /api/groups/{id}/join-requests/{userId}/approve
pub async fn approve_request_handler(
    State(state): State<AppState>,
    Path((group_id, user_id)): Path<(i64, String)>,
    Json(req): Json<ResolveRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    approve_request(&state, &user_id, group_id, &req.acting_user_id)
        .await
        .map_err(|e| e.into_http())?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/groups/{id}/join-requests/{userId}/reject
pub async fn reject_request_handler(
    State(state): State<AppState>,
    Path((group_id, user_id)): Path<(i64, String)>,
    Json(req): Json<ResolveRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    reject_request(&state, &user_id, group_id, &req.acting_user_id)
        .await
        .map_err(|e| e.into_http())?;
    Ok(StatusCode::NO_CONTENT)
}

fn into_response(row: store::JoinRequestRow) -> JoinRequestResponse {
    JoinRequestResponse {
        user_id: row.user_id,
        group_id: row.group_id,
    }
}
