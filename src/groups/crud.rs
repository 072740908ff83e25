//! Group endpoints. Mutations emit a realtime event alongside the HTTP
//! response so connected clients converge without polling.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::db::{self, store};
use crate::error::CoreError;
use crate::roles::{authorize, Action, Role};
use crate::state::AppState;
use crate::users::crud::UserResponse;
use crate::ws::broadcast;
use crate::ws::protocol::{GroupInfo, ServerEvent};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupResponse {
    pub id: i64,
    pub name: String,
    pub created_by: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupRequest {
    pub name: String,
    pub acting_user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateGroupRequest {
    pub name: String,
    pub acting_user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteGroupRequest {
    pub acting_user_id: String,
}

/// GET /api/groups
pub async fn list_groups(
    State(state): State<AppState>,
) -> Result<Json<Vec<GroupResponse>>, (StatusCode, String)> {
    let rows = db::query(&state.db, store::list_groups)
        .await
        .map_err(|e| e.into_http())?;
    Ok(Json(rows.into_iter().map(into_response).collect()))
}

/// GET /api/groups/{id}
pub async fn get_group(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
) -> Result<Json<GroupResponse>, (StatusCode, String)> {
    let row = db::query(&state.db, move |conn| {
        store::get_group(conn, group_id)?
            .ok_or_else(|| CoreError::not_found(format!("group {}", group_id)))
    })
    .await
    .map_err(|e| e.into_http())?;
    Ok(Json(into_response(row)))
}

/// GET /api/groups/{id}/users
pub async fn group_users(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
) -> Result<Json<Vec<UserResponse>>, (StatusCode, String)> {
    let rows = db::query(&state.db, move |conn| {
        store::get_group(conn, group_id)?
            .ok_or_else(|| CoreError::not_found(format!("group {}", group_id)))?;
        store::group_users(conn, group_id)
    })
    .await
    .map_err(|e| e.into_http())?;
    Ok(Json(
        rows.into_iter().map(crate::users::crud::into_response).collect(),
    ))
}

/// POST /api/groups
///
/// Any known user may create a group. The creator becomes a member and is
/// promoted to group admin; super admins are added as members of every new
/// group so they can always moderate it.
pub async fn create_group(
    State(state): State<AppState>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupResponse>), (StatusCode, String)> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "group name cannot be empty".to_string(),
        ));
    }

    let actor = req.acting_user_id.clone();
    let row = db::query(&state.db, move |conn| {
        let creator = store::get_user(conn, &actor)?
            .ok_or_else(|| CoreError::not_found(format!("user {}", actor)))?;
        if !authorize(Action::CreateGroup, creator.role, false) {
            return Err(CoreError::forbidden(format!(
                "user {} may not create groups",
                creator.id
            )));
        }
        let group = store::create_group(conn, &name, Some(&creator.id))?;
        store::add_user_to_group(conn, &creator.id, group.id)?;
        store::promote_user_role(conn, &creator.id, Role::GroupAdmin)?;
        for user in store::list_users(conn)? {
            if user.role == Role::SuperAdmin {
                store::add_user_to_group(conn, &user.id, group.id)?;
            }
        }
        Ok(group)
    })
    .await
    .map_err(|e| e.into_http())?;

    let event = ServerEvent::GroupCreated {
        group: group_info(&row),
    };
    broadcast::emit_to_all(&state.rooms, &event);
    tracing::info!(group_id = row.id, name = %row.name, "Group created");

    Ok((StatusCode::CREATED, Json(into_response(row))))
}

/// PUT /api/groups/{id}
pub async fn update_group(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    Json(req): Json<UpdateGroupRequest>,
) -> Result<Json<GroupResponse>, (StatusCode, String)> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "group name cannot be empty".to_string(),
        ));
    }

    let actor = req.acting_user_id.clone();
    let row = db::query(&state.db, move |conn| {
        let group = store::get_group(conn, group_id)?
            .ok_or_else(|| CoreError::not_found(format!("group {}", group_id)))?;
        authorize_manage(conn, &actor, group.id)?;
        store::update_group(conn, group_id, Some(&name), None)
    })
    .await
    .map_err(|e| e.into_http())?;

    let event = ServerEvent::GroupModified {
        group: group_info(&row),
    };
    broadcast::emit_to_all(&state.rooms, &event);

    Ok(Json(into_response(row)))
}

/// DELETE /api/groups/{id} — cascades to channels, memberships, messages,
/// bans, and pending requests.
pub async fn delete_group(
    State(state): State<AppState>,
    Path(group_id): Path<i64>,
    Json(req): Json<DeleteGroupRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let actor = req.acting_user_id.clone();
    db::query(&state.db, move |conn| {
        let group = store::get_group(conn, group_id)?
            .ok_or_else(|| CoreError::not_found(format!("group {}", group_id)))?;
        authorize_manage(conn, &actor, group.id)?;
        store::delete_group(conn, group_id)?;
        Ok(())
    })
    .await
    .map_err(|e| e.into_http())?;

    let event = ServerEvent::GroupDeleted { group_id };
    broadcast::emit_to_all(&state.rooms, &event);
    tracing::info!(group_id, "Group deleted");

    Ok(StatusCode::NO_CONTENT)
}

fn authorize_manage(
    conn: &rusqlite::Connection,
    acting_user_id: &str,
    group_id: i64,
) -> Result<(), CoreError> {
    let acting = store::get_user(conn, acting_user_id)
        .and_then(|u| {
            u.ok_or_else(|| CoreError::forbidden(format!("unknown acting user {}", acting_user_id)))
        })?;
    let in_scope = store::user_in_group(conn, &acting.id, group_id)?;
    if !authorize(Action::ManageGroup, acting.role, in_scope) {
        return Err(CoreError::forbidden(format!(
            "user {} may not manage group {}",
            acting.id, group_id
        )));
    }
    Ok(())
}

fn into_response(row: store::GroupRow) -> GroupResponse {
    GroupResponse {
        id: row.id,
        name: row.name,
        created_by: row.created_by,
    }
}

fn group_info(row: &store::GroupRow) -> GroupInfo {
    GroupInfo {
        id: row.id,
        name: row.name.clone(),
        created_by: row.created_by.clone(),
    }
}
