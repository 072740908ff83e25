//! User endpoints. Creation here is a provisioning surface (registration
//! proper lives outside this service); listing feeds member pickers and
//! presence views.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{self, store};
use crate::error::CoreError;
use crate::roles::Role;
use crate::state::AppState;
use crate::ws::broadcast;
use crate::ws::protocol::ServerEvent;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub role: Role,
    pub status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub role: Option<Role>,
}

/// GET /api/users
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserResponse>>, (StatusCode, String)> {
    let rows = db::query(&state.db, store::list_users)
        .await
        .map_err(|e| e.into_http())?;
    Ok(Json(rows.into_iter().map(into_response).collect()))
}

/// GET /api/users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserResponse>, (StatusCode, String)> {
    let uid = user_id.clone();
    let row = db::query(&state.db, move |conn| {
        store::get_user(conn, &uid)?.ok_or_else(|| CoreError::not_found(format!("user {}", uid)))
    })
    .await
    .map_err(|e| e.into_http())?;
    Ok(Json(into_response(row)))
}

/// POST /api/users
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), (StatusCode, String)> {
    let username = req.username.trim().to_string();
    if username.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "username cannot be empty".to_string(),
        ));
    }

    let id = Uuid::now_v7().to_string();
    let role = req.role.unwrap_or(Role::User);
    let email = req.email;
    let avatar = req.avatar;
    let row = db::query(&state.db, move |conn| {
        store::create_user(
            conn,
            &id,
            &username,
            email.as_deref(),
            avatar.as_deref(),
            role,
        )
    })
    .await
    .map_err(|e| e.into_http())?;

    Ok((StatusCode::CREATED, Json(into_response(row))))
}

/// DELETE /api/users/{id}
///
/// Account removal: memberships, bans, and pending requests go with the
/// account; message history keeps the sender's rows. Announced
/// platform-wide so rosters converge.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let uid = user_id.clone();
    db::query(&state.db, move |conn| {
        if !store::delete_user(conn, &uid)? {
            return Err(CoreError::not_found(format!("user {}", uid)));
        }
        Ok(())
    })
    .await
    .map_err(|e| e.into_http())?;

    let event = ServerEvent::UserDeleted {
        user_id: user_id.clone(),
    };
    broadcast::emit_to_all(&state.rooms, &event);
    tracing::info!(user_id = %user_id, "User deleted");

    Ok(StatusCode::NO_CONTENT)
}

pub fn into_response(row: store::UserRow) -> UserResponse {
    UserResponse {
        id: row.id,
        username: row.username,
        email: row.email,
        avatar: row.avatar,
        role: row.role,
        status: row.status,
    }
}
