use axum::routing::{get, post};
use axum::Router;

use crate::channels::crud as channel_crud;
use crate::chat::history;
use crate::groups::crud as group_crud;
use crate::moderation::{ban, promote, requests};
use crate::state::AppState;
use crate::users::crud as user_crud;
use crate::ws::handler as ws_handler;

async fn health() -> &'static str {
    "ok"
}

/// Build the full axum Router: REST surface plus the realtime socket.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Users
        .route("/api/users", get(user_crud::list_users).post(user_crud::create_user))
        .route(
            "/api/users/{id}",
            get(user_crud::get_user).delete(user_crud::delete_user),
        )
        // Groups
        .route(
            "/api/groups",
            get(group_crud::list_groups).post(group_crud::create_group),
        )
        .route(
            "/api/groups/{id}",
            get(group_crud::get_group)
                .put(group_crud::update_group)
                .delete(group_crud::delete_group),
        )
        .route("/api/groups/{id}/users", get(group_crud::group_users))
        .route(
            "/api/groups/{id}/users/{user_id}/promote",
            post(promote::promote_user_handler),
        )
        // Channels
        .route("/api/channels", get(channel_crud::list_channels))
        .route(
            "/api/groups/{id}/channels",
            get(channel_crud::list_group_channels).post(channel_crud::create_channel),
        )
        .route(
            "/api/channels/{id}",
            get(channel_crud::get_channel).delete(channel_crud::delete_channel),
        )
        .route("/api/channels/{id}/messages", get(history::channel_history))
        .route("/api/channels/{id}/ban", post(ban::ban_user_handler))
        // Join requests
        .route("/api/join-requests", get(requests::list_all_requests))
        .route(
            "/api/groups/{id}/join-requests",
            get(requests::list_group_requests).post(requests::create_request_handler),
        )
        .route(
            "/api/groups/{id}/join-requests/{user_id}/approve",
            post(requests::approve_request_handler),
        )
        .route(
            "/api/groups/{id}/join-requests/{user_id}/reject",
            post(requests::reject_request_handler),
        )
        // Realtime
        .route("/ws", get(ws_handler::ws_upgrade))
        .route("/health", get(health))
        .with_state(state)
}
