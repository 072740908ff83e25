//! Shared application state threaded through axum handlers and the WS
//! actors.

use std::sync::Arc;

use crate::db::DbPool;
use crate::rooms::RoomRegistry;
use crate::video::VideoState;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub rooms: Arc<RoomRegistry>,
    pub video: VideoState,
}

impl AppState {
    pub fn new(db: DbPool) -> Self {
        Self {
            db,
            rooms: Arc::new(RoomRegistry::new()),
            video: VideoState::new(),
        }
    }
}
