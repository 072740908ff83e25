use axum::http::StatusCode;

/// Error taxonomy for the realtime core and the REST surface.
///
/// On the WebSocket path these are handled locally: the offending event is
/// dropped and logged, since there is no request/response channel back to the
/// emitter. REST handlers surface them as HTTP statuses via `into_http`.
#[derive(Debug)]
pub enum CoreError {
    /// Authorization failure — banned user joining, non-admin moderating.
    Forbidden(String),
    /// Malformed or empty message content/type.
    InvalidPayload(String),
    /// Channel/group/user id that no longer exists in the store.
    NotFound(String),
    /// Persistence failure (lock poisoned, SQL error, task join).
    Storage(String),
}

impl std::fmt::Display for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::Forbidden(msg) => write!(f, "forbidden: {}", msg),
            CoreError::InvalidPayload(msg) => write!(f, "invalid payload: {}", msg),
            CoreError::NotFound(msg) => write!(f, "not found: {}", msg),
            CoreError::Storage(msg) => write!(f, "storage error: {}", msg),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => {
                CoreError::NotFound("row not found".to_string())
            }
            other => CoreError::Storage(other.to_string()),
        }
    }
}

impl CoreError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        CoreError::Forbidden(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        CoreError::InvalidPayload(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        CoreError::NotFound(msg.into())
    }

    /// Numeric code carried on the WS `error` event.
    pub fn code(&self) -> u16 {
        match self {
            CoreError::InvalidPayload(_) => 400,
            CoreError::Forbidden(_) => 403,
            CoreError::NotFound(_) => 404,
            CoreError::Storage(_) => 500,
        }
    }

    /// Map to an HTTP response for REST handlers.
    pub fn into_http(self) -> (StatusCode, String) {
        let status = match &self {
            CoreError::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string())
    }
}
