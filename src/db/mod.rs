pub mod migrations;
pub mod seed;
pub mod store;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::CoreError;

/// Type alias for the shared database connection.
/// rusqlite is synchronous — we wrap in Arc<Mutex> for thread safety
/// with tokio::task::spawn_blocking for DB operations.
pub type DbPool = Arc<Mutex<Connection>>;

/// Initialize the SQLite database: create data directory if needed,
/// open (or create) the database file, enable WAL mode, and run migrations.
pub fn init_db(data_dir: &str) -> Result<DbPool, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(data_dir)?;

    let db_path = Path::new(data_dir).join("huddle.db");
    let mut conn = Connection::open(&db_path)?;

    // WAL mode for better concurrent read performance
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    let migrations = migrations::migrations();
    migrations.to_latest(&mut conn)?;

    tracing::info!("Database initialized at {}", db_path.display());

    Ok(Arc::new(Mutex::new(conn)))
}

/// Run a blocking DB operation off the async runtime and await its result.
/// This is the synchronous persistence path (message append, moderation).
pub async fn query<T, F>(db: &DbPool, f: F) -> Result<T, CoreError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T, CoreError> + Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|_| CoreError::Storage("DB lock poisoned".to_string()))?;
        f(&conn)
    })
    .await
    .map_err(|e| CoreError::Storage(format!("task join: {}", e)))?
}

/// Issue a fire-and-forget persistence write: the in-memory room state has
/// already been updated and realtime traffic does not wait on storage.
/// Failures are logged under `op` so operators can detect drift between
/// in-memory and durable membership; there is no automatic retry.
pub fn write_detached<F>(db: &DbPool, op: &'static str, f: F)
where
    F: FnOnce(&Connection) -> Result<(), CoreError> + Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || {
        let conn = match db.lock() {
            Ok(conn) => conn,
            Err(_) => {
                tracing::error!(op, "Detached write dropped: DB lock poisoned");
                return;
            }
        };
        if let Err(e) = f(&conn) {
            tracing::error!(op, error = %e, "Detached write failed");
        }
    });
}
