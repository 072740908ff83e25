use rusqlite::Connection;

use crate::db::store;
use crate::error::CoreError;
use crate::roles::Role;

/// Seed starter data on an empty database: one super admin and two demo
/// groups with a handful of channels. Idempotent — skipped if any user
/// exists.
pub fn seed_starter_data(conn: &Connection) -> Result<(), CoreError> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
        .map_err(CoreError::from)?;
    if count > 0 {
        return Ok(());
    }

    let admin = store::create_user(conn, "1", "super", Some("super@mail.com"), None, Role::SuperAdmin)?;

    for (group_name, channels) in [
        ("Tulip", &["General", "News", "Trip"][..]),
        ("Calendula", &["General", "Games"][..]),
    ] {
        let group = store::create_group(conn, group_name, Some(&admin.id))?;
        store::add_user_to_group(conn, &admin.id, group.id)?;
        for channel_name in channels {
            store::create_channel(conn, group.id, channel_name)?;
        }
    }

    tracing::info!("Seeded starter groups and super admin");
    Ok(())
}
