//! All SQL lives here. Plain synchronous functions over `&Connection`;
//! callers go through `db::query` (awaited) or `db::write_detached`
//! (fire-and-forget) depending on the path.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::CoreError;
use crate::roles::Role;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub role: Role,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct GroupRow {
    pub id: i64,
    pub name: String,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChannelRow {
    pub id: i64,
    pub group_id: i64,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub channel_id: i64,
    pub sender_id: String,
    pub sender_name: String,
    pub avatar: Option<String>,
    pub kind: String,
    pub content: String,
    pub seq: i64,
    pub ts_millis: i64,
}

#[derive(Debug, Clone)]
pub struct JoinRequestRow {
    pub user_id: String,
    pub group_id: i64,
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    let role_str: String = row.get(4)?;
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        avatar: row.get(3)?,
        role: Role::from_str(&role_str).unwrap_or(Role::User),
        status: row.get(5)?,
    })
}

const USER_COLS: &str = "id, username, email, avatar, role, status";

// --- Users ---

pub fn create_user(
    conn: &Connection,
    id: &str,
    username: &str,
    email: Option<&str>,
    avatar: Option<&str>,
    role: Role,
) -> Result<UserRow, CoreError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO users (id, username, email, avatar, role, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'offline', ?6)",
        params![id, username, email, avatar, role.as_str(), now],
    )?;
    get_user(conn, id)?.ok_or_else(|| CoreError::Storage("user vanished after insert".into()))
}

pub fn get_user(conn: &Connection, id: &str) -> Result<Option<UserRow>, CoreError> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()?;
    Ok(row)
}

pub fn list_users(conn: &Connection) -> Result<Vec<UserRow>, CoreError> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLS} FROM users ORDER BY username"))?;
    let users = stmt
        .query_map([], user_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(users)
}

pub fn set_user_status(conn: &Connection, user_id: &str, status: &str) -> Result<(), CoreError> {
    let n = conn.execute(
        "UPDATE users SET status = ?1 WHERE id = ?2",
        params![status, user_id],
    )?;
    if n == 0 {
        return Err(CoreError::not_found(format!("user {}", user_id)));
    }
    Ok(())
}

/// Raise a user's role. Promotion never downgrades: setting GROUP_ADMIN on a
/// SUPER_ADMIN is a no-op.
pub fn promote_user_role(conn: &Connection, user_id: &str, role: Role) -> Result<(), CoreError> {
    let current = get_user(conn, user_id)?
        .ok_or_else(|| CoreError::not_found(format!("user {}", user_id)))?
        .role;
    if role > current {
        conn.execute(
            "UPDATE users SET role = ?1 WHERE id = ?2",
            params![role.as_str(), user_id],
        )?;
    }
    Ok(())
}

/// Remove an account. Group membership cascades via FK; channel membership,
/// bans, and pending requests are swept in the same transaction. The message
/// log keeps its historical sender columns.
pub fn delete_user(conn: &Connection, id: &str) -> Result<bool, CoreError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM channel_members WHERE user_id = ?1", params![id])?;
    tx.execute("DELETE FROM channel_bans WHERE user_id = ?1", params![id])?;
    tx.execute("DELETE FROM join_requests WHERE user_id = ?1", params![id])?;
    let n = tx.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    tx.commit()?;
    Ok(n > 0)
}

// --- Group membership ---

pub fn user_groups(conn: &Connection, user_id: &str) -> Result<Vec<i64>, CoreError> {
    let mut stmt =
        conn.prepare("SELECT group_id FROM group_members WHERE user_id = ?1 ORDER BY group_id")?;
    let ids = stmt
        .query_map(params![user_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

pub fn user_in_group(conn: &Connection, user_id: &str, group_id: i64) -> Result<bool, CoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM group_members WHERE user_id = ?1 AND group_id = ?2",
        params![user_id, group_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn add_user_to_group(conn: &Connection, user_id: &str, group_id: i64) -> Result<(), CoreError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT OR IGNORE INTO group_members (group_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
        params![group_id, user_id, now],
    )?;
    Ok(())
}

pub fn group_users(conn: &Connection, group_id: i64) -> Result<Vec<UserRow>, CoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLS} FROM users
         INNER JOIN group_members gm ON gm.user_id = users.id
         WHERE gm.group_id = ?1
         ORDER BY gm.joined_at"
    ))?;
    let users = stmt
        .query_map(params![group_id], user_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(users)
}

// --- Groups ---

pub fn create_group(
    conn: &Connection,
    name: &str,
    created_by: Option<&str>,
) -> Result<GroupRow, CoreError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO groups (name, created_by, created_at) VALUES (?1, ?2, ?3)",
        params![name, created_by, now],
    )?;
    let id = conn.last_insert_rowid();
    Ok(GroupRow {
        id,
        name: name.to_string(),
        created_by: created_by.map(|s| s.to_string()),
    })
}

pub fn get_group(conn: &Connection, id: i64) -> Result<Option<GroupRow>, CoreError> {
    let row = conn
        .query_row(
            "SELECT id, name, created_by FROM groups WHERE id = ?1",
            params![id],
            |row| {
                Ok(GroupRow {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_by: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn list_groups(conn: &Connection) -> Result<Vec<GroupRow>, CoreError> {
    let mut stmt = conn.prepare("SELECT id, name, created_by FROM groups ORDER BY id")?;
    let groups = stmt
        .query_map([], |row| {
            Ok(GroupRow {
                id: row.get(0)?,
                name: row.get(1)?,
                created_by: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(groups)
}

pub fn update_group(
    conn: &Connection,
    id: i64,
    name: Option<&str>,
    created_by: Option<&str>,
) -> Result<GroupRow, CoreError> {
    if let Some(name) = name {
        conn.execute("UPDATE groups SET name = ?1 WHERE id = ?2", params![name, id])?;
    }
    if let Some(created_by) = created_by {
        conn.execute(
            "UPDATE groups SET created_by = ?1 WHERE id = ?2",
            params![created_by, id],
        )?;
    }
    get_group(conn, id)?.ok_or_else(|| CoreError::not_found(format!("group {}", id)))
}

/// Delete a group. Channels, memberships, messages, bans, and pending join
/// requests cascade via foreign keys.
pub fn delete_group(conn: &Connection, id: i64) -> Result<bool, CoreError> {
    let n = conn.execute("DELETE FROM groups WHERE id = ?1", params![id])?;
    Ok(n > 0)
}

// --- Channels ---

pub fn create_channel(
    conn: &Connection,
    group_id: i64,
    name: &str,
) -> Result<ChannelRow, CoreError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO channels (group_id, name, created_at) VALUES (?1, ?2, ?3)",
        params![group_id, name, now],
    )?;
    Ok(ChannelRow {
        id: conn.last_insert_rowid(),
        group_id,
        name: name.to_string(),
    })
}

pub fn get_channel(conn: &Connection, id: i64) -> Result<Option<ChannelRow>, CoreError> {
    let row = conn
        .query_row(
            "SELECT id, group_id, name FROM channels WHERE id = ?1",
            params![id],
            |row| {
                Ok(ChannelRow {
                    id: row.get(0)?,
                    group_id: row.get(1)?,
                    name: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

pub fn list_channels(conn: &Connection, group_id: Option<i64>) -> Result<Vec<ChannelRow>, CoreError> {
    let map = |row: &rusqlite::Row<'_>| {
        Ok(ChannelRow {
            id: row.get(0)?,
            group_id: row.get(1)?,
            name: row.get(2)?,
        })
    };
    let channels = match group_id {
        Some(gid) => {
            let mut stmt = conn
                .prepare("SELECT id, group_id, name FROM channels WHERE group_id = ?1 ORDER BY id")?;
            let rows = stmt.query_map(params![gid], map)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
        None => {
            let mut stmt = conn.prepare("SELECT id, group_id, name FROM channels ORDER BY id")?;
            let rows = stmt.query_map([], map)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
    };
    Ok(channels)
}

pub fn delete_channel(conn: &Connection, id: i64) -> Result<bool, CoreError> {
    let n = conn.execute("DELETE FROM channels WHERE id = ?1", params![id])?;
    Ok(n > 0)
}

// --- Channel membership and bans ---

pub fn channel_members(conn: &Connection, channel_id: i64) -> Result<Vec<String>, CoreError> {
    let mut stmt = conn
        .prepare("SELECT user_id FROM channel_members WHERE channel_id = ?1 ORDER BY joined_at")?;
    let members = stmt
        .query_map(params![channel_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(members)
}

pub fn channel_banned(conn: &Connection, channel_id: i64) -> Result<Vec<String>, CoreError> {
    let mut stmt =
        conn.prepare("SELECT user_id FROM channel_bans WHERE channel_id = ?1 ORDER BY created_at")?;
    let banned = stmt
        .query_map(params![channel_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(banned)
}

pub fn is_channel_banned(
    conn: &Connection,
    channel_id: i64,
    user_id: &str,
) -> Result<bool, CoreError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM channel_bans WHERE channel_id = ?1 AND user_id = ?2",
        params![channel_id, user_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn add_channel_member(
    conn: &Connection,
    channel_id: i64,
    user_id: &str,
) -> Result<(), CoreError> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT OR IGNORE INTO channel_members (channel_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
        params![channel_id, user_id, now],
    )?;
    Ok(())
}

pub fn remove_channel_member(
    conn: &Connection,
    channel_id: i64,
    user_id: &str,
) -> Result<(), CoreError> {
    conn.execute(
        "DELETE FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
        params![channel_id, user_id],
    )?;
    Ok(())
}

/// Ban a user from a channel: add to the banned set and remove from the
/// member set in one transaction, preserving the invariant that a user is
/// never in both.
pub fn ban_channel_member(
    conn: &Connection,
    channel_id: i64,
    user_id: &str,
    banned_by: &str,
) -> Result<(), CoreError> {
    let now = Utc::now().to_rfc3339();
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT OR IGNORE INTO channel_bans (channel_id, user_id, banned_by, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![channel_id, user_id, banned_by, now],
    )?;
    tx.execute(
        "DELETE FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
        params![channel_id, user_id],
    )?;
    tx.commit()?;
    Ok(())
}

// --- Messages ---

/// Append a message with a server-assigned timestamp and the next sequence
/// number for its channel. The sequence read and the insert run in one
/// transaction, so per-channel order matches insertion order.
pub fn append_message(
    conn: &Connection,
    channel_id: i64,
    sender_id: &str,
    sender_name: &str,
    avatar: Option<&str>,
    kind: &str,
    content: &str,
) -> Result<MessageRow, CoreError> {
    let now = Utc::now();
    let ts_millis = now.timestamp_millis();
    let now_rfc = now.to_rfc3339();

    let tx = conn.unchecked_transaction()?;
    let seq: i64 = tx.query_row(
        "SELECT COALESCE(MAX(seq), 0) + 1 FROM messages WHERE channel_id = ?1",
        params![channel_id],
        |row| row.get(0),
    )?;
    tx.execute(
        "INSERT INTO messages (channel_id, sender_id, sender_name, avatar, kind, content, seq, ts_millis, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![channel_id, sender_id, sender_name, avatar, kind, content, seq, ts_millis, now_rfc],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;

    Ok(MessageRow {
        id,
        channel_id,
        sender_id: sender_id.to_string(),
        sender_name: sender_name.to_string(),
        avatar: avatar.map(|s| s.to_string()),
        kind: kind.to_string(),
        content: content.to_string(),
        seq,
        ts_millis,
    })
}

/// Paginated history, newest first: messages with seq < `before`.
pub fn channel_messages(
    conn: &Connection,
    channel_id: i64,
    before: i64,
    limit: u32,
) -> Result<Vec<MessageRow>, CoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, channel_id, sender_id, sender_name, avatar, kind, content, seq, ts_millis
         FROM messages
         WHERE channel_id = ?1 AND seq < ?2
         ORDER BY seq DESC
         LIMIT ?3",
    )?;
    let messages = stmt
        .query_map(params![channel_id, before, limit], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                channel_id: row.get(1)?,
                sender_id: row.get(2)?,
                sender_name: row.get(3)?,
                avatar: row.get(4)?,
                kind: row.get(5)?,
                content: row.get(6)?,
                seq: row.get(7)?,
                ts_millis: row.get(8)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(messages)
}

// --- Join requests ---

/// Create a pending join request. Returns false if an identical request
/// already exists (idempotent).
pub fn create_join_request(
    conn: &Connection,
    user_id: &str,
    group_id: i64,
) -> Result<bool, CoreError> {
    let now = Utc::now().to_rfc3339();
    let n = conn.execute(
        "INSERT OR IGNORE INTO join_requests (user_id, group_id, created_at) VALUES (?1, ?2, ?3)",
        params![user_id, group_id, now],
    )?;
    Ok(n > 0)
}

/// Remove a pending join request, returning whether it existed.
pub fn take_join_request(
    conn: &Connection,
    user_id: &str,
    group_id: i64,
) -> Result<bool, CoreError> {
    let n = conn.execute(
        "DELETE FROM join_requests WHERE user_id = ?1 AND group_id = ?2",
        params![user_id, group_id],
    )?;
    Ok(n > 0)
}

pub fn list_join_requests(
    conn: &Connection,
    group_id: Option<i64>,
) -> Result<Vec<JoinRequestRow>, CoreError> {
    let map = |row: &rusqlite::Row<'_>| {
        Ok(JoinRequestRow {
            user_id: row.get(0)?,
            group_id: row.get(1)?,
        })
    };
    let requests = match group_id {
        Some(gid) => {
            let mut stmt = conn.prepare(
                "SELECT user_id, group_id FROM join_requests WHERE group_id = ?1 ORDER BY created_at",
            )?;
            let rows = stmt.query_map(params![gid], map)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
        None => {
            let mut stmt =
                conn.prepare("SELECT user_id, group_id FROM join_requests ORDER BY created_at")?;
            let rows = stmt.query_map([], map)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
    };
    Ok(requests)
}
