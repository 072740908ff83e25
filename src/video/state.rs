//! In-memory registry of who is in which channel's video call.

use std::sync::Arc;

use dashmap::DashMap;

/// One user in a call. The peer id arrives separately from the join (the
/// client announces it once its media stack is ready), so it is optional
/// until then.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallParticipant {
    pub user_id: String,
    pub peer_id: Option<String>,
    pub display_name: String,
    pub avatar: Option<String>,
}

/// Active call participants keyed by channel id. Entirely transient.
#[derive(Debug, Clone, Default)]
pub struct VideoState {
    calls: Arc<DashMap<i64, Vec<CallParticipant>>>,
}

impl VideoState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a user joining a channel's call. Re-joining refreshes the
    /// display metadata but keeps any previously announced peer id.
    pub fn join(&self, channel_id: i64, user_id: &str, display_name: &str, avatar: Option<String>) {
        let mut entry = self.calls.entry(channel_id).or_default();
        if let Some(p) = entry.iter_mut().find(|p| p.user_id == user_id) {
            p.display_name = display_name.to_string();
            p.avatar = avatar;
        } else {
            entry.push(CallParticipant {
                user_id: user_id.to_string(),
                peer_id: None,
                display_name: display_name.to_string(),
                avatar,
            });
        }
    }

    /// Attach (or replace) a user's announced peer id, inserting the
    /// participant if the announcement races ahead of the join.
    pub fn announce_peer(
        &self,
        channel_id: i64,
        user_id: &str,
        peer_id: &str,
        display_name: &str,
        avatar: Option<String>,
    ) {
        let mut entry = self.calls.entry(channel_id).or_default();
        if let Some(p) = entry.iter_mut().find(|p| p.user_id == user_id) {
            p.peer_id = Some(peer_id.to_string());
            p.display_name = display_name.to_string();
            p.avatar = avatar;
        } else {
            entry.push(CallParticipant {
                user_id: user_id.to_string(),
                peer_id: Some(peer_id.to_string()),
                display_name: display_name.to_string(),
                avatar,
            });
        }
    }

    /// Remove a user from one channel's call. Returns true if they were in
    /// it. Empty calls are dropped from the map.
    pub fn leave(&self, channel_id: i64, user_id: &str) -> bool {
        let mut removed = false;
        if let Some(mut entry) = self.calls.get_mut(&channel_id) {
            let before = entry.len();
            entry.retain(|p| p.user_id != user_id);
            removed = entry.len() != before;
        }
        self.calls.remove_if(&channel_id, |_, v| v.is_empty());
        removed
    }

    /// Remove a user from every call they are in, returning the affected
    /// channel ids. Used on disconnect.
    pub fn leave_all(&self, user_id: &str) -> Vec<i64> {
        let channels: Vec<i64> = self
            .calls
            .iter()
            .filter(|e| e.value().iter().any(|p| p.user_id == user_id))
            .map(|e| *e.key())
            .collect();
        for channel_id in &channels {
            self.leave(*channel_id, user_id);
        }
        channels
    }

    pub fn participants(&self, channel_id: i64) -> Vec<CallParticipant> {
        self.calls
            .get(&channel_id)
            .map(|e| e.clone())
            .unwrap_or_default()
    }
}
