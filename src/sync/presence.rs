//! Presence tracking for peers editing the same page.
//!
//! Presence is ephemeral: records are created when a peer joins, updated by
//! cursor/selection/typing events and dropped when the peer leaves or the
//! session disconnects. Nothing here is persisted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::protocol::{Position, UserPresence};
use crate::document::{BlockId, UserId};

/// Presence state for one connected peer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub user_id: UserId,
    pub name: String,
    pub avatar: Option<String>,
    /// Locally assigned display colour (hex)
    pub color: String,
    pub position: Option<Position>,
    /// Block the peer has selected or is typing in
    pub block_id: Option<BlockId>,
    pub is_typing: bool,
    pub joined_at_ms: i64,
    pub last_active_ms: i64,
}

impl PresenceRecord {
    pub fn new(presence: &UserPresence, color: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let mut record = Self {
            user_id: presence.user_id.clone(),
            name: presence.user.name.clone(),
            avatar: presence.user.avatar.clone(),
            color: color.into(),
            position: None,
            block_id: None,
            is_typing: false,
            joined_at_ms: now,
            last_active_ms: now,
        };
        record.apply(presence);
        record
    }

    /// Merge the optional fields carried by a presence payload
    fn apply(&mut self, presence: &UserPresence) {
        if !presence.user.name.is_empty() {
            self.name = presence.user.name.clone();
        }
        if presence.user.avatar.is_some() {
            self.avatar = presence.user.avatar.clone();
        }
        if let Some(position) = presence.position {
            self.position = Some(position);
        }
        if let Some(block_id) = &presence.block_id {
            self.block_id = Some(block_id.clone());
        }
        if let Some(is_typing) = presence.is_typing {
            self.is_typing = is_typing;
        }
        self.touch();
    }

    pub fn touch(&mut self) {
        self.last_active_ms = chrono::Utc::now().timestamp_millis();
    }
}

/// All peers currently present on the joined page
#[derive(Debug, Clone, Default)]
pub struct PresenceSet {
    peers: HashMap<UserId, PresenceRecord>,
}

impl PresenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a peer; a peer already present is updated instead
    pub fn join(&mut self, presence: &UserPresence) {
        match self.peers.get_mut(&presence.user_id) {
            Some(record) => record.apply(presence),
            None => {
                let record = PresenceRecord::new(presence, generate_peer_color());
                self.peers.insert(presence.user_id.clone(), record);
            }
        }
    }

    pub fn leave(&mut self, user_id: &str) -> Option<PresenceRecord> {
        self.peers.remove(user_id)
    }

    /// Replace the whole set. Peers already known keep their colour.
    pub fn replace_all(&mut self, users: &[UserPresence]) {
        let mut previous = std::mem::take(&mut self.peers);

        for presence in users {
            let record = match previous.remove(&presence.user_id) {
                Some(mut record) => {
                    record.apply(presence);
                    record
                }
                None => PresenceRecord::new(presence, generate_peer_color()),
            };
            self.peers.insert(presence.user_id.clone(), record);
        }
    }

    /// Apply a cursor, selection or typing update. Unknown peers are added.
    pub fn update(&mut self, presence: &UserPresence) {
        self.join(presence);
    }

    pub fn get(&self, user_id: &str) -> Option<&PresenceRecord> {
        self.peers.get(user_id)
    }

    /// All peers, ordered by join time
    pub fn all(&self) -> Vec<PresenceRecord> {
        let mut peers: Vec<PresenceRecord> = self.peers.values().cloned().collect();
        peers.sort_by(|a, b| {
            a.joined_at_ms
                .cmp(&b.joined_at_ms)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        peers
    }

    /// Peers currently typing in `block_id`
    pub fn typing_in(&self, block_id: &str) -> Vec<&PresenceRecord> {
        self.peers
            .values()
            .filter(|p| p.is_typing && p.block_id.as_deref() == Some(block_id))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }
}

/// Pick a random display colour for a peer
pub fn generate_peer_color() -> String {
    use rand::Rng;
    let colors = [
        "#3b82f6", // blue
        "#ef4444", // red
        "#22c55e", // green
        "#f59e0b", // amber
        "#8b5cf6", // violet
        "#ec4899", // pink
        "#06b6d4", // cyan
        "#f97316", // orange
        "#14b8a6", // teal
        "#a855f7", // purple
        "#84cc16", // lime
        "#6366f1", // indigo
    ];
    let idx = rand::thread_rng().gen_range(0..colors.len());
    colors[idx].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::UserSummary;

    fn presence(id: &str, name: &str) -> UserPresence {
        UserPresence::new(UserSummary::new(id, name))
    }

    #[test]
    fn test_join_and_leave() {
        let mut set = PresenceSet::new();
        set.join(&presence("u1", "Alice"));
        set.join(&presence("u2", "Bob"));

        assert_eq!(set.len(), 2);
        assert!(set.get("u1").unwrap().color.starts_with('#'));

        let left = set.leave("u1").unwrap();
        assert_eq!(left.name, "Alice");
        assert!(set.get("u1").is_none());
        assert!(set.leave("u1").is_none());
    }

    #[test]
    fn test_join_twice_keeps_one_record() {
        let mut set = PresenceSet::new();
        set.join(&presence("u1", "Alice"));
        let color = set.get("u1").unwrap().color.clone();

        set.join(&presence("u1", "Alice B."));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("u1").unwrap().name, "Alice B.");
        assert_eq!(set.get("u1").unwrap().color, color);
    }

    #[test]
    fn test_replace_all_keeps_known_colours() {
        let mut set = PresenceSet::new();
        set.join(&presence("u1", "Alice"));
        set.join(&presence("gone", "Zed"));
        let color = set.get("u1").unwrap().color.clone();

        set.replace_all(&[presence("u1", "Alice"), presence("u3", "Cara")]);

        assert_eq!(set.len(), 2);
        assert!(set.get("gone").is_none());
        assert_eq!(set.get("u1").unwrap().color, color);
    }

    #[test]
    fn test_cursor_and_typing_updates() {
        let mut set = PresenceSet::new();
        set.join(&presence("u1", "Alice"));

        let mut cursor = presence("u1", "Alice");
        cursor.position = Some(Position { x: 10.0, y: 20.0 });
        set.update(&cursor);

        let mut typing = presence("u1", "Alice");
        typing.block_id = Some("b1".into());
        typing.is_typing = Some(true);
        set.update(&typing);

        let record = set.get("u1").unwrap();
        assert_eq!(record.position, Some(Position { x: 10.0, y: 20.0 }));
        assert_eq!(set.typing_in("b1").len(), 1);

        let mut stopped = presence("u1", "Alice");
        stopped.is_typing = Some(false);
        set.update(&stopped);
        assert!(set.typing_in("b1").is_empty());
    }

    #[test]
    fn test_generate_color() {
        let color = generate_peer_color();
        assert!(color.starts_with('#'));
        assert_eq!(color.len(), 7);
    }
}
