//! Online status of chat participants.
//!
//! Keeps the latest presence per user as pushed by the server. Users the
//! server reports as gone are dropped.

use std::collections::HashMap;

use tracing::debug;

use parley_shared::{EventBatch, Presence, PresenceEvent, UserId};

#[derive(Debug, Clone, Default)]
pub struct PresenceMap {
    users: HashMap<UserId, Presence>,
}

impl PresenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a presence update. An update older than the one held (by
    /// `last_seen`) is ignored. Returns whether anything changed.
    pub fn update(&mut self, presence: Presence) -> bool {
        if let Some(current) = self.users.get(&presence.user_id) {
            if current == &presence {
                return false;
            }
            if let (Some(held), Some(incoming)) = (current.last_seen, presence.last_seen) {
                if incoming < held {
                    debug!(user = %presence.user_id, "Ignoring stale presence update");
                    return false;
                }
            }
        }
        self.users.insert(presence.user_id.clone(), presence);
        true
    }

    pub fn remove(&mut self, user_id: &UserId) -> bool {
        self.users.remove(user_id).is_some()
    }

    /// Fold a batch; returns how many users changed.
    pub fn apply(&mut self, batch: &EventBatch<PresenceEvent>) -> usize {
        batch
            .events()
            .filter(|event| match event {
                PresenceEvent::Updated(presence) => self.update(presence.clone()),
                PresenceEvent::Gone { user_id } => self.remove(user_id),
            })
            .count()
    }

    pub fn get(&self, user_id: &UserId) -> Option<&Presence> {
        self.users.get(user_id)
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.users.get(user_id).is_some_and(|p| p.online)
    }

    /// Ids of every user currently online, sorted.
    pub fn online_users(&self) -> Vec<UserId> {
        let mut online: Vec<UserId> = self
            .users
            .values()
            .filter(|p| p.online)
            .map(|p| p.user_id.clone())
            .collect();
        online.sort();
        online
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
