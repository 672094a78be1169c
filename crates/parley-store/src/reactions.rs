use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use parley_shared::{EventBatch, MessageId, Reaction, ReactionEvent, UserId};

/// Reactions of the messages in one window, grouped by emoji.
#[derive(Debug, Clone, Default)]
pub struct ReactionIndex {
    by_message: HashMap<MessageId, BTreeMap<String, BTreeSet<UserId>>>,
}

impl ReactionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reaction. Returns `false` if that user already reacted with
    /// that emoji.
    pub fn add(&mut self, reaction: &Reaction) -> bool {
        self.by_message
            .entry(reaction.message_id.clone())
            .or_default()
            .entry(reaction.emoji.clone())
            .or_default()
            .insert(reaction.user_id.clone())
    }

    /// Remove a reaction. Returns `true` if it was present.
    pub fn remove(&mut self, reaction: &Reaction) -> bool {
        let Some(emojis) = self.by_message.get_mut(&reaction.message_id) else {
            return false;
        };
        let Some(users) = emojis.get_mut(&reaction.emoji) else {
            return false;
        };

        let removed = users.remove(&reaction.user_id);
        if users.is_empty() {
            emojis.remove(&reaction.emoji);
        }
        if emojis.is_empty() {
            self.by_message.remove(&reaction.message_id);
        }
        removed
    }

    /// Fold a batch; returns the messages whose reactions changed.
    pub fn apply(&mut self, batch: &EventBatch<ReactionEvent>) -> BTreeSet<MessageId> {
        let mut changed = BTreeSet::new();
        for event in batch.events() {
            let (reaction, did_change) = match event {
                ReactionEvent::Added(r) => (r, self.add(r)),
                ReactionEvent::Removed(r) => (r, self.remove(r)),
            };
            if did_change {
                changed.insert(reaction.message_id.clone());
            }
        }
        if !changed.is_empty() {
            debug!(messages = changed.len(), "Applied reaction events");
        }
        changed
    }

    /// `(emoji, count)` pairs for one message, ordered by emoji.
    pub fn counts(&self, message_id: &MessageId) -> Vec<(String, usize)> {
        self.by_message
            .get(message_id)
            .map(|emojis| {
                emojis
                    .iter()
                    .map(|(emoji, users)| (emoji.clone(), users.len()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Drop reactions of a deleted message.
    pub fn forget(&mut self, message_id: &MessageId) {
        self.by_message.remove(message_id);
    }
}
