//! Cache of reply targets that live outside the loaded window.
//!
//! Lookups are additive for the lifetime of one chat session. An id that was
//! looked up and not found stays "attempted" and is never requested again in
//! the same session; a failed request (network error) is forgotten so that
//! an explicit retry can ask again.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use parley_shared::{Message, MessageId};

#[derive(Debug, Clone, Default)]
pub struct ReplyCache {
    resolved: HashMap<MessageId, Message>,
    /// Requested at least once in this session (in flight or done).
    attempted: HashSet<MessageId>,
}

impl ReplyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.resolved.get(id)
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    /// Whether `id` was requested and the server did not know it.
    pub fn is_known_missing(&self, id: &MessageId) -> bool {
        self.attempted.contains(id) && !self.resolved.contains_key(id)
    }

    /// Pick the ids that still need a request and mark them attempted.
    /// The result feeds exactly one batched lookup.
    pub fn begin_lookup<'a, I>(&mut self, ids: I) -> Vec<MessageId>
    where
        I: IntoIterator<Item = &'a MessageId>,
    {
        let wanted: BTreeSet<&MessageId> = ids
            .into_iter()
            .filter(|id| !self.attempted.contains(*id))
            .collect();

        let batch: Vec<MessageId> = wanted.into_iter().cloned().collect();
        self.attempted.extend(batch.iter().cloned());
        batch
    }

    /// Store the results of a lookup. Anything the server returned that was
    /// not asked for is kept too; it is still a valid message.
    pub fn complete_lookup(&mut self, found: Vec<Message>) {
        debug!(found = found.len(), "Reply lookup completed");
        for message in found {
            self.attempted.insert(message.id.clone());
            self.resolved.insert(message.id.clone(), message);
        }
    }

    /// The request for `ids` failed; allow them to be asked for again.
    pub fn abort_lookup(&mut self, ids: &[MessageId]) {
        for id in ids {
            if !self.resolved.contains_key(id) {
                self.attempted.remove(id);
            }
        }
    }

    /// Keep a resolved target current when it is edited.
    pub fn refresh(&mut self, message: &Message) {
        if let Some(slot) = self.resolved.get_mut(&message.id) {
            *slot = message.clone();
        }
    }
}
