//! The paginated message window of one chat.

use std::collections::HashSet;

use tracing::debug;

use parley_shared::{ChatId, Message, MessageId};

use crate::error::{Result, StoreError};

/// Ordered, id-unique messages of one chat, in server page order.
#[derive(Debug, Clone)]
pub struct MessageWindow {
    chat_id: ChatId,
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
    next_page: u32,
    has_more: bool,
}

/// What a page merge did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMerge {
    pub page: u32,
    pub added: usize,
    pub has_more: bool,
}

impl MessageWindow {
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            messages: Vec::new(),
            ids: HashSet::new(),
            next_page: 0,
            has_more: true,
        }
    }

    pub fn chat_id(&self) -> &ChatId {
        &self.chat_id
    }

    /// Index of the page that may be merged next.
    pub fn next_page(&self) -> u32 {
        self.next_page
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.ids.contains(id)
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        if !self.ids.contains(id) {
            return None;
        }
        self.messages.iter().find(|m| &m.id == id)
    }

    /// The message with the latest `created_at`; the last one held wins ties.
    pub fn newest(&self) -> Option<&Message> {
        self.messages
            .iter()
            .fold(None, |best: Option<&Message>, m| match best {
                Some(b) if b.created_at > m.created_at => Some(b),
                _ => Some(m),
            })
    }

    /// Drop everything and start over at page 0 for `chat_id`.
    pub fn reset(&mut self, chat_id: ChatId) {
        debug!(from = %self.chat_id, to = %chat_id, "Resetting message window");
        *self = Self::new(chat_id);
    }

    /// Merge a fetched page. Page 0 replaces the window, later pages append.
    /// Ids already held are skipped; within `fetched` the first occurrence
    /// wins. A short or empty page means there is nothing further back.
    pub fn merge_page(
        &mut self,
        page: u32,
        fetched: Vec<Message>,
        page_size: u32,
    ) -> Result<PageMerge> {
        if page != self.next_page {
            return Err(StoreError::OutOfSequence {
                expected: self.next_page,
                got: page,
            });
        }

        if page == 0 {
            self.messages.clear();
            self.ids.clear();
        }

        let fetched_len = fetched.len();
        let mut added = 0;
        for message in fetched {
            if self.ids.insert(message.id.clone()) {
                self.messages.push(message);
                added += 1;
            }
        }

        self.has_more = fetched_len > 0 && fetched_len >= page_size as usize;
        self.next_page = page + 1;

        debug!(
            chat = %self.chat_id,
            page,
            fetched = fetched_len,
            added,
            has_more = self.has_more,
            "Merged page"
        );

        Ok(PageMerge {
            page,
            added,
            has_more: self.has_more,
        })
    }

    /// Append a message, or replace the held copy when the id is known.
    /// Returns `true` when the message is new to the window.
    pub fn upsert(&mut self, message: Message) -> bool {
        if self.ids.contains(&message.id) {
            self.replace(message);
            false
        } else {
            self.ids.insert(message.id.clone());
            self.messages.push(message);
            true
        }
    }

    /// Replace the held message with the same id. Returns `false` when the id
    /// is not in the window.
    pub fn replace(&mut self, message: Message) -> bool {
        match self.messages.iter_mut().find(|m| m.id == message.id) {
            Some(slot) => {
                *slot = message;
                true
            }
            None => false,
        }
    }

    /// Remove every message with `id`. Returns how many were removed.
    pub fn remove(&mut self, id: &MessageId) -> usize {
        if !self.ids.remove(id) {
            return 0;
        }
        let before = self.messages.len();
        self.messages.retain(|m| &m.id != id);
        before - self.messages.len()
    }
}
