//! Chat list summaries, kept current by pushed events.
//!
//! A summary is derived data: name and avatar come from chat metadata or the
//! other participant's profile, the rest from the chat's read state. Message
//! events only touch the chats they mention.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::debug;

use parley_shared::{
    Chat, ChatEvent, ChatId, ChatKind, EventBatch, Message, MessageEvent, ReadMarker, UserId,
};

use crate::read_state::{ChatReadState, ReadChange};

/// One row of the chat list.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatDisplaySummary {
    pub chat_id: ChatId,
    pub name: String,
    pub avatar: Option<String>,
    pub kind: ChatKind,
    pub last_message: Option<Message>,
    pub last_message_read: bool,
    pub unread_count: u32,
}

/// Everything needed to seed one summary; produced by the initial build.
#[derive(Debug, Clone)]
pub struct SummarySeed {
    pub chat: Chat,
    pub name: String,
    pub avatar: Option<String>,
    pub last_message: Option<Message>,
    pub marker: Option<ReadMarker>,
    pub unread: u32,
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    avatar: Option<String>,
    kind: ChatKind,
    read: ChatReadState,
}

impl Entry {
    fn summary(&self, chat_id: &ChatId) -> ChatDisplaySummary {
        ChatDisplaySummary {
            chat_id: chat_id.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            kind: self.kind,
            last_message: self.read.last_message().map(|m| self.read.with_read_flag(m)),
            last_message_read: self.read.last_message_read(),
            unread_count: self.read.unread(),
        }
    }
}

/// Which chats a batch touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryDelta {
    pub changed: BTreeSet<ChatId>,
    /// Chats whose last message was deleted; their latest message has to be
    /// fetched again.
    pub needs_refresh: BTreeSet<ChatId>,
    /// Chats created by a metadata event; their display fields still have to
    /// be resolved.
    pub added: BTreeSet<ChatId>,
    pub removed: BTreeSet<ChatId>,
}

#[derive(Debug, Clone)]
pub struct ChatSummaries {
    viewer: UserId,
    entries: HashMap<ChatId, Entry>,
}

impl ChatSummaries {
    pub fn new(viewer: UserId) -> Self {
        Self {
            viewer,
            entries: HashMap::new(),
        }
    }

    pub fn viewer(&self) -> &UserId {
        &self.viewer
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, chat_id: &ChatId) -> bool {
        self.entries.contains_key(chat_id)
    }

    pub fn chat_ids(&self) -> BTreeSet<ChatId> {
        self.entries.keys().cloned().collect()
    }

    pub fn get(&self, chat_id: &ChatId) -> Option<ChatDisplaySummary> {
        self.entries.get(chat_id).map(|e| e.summary(chat_id))
    }

    /// Insert or overwrite the summary of one chat.
    pub fn seed(&mut self, seed: SummarySeed) {
        let mut read = ChatReadState::with_counts(seed.last_message, seed.unread);
        if let Some(marker) = &seed.marker {
            read.set_marker(marker);
        }
        self.entries.insert(
            seed.chat.id.clone(),
            Entry {
                name: seed.name,
                avatar: seed.avatar,
                kind: seed.chat.kind,
                read,
            },
        );
    }

    pub fn set_marker(&mut self, marker: &ReadMarker) -> bool {
        match self.entries.get_mut(&marker.chat_id) {
            Some(entry) => {
                entry.read.set_marker(marker);
                true
            }
            None => false,
        }
    }

    pub fn set_unread(&mut self, chat_id: &ChatId, unread: u32) {
        if let Some(entry) = self.entries.get_mut(chat_id) {
            entry.read.set_unread(unread);
        }
    }

    /// Replace the last message after a refresh. Only fills the slot when it
    /// is still empty or older, so a push that raced the refresh wins.
    pub fn refresh_last_message(&mut self, chat_id: &ChatId, latest: Option<Message>) {
        let Some(entry) = self.entries.get_mut(chat_id) else {
            return;
        };
        let keep_current = match (entry.read.last_message(), &latest) {
            (Some(current), Some(latest)) => current.created_at > latest.created_at,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if !keep_current {
            entry.read.set_last_message(latest);
        }
    }

    /// Fold message events. Only chats mentioned in the batch are touched,
    /// and only their last-message, read and unread fields.
    pub fn apply_messages(&mut self, batch: &EventBatch<MessageEvent>) -> SummaryDelta {
        let mut delta = SummaryDelta::default();

        for event in batch.events() {
            let chat_id = event.chat_id();
            let Some(entry) = self.entries.get_mut(chat_id) else {
                debug!(chat = %chat_id, "Message event for unknown chat");
                continue;
            };

            match entry.read.apply(event, &self.viewer) {
                ReadChange::None => {}
                ReadChange::LastMessageChanged => {
                    delta.changed.insert(chat_id.clone());
                }
                ReadChange::LastMessageRemoved => {
                    delta.changed.insert(chat_id.clone());
                    delta.needs_refresh.insert(chat_id.clone());
                }
            }
        }

        delta
    }

    /// Fold chat metadata events. Group chats take name and avatar from the
    /// metadata; personal chats keep the participant's profile.
    pub fn apply_chats(&mut self, batch: &EventBatch<ChatEvent>) -> SummaryDelta {
        let mut delta = SummaryDelta::default();

        for event in batch.events() {
            match event {
                ChatEvent::Created(chat) => {
                    if !self.entries.contains_key(&chat.id) {
                        delta.added.insert(chat.id.clone());
                    }
                }
                ChatEvent::Updated(chat) => {
                    let Some(entry) = self.entries.get_mut(&chat.id) else {
                        // Joined a chat we have never listed.
                        delta.added.insert(chat.id.clone());
                        continue;
                    };
                    entry.kind = chat.kind;
                    if chat.kind == ChatKind::Group {
                        entry.name = group_name(chat);
                        entry.avatar = chat.avatar.clone();
                    }
                    delta.changed.insert(chat.id.clone());
                }
                ChatEvent::Deleted(stub) => {
                    if self.entries.remove(&stub.id).is_some() {
                        delta.removed.insert(stub.id.clone());
                    }
                }
            }
        }

        delta
    }

    /// Summaries ordered for display: newest last message first, chats
    /// without messages at the end, ties by chat id.
    pub fn sorted(&self) -> Vec<ChatDisplaySummary> {
        let mut list: Vec<ChatDisplaySummary> = self
            .entries
            .iter()
            .map(|(id, entry)| entry.summary(id))
            .collect();
        list.sort_by(display_order);
        list
    }
}

/// Display name of a group chat.
pub fn group_name(chat: &Chat) -> String {
    chat.name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| chat.id.to_string())
}

fn display_order(a: &ChatDisplaySummary, b: &ChatDisplaySummary) -> Ordering {
    let a_time = a.last_message.as_ref().map(|m| m.created_at);
    let b_time = b.last_message.as_ref().map(|m| m.created_at);
    match (a_time, b_time) {
        (Some(a_time), Some(b_time)) => b_time.cmp(&a_time),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.chat_id.cmp(&b.chat_id))
}
