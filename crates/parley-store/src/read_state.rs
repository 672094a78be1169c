//! Read/unread bookkeeping for one chat.
//!
//! Read status is identity based: a message is read iff its id equals the
//! viewer's last-read marker. Timestamps only decide whether a new message
//! displaces the recorded last message, never whether something was seen.

use parley_shared::{Message, MessageEvent, MessageId, ReadMarker, UserId};

/// What a single event did to the read state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadChange {
    None,
    /// The recorded last message was replaced or edited.
    LastMessageChanged,
    /// The recorded last message was deleted; the caller should supply a
    /// replacement if it knows one.
    LastMessageRemoved,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatReadState {
    last_read: Option<MessageId>,
    last_message: Option<Message>,
    unread: u32,
}

impl ChatReadState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_counts(last_message: Option<Message>, unread: u32) -> Self {
        Self {
            last_read: None,
            last_message,
            unread,
        }
    }

    pub fn set_marker(&mut self, marker: &ReadMarker) {
        self.last_read = marker.last_read_message_id.clone();
    }

    pub fn last_read(&self) -> Option<&MessageId> {
        self.last_read.as_ref()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.last_message.as_ref()
    }

    /// Overwrite the recorded last message without touching the counter.
    pub fn set_last_message(&mut self, message: Option<Message>) {
        self.last_message = message;
    }

    pub fn set_unread(&mut self, unread: u32) {
        self.unread = unread;
    }

    pub fn unread(&self) -> u32 {
        self.unread
    }

    pub fn is_read(&self, id: &MessageId) -> bool {
        self.last_read.as_ref() == Some(id)
    }

    /// Whether the recorded last message has been seen.
    pub fn last_message_read(&self) -> bool {
        self.last_message
            .as_ref()
            .map(|m| self.is_read(&m.id))
            .unwrap_or(false)
    }

    /// Copy of `message` with its derived `read` flag filled in.
    pub fn with_read_flag(&self, message: &Message) -> Message {
        let mut message = message.clone();
        message.read = self.is_read(&message.id);
        message
    }

    pub fn apply(&mut self, event: &MessageEvent, viewer: &UserId) -> ReadChange {
        match event {
            MessageEvent::Created(message) => self.on_created(message, viewer),
            MessageEvent::Updated(message) => self.on_updated(message),
            MessageEvent::Deleted(stub) => self.on_deleted(&stub.id),
        }
    }

    /// A message newer than the recorded last message takes its place, and
    /// counts as unread unless the viewer sent it.
    pub fn on_created(&mut self, message: &Message, viewer: &UserId) -> ReadChange {
        let newer = match &self.last_message {
            None => true,
            Some(last) => last.id != message.id && message.created_at >= last.created_at,
        };
        if !newer {
            return ReadChange::None;
        }

        if &message.sender_id != viewer {
            self.unread += 1;
        }
        self.last_message = Some(message.clone());
        ReadChange::LastMessageChanged
    }

    /// Edits refresh the copy of the last message; they never count.
    pub fn on_updated(&mut self, message: &Message) -> ReadChange {
        match &mut self.last_message {
            Some(last) if last.id == message.id => {
                *last = message.clone();
                ReadChange::LastMessageChanged
            }
            _ => ReadChange::None,
        }
    }

    pub fn on_deleted(&mut self, id: &MessageId) -> ReadChange {
        match &self.last_message {
            Some(last) if &last.id == id => {
                self.unread = self.unread.saturating_sub(1);
                self.last_message = None;
                ReadChange::LastMessageRemoved
            }
            _ => ReadChange::None,
        }
    }
}
