//! Domain models exchanged with the chat backend.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be decoded
//! straight from REST responses and push frames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChatId, ChatKind, MessageId, UserId};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: UserId,
    #[serde(default)]
    pub body: Option<String>,
    /// Weak reference; the target may live outside the loaded window.
    #[serde(default)]
    pub reply_to: Option<MessageId>,
    /// Server-assigned creation time.
    pub created_at: DateTime<Utc>,
    /// Derived locally from the chat's read marker. Never sent by the server
    /// as an authoritative value.
    #[serde(default, skip_serializing)]
    pub read: bool,
}

/// Payload of a DELETED message event: just enough to locate the entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletedMessage {
    pub id: MessageId,
    pub chat_id: ChatId,
}

/// A message the local user is about to send.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageDraft {
    pub chat_id: ChatId,
    pub sender_id: UserId,
    pub body: String,
    #[serde(default)]
    pub reply_to: Option<MessageId>,
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// Chat metadata as stored by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub id: ChatId,
    pub kind: ChatKind,
    /// Only meaningful for group chats.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub member_ids: Vec<UserId>,
}

impl Chat {
    /// The participant of a personal chat that is not `viewer`.
    pub fn other_member(&self, viewer: &UserId) -> Option<&UserId> {
        self.member_ids.iter().find(|id| *id != viewer)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatStub {
    pub id: ChatId,
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

// ---------------------------------------------------------------------------
// Read marker
// ---------------------------------------------------------------------------

/// The last message a user has seen in a chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadMarker {
    pub chat_id: ChatId,
    pub user_id: UserId,
    #[serde(default)]
    pub last_read_message_id: Option<MessageId>,
}

// ---------------------------------------------------------------------------
// Reactions & presence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Reaction {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub emoji: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Presence {
    pub user_id: UserId,
    pub online: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}
