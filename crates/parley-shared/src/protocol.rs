use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::models::{Chat, ChatStub, DeletedMessage, Message, Presence, Reaction};
use crate::types::{ChatId, MessageId, UserId};

/// Change to a message, as pushed on the `messages` domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum MessageEvent {
    Created(Message),
    /// Body edit; replaces the held copy.
    Updated(Message),
    Deleted(DeletedMessage),
}

impl MessageEvent {
    pub fn chat_id(&self) -> &ChatId {
        match self {
            Self::Created(m) | Self::Updated(m) => &m.chat_id,
            Self::Deleted(stub) => &stub.chat_id,
        }
    }

    pub fn message_id(&self) -> &MessageId {
        match self {
            Self::Created(m) | Self::Updated(m) => &m.id,
            Self::Deleted(stub) => &stub.id,
        }
    }
}

/// Change to chat metadata, as pushed on the `chats` domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChatEvent {
    Created(Chat),
    Updated(Chat),
    Deleted(ChatStub),
}

impl ChatEvent {
    pub fn chat_id(&self) -> &ChatId {
        match self {
            Self::Created(c) | Self::Updated(c) => &c.id,
            Self::Deleted(stub) => &stub.id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ReactionEvent {
    Added(Reaction),
    Removed(Reaction),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PresenceEvent {
    Updated(Presence),
    /// The user is no longer tracked by the server (account removed, left
    /// every shared chat).
    Gone { user_id: UserId },
}

/// One push frame: at most one event per key.
///
/// Backed by a `BTreeMap`, so iteration is ordered by key and folding a batch
/// is reproducible.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct EventBatch<E> {
    events: BTreeMap<String, E>,
}

impl<E> EventBatch<E> {
    pub fn new() -> Self {
        Self {
            events: BTreeMap::new(),
        }
    }

    /// Insert or replace the event for `key` (latest wins).
    pub fn insert(&mut self, key: impl Into<String>, event: E) {
        self.events.insert(key.into(), event);
    }

    pub fn get(&self, key: &str) -> Option<&E> {
        self.events.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &E)> {
        self.events.iter()
    }

    pub fn events(&self) -> impl Iterator<Item = &E> {
        self.events.values()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<E: DeserializeOwned> EventBatch<E> {
    /// Decode one JSON push frame.
    pub fn from_json(frame: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(frame).map_err(ProtocolError::Malformed)
    }
}

impl<E> Default for EventBatch<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, E> FromIterator<(K, E)> for EventBatch<E> {
    fn from_iter<I: IntoIterator<Item = (K, E)>>(iter: I) -> Self {
        Self {
            events: iter.into_iter().map(|(k, e)| (k.into(), e)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_message_frame() {
        let frame = r#"{
            "m2": {"type": "created", "data": {
                "id": "m2", "chat_id": "c1", "sender_id": "u2",
                "body": "hi", "created_at": "2024-05-01T10:00:00Z"
            }},
            "m1": {"type": "deleted", "data": {"id": "m1", "chat_id": "c1"}}
        }"#;

        let batch = EventBatch::<MessageEvent>::from_json(frame).unwrap();
        assert_eq!(batch.len(), 2);

        // Key order, not frame order.
        let keys: Vec<_> = batch.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["m1", "m2"]);

        match batch.get("m2") {
            Some(MessageEvent::Created(m)) => {
                assert_eq!(m.sender_id, UserId::from("u2"));
                assert_eq!(m.reply_to, None);
                assert!(!m.read);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_frame_is_an_error() {
        let err = EventBatch::<MessageEvent>::from_json(r#"{"m1": {"type": "exploded"}}"#);
        assert!(matches!(err, Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn test_later_insert_replaces_earlier() {
        let mut batch = EventBatch::new();
        batch.insert("u1", PresenceEvent::Gone { user_id: "u1".into() });
        batch.insert(
            "u1",
            PresenceEvent::Updated(Presence {
                user_id: "u1".into(),
                online: true,
                last_seen: None,
            }),
        );
        assert_eq!(batch.len(), 1);
        assert!(matches!(batch.get("u1"), Some(PresenceEvent::Updated(_))));
    }
}
