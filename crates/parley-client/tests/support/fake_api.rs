use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Notify;

use parley_net::{ChatApi, NetError, Result};
use parley_shared::{
    Chat, ChatId, ChatKind, Message, MessageDraft, MessageId, ReadMarker, UserId, UserProfile,
};

/// Every request the fake served, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    GetMessages { chat: ChatId, page: u32, size: u32 },
    Lookup(Vec<MessageId>),
    ReadMarker(ChatId),
    Unread(ChatId),
    ListChats,
    GetChat(ChatId),
    GetUser(UserId),
    Send(ChatId),
    Edit(MessageId),
    Delete(MessageId),
    MarkRead(ChatId, MessageId),
}

#[derive(Default)]
struct Data {
    /// Per chat, newest first (server page order).
    messages: HashMap<ChatId, Vec<Message>>,
    chats: Vec<Chat>,
    users: HashMap<UserId, UserProfile>,
    markers: HashMap<ChatId, MessageId>,
    unread: HashMap<ChatId, u32>,
    failing: bool,
    gates: HashMap<ChatId, Arc<Notify>>,
    lookup_gate: Option<Arc<Notify>>,
    marker_gates: HashMap<ChatId, Arc<Notify>>,
    calls: Vec<Call>,
}

/// In-memory `ChatApi` that records its calls.
#[derive(Default)]
pub struct FakeApi {
    data: Mutex<Data>,
}

pub fn message(id: &str, chat: &str, sender: &str, secs: i64) -> Message {
    Message {
        id: id.into(),
        chat_id: chat.into(),
        sender_id: sender.into(),
        body: Some(format!("body of {id}")),
        reply_to: None,
        created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        read: false,
    }
}

/// `count` messages for `chat`, newest first, ids `{chat}-{n}` with `n`
/// counting down from `count - 1`.
pub fn history(chat: &str, count: usize) -> Vec<Message> {
    (0..count)
        .rev()
        .map(|n| message(&format!("{chat}-{n}"), chat, "u2", 1_000 + n as i64))
        .collect()
}

pub fn chat(id: &str, kind: ChatKind, name: Option<&str>, members: &[&str]) -> Chat {
    Chat {
        id: id.into(),
        kind,
        name: name.map(str::to_string),
        avatar: None,
        member_ids: members.iter().map(|m| UserId::from(*m)).collect(),
    }
}

impl FakeApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn data(&self) -> std::sync::MutexGuard<'_, Data> {
        self.data.lock().unwrap()
    }

    fn record(&self, call: Call) -> Result<()> {
        let mut data = self.data();
        data.calls.push(call);
        if data.failing {
            return Err(NetError::Api {
                code: 503,
                message: "unavailable".into(),
            });
        }
        Ok(())
    }

    pub fn set_messages(&self, chat: &str, messages: Vec<Message>) {
        self.data().messages.insert(chat.into(), messages);
    }

    pub fn remove_message(&self, chat: &str, id: &str) {
        if let Some(list) = self.data().messages.get_mut(&ChatId::from(chat)) {
            list.retain(|m| m.id.as_str() != id);
        }
    }

    pub fn add_chat(&self, chat: Chat) {
        self.data().chats.push(chat);
    }

    pub fn add_user(&self, id: &str, name: &str) {
        self.data().users.insert(
            id.into(),
            UserProfile {
                id: id.into(),
                display_name: name.into(),
                avatar: None,
            },
        );
    }

    pub fn set_marker(&self, chat: &str, message: &str) {
        self.data().markers.insert(chat.into(), message.into());
    }

    pub fn set_unread(&self, chat: &str, count: u32) {
        self.data().unread.insert(chat.into(), count);
    }

    pub fn set_failing(&self, failing: bool) {
        self.data().failing = failing;
    }

    /// Hold page requests for `chat` until the returned handle is notified.
    pub fn hold_pages(&self, chat: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.data().gates.insert(chat.into(), gate.clone());
        gate
    }

    /// Hold message lookups until the returned handle is notified.
    pub fn hold_lookups(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.data().lookup_gate = Some(gate.clone());
        gate
    }

    /// Hold read-marker requests for `chat` until the returned handle is
    /// notified.
    pub fn hold_markers(&self, chat: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.data().marker_gates.insert(chat.into(), gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<Call> {
        self.data().calls.clone()
    }

    pub fn lookups(&self) -> Vec<Vec<MessageId>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Lookup(ids) => Some(ids),
                _ => None,
            })
            .collect()
    }

    pub fn page_requests(&self, chat: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::GetMessages { chat: id, .. } if id.as_str() == chat))
            .count()
    }

    fn find_message(data: &Data, id: &MessageId) -> Option<Message> {
        data.messages
            .values()
            .flatten()
            .find(|m| &m.id == id)
            .cloned()
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn get_messages(&self, chat_id: &ChatId, page: u32, size: u32) -> Result<Vec<Message>> {
        let gate = self.data().gates.get(chat_id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.record(Call::GetMessages {
            chat: chat_id.clone(),
            page,
            size,
        })?;

        let data = self.data();
        let all = data.messages.get(chat_id).cloned().unwrap_or_default();
        Ok(all
            .into_iter()
            .skip((page * size) as usize)
            .take(size as usize)
            .collect())
    }

    async fn get_messages_by_ids(&self, ids: &[MessageId]) -> Result<Vec<Message>> {
        let gate = self.data().lookup_gate.clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.record(Call::Lookup(ids.to_vec()))?;
        let data = self.data();
        Ok(ids
            .iter()
            .filter_map(|id| Self::find_message(&data, id))
            .collect())
    }

    async fn get_read_marker(&self, chat_id: &ChatId, user_id: &UserId) -> Result<ReadMarker> {
        let gate = self.data().marker_gates.get(chat_id).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.record(Call::ReadMarker(chat_id.clone()))?;
        Ok(ReadMarker {
            chat_id: chat_id.clone(),
            user_id: user_id.clone(),
            last_read_message_id: self.data().markers.get(chat_id).cloned(),
        })
    }

    async fn get_unread_count(&self, chat_id: &ChatId, _user_id: &UserId) -> Result<u32> {
        self.record(Call::Unread(chat_id.clone()))?;
        Ok(self.data().unread.get(chat_id).copied().unwrap_or(0))
    }

    async fn list_chats(&self, _user_id: &UserId) -> Result<Vec<Chat>> {
        self.record(Call::ListChats)?;
        Ok(self.data().chats.clone())
    }

    async fn get_chat(&self, chat_id: &ChatId) -> Result<Chat> {
        self.record(Call::GetChat(chat_id.clone()))?;
        self.data()
            .chats
            .iter()
            .find(|c| &c.id == chat_id)
            .cloned()
            .ok_or(NetError::Api {
                code: 404,
                message: format!("no chat {chat_id}"),
            })
    }

    async fn get_user(&self, user_id: &UserId) -> Result<UserProfile> {
        self.record(Call::GetUser(user_id.clone()))?;
        self.data()
            .users
            .get(user_id)
            .cloned()
            .ok_or(NetError::Api {
                code: 404,
                message: format!("no user {user_id}"),
            })
    }

    async fn send_message(&self, draft: &MessageDraft) -> Result<Message> {
        self.record(Call::Send(draft.chat_id.clone()))?;
        let mut sent = message("sent-1", draft.chat_id.as_str(), draft.sender_id.as_str(), 9_999);
        sent.body = Some(draft.body.clone());
        sent.reply_to = draft.reply_to.clone();
        Ok(sent)
    }

    async fn edit_message(&self, message_id: &MessageId, body: &str) -> Result<Message> {
        self.record(Call::Edit(message_id.clone()))?;
        let data = self.data();
        let mut edited = Self::find_message(&data, message_id).ok_or(NetError::Api {
            code: 404,
            message: "no such message".into(),
        })?;
        edited.body = Some(body.to_string());
        Ok(edited)
    }

    async fn delete_message(&self, message_id: &MessageId) -> Result<()> {
        self.record(Call::Delete(message_id.clone()))
    }

    async fn mark_read(
        &self,
        chat_id: &ChatId,
        _user_id: &UserId,
        message_id: &MessageId,
    ) -> Result<()> {
        self.record(Call::MarkRead(chat_id.clone(), message_id.clone()))?;
        self.data()
            .markers
            .insert(chat_id.clone(), message_id.clone());
        Ok(())
    }
}
