//! REST collaborator of the sync core.
//!
//! [`ChatApi`] is the seam the client crate is written against; the
//! production implementation, [`HttpChatApi`], speaks JSON over HTTP.
//! Mutation calls return the server's view for immediate feedback only:
//! local state changes solely through push events.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use parley_shared::{
    Chat, ChatId, Message, MessageDraft, MessageId, ReadMarker, UserId, UserProfile,
};

use crate::error::{NetError, Result};

#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Page `page` of a chat, newest first; page 0 is the most recent.
    async fn get_messages(&self, chat_id: &ChatId, page: u32, size: u32) -> Result<Vec<Message>>;

    /// Batched lookup. Order of the result is not guaranteed and unknown ids
    /// are simply missing.
    async fn get_messages_by_ids(&self, ids: &[MessageId]) -> Result<Vec<Message>>;

    async fn get_read_marker(&self, chat_id: &ChatId, user_id: &UserId) -> Result<ReadMarker>;

    async fn get_unread_count(&self, chat_id: &ChatId, user_id: &UserId) -> Result<u32>;

    /// Every chat `user_id` is a member of.
    async fn list_chats(&self, user_id: &UserId) -> Result<Vec<Chat>>;

    async fn get_chat(&self, chat_id: &ChatId) -> Result<Chat>;

    async fn get_user(&self, user_id: &UserId) -> Result<UserProfile>;

    async fn send_message(&self, draft: &MessageDraft) -> Result<Message>;

    async fn edit_message(&self, message_id: &MessageId, body: &str) -> Result<Message>;

    async fn delete_message(&self, message_id: &MessageId) -> Result<()>;

    async fn mark_read(
        &self,
        chat_id: &ChatId,
        user_id: &UserId,
        message_id: &MessageId,
    ) -> Result<()>;
}

#[derive(Serialize)]
struct LookupRequest<'a> {
    ids: &'a [MessageId],
}

#[derive(Serialize)]
struct EditRequest<'a> {
    body: &'a str,
}

#[derive(Serialize)]
struct MarkReadRequest<'a> {
    last_read_message_id: &'a MessageId,
}

#[derive(Deserialize)]
struct UnreadCount {
    count: u32,
}

/// [`ChatApi`] over HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    base: Url,
    http: reqwest::Client,
}

impl HttpChatApi {
    pub fn new(base: Url, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base, http })
    }

    fn url(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(url = %url, "GET");
        let resp = self.http.get(url).send().await?;
        decode(resp).await
    }
}

/// Turn a response into `T`, mapping non-success statuses to
/// [`NetError::Api`].
async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let resp = check_status(resp).await?;
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let code = resp.status().as_u16();
    let message = resp.text().await.unwrap_or_default();
    Err(NetError::Api { code, message })
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn get_messages(&self, chat_id: &ChatId, page: u32, size: u32) -> Result<Vec<Message>> {
        let mut url = self.url(&format!("chats/{chat_id}/messages"))?;
        url.query_pairs_mut()
            .append_pair("page", &page.to_string())
            .append_pair("size", &size.to_string());
        self.get_json(url).await
    }

    async fn get_messages_by_ids(&self, ids: &[MessageId]) -> Result<Vec<Message>> {
        let url = self.url("messages/lookup")?;
        debug!(url = %url, count = ids.len(), "POST lookup");
        let resp = self
            .http
            .post(url)
            .json(&LookupRequest { ids })
            .send()
            .await?;
        decode(resp).await
    }

    async fn get_read_marker(&self, chat_id: &ChatId, user_id: &UserId) -> Result<ReadMarker> {
        let url = self.url(&format!("chats/{chat_id}/read-markers/{user_id}"))?;
        self.get_json(url).await
    }

    async fn get_unread_count(&self, chat_id: &ChatId, user_id: &UserId) -> Result<u32> {
        let url = self.url(&format!("chats/{chat_id}/unread/{user_id}"))?;
        let count: UnreadCount = self.get_json(url).await?;
        Ok(count.count)
    }

    async fn list_chats(&self, user_id: &UserId) -> Result<Vec<Chat>> {
        let url = self.url(&format!("users/{user_id}/chats"))?;
        self.get_json(url).await
    }

    async fn get_chat(&self, chat_id: &ChatId) -> Result<Chat> {
        let url = self.url(&format!("chats/{chat_id}"))?;
        self.get_json(url).await
    }

    async fn get_user(&self, user_id: &UserId) -> Result<UserProfile> {
        let url = self.url(&format!("users/{user_id}"))?;
        self.get_json(url).await
    }

    async fn send_message(&self, draft: &MessageDraft) -> Result<Message> {
        let url = self.url(&format!("chats/{}/messages", draft.chat_id))?;
        let resp = self.http.post(url).json(draft).send().await?;
        decode(resp).await
    }

    async fn edit_message(&self, message_id: &MessageId, body: &str) -> Result<Message> {
        let url = self.url(&format!("messages/{message_id}"))?;
        let resp = self
            .http
            .patch(url)
            .json(&EditRequest { body })
            .send()
            .await?;
        decode(resp).await
    }

    async fn delete_message(&self, message_id: &MessageId) -> Result<()> {
        let url = self.url(&format!("messages/{message_id}"))?;
        let resp = self.http.delete(url).send().await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn mark_read(
        &self,
        chat_id: &ChatId,
        user_id: &UserId,
        message_id: &MessageId,
    ) -> Result<()> {
        let url = self.url(&format!("chats/{chat_id}/read-markers/{user_id}"))?;
        let resp = self
            .http
            .put(url)
            .json(&MarkReadRequest {
                last_read_message_id: message_id,
            })
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }
}
