//! The open chat: paginated window, live reconciliation, reply context and
//! read state for one scope at a time.
//!
//! Loading page 0 of a chat makes it the session's scope. Everything that
//! belongs to the previous scope (window, reply cache, reactions, the push
//! subscription) is dropped before the first page is requested, and a
//! generation counter makes sure results of requests started for the old
//! scope are discarded when they land.
//!
//! Every later page reopens a push subscription that has ended;
//! [`ChatSession::reconnect`] does the same on demand.
//!
//! State lives behind a `std::sync::Mutex` that is only held for synchronous
//! folds, never across an `.await`. The push transports are the only shared
//! async resources and sit behind `tokio::sync::Mutex`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::Serialize;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use parley_net::{ChatApi, EventTransport, PushConnector, Updates};
use parley_shared::{
    ChatId, ConnectionStatus, EventBatch, EventDomain, LoadState, Message, MessageDraft,
    MessageEvent, MessageId, ReactionEvent, ReadMarker, SubscriptionMode, UserId,
};
use parley_store::{reconcile, ChatReadState, MessageWindow, ReactionIndex, ReplyCache};

use crate::error::{ClientError, Result};

/// Immutable view of the session for the presentation layer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionSnapshot {
    pub chat_id: Option<ChatId>,
    /// Window contents in page order, with `read` filled in.
    pub messages: Vec<Message>,
    pub has_more: bool,
    /// Number of pages merged so far.
    pub pages: LoadState<u32>,
    /// Number of reply targets resolved from outside the window.
    pub replies: LoadState<usize>,
    pub last_read: Option<MessageId>,
    pub unread: u32,
    /// `(emoji, count)` per message that has reactions.
    pub reactions: BTreeMap<MessageId, Vec<(String, usize)>>,
}

#[derive(Default)]
struct SessionState {
    generation: u64,
    window: Option<MessageWindow>,
    pages: LoadState<u32>,
    in_flight: bool,
    replies: ReplyCache,
    reply_state: LoadState<usize>,
    read: ChatReadState,
    reactions: ReactionIndex,
}

impl SessionState {
    fn chat_id(&self) -> Option<&ChatId> {
        self.window.as_ref().map(|w| w.chat_id())
    }

    /// Drop everything and start a fresh scope.
    fn enter_scope(&mut self, chat_id: Option<ChatId>) {
        *self = Self {
            generation: self.generation + 1,
            window: chat_id.map(MessageWindow::new),
            ..Self::default()
        };
    }

    /// Reply targets of window messages that the window itself cannot answer.
    fn missing_reply_targets(&self) -> Vec<MessageId> {
        let Some(window) = &self.window else {
            return Vec::new();
        };
        window
            .messages()
            .iter()
            .filter_map(|m| m.reply_to.clone())
            .filter(|target| !window.contains(target))
            .collect()
    }

    fn snapshot(&self) -> SessionSnapshot {
        let messages: Vec<Message> = self
            .window
            .as_ref()
            .map(|w| w.messages().iter().map(|m| self.read.with_read_flag(m)).collect())
            .unwrap_or_default();

        let reactions = messages
            .iter()
            .filter_map(|m| {
                let counts = self.reactions.counts(&m.id);
                (!counts.is_empty()).then(|| (m.id.clone(), counts))
            })
            .collect();

        SessionSnapshot {
            chat_id: self.chat_id().cloned(),
            has_more: self.window.as_ref().is_some_and(|w| w.has_more()),
            messages,
            pages: self.pages.clone(),
            replies: self.reply_state.clone(),
            last_read: self.read.last_read().cloned(),
            unread: self.read.unread(),
            reactions,
        }
    }
}

struct Shared {
    api: Arc<dyn ChatApi>,
    viewer: UserId,
    page_size: u32,
    messages: AsyncMutex<EventTransport<MessageEvent>>,
    reactions: AsyncMutex<EventTransport<ReactionEvent>>,
    status: watch::Receiver<ConnectionStatus>,
    state: Mutex<SessionState>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn generation(&self) -> u64 {
        self.lock().generation
    }

    fn publish(&self, state: &SessionState) {
        self.snapshot_tx.send_replace(state.snapshot());
    }

    /// One batched lookup for `ids`. Results are dropped when the scope
    /// changed while the request was out.
    async fn fetch_replies(&self, generation: u64, ids: Vec<MessageId>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        {
            let mut state = self.lock();
            if state.generation != generation {
                return Ok(());
            }
            state.reply_state = LoadState::Loading;
            self.publish(&state);
        }

        debug!(count = ids.len(), "Looking up reply targets");
        let result = self.api.get_messages_by_ids(&ids).await;

        let mut state = self.lock();
        if state.generation != generation {
            debug!("Discarding reply lookup for a previous chat");
            return Ok(());
        }

        let outcome: Result<()> = match result {
            Ok(found) => {
                state.replies.complete_lookup(found);
                let resolved = state.replies.len();
                state.reply_state = LoadState::Success(resolved);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Reply lookup failed");
                state.replies.abort_lookup(&ids);
                state.reply_state = LoadState::Error(e.to_string());
                Err(e.into())
            }
        };
        self.publish(&state);
        outcome
    }

    async fn refresh_read_state(&self, chat_id: &ChatId, generation: u64) -> Result<()> {
        let (marker, unread) = tokio::join!(
            self.api.get_read_marker(chat_id, &self.viewer),
            self.api.get_unread_count(chat_id, &self.viewer),
        );

        let mut state = self.lock();
        if state.generation != generation {
            return Ok(());
        }

        let mut outcome: Result<()> = Ok(());
        match marker {
            Ok(marker) => state.read.set_marker(&marker),
            Err(e) => {
                warn!(chat = %chat_id, error = %e, "Failed to fetch read marker");
                outcome = Err(e.into());
            }
        }
        match unread {
            Ok(count) => state.read.set_unread(count),
            Err(e) => {
                warn!(chat = %chat_id, error = %e, "Failed to fetch unread count");
                if outcome.is_ok() {
                    outcome = Err(e.into());
                }
            }
        }
        self.publish(&state);
        outcome
    }

    /// Close the subscriptions of the scope that `generation` replaced.
    /// Skipped if an even newer scope already owns the transports.
    async fn drop_previous_subscriptions(&self, generation: u64) {
        let mut transport = self.messages.lock().await;
        if self.generation() == generation {
            transport.disconnect().await;
        }
        drop(transport);

        let mut transport = self.reactions.lock().await;
        if self.generation() == generation {
            transport.disconnect().await;
        }
    }
}

/// A chat session. Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct ChatSession {
    shared: Arc<Shared>,
}

impl ChatSession {
    pub fn new(
        api: Arc<dyn ChatApi>,
        connector: Arc<dyn PushConnector>,
        viewer: UserId,
        page_size: u32,
    ) -> Self {
        let messages = EventTransport::new(connector.clone(), EventDomain::Messages);
        let reactions = EventTransport::new(connector, EventDomain::Reactions);
        let status = messages.status();
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());

        Self {
            shared: Arc::new(Shared {
                api,
                viewer,
                page_size,
                messages: AsyncMutex::new(messages),
                reactions: AsyncMutex::new(reactions),
                status,
                state: Mutex::new(SessionState::default()),
                snapshot_tx,
            }),
        }
    }

    pub fn viewer(&self) -> &UserId {
        &self.shared.viewer
    }

    /// Load the next page of `chat_id`. A different chat than the current
    /// one resets the session and loads page 0.
    ///
    /// A call while a load for the same chat is pending, or after the last
    /// page, does nothing. A failed fetch leaves the window untouched and is
    /// reported both as the returned error and in the snapshot.
    pub async fn load_next_page(&self, chat_id: &ChatId) -> Result<()> {
        let shared = &self.shared;

        let (generation, page, switched) = {
            let mut state = shared.lock();
            let switched = state.chat_id() != Some(chat_id);
            if switched {
                info!(chat = %chat_id, "Opening chat");
                state.enter_scope(Some(chat_id.clone()));
            } else if state.in_flight {
                debug!(chat = %chat_id, "Page load already in flight, ignoring");
                return Ok(());
            }

            let Some(window) = &state.window else {
                return Ok(());
            };
            if !window.has_more() {
                debug!(chat = %chat_id, "No further pages");
                return Ok(());
            }
            let page = window.next_page();

            state.in_flight = true;
            state.pages = LoadState::Loading;
            shared.publish(&state);
            (state.generation, page, switched)
        };

        if switched {
            shared.drop_previous_subscriptions(generation).await;
        }

        let fetched = shared
            .api
            .get_messages(chat_id, page, shared.page_size)
            .await;

        let reply_ids = {
            let mut state = shared.lock();
            if state.generation != generation {
                debug!(chat = %chat_id, page, "Discarding page for a previous chat");
                return Ok(());
            }
            state.in_flight = false;

            let messages = match fetched {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(chat = %chat_id, page, error = %e, "Page fetch failed");
                    state.pages = LoadState::Error(e.to_string());
                    shared.publish(&state);
                    return Err(e.into());
                }
            };

            let SessionState {
                window,
                read,
                pages,
                ..
            } = &mut *state;
            let Some(window) = window.as_mut() else {
                return Ok(());
            };
            let merge = match window.merge_page(page, messages, shared.page_size) {
                Ok(merge) => merge,
                Err(e) => {
                    *pages = LoadState::Error(e.to_string());
                    shared.publish(&state);
                    return Err(e.into());
                }
            };
            *pages = LoadState::Success(merge.page + 1);
            if merge.page == 0 {
                read.set_last_message(window.newest().cloned());
            }

            let targets = state.missing_reply_targets();
            let ids = state.replies.begin_lookup(&targets);
            shared.publish(&state);
            ids
        };

        // Page 0 opens the subscriptions; later pages reopen any that ended.
        if let Err(e) = self.resubscribe(chat_id, generation, page == 0).await {
            warn!(chat = %chat_id, error = %e, "Live updates unavailable");
        }
        if page == 0 {
            if let Err(e) = shared.refresh_read_state(chat_id, generation).await {
                debug!(chat = %chat_id, error = %e, "Read state left as is");
            }
        }

        if let Err(e) = shared.fetch_replies(generation, reply_ids).await {
            debug!(chat = %chat_id, error = %e, "Reply context incomplete");
        }

        Ok(())
    }

    /// Reopen both push subscriptions of the open chat, for instance after
    /// [`ChatSession::connection_status`] turned terminal. The window is kept.
    pub async fn reconnect(&self) -> Result<()> {
        let (chat_id, generation) = self.current()?;
        info!(chat = %chat_id, "Reconnecting live updates");
        self.resubscribe(&chat_id, generation, true).await
    }

    /// Open the push subscriptions for `chat_id` and start folding them.
    /// Unless `force` is set, a transport that is still connected is kept.
    async fn resubscribe(&self, chat_id: &ChatId, generation: u64, force: bool) -> Result<()> {
        let scope = BTreeSet::from([chat_id.to_string()]);

        {
            let mut transport = self.shared.messages.lock().await;
            // Another chat was opened while we waited for the transport.
            if self.shared.generation() != generation {
                return Ok(());
            }
            if force || transport.current_status() != ConnectionStatus::Connected {
                transport
                    .connect(scope.clone(), SubscriptionMode::FullStream)
                    .await?;
                tokio::spawn(run_message_loop(
                    Arc::downgrade(&self.shared),
                    generation,
                    transport.updates()?,
                ));
            }
        }

        let mut transport = self.shared.reactions.lock().await;
        if self.shared.generation() != generation {
            return Ok(());
        }
        if !force && transport.current_status() == ConnectionStatus::Connected {
            return Ok(());
        }
        match transport.connect(scope, SubscriptionMode::FullStream).await {
            Ok(()) => {
                let updates = transport.updates()?;
                tokio::spawn(run_reaction_loop(
                    Arc::downgrade(&self.shared),
                    generation,
                    updates,
                ));
            }
            Err(e) => warn!(chat = %chat_id, error = %e, "Reaction updates unavailable"),
        }

        Ok(())
    }

    /// Look up every reply target of the window that is neither loaded nor
    /// already asked for. Issues at most one request.
    pub async fn resolve_replies(&self) -> Result<()> {
        let (generation, ids) = {
            let mut state = self.shared.lock();
            if state.window.is_none() {
                return Err(ClientError::NoChatOpen);
            }
            let targets = state.missing_reply_targets();
            let ids = state.replies.begin_lookup(&targets);
            (state.generation, ids)
        };
        self.shared.fetch_replies(generation, ids).await
    }

    /// The message `message` replies to, if it is loaded or was resolved.
    pub fn reply_context(&self, message: &Message) -> Option<Message> {
        let target = message.reply_to.as_ref()?;
        let state = self.shared.lock();
        state
            .window
            .as_ref()
            .and_then(|w| w.get(target))
            .or_else(|| state.replies.get(target))
            .map(|m| state.read.with_read_flag(m))
    }

    /// Re-fetch the viewer's read marker and unread count.
    pub async fn refresh_read_marker(&self) -> Result<()> {
        let (chat_id, generation) = self.current()?;
        self.shared.refresh_read_state(&chat_id, generation).await
    }

    /// Post a message to the open chat. The returned copy is not merged;
    /// the message shows up through the push subscription.
    pub async fn send_message(&self, body: &str, reply_to: Option<MessageId>) -> Result<Message> {
        let (chat_id, _) = self.current()?;
        let draft = MessageDraft {
            chat_id,
            sender_id: self.shared.viewer.clone(),
            body: body.to_string(),
            reply_to,
        };
        let sent = self.shared.api.send_message(&draft).await?;
        info!(chat = %sent.chat_id, msg_id = %sent.id, "Message sent");
        Ok(sent)
    }

    pub async fn edit_message(&self, message_id: &MessageId, body: &str) -> Result<Message> {
        self.current()?;
        let edited = self.shared.api.edit_message(message_id, body).await?;
        debug!(msg_id = %message_id, "Message edited");
        Ok(edited)
    }

    pub async fn delete_message(&self, message_id: &MessageId) -> Result<()> {
        self.current()?;
        self.shared.api.delete_message(message_id).await?;
        debug!(msg_id = %message_id, "Message deleted");
        Ok(())
    }

    /// Move the viewer's read marker to `message_id`, then re-read the
    /// marker the server actually stored.
    pub async fn mark_read(&self, message_id: &MessageId) -> Result<()> {
        let (chat_id, generation) = self.current()?;
        self.shared
            .api
            .mark_read(&chat_id, &self.shared.viewer, message_id)
            .await?;
        self.shared.refresh_read_state(&chat_id, generation).await
    }

    /// Apply a marker obtained elsewhere (e.g. from the chat list).
    pub fn set_read_marker(&self, marker: &ReadMarker) {
        let mut state = self.shared.lock();
        if state.chat_id() == Some(&marker.chat_id) {
            state.read.set_marker(marker);
            self.shared.publish(&state);
        }
    }

    pub fn chat_id(&self) -> Option<ChatId> {
        self.shared.lock().chat_id().cloned()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.lock().snapshot()
    }

    /// Snapshots as they change. The receiver always holds the latest one.
    pub fn subscribe_snapshots(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Status of the message subscription.
    pub fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.clone()
    }

    /// Leave the current chat and close its subscriptions.
    pub async fn close(&self) {
        {
            let mut state = self.shared.lock();
            state.enter_scope(None);
            self.shared.publish(&state);
        }
        self.shared.messages.lock().await.disconnect().await;
        self.shared.reactions.lock().await.disconnect().await;
        info!("Chat session closed");
    }

    fn current(&self) -> Result<(ChatId, u64)> {
        let state = self.shared.lock();
        state
            .chat_id()
            .cloned()
            .map(|chat_id| (chat_id, state.generation))
            .ok_or(ClientError::NoChatOpen)
    }
}

/// Fold message batches for one scope until the connection ends, the scope
/// changes or the session is dropped.
async fn run_message_loop(
    shared: Weak<Shared>,
    generation: u64,
    mut updates: Updates<MessageEvent>,
) {
    while let Some(batch) = updates.recv().await {
        let Some(session) = shared.upgrade() else {
            break;
        };
        let Some(ids) = fold_messages(&session, generation, &batch) else {
            break;
        };
        if !ids.is_empty() {
            // Resolution must not hold up the next batch.
            tokio::spawn(async move {
                if let Err(e) = session.fetch_replies(generation, ids).await {
                    debug!(error = %e, "Reply context incomplete");
                }
            });
        }
    }
    debug!(generation, "Message loop finished");
}

/// Returns the reply targets to look up, or `None` if the scope is gone.
fn fold_messages(
    shared: &Shared,
    generation: u64,
    batch: &EventBatch<MessageEvent>,
) -> Option<Vec<MessageId>> {
    let mut state = shared.lock();
    if state.generation != generation {
        return None;
    }

    let SessionState {
        window,
        read,
        replies,
        reactions,
        ..
    } = &mut *state;
    let window = window.as_mut()?;
    let report = reconcile(window, read, &shared.viewer, batch);

    for event in batch.events() {
        match event {
            MessageEvent::Updated(message) => replies.refresh(message),
            MessageEvent::Deleted(stub) => reactions.forget(&stub.id),
            MessageEvent::Created(_) => {}
        }
    }

    let ids = replies.begin_lookup(&report.reply_targets);
    if report.window_changed() || report.read_changed {
        shared.publish(&state);
    }
    Some(ids)
}

async fn run_reaction_loop(
    shared: Weak<Shared>,
    generation: u64,
    mut updates: Updates<ReactionEvent>,
) {
    while let Some(batch) = updates.recv().await {
        let Some(session) = shared.upgrade() else {
            break;
        };
        if !fold_reactions(&session, generation, &batch) {
            break;
        }
    }
    debug!(generation, "Reaction loop finished");
}

/// Returns `false` if the scope is gone.
fn fold_reactions(shared: &Shared, generation: u64, batch: &EventBatch<ReactionEvent>) -> bool {
    let mut state = shared.lock();
    if state.generation != generation {
        return false;
    }
    if !state.reactions.apply(batch).is_empty() {
        shared.publish(&state);
    }
    true
}
