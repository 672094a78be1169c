//! The viewer's chat list, built once and then kept current by push events.
//!
//! The initial build resolves every chat concurrently (bounded). After that
//! two latest-only subscriptions keep it fresh: message events for every
//! listed chat, and chat metadata events for the viewer.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info, warn};

use parley_net::{ChatApi, EventTransport, PushConnector, Updates};
use parley_shared::constants::{CHAT_LIST_CONCURRENCY, LAST_MESSAGE_PAGE_SIZE};
use parley_shared::{
    Chat, ChatEvent, ChatId, ChatKind, EventBatch, EventDomain, LoadState, MessageEvent,
    SubscriptionMode, UserId,
};
use parley_store::summaries::group_name;
use parley_store::{ChatDisplaySummary, ChatSummaries, SummarySeed};

use crate::error::Result;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatListSnapshot {
    /// Sorted for display.
    pub chats: Vec<ChatDisplaySummary>,
    /// Number of chats listed once the build finished.
    pub load: LoadState<usize>,
}

struct ListState {
    generation: u64,
    summaries: ChatSummaries,
    load: LoadState<usize>,
}

struct Shared {
    api: Arc<dyn ChatApi>,
    viewer: UserId,
    messages: AsyncMutex<EventTransport<MessageEvent>>,
    chats: AsyncMutex<EventTransport<ChatEvent>>,
    state: Mutex<ListState>,
    snapshot_tx: watch::Sender<ChatListSnapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ListState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &ListState) {
        self.snapshot_tx.send_replace(ChatListSnapshot {
            chats: state.summaries.sorted(),
            load: state.load.clone(),
        });
    }

    /// Point the message subscription at the current set of chats.
    async fn resubscribe_messages(&self, generation: u64, this: Weak<Shared>) -> Result<()> {
        let mut transport = self.messages.lock().await;
        let scope: BTreeSet<String> = {
            let state = self.lock();
            if state.generation != generation {
                return Ok(());
            }
            state
                .summaries
                .chat_ids()
                .into_iter()
                .map(|id| id.to_string())
                .collect()
        };

        if scope.is_empty() {
            transport.disconnect().await;
            return Ok(());
        }

        debug!(chats = scope.len(), "Subscribing to chat list messages");
        transport.connect(scope, SubscriptionMode::LatestOnly).await?;
        let updates = transport.updates()?;
        tokio::spawn(run_message_loop(this, generation, updates));
        Ok(())
    }

    /// Fetch the latest message of a chat whose last message was deleted.
    async fn refresh_last_message(&self, generation: u64, chat_id: ChatId) {
        let latest = match self.api.get_messages(&chat_id, 0, LAST_MESSAGE_PAGE_SIZE).await {
            Ok(page) => page.into_iter().next(),
            Err(e) => {
                warn!(chat = %chat_id, error = %e, "Failed to refresh last message");
                return;
            }
        };

        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        state.summaries.refresh_last_message(&chat_id, latest);
        self.publish(&state);
    }

    /// Resolve and insert chats announced by metadata events.
    async fn add_chats(&self, generation: u64, chat_ids: BTreeSet<ChatId>) -> bool {
        let chats: Vec<Chat> = stream::iter(chat_ids)
            .map(|chat_id| async move {
                match self.api.get_chat(&chat_id).await {
                    Ok(chat) => Some(chat),
                    Err(e) => {
                        warn!(chat = %chat_id, error = %e, "Failed to fetch new chat");
                        None
                    }
                }
            })
            .buffer_unordered(CHAT_LIST_CONCURRENCY)
            .filter_map(|chat| async move { chat })
            .collect()
            .await;

        let seeds = build_seeds(self.api.as_ref(), &self.viewer, chats).await;

        let mut state = self.lock();
        if state.generation != generation || seeds.is_empty() {
            return false;
        }
        for seed in seeds {
            info!(chat = %seed.chat.id, "Chat added to list");
            state.summaries.seed(seed);
        }
        self.publish(&state);
        true
    }
}

/// Live chat list of one viewer. Cheap to clone.
#[derive(Clone)]
pub struct ChatListFeed {
    shared: Arc<Shared>,
}

impl ChatListFeed {
    pub fn new(api: Arc<dyn ChatApi>, connector: Arc<dyn PushConnector>, viewer: UserId) -> Self {
        let (snapshot_tx, _) = watch::channel(ChatListSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                api,
                messages: AsyncMutex::new(EventTransport::new(
                    connector.clone(),
                    EventDomain::Messages,
                )),
                chats: AsyncMutex::new(EventTransport::new(connector, EventDomain::Chats)),
                state: Mutex::new(ListState {
                    generation: 0,
                    summaries: ChatSummaries::new(viewer.clone()),
                    load: LoadState::NotStarted,
                }),
                viewer,
                snapshot_tx,
            }),
        }
    }

    /// Build the list from scratch and (re)open its subscriptions.
    ///
    /// Listing the chats must succeed; a chat whose details cannot be fetched
    /// is left out and logged.
    pub async fn load(&self) -> Result<()> {
        let shared = &self.shared;
        let generation = {
            let mut state = shared.lock();
            state.generation += 1;
            state.load = LoadState::Loading;
            shared.publish(&state);
            state.generation
        };

        let chats = match shared.api.list_chats(&shared.viewer).await {
            Ok(chats) => chats,
            Err(e) => {
                warn!(error = %e, "Failed to list chats");
                let mut state = shared.lock();
                if state.generation == generation {
                    state.load = LoadState::Error(e.to_string());
                    shared.publish(&state);
                }
                return Err(e.into());
            }
        };

        let listed = chats.len();
        let seeds = build_seeds(shared.api.as_ref(), &shared.viewer, chats).await;

        {
            let mut state = shared.lock();
            if state.generation != generation {
                return Ok(());
            }
            state.summaries = ChatSummaries::new(shared.viewer.clone());
            for seed in seeds {
                state.summaries.seed(seed);
            }
            let built = state.summaries.len();
            state.load = LoadState::Success(built);
            shared.publish(&state);
            info!(listed, built, "Chat list built");
        }

        shared
            .resubscribe_messages(generation, Arc::downgrade(shared))
            .await?;

        let mut transport = shared.chats.lock().await;
        let scope = BTreeSet::from([shared.viewer.to_string()]);
        transport.connect(scope, SubscriptionMode::LatestOnly).await?;
        let updates = transport.updates()?;
        tokio::spawn(run_chat_loop(Arc::downgrade(shared), generation, updates));

        Ok(())
    }

    pub fn get(&self, chat_id: &ChatId) -> Option<ChatDisplaySummary> {
        self.shared.lock().summaries.get(chat_id)
    }

    /// Summaries sorted for display.
    pub fn sorted(&self) -> Vec<ChatDisplaySummary> {
        self.shared.lock().summaries.sorted()
    }

    pub fn snapshot(&self) -> ChatListSnapshot {
        self.shared.snapshot_tx.borrow().clone()
    }

    pub fn subscribe_snapshots(&self) -> watch::Receiver<ChatListSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Re-fetch the read marker and unread count of one chat, e.g. after
    /// the viewer read it in a session.
    pub async fn refresh_read_state(&self, chat_id: &ChatId) -> Result<()> {
        let shared = &self.shared;
        let (marker, unread) = tokio::try_join!(
            shared.api.get_read_marker(chat_id, &shared.viewer),
            shared.api.get_unread_count(chat_id, &shared.viewer),
        )?;

        let mut state = shared.lock();
        if state.summaries.set_marker(&marker) {
            state.summaries.set_unread(chat_id, unread);
            shared.publish(&state);
        }
        Ok(())
    }

    pub async fn close(&self) {
        {
            let mut state = self.shared.lock();
            state.generation += 1;
            state.summaries = ChatSummaries::new(self.shared.viewer.clone());
            state.load = LoadState::NotStarted;
            self.shared.publish(&state);
        }
        self.shared.messages.lock().await.disconnect().await;
        self.shared.chats.lock().await.disconnect().await;
        info!("Chat list closed");
    }
}

/// Resolve display data for `chats`, at most [`CHAT_LIST_CONCURRENCY`] at a
/// time. Chats that fail are skipped.
async fn build_seeds(api: &dyn ChatApi, viewer: &UserId, chats: Vec<Chat>) -> Vec<SummarySeed> {
    stream::iter(chats)
        .map(|chat| async move {
            let chat_id = chat.id.clone();
            match build_seed(api, viewer, chat).await {
                Ok(seed) => Some(seed),
                Err(e) => {
                    warn!(chat = %chat_id, error = %e, "Skipping chat");
                    None
                }
            }
        })
        .buffer_unordered(CHAT_LIST_CONCURRENCY)
        .filter_map(|seed| async move { seed })
        .collect()
        .await
}

async fn build_seed(
    api: &dyn ChatApi,
    viewer: &UserId,
    chat: Chat,
) -> parley_net::Result<SummarySeed> {
    let (name, avatar) = match (chat.kind, chat.other_member(viewer)) {
        (ChatKind::Personal, Some(other)) => {
            let profile = api.get_user(other).await?;
            (profile.display_name, profile.avatar)
        }
        // Group chats, and personal chats with nobody else left in them.
        _ => (group_name(&chat), chat.avatar.clone()),
    };

    let (last, marker, unread) = tokio::try_join!(
        api.get_messages(&chat.id, 0, LAST_MESSAGE_PAGE_SIZE),
        api.get_read_marker(&chat.id, viewer),
        api.get_unread_count(&chat.id, viewer),
    )?;

    Ok(SummarySeed {
        chat,
        name,
        avatar,
        last_message: last.into_iter().next(),
        marker: Some(marker),
        unread,
    })
}

async fn run_message_loop(
    shared: Weak<Shared>,
    generation: u64,
    mut updates: Updates<MessageEvent>,
) {
    while let Some(batch) = updates.recv().await {
        let Some(feed) = shared.upgrade() else {
            break;
        };
        let Some(needs_refresh) = fold_messages(&feed, generation, &batch) else {
            break;
        };
        for chat_id in needs_refresh {
            let feed = feed.clone();
            tokio::spawn(async move { feed.refresh_last_message(generation, chat_id).await });
        }
    }
    debug!(generation, "Chat list message loop finished");
}

fn fold_messages(
    shared: &Shared,
    generation: u64,
    batch: &EventBatch<MessageEvent>,
) -> Option<BTreeSet<ChatId>> {
    let mut state = shared.lock();
    if state.generation != generation {
        return None;
    }
    let delta = state.summaries.apply_messages(batch);
    if !delta.changed.is_empty() {
        shared.publish(&state);
    }
    Some(delta.needs_refresh)
}

async fn run_chat_loop(shared: Weak<Shared>, generation: u64, mut updates: Updates<ChatEvent>) {
    while let Some(batch) = updates.recv().await {
        let Some(feed) = shared.upgrade() else {
            break;
        };

        let delta = {
            let mut state = feed.lock();
            if state.generation != generation {
                break;
            }
            let delta = state.summaries.apply_chats(&batch);
            if !delta.changed.is_empty() || !delta.removed.is_empty() {
                feed.publish(&state);
            }
            delta
        };

        let mut membership_changed = !delta.removed.is_empty();
        if !delta.added.is_empty() {
            membership_changed |= feed.add_chats(generation, delta.added).await;
        }
        if membership_changed {
            if let Err(e) = feed
                .resubscribe_messages(generation, shared.clone())
                .await
            {
                warn!(error = %e, "Failed to follow chat list membership");
            }
        }
    }
    debug!(generation, "Chat list metadata loop finished");
}
