use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, info};

use parley_net::{EventTransport, PushConnector, Updates};
use parley_shared::{ConnectionStatus, EventDomain, Presence, PresenceEvent, SubscriptionMode, UserId};
use parley_store::PresenceMap;

use crate::error::Result;

#[derive(Default)]
struct FeedState {
    generation: u64,
    users: PresenceMap,
}

struct Shared {
    transport: AsyncMutex<EventTransport<PresenceEvent>>,
    status: watch::Receiver<ConnectionStatus>,
    state: Mutex<FeedState>,
    online_tx: watch::Sender<Vec<UserId>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Online status of a set of users.
#[derive(Clone)]
pub struct PresenceFeed {
    shared: Arc<Shared>,
}

impl PresenceFeed {
    pub fn new(connector: Arc<dyn PushConnector>) -> Self {
        let transport = EventTransport::new(connector, EventDomain::Presence);
        let status = transport.status();
        let (online_tx, _) = watch::channel(Vec::new());
        Self {
            shared: Arc::new(Shared {
                transport: AsyncMutex::new(transport),
                status,
                state: Mutex::new(FeedState::default()),
                online_tx,
            }),
        }
    }

    /// Follow `users`, replacing whatever was followed before.
    pub async fn watch(&self, users: BTreeSet<UserId>) -> Result<()> {
        let mut transport = self.shared.transport.lock().await;
        let generation = {
            let mut state = self.shared.lock();
            state.generation += 1;
            state.users = PresenceMap::new();
            self.shared.online_tx.send_replace(Vec::new());
            state.generation
        };

        if users.is_empty() {
            transport.disconnect().await;
            return Ok(());
        }

        let scope = users.iter().map(|u| u.to_string()).collect();
        transport.connect(scope, SubscriptionMode::LatestOnly).await?;
        let updates = transport.updates()?;
        tokio::spawn(run_presence_loop(
            Arc::downgrade(&self.shared),
            generation,
            updates,
        ));
        info!(users = users.len(), "Watching presence");
        Ok(())
    }

    pub fn get(&self, user_id: &UserId) -> Option<Presence> {
        self.shared.lock().users.get(user_id).cloned()
    }

    pub fn is_online(&self, user_id: &UserId) -> bool {
        self.shared.lock().users.is_online(user_id)
    }

    /// Sorted ids of the followed users that are online, as they change.
    pub fn subscribe_online(&self) -> watch::Receiver<Vec<UserId>> {
        self.shared.online_tx.subscribe()
    }

    pub fn connection_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.clone()
    }

    pub async fn close(&self) {
        self.shared.lock().generation += 1;
        self.shared.transport.lock().await.disconnect().await;
    }
}

async fn run_presence_loop(
    shared: Weak<Shared>,
    generation: u64,
    mut updates: Updates<PresenceEvent>,
) {
    while let Some(batch) = updates.recv().await {
        let Some(feed) = shared.upgrade() else {
            break;
        };
        let current = {
            let mut state = feed.lock();
            if state.generation == generation && state.users.apply(&batch) > 0 {
                feed.online_tx.send_replace(state.users.online_users());
            }
            state.generation == generation
        };
        if !current {
            break;
        }
    }
    debug!(generation, "Presence loop finished");
}
