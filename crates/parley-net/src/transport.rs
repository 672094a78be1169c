//! Reconnectable push transport with one subscriber per connection.
//!
//! A connection is a background tokio task that reads frames from a
//! [`PushConnector`], decodes them into [`EventBatch`]es and publishes them
//! into a conflating channel. The owner talks to it only through
//! [`EventTransport::connect`], [`EventTransport::disconnect`] and the
//! [`Updates`] handle; reconnecting is always the owner's decision.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use parley_shared::{ConnectionStatus, EventBatch, EventDomain, SubscriptionMode};

use crate::conflate;
use crate::error::{NetError, Result};

/// Raw text frames of one push connection. An `Err` item is a transport
/// failure and ends the connection.
pub type FrameStream = BoxStream<'static, Result<String>>;

/// What a connection is filtered to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub domain: EventDomain,
    pub scope: BTreeSet<String>,
    pub mode: SubscriptionMode,
}

/// Opens push connections. The production implementation is
/// [`crate::websocket::WebSocketConnector`]; tests plug in channels.
#[async_trait]
pub trait PushConnector: Send + Sync {
    async fn open(&self, subscription: &Subscription) -> Result<FrameStream>;
}

/// The consumer side of one connection.
#[derive(Debug)]
pub struct Updates<E> {
    rx: conflate::Receiver<EventBatch<E>>,
}

impl<E: Clone> Updates<E> {
    /// The newest batch not yet seen, or `None` once the connection is gone
    /// and everything has been drained.
    pub async fn recv(&mut self) -> Option<EventBatch<E>> {
        self.rx.recv().await
    }
}

struct ActiveConnection<E> {
    subscription: Subscription,
    task: JoinHandle<()>,
    updates: Option<Updates<E>>,
}

/// Push transport for one event domain.
pub struct EventTransport<E> {
    connector: Arc<dyn PushConnector>,
    domain: EventDomain,
    active: Option<ActiveConnection<E>>,
    status_tx: watch::Sender<ConnectionStatus>,
}

impl<E> EventTransport<E>
where
    E: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(connector: Arc<dyn PushConnector>, domain: EventDomain) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            connector,
            domain,
            active: None,
            status_tx,
        }
    }

    pub fn domain(&self) -> EventDomain {
        self.domain
    }

    /// Open a connection filtered to `scope`. Any previous connection is torn
    /// down first, so there is never more than one live connection.
    pub async fn connect(
        &mut self,
        scope: BTreeSet<String>,
        mode: SubscriptionMode,
    ) -> Result<()> {
        self.disconnect().await;

        let subscription = Subscription {
            domain: self.domain,
            scope,
            mode,
        };

        self.status_tx.send_replace(ConnectionStatus::Connecting);
        let frames = match self.connector.open(&subscription).await {
            Ok(frames) => frames,
            Err(e) => {
                warn!(domain = %self.domain, error = %e, "Push connect failed");
                self.status_tx
                    .send_replace(ConnectionStatus::Failed(e.to_string()));
                return Err(e);
            }
        };

        let (tx, rx) = conflate::channel();

        // Before spawning: the task may finish at once and its terminal status
        // must not be overwritten.
        self.status_tx.send_replace(ConnectionStatus::Connected);
        let task = tokio::spawn(pump_frames(
            self.domain,
            frames,
            tx,
            self.status_tx.clone(),
        ));

        info!(
            domain = %self.domain,
            scope = subscription.scope.len(),
            mode = mode.as_query(),
            "Push connection opened"
        );

        self.active = Some(ActiveConnection {
            subscription,
            task,
            updates: Some(Updates { rx }),
        });
        Ok(())
    }

    /// Close the current connection. Returns once the reader task has
    /// stopped; a no-op when nothing is connected.
    pub async fn disconnect(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        active.task.abort();
        // Cancelled or already finished; either way it is gone.
        let _ = active.task.await;

        self.status_tx.send_replace(ConnectionStatus::Disconnected);
        debug!(domain = %self.domain, "Push connection torn down");
    }

    /// Take the update stream of the current connection. There is exactly
    /// one per connection.
    pub fn updates(&mut self) -> Result<Updates<E>> {
        let active = self.active.as_mut().ok_or(NetError::NotConnected)?;
        active.updates.take().ok_or(NetError::AlreadySubscribed)
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_tx.subscribe()
    }

    pub fn current_status(&self) -> ConnectionStatus {
        self.status_tx.borrow().clone()
    }

    /// The filter of the live connection, if any.
    pub fn subscription(&self) -> Option<&Subscription> {
        self.active.as_ref().map(|a| &a.subscription)
    }
}

impl<E> Drop for EventTransport<E> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
        }
    }
}

async fn pump_frames<E>(
    domain: EventDomain,
    mut frames: FrameStream,
    tx: conflate::Sender<EventBatch<E>>,
    status_tx: watch::Sender<ConnectionStatus>,
) where
    E: DeserializeOwned + Clone + Send + Sync + 'static,
{
    while let Some(frame) = frames.next().await {
        let text = match frame {
            Ok(text) => text,
            Err(e) => {
                warn!(domain = %domain, error = %e, "Push connection failed");
                status_tx.send_replace(ConnectionStatus::Failed(e.to_string()));
                return;
            }
        };

        match EventBatch::<E>::from_json(&text) {
            Ok(batch) if batch.is_empty() => {}
            Ok(batch) => {
                debug!(domain = %domain, events = batch.len(), "Push batch received");
                tx.publish(batch);
            }
            Err(e) => {
                warn!(domain = %domain, error = %e, len = text.len(), "Dropping malformed frame");
            }
        }
    }

    info!(domain = %domain, "Push connection closed by peer");
    status_tx.send_replace(ConnectionStatus::Closed);
}
