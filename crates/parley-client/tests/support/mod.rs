#![allow(dead_code)]

pub mod fake_api;
pub mod push;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use parley_client::{ClientConfig, SyncClient};
use parley_shared::{EventBatch, UserId};

pub use fake_api::{chat, history, message, Call, FakeApi};
pub use push::ChannelConnector;

pub const VIEWER: &str = "u1";

/// A client for `VIEWER` on fresh fakes.
pub fn client(page_size: u32) -> (SyncClient, Arc<FakeApi>, Arc<ChannelConnector>) {
    let api = FakeApi::new();
    let connector = Arc::new(ChannelConnector::default());
    let config = ClientConfig {
        user_id: Some(UserId::from(VIEWER)),
        page_size,
        ..ClientConfig::default()
    };
    let client = SyncClient::with_backends(api.clone(), connector.clone(), config).unwrap();
    (client, api, connector)
}

/// Wait for a watched value to satisfy `predicate` and return it.
pub async fn wait_until<T, F>(rx: &mut watch::Receiver<T>, mut predicate: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            {
                let current = rx.borrow_and_update();
                if predicate(&current) {
                    return current.clone();
                }
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("condition not reached in time")
}

/// A batch keyed by the given strings, in order.
pub fn batch<E>(events: Vec<(&str, E)>) -> EventBatch<E> {
    events.into_iter().collect()
}
