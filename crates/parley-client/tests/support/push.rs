use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::mpsc;

use parley_net::{FrameStream, NetError, PushConnector, Result, Subscription};
use parley_shared::{EventBatch, EventDomain};

type FrameSender = mpsc::UnboundedSender<Result<String>>;

/// Push connector backed by in-process channels. Each `open` is recorded
/// with its subscription so tests can both inspect and drive it.
#[derive(Default)]
pub struct ChannelConnector {
    opened: Mutex<Vec<(Subscription, FrameSender)>>,
}

impl ChannelConnector {
    pub fn subscriptions(&self, domain: EventDomain) -> Vec<Subscription> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s.domain == domain)
            .map(|(s, _)| s.clone())
            .collect()
    }

    /// Wait until `domain` has been opened at least `count` times.
    pub async fn wait_for_open(&self, domain: EventDomain, count: usize) -> Subscription {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let subs = self.subscriptions(domain);
                if subs.len() >= count {
                    return subs[count - 1].clone();
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("{domain} was not opened {count} time(s)"))
    }

    /// Send `batch` on the newest connection of `domain`.
    pub fn push<E: Serialize>(&self, domain: EventDomain, batch: &EventBatch<E>) {
        let frame = serde_json::to_string(batch).unwrap();
        self.push_raw(domain, frame);
    }

    pub fn push_raw(&self, domain: EventDomain, frame: impl Into<String>) {
        self.send(domain, Ok(frame.into()));
    }

    /// Break the newest connection of `domain` with a transport error.
    pub fn fail(&self, domain: EventDomain, reason: &str) {
        self.send(domain, Err(NetError::Closed(reason.into())));
    }

    fn send(&self, domain: EventDomain, item: Result<String>) {
        let opened = self.opened.lock().unwrap();
        let (_, tx) = opened
            .iter()
            .rev()
            .find(|(s, _)| s.domain == domain)
            .unwrap_or_else(|| panic!("no {domain} connection"));
        tx.send(item).unwrap();
    }
}

#[async_trait]
impl PushConnector for ChannelConnector {
    async fn open(&self, subscription: &Subscription) -> Result<FrameStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.opened.lock().unwrap().push((subscription.clone(), tx));
        let frames = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        });
        Ok(frames.boxed())
    }
}
