//! Single-slot, latest-value-wins channel.
//!
//! A slow receiver never sees a backlog: every publish overwrites whatever
//! the receiver has not taken yet. Built on `tokio::sync::watch`, whose
//! version counter gives exactly this behaviour.

use tokio::sync::watch;

/// Create a conflating channel.
pub fn channel<T: Clone>() -> (Sender<T>, Receiver<T>) {
    let (tx, rx) = watch::channel(None);
    (Sender { inner: tx }, Receiver { inner: rx })
}

#[derive(Debug)]
pub struct Sender<T> {
    inner: watch::Sender<Option<T>>,
}

impl<T> Sender<T> {
    /// Replace the pending value. Never blocks, never fails; a value published
    /// while nobody listens is simply kept until someone does.
    pub fn publish(&self, value: T) {
        self.inner.send_replace(Some(value));
    }
}

#[derive(Debug)]
pub struct Receiver<T> {
    inner: watch::Receiver<Option<T>>,
}

impl<T: Clone> Receiver<T> {
    /// Wait for the next value that has not been seen yet.
    ///
    /// A value published just before the sender went away is still delivered;
    /// after that, `None`.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            self.inner.changed().await.ok()?;
            if let Some(value) = self.inner.borrow_and_update().clone() {
                return Some(value);
            }
        }
    }
}
