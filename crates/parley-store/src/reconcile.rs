//! Folding pushed message events into a chat's window.
//!
//! The fold is pure: the same window, read state and batch always produce the
//! same result. Anything asynchronous (resolving reply targets) is returned
//! to the caller in the [`ReconcileReport`] instead of being done here.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use parley_shared::{EventBatch, MessageEvent, MessageId, UserId};

use crate::read_state::{ChatReadState, ReadChange};
use crate::window::MessageWindow;

/// Outcome of one event against the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Appended,
    /// CREATED for an id already held; replaced in place.
    Replaced,
    Updated,
    Removed(usize),
    /// Event for a message outside the window (or another chat).
    Ignored,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub appended: Vec<MessageId>,
    pub updated: Vec<MessageId>,
    pub removed: Vec<MessageId>,
    pub ignored: Vec<MessageId>,
    /// Reply targets of new messages that are not in the window.
    pub reply_targets: BTreeSet<MessageId>,
    pub read_changed: bool,
}

impl ReconcileReport {
    pub fn window_changed(&self) -> bool {
        !(self.appended.is_empty() && self.updated.is_empty() && self.removed.is_empty())
    }
}

/// Apply one event to the window only.
pub fn apply_event(window: &mut MessageWindow, event: &MessageEvent) -> Applied {
    if event.chat_id() != window.chat_id() {
        return Applied::Ignored;
    }

    match event {
        MessageEvent::Created(message) => {
            if window.upsert(message.clone()) {
                Applied::Appended
            } else {
                Applied::Replaced
            }
        }
        MessageEvent::Updated(message) => {
            if window.replace(message.clone()) {
                Applied::Updated
            } else {
                Applied::Ignored
            }
        }
        MessageEvent::Deleted(stub) => match window.remove(&stub.id) {
            0 => Applied::Ignored,
            n => Applied::Removed(n),
        },
    }
}

/// Fold a batch into the window and re-run the read tracker after every
/// event, in the batch's key order.
pub fn reconcile(
    window: &mut MessageWindow,
    read: &mut ChatReadState,
    viewer: &UserId,
    batch: &EventBatch<MessageEvent>,
) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for (key, event) in batch.iter() {
        let applied = apply_event(window, event);
        trace!(key = %key, ?applied, "Applied message event");

        let id = event.message_id().clone();
        match applied {
            Applied::Appended => {
                if let MessageEvent::Created(message) = event {
                    if let Some(target) = &message.reply_to {
                        if !window.contains(target) {
                            report.reply_targets.insert(target.clone());
                        }
                    }
                }
                report.appended.push(id);
            }
            Applied::Replaced | Applied::Updated => report.updated.push(id),
            Applied::Removed(_) => report.removed.push(id),
            Applied::Ignored => {
                report.ignored.push(id);
                if event.chat_id() != window.chat_id() {
                    continue;
                }
            }
        }

        match read.apply(event, viewer) {
            ReadChange::None => {}
            ReadChange::LastMessageChanged => report.read_changed = true,
            ReadChange::LastMessageRemoved => {
                read.set_last_message(window.newest().cloned());
                report.read_changed = true;
            }
        }
    }

    // A target that arrived later in the same batch needs no lookup.
    report.reply_targets.retain(|id| !window.contains(id));

    debug!(
        chat = %window.chat_id(),
        appended = report.appended.len(),
        updated = report.updated.len(),
        removed = report.removed.len(),
        ignored = report.ignored.len(),
        "Reconciled batch"
    );

    report
}
