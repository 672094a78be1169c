//! # parley-store
//!
//! In-memory state of the sync core: the paginated message window of the
//! open chat, the read tracker, reply and reaction caches, and the chat list
//! summaries. Everything here is synchronous and deterministic; the client
//! crate owns the tasks that feed it.

pub mod presence;
pub mod reactions;
pub mod read_state;
pub mod reconcile;
pub mod replies;
pub mod summaries;
pub mod window;

mod error;

pub use error::{Result, StoreError};
pub use presence::PresenceMap;
pub use reactions::ReactionIndex;
pub use read_state::{ChatReadState, ReadChange};
pub use reconcile::{apply_event, reconcile, Applied, ReconcileReport};
pub use replies::ReplyCache;
pub use summaries::{ChatDisplaySummary, ChatSummaries, SummaryDelta, SummarySeed};
pub use window::{MessageWindow, PageMerge};
