//! # parley-shared
//!
//! Identifiers, domain models and push-event envelopes shared by every other
//! Parley crate.

pub mod constants;
pub mod error;
pub mod models;
pub mod protocol;
pub mod state;
pub mod types;

pub use error::ProtocolError;
pub use models::*;
pub use protocol::{ChatEvent, EventBatch, MessageEvent, PresenceEvent, ReactionEvent};
pub use state::LoadState;
pub use types::*;
