use thiserror::Error;

use parley_net::NetError;
use parley_store::StoreError;

/// Errors surfaced by sessions and feeds.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Network error: {0}")]
    Net(#[from] NetError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A chat operation was called before any chat was loaded.
    #[error("No chat is open")]
    NoChatOpen,
}

pub type Result<T> = std::result::Result<T, ClientError>;
