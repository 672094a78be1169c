use thiserror::Error;

use parley_shared::ProtocolError;

/// Errors produced by the network layer.
#[derive(Error, Debug)]
pub enum NetError {
    /// Transport-level HTTP failure (DNS, TLS, timeout, ...).
    #[error("HTTP error: {0}")]
    Http(Box<reqwest::Error>),

    /// The server answered with a non-success status.
    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    /// WebSocket handshake or stream failure.
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// `updates()` was called without a live connection.
    #[error("Not connected")]
    NotConnected,

    /// The update stream of the current connection was already taken.
    #[error("Update stream already has a subscriber")]
    AlreadySubscribed,

    /// The push connection ended.
    #[error("Connection closed: {0}")]
    Closed(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, NetError>;

impl From<reqwest::Error> for NetError {
    fn from(e: reqwest::Error) -> Self {
        NetError::Http(Box::new(e))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for NetError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        NetError::WebSocket(Box::new(e))
    }
}
