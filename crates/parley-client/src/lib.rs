//! # parley-client
//!
//! Entry point of the sync core. A [`SyncClient`] is built once from
//! configuration and hands out the stateful pieces a chat UI needs: a
//! [`ChatSession`] for the open chat, a [`ChatListFeed`] for the list of
//! chats and a [`PresenceFeed`] for online status.

pub mod chat_list;
pub mod config;
pub mod error;
pub mod presence;
pub mod session;

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, EnvFilter};

use parley_net::{ChatApi, HttpChatApi, PushConnector, WebSocketConnector};
use parley_shared::constants::APP_NAME;
use parley_shared::UserId;

pub use chat_list::{ChatListFeed, ChatListSnapshot};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use presence::PresenceFeed;
pub use session::{ChatSession, SessionSnapshot};

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the
/// default filter. Calling it more than once is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("parley_client=debug,parley_net=debug,parley_store=info,warn")
    });

    let installed = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Starting {APP_NAME} sync client");
    }
}

/// Backends and settings shared by every session and feed.
#[derive(Clone)]
pub struct SyncClient {
    api: Arc<dyn ChatApi>,
    connector: Arc<dyn PushConnector>,
    viewer: UserId,
    config: ClientConfig,
}

impl SyncClient {
    /// Build a client talking HTTP and WebSocket to the configured server.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let api_base = config.api_base().map_err(parley_net::NetError::from)?;
        let ws_base = config.ws_base().map_err(parley_net::NetError::from)?;

        let api = HttpChatApi::new(api_base, config.request_timeout)?;
        let connector = WebSocketConnector::new(ws_base);
        Self::with_backends(Arc::new(api), Arc::new(connector), config)
    }

    /// Build a client on caller-provided backends.
    pub fn with_backends(
        api: Arc<dyn ChatApi>,
        connector: Arc<dyn PushConnector>,
        config: ClientConfig,
    ) -> Result<Self> {
        let viewer = config
            .user_id
            .clone()
            .ok_or_else(|| ClientError::Config("no user id configured".into()))?;
        if config.page_size == 0 {
            return Err(ClientError::Config("page size must be positive".into()));
        }

        tracing::debug!(
            viewer = %viewer,
            api = %config.api_url,
            ws = %config.ws_url,
            page_size = config.page_size,
            "Sync client configured"
        );

        Ok(Self {
            api,
            connector,
            viewer,
            config,
        })
    }

    /// Configure from `PARLEY_*` environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = ClientConfig::from_env();
        Self::new(config).context("Failed to build sync client from environment")
    }

    pub fn viewer(&self) -> &UserId {
        &self.viewer
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn api(&self) -> Arc<dyn ChatApi> {
        self.api.clone()
    }

    /// A new, empty chat session. Open a chat with
    /// [`ChatSession::load_next_page`].
    pub fn chat_session(&self) -> ChatSession {
        ChatSession::new(
            self.api.clone(),
            self.connector.clone(),
            self.viewer.clone(),
            self.config.page_size,
        )
    }

    /// A new chat list feed. Call [`ChatListFeed::load`] to build it.
    pub fn chat_list(&self) -> ChatListFeed {
        ChatListFeed::new(self.api.clone(), self.connector.clone(), self.viewer.clone())
    }

    pub fn presence(&self) -> PresenceFeed {
        PresenceFeed::new(self.connector.clone())
    }
}
