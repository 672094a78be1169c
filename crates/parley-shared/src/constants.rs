/// Application name
pub const APP_NAME: &str = "Parley";

/// Messages per page when the configuration does not say otherwise
pub const DEFAULT_PAGE_SIZE: u32 = 30;

/// Default REST API base URL (local development)
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8080/api/";

/// Default push endpoint base URL (local development)
pub const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8080/ws/";

/// Default HTTP request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Maximum concurrent per-chat requests while building the chat list
pub const CHAT_LIST_CONCURRENCY: usize = 8;

/// Number of messages fetched when only a chat's latest message is needed
pub const LAST_MESSAGE_PAGE_SIZE: u32 = 1;
