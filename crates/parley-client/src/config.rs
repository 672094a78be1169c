//! Client configuration loaded from environment variables.
//!
//! Everything except the viewer's user id has a default pointing at a local
//! development server.

use std::time::Duration;

use url::Url;

use parley_shared::constants::{
    DEFAULT_API_URL, DEFAULT_PAGE_SIZE, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_WS_URL,
};
use parley_shared::UserId;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST API. Must end with `/`.
    /// Env: `PARLEY_API_URL`
    /// Default: `http://127.0.0.1:8080/api/`
    pub api_url: String,

    /// Base URL of the push endpoints. Must end with `/`.
    /// Env: `PARLEY_WS_URL`
    /// Default: `ws://127.0.0.1:8080/ws/`
    pub ws_url: String,

    /// The viewing user.
    /// Env: `PARLEY_USER_ID`
    /// Default: none; required to build a client.
    pub user_id: Option<UserId>,

    /// Messages per page.
    /// Env: `PARLEY_PAGE_SIZE`
    /// Default: `30`
    pub page_size: u32,

    /// Env: `PARLEY_REQUEST_TIMEOUT_SECS`
    /// Default: `15`
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            user_id: None,
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`], reading from `lookup`.
    pub fn from_vars<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("PARLEY_API_URL") {
            match parse_base_url(&value) {
                Ok(url) => config.api_url = url.into(),
                Err(e) => tracing::warn!(value = %value, error = %e, "Invalid PARLEY_API_URL, using default"),
            }
        }

        if let Some(value) = lookup("PARLEY_WS_URL") {
            match parse_base_url(&value) {
                Ok(url) => config.ws_url = url.into(),
                Err(e) => tracing::warn!(value = %value, error = %e, "Invalid PARLEY_WS_URL, using default"),
            }
        }

        if let Some(value) = lookup("PARLEY_USER_ID") {
            let value = value.trim();
            if !value.is_empty() {
                config.user_id = Some(UserId::from(value));
            }
        }

        if let Some(value) = lookup("PARLEY_PAGE_SIZE") {
            match value.parse::<u32>() {
                Ok(n) if n > 0 => config.page_size = n,
                _ => tracing::warn!(value = %value, "Invalid PARLEY_PAGE_SIZE, using default"),
            }
        }

        if let Some(value) = lookup("PARLEY_REQUEST_TIMEOUT_SECS") {
            match value.parse::<u64>() {
                Ok(secs) if secs > 0 => config.request_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(
                    value = %value,
                    "Invalid PARLEY_REQUEST_TIMEOUT_SECS, using default"
                ),
            }
        }

        // RUST_LOG is read by tracing-subscriber directly.

        config
    }

    pub fn api_base(&self) -> Result<Url, url::ParseError> {
        parse_base_url(&self.api_url)
    }

    pub fn ws_base(&self) -> Result<Url, url::ParseError> {
        parse_base_url(&self.ws_url)
    }
}

/// Parse a base URL, adding the trailing slash `Url::join` needs to keep the
/// last path segment.
fn parse_base_url(value: &str) -> Result<Url, url::ParseError> {
    let value = value.trim();
    if value.ends_with('/') {
        Url::parse(value)
    } else {
        Url::parse(&format!("{value}/"))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert!(config.api_base().is_ok());
        assert!(config.ws_base().is_ok());
        assert_eq!(config.page_size, 30);
        assert!(config.user_id.is_none());
    }

    #[test]
    fn test_from_vars() {
        let env = vars(&[
            ("PARLEY_API_URL", "https://chat.example/api"),
            ("PARLEY_WS_URL", "wss://chat.example/ws/"),
            ("PARLEY_USER_ID", "u1"),
            ("PARLEY_PAGE_SIZE", "50"),
            ("PARLEY_REQUEST_TIMEOUT_SECS", "5"),
        ]);
        let config = ClientConfig::from_vars(|k| env.get(k).cloned());

        assert_eq!(config.api_url, "https://chat.example/api/");
        assert_eq!(config.ws_url, "wss://chat.example/ws/");
        assert_eq!(config.user_id, Some(UserId::from("u1")));
        assert_eq!(config.page_size, 50);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let env = vars(&[
            ("PARLEY_API_URL", "not a url"),
            ("PARLEY_PAGE_SIZE", "0"),
            ("PARLEY_REQUEST_TIMEOUT_SECS", "soon"),
            ("PARLEY_USER_ID", "   "),
        ]);
        let config = ClientConfig::from_vars(|k| env.get(k).cloned());

        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(
            config.request_timeout,
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
        );
        assert!(config.user_id.is_none());
    }
}
