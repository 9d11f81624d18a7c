//! Client configuration loaded from environment variables.
//!
//! All settings have defaults so the client can start with zero
//! configuration against a backend on localhost.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use spaces_net::realtime::ws_base_from_api;
use spaces_shared::constants::{
    CALL_POLL_MS, DEFAULT_API_URL, EVENTS_POLL_MS, IDENTITY_POLL_MS, REQUEST_TIMEOUT_SECS,
    SEARCH_DEBOUNCE_MS, SPACE_POLL_MS, THREAD_POLL_MS, UNREAD_POLL_MS,
};

/// Cadences of the sync engine's periodic tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTimings {
    pub identity: Duration,
    pub space: Duration,
    pub unread: Duration,
    pub thread: Duration,
    pub events: Duration,
    pub calls: Duration,
    pub search_debounce: Duration,
}

impl Default for SyncTimings {
    fn default() -> Self {
        Self {
            identity: Duration::from_millis(IDENTITY_POLL_MS),
            space: Duration::from_millis(SPACE_POLL_MS),
            unread: Duration::from_millis(UNREAD_POLL_MS),
            thread: Duration::from_millis(THREAD_POLL_MS),
            events: Duration::from_millis(EVENTS_POLL_MS),
            calls: Duration::from_millis(CALL_POLL_MS),
            search_debounce: Duration::from_millis(SEARCH_DEBOUNCE_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base URL.
    /// Env: `SPACES_API_URL`
    /// Default: `http://127.0.0.1:8000`
    pub api_url: Url,

    /// WebSocket base URL.
    /// Env: `SPACES_WS_URL`
    /// Default: the API URL with `http`→`ws`, `https`→`wss`.
    pub ws_url: Url,

    /// Directory holding `spaces.db`.
    /// Env: `SPACES_DATA_DIR`
    /// Default: `None` (platform data directory).
    pub data_dir: Option<PathBuf>,

    pub timings: SyncTimings,

    /// Env: `SPACES_REQUEST_TIMEOUT_SECS`
    pub request_timeout: Duration,

    /// Credentials for a headless login when no session is stored.
    /// Env: `SPACES_EMAIL`, `SPACES_PASSWORD`
    pub email: Option<String>,
    pub password: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let api_url = default_api_url();
        let ws_url = ws_base_from_api(&api_url).unwrap_or_else(|_| api_url.clone());
        Self {
            api_url,
            ws_url,
            data_dir: None,
            timings: SyncTimings::default(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            email: None,
            password: None,
        }
    }
}

fn default_api_url() -> Url {
    match Url::parse(DEFAULT_API_URL) {
        Ok(url) => url,
        Err(_) => unreachable!("DEFAULT_API_URL is a valid url"),
    }
}

impl ClientConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup("SPACES_API_URL") {
            match Url::parse(&raw) {
                Ok(url) => match ws_base_from_api(&url) {
                    Ok(ws) => {
                        config.api_url = url;
                        config.ws_url = ws;
                    }
                    Err(e) => {
                        tracing::warn!(value = %raw, error = %e, "Invalid SPACES_API_URL, using default")
                    }
                },
                Err(e) => {
                    tracing::warn!(value = %raw, error = %e, "Invalid SPACES_API_URL, using default")
                }
            }
        }

        if let Some(raw) = lookup("SPACES_WS_URL") {
            match Url::parse(&raw) {
                Ok(url) if matches!(url.scheme(), "ws" | "wss") => config.ws_url = url,
                _ => tracing::warn!(value = %raw, "Invalid SPACES_WS_URL, using derived value"),
            }
        }

        if let Some(dir) = lookup("SPACES_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = Some(PathBuf::from(dir));
            }
        }

        let t = &mut config.timings;
        read_millis(&lookup, "SPACES_IDENTITY_POLL_MS", &mut t.identity);
        read_millis(&lookup, "SPACES_SPACE_POLL_MS", &mut t.space);
        read_millis(&lookup, "SPACES_UNREAD_POLL_MS", &mut t.unread);
        read_millis(&lookup, "SPACES_THREAD_POLL_MS", &mut t.thread);
        read_millis(&lookup, "SPACES_EVENTS_POLL_MS", &mut t.events);
        read_millis(&lookup, "SPACES_CALL_POLL_MS", &mut t.calls);
        read_millis(&lookup, "SPACES_SEARCH_DEBOUNCE_MS", &mut t.search_debounce);

        if let Some(raw) = lookup("SPACES_REQUEST_TIMEOUT_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => config.request_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(
                    value = %raw,
                    "Invalid SPACES_REQUEST_TIMEOUT_SECS, using default"
                ),
            }
        }

        config.email = lookup("SPACES_EMAIL").filter(|s| !s.is_empty());
        config.password = lookup("SPACES_PASSWORD").filter(|s| !s.is_empty());

        config
    }
}

fn read_millis<F>(lookup: &F, key: &str, slot: &mut Duration)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(key) {
        match raw.parse::<u64>() {
            Ok(ms) if ms > 0 => *slot = Duration::from_millis(ms),
            _ => tracing::warn!(key, value = %raw, "Invalid interval, using default"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> ClientConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = config(&[]);
        assert_eq!(config.api_url.as_str(), "http://127.0.0.1:8000/");
        assert_eq!(config.ws_url.scheme(), "ws");
        assert_eq!(config.timings.thread, Duration::from_millis(1_000));
        assert_eq!(config.timings.search_debounce, Duration::from_millis(300));
        assert!(config.email.is_none());
    }

    #[test]
    fn test_secure_api_derives_secure_socket() {
        let config = config(&[("SPACES_API_URL", "https://spaces.example.com")]);
        assert_eq!(config.ws_url.scheme(), "wss");
        assert_eq!(config.ws_url.host_str(), Some("spaces.example.com"));
    }

    #[test]
    fn test_explicit_ws_url_wins() {
        let config = config(&[
            ("SPACES_API_URL", "https://api.example.com"),
            ("SPACES_WS_URL", "wss://push.example.com"),
        ]);
        assert_eq!(config.ws_url.host_str(), Some("push.example.com"));
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = config(&[
            ("SPACES_API_URL", "not a url"),
            ("SPACES_THREAD_POLL_MS", "soon"),
            ("SPACES_CALL_POLL_MS", "0"),
            ("SPACES_WS_URL", "http://wrong-scheme"),
        ]);
        assert_eq!(config.api_url.as_str(), "http://127.0.0.1:8000/");
        assert_eq!(config.ws_url.scheme(), "ws");
        assert_eq!(config.timings.thread, Duration::from_millis(1_000));
        assert_eq!(config.timings.calls, Duration::from_millis(1_500));
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("SPACES_UNREAD_POLL_MS", "500"),
            ("SPACES_DATA_DIR", "/tmp/spaces"),
            ("SPACES_EMAIL", "ada@example.com"),
            ("SPACES_PASSWORD", ""),
        ]);
        assert_eq!(config.timings.unread, Duration::from_millis(500));
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/spaces")));
        assert_eq!(config.email.as_deref(), Some("ada@example.com"));
        assert!(config.password.is_none());
    }
}
