/// Application name
pub const APP_NAME: &str = "Spaces";

/// Default REST base URL for local development
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Timestamps below this are seconds, not milliseconds (10^12)
pub const SECONDS_SCALE_CEILING: f64 = 1_000_000_000_000.0;

/// Header carrying the caller's user id on every request
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Default avatar glyph for new accounts
pub const DEFAULT_AVATAR: &str = "👤";

/// Channels every new space starts with
pub const DEFAULT_CHANNELS: [&str; 2] = ["general", "random"];

/// Poll cadences (milliseconds)
pub const IDENTITY_POLL_MS: u64 = 2_000;
pub const SPACE_POLL_MS: u64 = 2_000;
pub const UNREAD_POLL_MS: u64 = 3_000;
pub const THREAD_POLL_MS: u64 = 1_000;
pub const EVENTS_POLL_MS: u64 = 5_000;
pub const CALL_POLL_MS: u64 = 1_500;

/// Quiet period after the last keystroke before a search runs
pub const SEARCH_DEBOUNCE_MS: u64 = 300;

/// Delay before a dropped socket is reopened
pub const SOCKET_RECONNECT_SECS: u64 = 3;

/// Per-request HTTP timeout
pub const REQUEST_TIMEOUT_SECS: u64 = 15;
