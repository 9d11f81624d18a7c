//! v001 -- Initial schema creation.
//!
//! Creates the session key/value table and the dismissed-notification set.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Key/value pairs (session token, serialized user)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS kv (
    key        TEXT PRIMARY KEY NOT NULL,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL                 -- RFC-3339
);

-- ----------------------------------------------------------------
-- Dismissed notifications (grow-only, per user)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS dismissed_notifications (
    user_id         INTEGER NOT NULL,
    notification_id TEXT NOT NULL,           -- JSON-encoded key
    dismissed_at    TEXT NOT NULL,

    PRIMARY KEY (user_id, notification_id)
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
