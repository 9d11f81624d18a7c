use rusqlite::Connection;

const UP_SQL: &str = r#"
-- Calendar events saved while the backend was unreachable
CREATE TABLE IF NOT EXISTS local_events (
    id         TEXT PRIMARY KEY NOT NULL,    -- JSON-encoded key
    body       TEXT NOT NULL,                -- full event JSON
    created_at TEXT NOT NULL
);

-- Call records (calls have no backend endpoint)
CREATE TABLE IF NOT EXISTS local_calls (
    id         TEXT PRIMARY KEY NOT NULL,    -- JSON-encoded key
    caller_id  INTEGER NOT NULL,
    callee_id  INTEGER NOT NULL,
    status     TEXT NOT NULL,
    body       TEXT NOT NULL,                -- full call JSON
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_local_calls_callee ON local_calls(callee_id, status);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
