//! Local fallback copy of calendar events.

use chrono::Utc;
use rusqlite::params;

use spaces_shared::{CalendarEvent, Key};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Insert or replace an event in the fallback store.
    pub fn save_local_event(&self, event: &CalendarEvent) -> Result<()> {
        let id = serde_json::to_string(&event.id)?;
        let body = serde_json::to_string(event)?;
        self.conn().execute(
            "INSERT INTO local_events (id, body, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET body = excluded.body",
            params![id, body, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Remove an event once the backend holds it.  Returns whether a row
    /// was deleted.
    pub fn delete_local_event(&self, id: &Key) -> Result<bool> {
        let id = serde_json::to_string(id)?;
        let n = self
            .conn()
            .execute("DELETE FROM local_events WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    /// All fallback events, oldest first.  Malformed rows are skipped.
    pub fn list_local_events(&self) -> Result<Vec<CalendarEvent>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT body FROM local_events ORDER BY created_at ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut events = Vec::new();
        for row in rows {
            let body = row?;
            match serde_json::from_str(&body) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!(error = %e, "skipping malformed local event"),
            }
        }
        Ok(events)
    }
}
