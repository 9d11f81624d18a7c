//! Per-user set of dismissed notification ids.
//!
//! The set only grows.  It is consulted before every notification merge so a
//! backend that keeps re-sending a dismissed notification cannot resurrect it.

use std::collections::HashSet;

use chrono::Utc;
use rusqlite::params;

use spaces_shared::types::NotificationId;
use spaces_shared::UserId;

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Record `id` as dismissed by `user`.  Returns `false` if it already was.
    pub fn dismiss_notification(&self, user: UserId, id: &NotificationId) -> Result<bool> {
        let encoded = serde_json::to_string(id)?;
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO dismissed_notifications (user_id, notification_id, dismissed_at)
             VALUES (?1, ?2, ?3)",
            params![user.0, encoded, Utc::now().to_rfc3339()],
        )?;
        Ok(inserted > 0)
    }

    pub fn dismissed_notifications(&self, user: UserId) -> Result<HashSet<NotificationId>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT notification_id FROM dismissed_notifications WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user.0], |row| row.get::<_, String>(0))?;

        let mut ids = HashSet::new();
        for row in rows {
            let raw = row?;
            match serde_json::from_str::<NotificationId>(&raw) {
                Ok(id) => {
                    ids.insert(id);
                }
                Err(e) => tracing::warn!(raw = %raw, error = %e, "skipping malformed dismissed id"),
            }
        }
        Ok(ids)
    }
}
