//! Persisted session: the signed-in user record and its bearer token.
//!
//! Stored as two fixed keys in the `kv` table so either half can be read
//! without decoding the other.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use spaces_shared::User;

use crate::database::Database;
use crate::error::Result;
use crate::models::StoredSession;

pub const TOKEN_KEY: &str = "spaces_token";
pub const USER_KEY: &str = "spaces_user";

impl Database {
    /// Persist `user` and `token`, replacing any previous session.
    pub fn save_session(&mut self, user: &User, token: &str) -> Result<()> {
        let user_json = serde_json::to_string(user)?;
        let now = Utc::now().to_rfc3339();

        let tx = self.conn_mut().transaction()?;
        for (key, value) in [(TOKEN_KEY, token), (USER_KEY, user_json.as_str())] {
            tx.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )?;
        }
        tx.commit()?;

        tracing::debug!(user_id = %user.id, "session saved");
        Ok(())
    }

    /// Load the stored session.  `None` if either half is missing.
    pub fn load_session(&self) -> Result<Option<StoredSession>> {
        let token = self.kv_get(TOKEN_KEY)?;
        let user_json = self.kv_get(USER_KEY)?;

        match (token, user_json) {
            (Some(token), Some(user_json)) => {
                let user: User = serde_json::from_str(&user_json)?;
                Ok(Some(StoredSession { user, token }))
            }
            _ => Ok(None),
        }
    }

    /// Remove the stored session.  Safe to call when nothing is stored.
    pub fn clear_session(&self) -> Result<()> {
        let removed = self.conn().execute(
            "DELETE FROM kv WHERE key IN (?1, ?2)",
            params![TOKEN_KEY, USER_KEY],
        )?;
        if removed > 0 {
            tracing::info!("session cleared");
        }
        Ok(())
    }

    fn kv_get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?)
    }
}
