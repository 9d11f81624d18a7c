//! Call records.
//!
//! Calls have no backend endpoint: they are client-local records whose
//! status transitions are picked up by polling.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use spaces_shared::types::CallId;
use spaces_shared::{Call, CallStatus, UserId};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Insert or replace a call record.
    pub fn upsert_call(&self, call: &Call) -> Result<()> {
        let id = serde_json::to_string(&call.id)?;
        let body = serde_json::to_string(call)?;
        self.conn().execute(
            "INSERT INTO local_calls (id, caller_id, callee_id, status, body, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET status = excluded.status,
                                           body = excluded.body,
                                           updated_at = excluded.updated_at",
            params![
                id,
                call.caller_id.0,
                call.callee_id.0,
                call.status.as_str(),
                body,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_call(&self, id: &CallId) -> Result<Option<Call>> {
        let key = serde_json::to_string(id)?;
        let body: Option<String> = self
            .conn()
            .query_row(
                "SELECT body FROM local_calls WHERE id = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        Ok(match body {
            Some(body) => Some(serde_json::from_str(&body)?),
            None => None,
        })
    }

    /// Update a call's status.  Returns `false` if the call is unknown.
    pub fn set_call_status(&self, id: &CallId, status: CallStatus) -> Result<bool> {
        match self.get_call(id)? {
            Some(mut call) => {
                call.status = status;
                self.upsert_call(&call)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Ringing calls addressed to `callee`, newest first.
    pub fn ringing_calls_for(&self, callee: UserId) -> Result<Vec<Call>> {
        let mut stmt = self.conn().prepare(
            "SELECT body FROM local_calls
             WHERE callee_id = ?1 AND status = ?2
             ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map(params![callee.0, CallStatus::Ringing.as_str()], |row| {
            row.get::<_, String>(0)
        })?;

        let mut calls = Vec::new();
        for row in rows {
            let body = row?;
            match serde_json::from_str(&body) {
                Ok(call) => calls.push(call),
                Err(e) => tracing::warn!(error = %e, "skipping malformed call record"),
            }
        }
        Ok(calls)
    }
}
