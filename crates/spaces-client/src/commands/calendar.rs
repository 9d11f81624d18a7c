use tracing::{info, warn};
use uuid::Uuid;

use spaces_shared::types::Key;
use spaces_shared::{CalendarEvent, EventKind, UserId, ValidationError};

use crate::error::Result;
use crate::events::{SyncEvent, Topic};
use crate::state::lock;
use crate::sync::SyncEngine;

/// Fields the user fills in when scheduling.
#[derive(Debug, Clone, Default)]
pub struct EventDraft {
    pub title: String,
    pub description: String,
    pub date: String,
    pub time: String,
    pub duration: u32,
    pub kind: EventKind,
    pub attendees: Vec<UserId>,
}

impl EventDraft {
    fn into_event(self, creator: UserId) -> Result<CalendarEvent> {
        let title = self.title.trim();
        if title.is_empty() {
            return Err(ValidationError::Empty("title").into());
        }
        Ok(CalendarEvent {
            id: Key::Text(format!("evt-{}", Uuid::new_v4())),
            title: title.to_string(),
            description: self.description,
            date: self.date,
            time: self.time,
            duration: self.duration,
            kind: self.kind,
            created_by: Some(creator),
            attendees: self.attendees,
        })
    }
}

impl SyncEngine {
    /// Save an event.  When the backend cannot be reached the event is kept
    /// in the local store and served from there until it comes back.
    pub async fn save_event(&self, draft: EventDraft) -> Result<CalendarEvent> {
        let ctx = self.context();
        let event = draft.into_event(ctx.me()?)?;

        let stored = match ctx.backend.save_event(&event).await {
            Ok(stored) => stored,
            Err(e) if e.is_session_fatal() || e.is_forbidden() => return Err(ctx.check(e)),
            Err(e) => {
                warn!(error = %e, "events endpoint unavailable, saving locally");
                ctx.db().save_local_event(&event)?;
                event
            }
        };

        {
            let mut snap = lock(&ctx.state);
            if !snap.events.iter().any(|e| e.id == stored.id) {
                snap.events.push(stored.clone());
            }
        }
        info!(id = %stored.id, title = %stored.title, "event saved");
        ctx.emit(SyncEvent::StateChanged(Topic::Events));
        Ok(stored)
    }
}
