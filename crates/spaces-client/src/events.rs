use tokio::sync::broadcast;

use spaces_shared::types::CallId;
use spaces_shared::{Call, CallStatus, ChatId, Notification};

pub const EVENT_STATE_CHANGED: &str = "state-changed";
pub const EVENT_ACCESS_DENIED: &str = "access-denied";
pub const EVENT_NOTIFICATION_RECEIVED: &str = "notification-received";
pub const EVENT_INCOMING_CALL: &str = "incoming-call";
pub const EVENT_CALL_CLEARED: &str = "call-cleared";
pub const EVENT_CALL_ENDED: &str = "call-ended";
pub const EVENT_SESSION_EXPIRED: &str = "session-expired";

/// Which part of the snapshot moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Identity,
    Spaces,
    Thread(ChatId),
    Unread,
    Events,
    Search,
    View,
}

/// Everything observers of the engine are told about.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    StateChanged(Topic),
    /// A recoverable 403 or a gated navigation.  `chat` is set when a thread
    /// was involved.
    AccessDenied { chat: Option<ChatId>, reason: String },
    NotificationReceived(Notification),
    IncomingCall(Call),
    /// A surfaced incoming call disappeared before it was answered.
    CallCleared(CallId),
    CallEnded { id: CallId, status: CallStatus },
    /// The backend rejected the session.  Local state is wiped and every
    /// periodic task has stopped.
    SessionExpired,
}

impl SyncEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SyncEvent::StateChanged(_) => EVENT_STATE_CHANGED,
            SyncEvent::AccessDenied { .. } => EVENT_ACCESS_DENIED,
            SyncEvent::NotificationReceived(_) => EVENT_NOTIFICATION_RECEIVED,
            SyncEvent::IncomingCall(_) => EVENT_INCOMING_CALL,
            SyncEvent::CallCleared(_) => EVENT_CALL_CLEARED,
            SyncEvent::CallEnded { .. } => EVENT_CALL_ENDED,
            SyncEvent::SessionExpired => EVENT_SESSION_EXPIRED,
        }
    }
}

pub fn emit_event(tx: &broadcast::Sender<SyncEvent>, event: SyncEvent) {
    let name = event.name();
    if tx.send(event).is_err() {
        tracing::trace!(event = name, "No subscribers for event");
    }
}
