//! Merge steps.
//!
//! Every function here takes the snapshot and freshly obtained data and
//! returns whether anything changed.  None of them perform I/O, so the same
//! merge runs whether the data came from a poll or a push frame.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use spaces_shared::types::{CallId, NotificationId};
use spaces_shared::{CalendarEvent, Call, CallStatus, ChatId, Message, Notification, Space, User};

use crate::state::Snapshot;

/// Result of an identity merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdentityChange {
    pub changed: bool,
    /// The space list changed length; the caller should reload spaces.
    pub spaces_changed: bool,
}

pub fn filter_dismissed(user: &mut User, dismissed: &HashSet<NotificationId>) {
    user.notifications.retain(|n| !dismissed.contains(&n.id));
}

/// Replace the cached user when the friend, notification or space count
/// moved.  Dismissed notifications are filtered out before comparing.
pub fn merge_identity(
    snap: &mut Snapshot,
    mut fresh: User,
    dismissed: &HashSet<NotificationId>,
) -> IdentityChange {
    filter_dismissed(&mut fresh, dismissed);

    let change = match &snap.user {
        None => IdentityChange {
            changed: true,
            spaces_changed: true,
        },
        Some(cached) => {
            let spaces_changed = cached.spaces.len() != fresh.spaces.len();
            IdentityChange {
                changed: spaces_changed
                    || cached.friends.len() != fresh.friends.len()
                    || cached.notifications.len() != fresh.notifications.len(),
                spaces_changed,
            }
        }
    };

    if change.changed {
        debug!(user_id = %fresh.id, "identity changed");
        snap.user = Some(fresh);
    }
    change
}

/// Replace the user directory when its size changes.
pub fn merge_directory(snap: &mut Snapshot, fresh: Vec<User>) -> bool {
    if snap.users.len() == fresh.len() {
        return false;
    }
    snap.users = fresh;
    true
}

/// Replace the whole space list, keeping each space's local `expanded` flag.
pub fn merge_spaces(snap: &mut Snapshot, mut fresh: Vec<Space>) -> bool {
    for space in &mut fresh {
        if let Some(old) = snap.space(space.id) {
            space.expanded = old.expanded;
        }
    }
    if snap.spaces == fresh {
        return false;
    }
    snap.spaces = fresh;
    true
}

/// Replace one space if its member count or serialized channel list moved.
pub fn merge_active_space(snap: &mut Snapshot, mut fresh: Space) -> bool {
    let Some(old) = snap.space_mut(fresh.id) else {
        snap.spaces.push(fresh);
        return true;
    };

    let same_members = old.members.len() == fresh.members.len();
    let same_channels = serde_json::to_string(&old.channels).ok()
        == serde_json::to_string(&fresh.channels).ok();
    if same_members && same_channels {
        return false;
    }

    fresh.expanded = old.expanded;
    *old = fresh;
    true
}

/// Replace a thread only when its length differs from the cached one.
pub fn merge_thread(snap: &mut Snapshot, chat: ChatId, fresh: Vec<Message>) -> bool {
    if let Some(cached) = snap.messages.get(&chat) {
        if cached.len() == fresh.len() {
            return false;
        }
    }
    snap.messages.insert(chat, Arc::new(fresh));
    true
}

/// Drop one thread's cache after access was revoked.  Other threads stay.
pub fn clear_thread(snap: &mut Snapshot, chat: ChatId) -> bool {
    snap.unread.forget(chat);
    snap.messages.remove(&chat).is_some()
}

/// Append a chat-socket frame unless a message with that id is cached.
pub fn merge_chat_frame(snap: &mut Snapshot, chat: ChatId, message: Message) -> bool {
    let thread = snap.messages.entry(chat).or_default();
    if thread.iter().any(|m| m.id == message.id) {
        return false;
    }
    Arc::make_mut(thread).push(message);
    true
}

/// Store a message returned by the backend, matched by id.
pub fn replace_message(snap: &mut Snapshot, chat: ChatId, message: Message) -> bool {
    let Some(thread) = snap.messages.get_mut(&chat) else {
        return false;
    };
    let Some(index) = thread.iter().position(|m| m.id == message.id) else {
        return false;
    };
    if thread[index] == message {
        return false;
    }
    Arc::make_mut(thread)[index] = message;
    true
}

/// Merge a pushed notification.  Dismissed or already present ids are
/// ignored.  New notifications go first.
pub fn merge_push_notification(
    snap: &mut Snapshot,
    notification: Notification,
    dismissed: &HashSet<NotificationId>,
) -> bool {
    let Some(user) = snap.user.as_mut() else {
        return false;
    };
    if dismissed.contains(&notification.id) || user.has_notification(&notification.id) {
        return false;
    }
    user.notifications.insert(0, notification);
    true
}

/// Replace the event list when its length changes.
pub fn merge_events(snap: &mut Snapshot, fresh: Vec<CalendarEvent>) -> bool {
    if snap.events.len() == fresh.len() {
        return false;
    }
    snap.events = fresh;
    true
}

#[derive(Debug, Clone, PartialEq)]
pub enum IncomingCallChange {
    Surfaced(Call),
    Cleared(CallId),
}

/// Reconcile the incoming-call slot with the ringing calls addressed to us.
///
/// A call is surfaced once per id.  A surfaced call that is no longer
/// ringing is cleared.
pub fn observe_incoming_calls(snap: &mut Snapshot, ringing: &[Call]) -> Option<IncomingCallChange> {
    if let Some(current) = &snap.incoming_call {
        if ringing.iter().any(|c| c.id == current.id) {
            return None;
        }
        let id = current.id.clone();
        snap.incoming_call = None;
        return Some(IncomingCallChange::Cleared(id));
    }

    let call = ringing
        .iter()
        .find(|c| !snap.surfaced_calls.contains(&c.id))?
        .clone();
    snap.surfaced_calls.insert(call.id.clone());
    snap.incoming_call = Some(call.clone());
    Some(IncomingCallChange::Surfaced(call))
}

/// Apply the latest status of the active call.  Leaves the call view on
/// `rejected` or `ended` and returns that status.
pub fn observe_active_call(snap: &mut Snapshot, latest: Option<&Call>) -> Option<CallStatus> {
    let active = snap.active_call.as_mut()?;
    let status = latest.map(|c| c.status)?;
    if status.is_terminal() {
        snap.active_call = None;
        return Some(status);
    }
    active.status = status;
    None
}
