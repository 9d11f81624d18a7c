//! Domain records exchanged with the backend.
//!
//! Field names follow the backend's camelCase JSON.  Every collection field
//! defaults to empty so a sparse record from an older client still decodes.

use std::collections::{BTreeMap, BTreeSet};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::deserialize_timestamp_ms;
use crate::types::{
    lenient_datetime, AttachmentId, CallId, ChannelId, EventId, Key, MessageId, NotificationId,
    SpaceId, UserId,
};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    #[default]
    #[serde(other)]
    Offline,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    /// Single glyph shown next to the name.
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub status: Presence,
    /// Ordered space membership.
    #[serde(default)]
    pub spaces: Vec<SpaceId>,
    #[serde(default)]
    pub friends: Vec<UserId>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
}

impl User {
    pub fn is_friend(&self, other: UserId) -> bool {
        self.friends.contains(&other)
    }

    /// Insert with set semantics.  Returns `false` if already present.
    pub fn add_friend(&mut self, other: UserId) -> bool {
        if self.is_friend(other) {
            return false;
        }
        self.friends.push(other);
        true
    }

    pub fn has_notification(&self, id: &NotificationId) -> bool {
        self.notifications.iter().any(|n| &n.id == id)
    }

    /// Remove a notification by id.  Returns whether anything was removed.
    pub fn remove_notification(&mut self, id: &NotificationId) -> bool {
        let before = self.notifications.len();
        self.notifications.retain(|n| &n.id != id);
        self.notifications.len() != before
    }
}

/// Payload for `POST /users/signup`.
#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub password: String,
    pub avatar: String,
    pub status: Presence,
    pub spaces: Vec<SpaceId>,
    pub friends: Vec<UserId>,
    pub notifications: Vec<Notification>,
}

// ---------------------------------------------------------------------------
// Space & Channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IconKind {
    Graduation,
    Briefcase,
    #[default]
    #[serde(other)]
    User,
}

impl IconKind {
    pub fn glyph(self) -> &'static str {
        match self {
            IconKind::Graduation => "🎓",
            IconKind::Briefcase => "💼",
            IconKind::User => "👤",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Channel {
    pub id: ChannelId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub members: BTreeSet<UserId>,
}

impl Channel {
    /// Lower-cases the name and collapses whitespace runs into `-`.
    pub fn normalize_name(raw: &str) -> String {
        raw.split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join("-")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Space {
    pub id: SpaceId,
    pub name: String,
    #[serde(default)]
    pub icon_type: IconKind,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub invite_code: String,
    pub owner_id: UserId,
    #[serde(default)]
    pub members: BTreeSet<UserId>,
    /// Set on creation so the backend appends the space to the creator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
    /// Sidebar expand/collapse flag.  Client-local: preserved across merges.
    #[serde(default)]
    pub expanded: bool,
}

impl Space {
    pub fn is_owner(&self, user: UserId) -> bool {
        self.owner_id == user
    }

    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn channel_mut(&mut self, id: ChannelId) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.id == id)
    }

    /// `NAME-NNNN`: first four characters upper-cased, four random digits.
    pub fn generate_invite_code(name: &str) -> String {
        use rand::Rng;
        let prefix: String = name.chars().take(4).collect::<String>().to_uppercase();
        let digits: u16 = rand::thread_rng().gen_range(1000..10000);
        format!("{prefix}-{digits}")
    }
}

// ---------------------------------------------------------------------------
// Message & Attachment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AttachmentSource {
    /// Local upload carried as a `data:` URL.
    Inline { data: String },
    /// Drive-style external reference.
    Linked { url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub id: AttachmentId,
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "type", default)]
    pub mime: String,
    #[serde(flatten)]
    pub source: AttachmentSource,
}

impl Attachment {
    pub fn inline(name: impl Into<String>, mime: impl Into<String>, bytes: &[u8]) -> Self {
        let mime = mime.into();
        let data = format!("data:{};base64,{}", mime, STANDARD.encode(bytes));
        Self {
            id: Key::Int(crate::types::next_id()),
            name: name.into(),
            size: bytes.len() as u64,
            mime,
            source: AttachmentSource::Inline { data },
        }
    }

    pub fn linked(
        name: impl Into<String>,
        mime: impl Into<String>,
        size: u64,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: Key::Int(crate::types::next_id()),
            name: name.into(),
            size,
            mime: mime.into(),
            source: AttachmentSource::Linked { url: url.into() },
        }
    }

    /// Decoded bytes of an inline upload.
    pub fn inline_bytes(&self) -> Option<Vec<u8>> {
        match &self.source {
            AttachmentSource::Inline { data } => {
                let (_, payload) = data.split_once(";base64,")?;
                STANDARD.decode(payload).ok()
            }
            AttachmentSource::Linked { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub user_id: UserId,
    #[serde(default)]
    pub text: String,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Emoji → users who reacted with it.  Keys with no users are removed.
    #[serde(default)]
    pub reactions: BTreeMap<String, BTreeSet<UserId>>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Reserved for threaded replies; never populated.
    #[serde(default)]
    pub thread: Vec<serde_json::Value>,
}

impl Message {
    pub fn new(author: UserId, text: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            id: Key::Int(crate::types::next_id()),
            user_id: author,
            text: text.into(),
            timestamp: Some(Utc::now()),
            reactions: BTreeMap::new(),
            attachments,
            thread: Vec::new(),
        }
    }

    /// Flip `user`'s membership in the `emoji` set.
    ///
    /// Returns `true` if the reaction is now present.
    pub fn toggle_reaction(&mut self, emoji: &str, user: UserId) -> bool {
        let users = self.reactions.entry(emoji.to_string()).or_default();
        let added = if users.remove(&user) {
            false
        } else {
            users.insert(user);
            true
        };
        if users.is_empty() {
            self.reactions.remove(emoji);
        }
        added
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    FriendRequest,
    Invite,
    #[serde(other)]
    Info,
}

impl NotificationKind {
    pub fn is_actionable(self) -> bool {
        matches!(self, NotificationKind::FriendRequest | NotificationKind::Invite)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    /// Sender display name.
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub from_id: Option<UserId>,
    /// Milliseconds since the epoch, rescaled on decode if sent in seconds.
    #[serde(default, deserialize_with = "deserialize_timestamp_ms")]
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NotificationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_id: Option<SpaceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub space_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Notification {
    pub fn friend_request(from_id: UserId, from_name: &str) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: Key::Text(format!("fr-{now}-{}", rand::random::<u32>())),
            kind: NotificationKind::FriendRequest,
            from: from_name.to_string(),
            from_id: Some(from_id),
            timestamp: now,
            status: Some(NotificationStatus::Pending),
            space_id: None,
            space_name: None,
            message: None,
        }
    }

    pub fn invite(from_id: UserId, from_name: &str, space: &Space) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: Key::Text(format!("inv-{now}-{}", rand::random::<u32>())),
            kind: NotificationKind::Invite,
            from: from_name.to_string(),
            from_id: Some(from_id),
            timestamp: now,
            status: Some(NotificationStatus::Pending),
            space_id: Some(space.id),
            space_name: Some(space.name.clone()),
            message: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Call
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Ringing,
    Accepted,
    Rejected,
    Ended,
}

impl CallStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, CallStatus::Rejected | CallStatus::Ended)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CallStatus::Ringing => "ringing",
            CallStatus::Accepted => "accepted",
            CallStatus::Rejected => "rejected",
            CallStatus::Ended => "ended",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    pub id: CallId,
    pub caller_id: UserId,
    #[serde(default)]
    pub caller_name: String,
    #[serde(default)]
    pub caller_avatar: String,
    pub callee_id: UserId,
    pub status: CallStatus,
    #[serde(default, deserialize_with = "deserialize_timestamp_ms")]
    pub timestamp: i64,
}

impl Call {
    pub fn ring(caller: &User, callee: UserId) -> Self {
        Self {
            id: Key::Text(format!("call-{}", crate::types::next_id())),
            caller_id: caller.id,
            caller_name: caller.name.clone(),
            caller_avatar: caller.avatar.clone(),
            callee_id: callee,
            status: CallStatus::Ringing,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

// ---------------------------------------------------------------------------
// Calendar
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    #[default]
    Meeting,
    Note,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: EventId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// `YYYY-MM-DD`.
    #[serde(default)]
    pub date: String,
    /// `HH:MM`.
    #[serde(default)]
    pub time: String,
    /// Minutes.
    #[serde(default)]
    pub duration: u32,
    #[serde(rename = "type", default)]
    pub kind: EventKind,
    #[serde(default)]
    pub created_by: Option<UserId>,
    #[serde(default)]
    pub attendees: Vec<UserId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> Message {
        Message::new(UserId(1), "hello", Vec::new())
    }

    #[test]
    fn toggle_reaction_twice_restores_prior_state() {
        let mut msg = message();
        msg.toggle_reaction("👍", UserId(2));
        let before = msg.reactions.clone();

        assert!(msg.toggle_reaction("🎉", UserId(1)));
        assert!(!msg.toggle_reaction("🎉", UserId(1)));
        assert_eq!(msg.reactions, before);

        assert!(!msg.toggle_reaction("👍", UserId(2)));
        assert!(msg.reactions.is_empty(), "empty emoji keys are dropped");
    }

    #[test]
    fn message_decodes_sparse_record() {
        let msg: Message = serde_json::from_str(
            r#"{"id": 1700000000000, "userId": 3, "text": "hi", "timestamp": "bogus"}"#,
        )
        .unwrap();
        assert_eq!(msg.id, Key::Int(1700000000000));
        assert!(msg.timestamp.is_none());
        assert!(msg.reactions.is_empty());
    }

    #[test]
    fn attachment_inline_and_linked_decode() {
        let inline = Attachment::inline("a.txt", "text/plain", b"abc");
        let json = serde_json::to_string(&inline).unwrap();
        let back: Attachment = serde_json::from_str(&json).unwrap();
        assert_eq!(back.inline_bytes().unwrap(), b"abc");

        let linked: Attachment = serde_json::from_str(
            r#"{"id": "d1", "name": "spec.pdf", "size": 10, "type": "application/pdf", "url": "https://drive/x"}"#,
        )
        .unwrap();
        assert!(matches!(linked.source, AttachmentSource::Linked { .. }));
        assert!(linked.inline_bytes().is_none());
    }

    #[test]
    fn unknown_notification_type_is_info() {
        let n: Notification = serde_json::from_str(
            r#"{"id": "n1", "type": "space_renamed", "from": "Ada", "timestamp": 1700000000}"#,
        )
        .unwrap();
        assert_eq!(n.kind, NotificationKind::Info);
        assert_eq!(n.timestamp, 1_700_000_000_000);
    }

    #[test]
    fn channel_name_normalization() {
        assert_eq!(Channel::normalize_name("  Design   Review "), "design-review");
    }

    #[test]
    fn invite_code_shape() {
        let code = Space::generate_invite_code("design team");
        let (prefix, digits) = code.split_once('-').unwrap();
        assert_eq!(prefix, "DESI");
        assert_eq!(digits.len(), 4);
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn space_keeps_unknown_icon_as_user() {
        let space: Space = serde_json::from_str(
            r#"{"id": 1, "name": "x", "iconType": "rocket", "ownerId": 2}"#,
        )
        .unwrap();
        assert_eq!(space.icon_type, IconKind::User);
        assert!(space.channels.is_empty());
    }
}
