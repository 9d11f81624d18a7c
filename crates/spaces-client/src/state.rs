//! In-memory snapshot the sync engine reconciles.
//!
//! The [`Snapshot`] is wrapped in `Arc<Mutex<>>` and shared by every engine
//! task.  Only the engine's merge steps write it; observers read clones.
//! The lock is never held across an `.await`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use spaces_shared::search::SearchHit;
use spaces_shared::types::CallId;
use spaces_shared::{
    CalendarEvent, Call, ChannelId, ChatId, Message, Space, SpaceId, User, UserId,
};

/// What the user is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[default]
    Home,
    Space(SpaceId),
    Channel {
        space: SpaceId,
        channel: ChannelId,
    },
    Direct {
        peer: UserId,
        chat: ChatId,
    },
}

impl View {
    pub fn active_chat(&self) -> Option<ChatId> {
        match *self {
            View::Channel { channel, .. } => Some(ChatId::Channel(channel)),
            View::Direct { chat, .. } => Some(chat),
            View::Home | View::Space(_) => None,
        }
    }

    pub fn active_space(&self) -> Option<SpaceId> {
        match *self {
            View::Space(space) | View::Channel { space, .. } => Some(space),
            View::Home | View::Direct { .. } => None,
        }
    }
}

/// Last seen message count per chat, plus the set flagged unread.
#[derive(Debug, Clone, Default)]
pub struct UnreadTracker {
    counts: HashMap<ChatId, usize>,
    unread: HashSet<ChatId>,
}

impl UnreadTracker {
    /// Record a fetched count.  Marks the chat unread when the count grew
    /// and it is not the open chat.  The first observation of a chat is a
    /// baseline.  Returns whether the chat was newly marked.
    pub fn observe(&mut self, chat: ChatId, count: usize, is_active: bool) -> bool {
        let previous = self.counts.insert(chat, count);
        match previous {
            Some(prev) if count > prev && !is_active => self.unread.insert(chat),
            _ => false,
        }
    }

    /// Entering a chat clears its flag and pins the count to what was just
    /// fetched.
    pub fn enter(&mut self, chat: ChatId, count: usize) {
        self.unread.remove(&chat);
        self.counts.insert(chat, count);
    }

    pub fn is_unread(&self, chat: ChatId) -> bool {
        self.unread.contains(&chat)
    }

    pub fn unread(&self) -> &HashSet<ChatId> {
        &self.unread
    }

    pub fn count(&self, chat: ChatId) -> Option<usize> {
        self.counts.get(&chat).copied()
    }

    pub fn forget(&mut self, chat: ChatId) {
        self.counts.remove(&chat);
        self.unread.remove(&chat);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchState {
    pub query: String,
    pub results: Vec<SearchHit>,
    /// Result the user highlighted; cleared along with the results.
    pub pinned: Option<SearchHit>,
}

impl SearchState {
    pub fn clear(&mut self) {
        self.query.clear();
        self.results.clear();
        self.pinned = None;
    }
}

#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// `None` until the first identity refresh lands.
    pub user: Option<User>,
    /// User directory, used for friend names and DM search.
    pub users: Vec<User>,
    pub spaces: Vec<Space>,
    /// Set when the user's space list moved and cleared once the reload
    /// landed, so a failed reload is retried on the next identity tick.
    pub spaces_stale: bool,
    /// Message cache per chat.  An entry is only replaced when its length
    /// changes, so observers can compare with `Arc::ptr_eq`.
    pub messages: HashMap<ChatId, Arc<Vec<Message>>>,
    pub view: View,
    pub unread: UnreadTracker,
    pub events: Vec<CalendarEvent>,
    pub incoming_call: Option<Call>,
    pub active_call: Option<Call>,
    /// Incoming call ids already surfaced once.
    pub surfaced_calls: HashSet<CallId>,
    pub space_search: SearchState,
    pub dm_search: SearchState,
    /// Dismissible access-denied notice.
    pub notice: Option<String>,
}

impl Snapshot {
    pub fn space(&self, id: SpaceId) -> Option<&Space> {
        self.spaces.iter().find(|s| s.id == id)
    }

    pub fn space_mut(&mut self, id: SpaceId) -> Option<&mut Space> {
        self.spaces.iter_mut().find(|s| s.id == id)
    }

    pub fn thread(&self, chat: ChatId) -> Option<&Arc<Vec<Message>>> {
        self.messages.get(&chat)
    }

    pub fn friends(&self) -> Vec<&User> {
        match &self.user {
            Some(me) => self.users.iter().filter(|u| me.is_friend(u.id)).collect(),
            None => Vec::new(),
        }
    }
}

pub type SharedState = Arc<Mutex<Snapshot>>;

pub(crate) fn lock(state: &SharedState) -> MutexGuard<'_, Snapshot> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}
