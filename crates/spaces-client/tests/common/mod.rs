//! In-memory backend and fixtures shared by the engine tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::{broadcast, oneshot};

use spaces_client::{SyncContext, SyncEngine, SyncEvent, SyncTimings};
use spaces_net::backend::Result;
use spaces_net::{AuthSession, Backend, GatewayError, HealthStatus, SessionContext};
use spaces_shared::types::{Key, NotificationId};
use spaces_shared::{
    CalendarEvent, Channel, ChannelId, ChatId, EventKind, IconKind, Message, NewUser, Notification,
    NotificationKind, Presence, Space, SpaceId, User, UserId, Visibility,
};
use spaces_store::Database;

#[derive(Default)]
pub struct FakeState {
    pub users: Vec<User>,
    pub spaces: Vec<Space>,
    pub messages: HashMap<ChatId, Vec<Message>>,
    /// Chats answering 403.
    pub forbidden: HashSet<ChatId>,
    /// `None` makes the events endpoint answer 503.
    pub events: Option<Vec<CalendarEvent>>,
    /// Every endpoint answers 401.
    pub unauthorized: bool,
    /// Operation name to the number of upcoming calls answering 503.
    pub failures: HashMap<&'static str, usize>,
    /// Every request, in order, as `"op target"`.
    pub log: Vec<String>,
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
    /// When set, the next space fetch waits for the paired sender.
    space_gate: Mutex<Option<oneshot::Receiver<()>>>,
}

impl FakeBackend {
    pub fn new(state: FakeState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            space_gate: Mutex::new(None),
        })
    }

    /// Hold the next `fetch_spaces_by_ids` until the returned sender fires.
    pub fn hold_space_fetch(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.space_gate.lock().unwrap() = Some(rx);
        tx
    }

    /// Number of logged requests equal to `entry`, e.g. `"fetch_messages dm_1_2"`.
    pub fn hits(&self, entry: &str) -> usize {
        self.state().log.iter().filter(|e| e.as_str() == entry).count()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn requests(&self, op: &str) -> usize {
        self.state()
            .log
            .iter()
            .filter(|entry| entry.split(' ').next() == Some(op))
            .count()
    }

    fn enter(&self, entry: String) -> Result<MutexGuard<'_, FakeState>> {
        let mut state = self.state();
        let op = entry.split(' ').next().unwrap_or_default().to_string();
        state.log.push(entry);
        if state.unauthorized {
            return Err(GatewayError::SessionExpired);
        }
        if let Some(remaining) = state.failures.get_mut(op.as_str()) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(GatewayError::Status(503));
            }
        }
        Ok(state)
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn health(&self) -> Result<HealthStatus> {
        self.enter("health".into())?;
        Ok(HealthStatus {
            status: "healthy".into(),
            service: Some("fake".into()),
        })
    }

    async fn fetch_users(&self) -> Result<Vec<User>> {
        Ok(self.enter("fetch_users".into())?.users.clone())
    }

    async fn signup(&self, user: &NewUser) -> Result<AuthSession> {
        let mut state = self.enter(format!("signup {}", user.email))?;
        let created = User {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            avatar: user.avatar.clone(),
            status: user.status,
            spaces: Vec::new(),
            friends: Vec::new(),
            notifications: Vec::new(),
        };
        state.users.push(created.clone());
        Ok(AuthSession {
            user: created,
            token: "fake-token".into(),
        })
    }

    async fn login(&self, email: &str, _password: &str) -> Result<AuthSession> {
        let state = self.enter(format!("login {email}"))?;
        match state.users.iter().find(|u| u.email == email) {
            Some(user) => Ok(AuthSession {
                user: user.clone(),
                token: "fake-token".into(),
            }),
            None => Err(GatewayError::AuthRejected("Invalid credentials".into())),
        }
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.enter(format!("find_user_by_email {email}"))?;
        Ok(state.users.iter().find(|u| u.email == email).cloned())
    }

    async fn search_users(&self, query: &str) -> Result<Vec<User>> {
        let state = self.enter(format!("search_users {query}"))?;
        let needle = query.to_lowercase();
        Ok(state
            .users
            .iter()
            .filter(|u| u.name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut state = self.enter(format!("update_user {}", user.id))?;
        if let Some(slot) = state.users.iter_mut().find(|u| u.id == user.id) {
            *slot = user.clone();
        }
        Ok(())
    }

    async fn fetch_spaces(&self) -> Result<Vec<Space>> {
        Ok(self.enter("fetch_spaces".into())?.spaces.clone())
    }

    async fn fetch_spaces_by_ids(&self, ids: &[SpaceId]) -> Result<Vec<Space>> {
        let gate = self.space_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        let state = self.enter(format!("fetch_spaces_by_ids {}", ids.len()))?;
        Ok(state
            .spaces
            .iter()
            .filter(|s| ids.contains(&s.id))
            .cloned()
            .collect())
    }

    async fn save_space(&self, space: &Space) -> Result<()> {
        let mut state = self.enter(format!("save_space {}", space.id))?;
        match state.spaces.iter_mut().find(|s| s.id == space.id) {
            Some(slot) => *slot = space.clone(),
            None => {
                state.spaces.push(space.clone());
                if let Some(creator) = space.created_by {
                    if let Some(user) = state.users.iter_mut().find(|u| u.id == creator) {
                        user.spaces.push(space.id);
                    }
                }
            }
        }
        Ok(())
    }

    async fn delete_space(&self, id: SpaceId) -> Result<()> {
        let mut state = self.enter(format!("delete_space {id}"))?;
        state.spaces.retain(|s| s.id != id);
        Ok(())
    }

    async fn fetch_messages(&self, chat: ChatId) -> Result<Vec<Message>> {
        let state = self.enter(format!("fetch_messages {chat}"))?;
        if state.forbidden.contains(&chat) {
            return Err(GatewayError::Forbidden);
        }
        Ok(state.messages.get(&chat).cloned().unwrap_or_default())
    }

    async fn post_message(&self, chat: ChatId, message: &Message) -> Result<()> {
        let mut state = self.enter(format!("post_message {chat}"))?;
        if state.forbidden.contains(&chat) {
            return Err(GatewayError::Forbidden);
        }
        state.messages.entry(chat).or_default().push(message.clone());
        Ok(())
    }

    async fn patch_message(&self, chat: ChatId, message: &Message) -> Result<Option<Message>> {
        let mut state = self.enter(format!("patch_message {chat}"))?;
        let thread = state.messages.entry(chat).or_default();
        match thread.iter_mut().find(|m| m.id == message.id) {
            Some(slot) => {
                *slot = message.clone();
                Ok(Some(message.clone()))
            }
            None => Err(GatewayError::Status(404)),
        }
    }

    async fn send_friend_request(&self, to: UserId, notification: &Notification) -> Result<()> {
        let mut state = self.enter(format!("send_friend_request {to}"))?;
        if let Some(user) = state.users.iter_mut().find(|u| u.id == to) {
            user.notifications.push(notification.clone());
        }
        Ok(())
    }

    async fn accept_friend(
        &self,
        user: UserId,
        friend: UserId,
        notification: &NotificationId,
    ) -> Result<()> {
        let mut state = self.enter(format!("accept_friend {notification}"))?;
        for (a, b) in [(user, friend), (friend, user)] {
            if let Some(u) = state.users.iter_mut().find(|u| u.id == a) {
                u.add_friend(b);
            }
        }
        Ok(())
    }

    async fn reject_friend(&self, _user: UserId, notification: &NotificationId) -> Result<()> {
        self.enter(format!("reject_friend {notification}"))?;
        Ok(())
    }

    async fn add_member(
        &self,
        user: UserId,
        space: SpaceId,
        channel: Option<ChannelId>,
    ) -> Result<()> {
        let mut state = self.enter(format!("add_member {space}"))?;
        if let Some(s) = state.spaces.iter_mut().find(|s| s.id == space) {
            s.members.insert(user);
            if let Some(c) = channel.and_then(|id| s.channel_mut(id)) {
                c.members.insert(user);
            }
        }
        Ok(())
    }

    async fn accept_invite(
        &self,
        user: UserId,
        notification: &NotificationId,
    ) -> Result<Option<Space>> {
        let mut state = self.enter(format!("accept_invite {notification}"))?;
        let space_id = state
            .users
            .iter()
            .find(|u| u.id == user)
            .and_then(|u| u.notifications.iter().find(|n| &n.id == notification))
            .and_then(|n| n.space_id);
        let Some(space_id) = space_id else {
            return Ok(None);
        };
        let joined = state.spaces.iter_mut().find(|s| s.id == space_id).map(|s| {
            s.members.insert(user);
            for channel in &mut s.channels {
                if channel.visibility == Visibility::Public {
                    channel.members.insert(user);
                }
            }
            s.clone()
        });
        Ok(joined)
    }

    async fn reject_invite(&self, _user: UserId, notification: &NotificationId) -> Result<()> {
        self.enter(format!("reject_invite {notification}"))?;
        Ok(())
    }

    async fn fetch_events(&self) -> Result<Vec<CalendarEvent>> {
        let state = self.enter("fetch_events".into())?;
        state.events.clone().ok_or(GatewayError::Status(503))
    }

    async fn save_event(&self, event: &CalendarEvent) -> Result<CalendarEvent> {
        let mut state = self.enter(format!("save_event {}", event.id))?;
        match state.events.as_mut() {
            Some(events) => {
                events.push(event.clone());
                Ok(event.clone())
            }
            None => Err(GatewayError::Status(503)),
        }
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn user(id: i64, name: &str) -> User {
    User {
        id: UserId(id),
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        avatar: "👤".into(),
        status: Presence::Online,
        spaces: Vec::new(),
        friends: Vec::new(),
        notifications: Vec::new(),
    }
}

pub fn channel(id: i64, name: &str, members: &[i64]) -> Channel {
    Channel {
        id: ChannelId(id),
        name: name.to_string(),
        visibility: Visibility::Public,
        members: members.iter().map(|&m| UserId(m)).collect(),
    }
}

pub fn space(id: i64, name: &str, owner: i64, channels: Vec<Channel>) -> Space {
    let mut members: BTreeSet<UserId> = BTreeSet::from([UserId(owner)]);
    for c in &channels {
        members.extend(c.members.iter().copied());
    }
    Space {
        id: SpaceId(id),
        name: name.to_string(),
        icon_type: IconKind::Briefcase,
        channels,
        invite_code: "TEST-1234".into(),
        owner_id: UserId(owner),
        members,
        created_by: None,
        expanded: false,
    }
}

pub fn message(id: i64, author: i64, text: &str) -> Message {
    Message {
        id: Key::Int(id),
        user_id: UserId(author),
        text: text.to_string(),
        timestamp: Utc.timestamp_millis_opt(1_700_000_000_000 + id).single(),
        reactions: Default::default(),
        attachments: Vec::new(),
        thread: Vec::new(),
    }
}

pub fn notification(id: &str, kind: NotificationKind, from: i64) -> Notification {
    Notification {
        id: Key::text(id),
        kind,
        from: format!("user-{from}"),
        from_id: Some(UserId(from)),
        timestamp: 1_700_000_000_000,
        status: None,
        space_id: None,
        space_name: None,
        message: None,
    }
}

pub fn calendar_event(id: &str, title: &str) -> CalendarEvent {
    CalendarEvent {
        id: Key::text(id),
        title: title.to_string(),
        description: String::new(),
        date: "2026-10-20".into(),
        time: "10:00".into(),
        duration: 30,
        kind: EventKind::Meeting,
        created_by: Some(UserId(1)),
        attendees: Vec::new(),
    }
}

pub fn thread(n: i64) -> Vec<Message> {
    (1..=n).map(|i| message(i, 2, &format!("message {i}"))).collect()
}

pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub session: Arc<SessionContext>,
    pub engine: SyncEngine,
    pub events: broadcast::Receiver<SyncEvent>,
}

impl Harness {
    /// Engine signed in as `me`, backed by an in-memory store.
    pub fn new(me: &User, state: FakeState) -> Self {
        let db = Database::open_in_memory().unwrap().into_shared();
        let session = Arc::new(SessionContext::new(db));
        session.save(me, "fake-token").unwrap();

        let backend = FakeBackend::new(state);
        let dyn_backend: Arc<dyn Backend> = backend.clone();
        let ctx = SyncContext::new(dyn_backend, session.clone(), SyncTimings::default());
        let engine = SyncEngine::new(ctx);
        let events = engine.subscribe();
        Self {
            backend,
            session,
            engine,
            events,
        }
    }

    /// Everything emitted since the last drain.
    pub fn drain(&mut self) -> Vec<SyncEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            out.push(event);
        }
        out
    }
}
