//! Realtime channel manager.
//!
//! Two socket roles share one implementation:
//!
//! * the **chat socket**, bound to the open chat.  At most one exists; opening
//!   another closes the previous one first.
//! * the **user socket**, opened once per session on the `notifications`
//!   chat id, carrying `{type: "notification", ...}` push frames.
//!
//! Each socket runs in its own tokio task and forwards decoded frames over an
//! mpsc channel.  The task owns the connection; dropping its [`SocketHandle`]
//! closes it.  Dropped connections are reopened after a fixed delay.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};
use url::Url;

use spaces_shared::constants::SOCKET_RECONNECT_SECS;
use spaces_shared::protocol::{ChatFrame, PushFrame};
use spaces_shared::{ChatId, Message, Notification};

use crate::error::RealtimeError;
use crate::session::SessionContext;

/// Decoded inbound traffic, tagged with the socket it came from.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    ChatMessage { chat: ChatId, message: Message },
    Notification(Notification),
    Connected { chat: ChatId },
    Disconnected { chat: ChatId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Chat(ChatId),
    User,
}

impl Role {
    fn chat(self) -> ChatId {
        match self {
            Role::Chat(chat) => chat,
            Role::User => ChatId::Notifications,
        }
    }
}

/// Derive the socket base from the REST base: `https` becomes `wss`, `http`
/// becomes `ws`.
pub fn ws_base_from_api(api: &Url) -> Result<Url, RealtimeError> {
    let scheme = match api.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(RealtimeError::Scheme(other.to_string())),
    };
    let mut base = api.clone();
    base.set_scheme(scheme)
        .map_err(|_| RealtimeError::Scheme(scheme.to_string()))?;
    Ok(base)
}

/// `{base}/ws/chat/{chat}?token={token}`.
pub fn socket_url(base: &Url, chat: ChatId, token: &str) -> Result<Url, RealtimeError> {
    let raw = format!("{}/ws/chat/{chat}", base.as_str().trim_end_matches('/'));
    let mut url = Url::parse(&raw)?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url)
}

/// Decode a chat-socket frame.  Malformed frames are logged and dropped.
pub fn decode_chat_frame(chat: ChatId, text: &str) -> Option<Message> {
    match serde_json::from_str::<ChatFrame>(text) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!(%chat, error = %e, "dropping malformed chat frame");
            None
        }
    }
}

/// Decode a user-socket frame.  Unknown frame types are ignored.
pub fn decode_push_frame(text: &str) -> Option<Notification> {
    match PushFrame::from_json(text) {
        Ok(PushFrame::Notification { notification }) => Some(notification),
        Ok(PushFrame::Unknown) => {
            debug!("ignoring unrecognized push frame");
            None
        }
        Err(e) => {
            warn!(error = %e, "dropping malformed push frame");
            None
        }
    }
}

/// Ownership token for one running socket task.
pub struct SocketHandle {
    chat: ChatId,
    close_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SocketHandle {
    pub fn chat(&self) -> ChatId {
        self.chat
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
        debug!(chat = %self.chat, "socket handle released");
    }
}

pub struct RealtimeManager {
    ws_base: Url,
    session: Arc<SessionContext>,
    events: mpsc::Sender<RealtimeEvent>,
    reconnect: Duration,
    chat: Mutex<Option<SocketHandle>>,
    user: Mutex<Option<SocketHandle>>,
}

impl RealtimeManager {
    pub fn new(
        ws_base: Url,
        session: Arc<SessionContext>,
        events: mpsc::Sender<RealtimeEvent>,
    ) -> Self {
        Self {
            ws_base,
            session,
            events,
            reconnect: Duration::from_secs(SOCKET_RECONNECT_SECS),
            chat: Mutex::new(None),
            user: Mutex::new(None),
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect = delay;
        self
    }

    /// Bind the chat socket to `chat`, closing whichever chat socket was open.
    /// Re-opening the already bound chat is a no-op.
    pub fn open_chat(&self, chat: ChatId) -> Result<(), RealtimeError> {
        let mut slot = self.chat.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(current) = slot.as_ref() {
            if current.chat == chat && !current.is_finished() {
                return Ok(());
            }
        }
        // Close before opening.
        slot.take();

        let url = self.url_for(chat)?;
        *slot = Some(self.spawn(url, Role::Chat(chat)));
        info!(%chat, "chat socket opened");
        Ok(())
    }

    /// Close the chat socket, but only if it is still bound to `chat`.
    pub fn close_chat(&self, chat: ChatId) {
        let mut slot = self.chat.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().map(|h| h.chat) == Some(chat) {
            slot.take();
            info!(%chat, "chat socket closed");
        }
    }

    pub fn active_chat(&self) -> Option<ChatId> {
        self.chat
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(SocketHandle::chat)
    }

    /// Open the account-wide push socket.  Idempotent while it is running.
    pub fn open_user(&self) -> Result<(), RealtimeError> {
        let mut slot = self.user.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }
        let url = self.url_for(ChatId::Notifications)?;
        *slot = Some(self.spawn(url, Role::User));
        info!("user socket opened");
        Ok(())
    }

    pub fn user_open(&self) -> bool {
        self.user
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Close both sockets.
    pub fn close_all(&self) {
        self.chat.lock().unwrap_or_else(|e| e.into_inner()).take();
        self.user.lock().unwrap_or_else(|e| e.into_inner()).take();
    }

    fn url_for(&self, chat: ChatId) -> Result<Url, RealtimeError> {
        let token = self.session.token().ok_or(RealtimeError::NoSession)?;
        socket_url(&self.ws_base, chat, &token)
    }

    fn spawn(&self, url: Url, role: Role) -> SocketHandle {
        let (close_tx, close_rx) = oneshot::channel();
        let task = tokio::spawn(run_socket(
            url,
            role,
            self.events.clone(),
            close_rx,
            self.reconnect,
        ));
        SocketHandle {
            chat: role.chat(),
            close_tx: Some(close_tx),
            task,
        }
    }
}

impl Drop for RealtimeManager {
    fn drop(&mut self) {
        self.close_all();
    }
}

fn decode(role: Role, text: &str) -> Option<RealtimeEvent> {
    match role {
        Role::Chat(chat) => {
            decode_chat_frame(chat, text).map(|message| RealtimeEvent::ChatMessage { chat, message })
        }
        Role::User => decode_push_frame(text).map(RealtimeEvent::Notification),
    }
}

/// Socket task body.  Runs until the close signal fires or the event
/// receiver goes away.
async fn run_socket(
    url: Url,
    role: Role,
    events: mpsc::Sender<RealtimeEvent>,
    mut close_rx: oneshot::Receiver<()>,
    reconnect: Duration,
) {
    let chat = role.chat();

    loop {
        let connected = tokio::select! {
            _ = &mut close_rx => return,
            res = tokio_tungstenite::connect_async(url.as_str()) => match res {
                Ok((stream, _)) => Some(stream),
                Err(e) => {
                    warn!(%chat, error = %e, "socket connect failed");
                    None
                }
            },
        };

        if let Some(mut stream) = connected {
            debug!(%chat, "socket connected");
            if events.send(RealtimeEvent::Connected { chat }).await.is_err() {
                return;
            }

            loop {
                tokio::select! {
                    _ = &mut close_rx => {
                        let _ = stream.close(None).await;
                        return;
                    }
                    frame = stream.next() => match frame {
                        Some(Ok(WsMessage::Text(text))) => {
                            if let Some(event) = decode(role, &text) {
                                if events.send(event).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Some(Ok(WsMessage::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(%chat, error = %e, "socket read failed");
                            break;
                        }
                    },
                }
            }

            debug!(%chat, "socket disconnected");
            if events.send(RealtimeEvent::Disconnected { chat }).await.is_err() {
                return;
            }
        }

        tokio::select! {
            _ = &mut close_rx => return,
            _ = tokio::time::sleep(reconnect) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use spaces_shared::{ChannelId, Key, Presence, User, UserId};
    use spaces_store::Database;

    use super::*;

    #[test]
    fn ws_scheme_follows_api_scheme() {
        let secure = ws_base_from_api(&Url::parse("https://api.example.com").unwrap()).unwrap();
        assert_eq!(secure.scheme(), "wss");
        let plain = ws_base_from_api(&Url::parse("http://127.0.0.1:8000").unwrap()).unwrap();
        assert_eq!(plain.scheme(), "ws");
        assert!(ws_base_from_api(&Url::parse("ftp://example.com").unwrap()).is_err());
    }

    #[test]
    fn socket_urls() {
        let base = Url::parse("wss://api.example.com/").unwrap();
        let chat = socket_url(&base, ChatId::Channel(ChannelId(7)), "t0k").unwrap();
        assert_eq!(chat.as_str(), "wss://api.example.com/ws/chat/7?token=t0k");

        let dm = socket_url(&base, ChatId::direct(UserId(2), UserId(1)), "t").unwrap();
        assert_eq!(dm.path(), "/ws/chat/dm_1_2");

        let user = socket_url(&base, ChatId::Notifications, "t").unwrap();
        assert_eq!(user.path(), "/ws/chat/notifications");
    }

    #[test]
    fn malformed_frames_are_dropped() {
        let chat = ChatId::Channel(ChannelId(1));
        assert!(decode_chat_frame(chat, "{not json").is_none());
        assert!(decode_chat_frame(chat, r#"{"id": 1, "userId": 2, "text": "hi"}"#).is_some());
        assert!(decode_push_frame("[]").is_none());
        assert!(decode_push_frame(r#"{"type": "typing"}"#).is_none());
    }

    #[test]
    fn push_frame_timestamp_is_rescaled() {
        let n = decode_push_frame(
            r#"{"type":"notification","notification":{"id":"x","type":"info","from":"sys","timestamp":1700000000}}"#,
        )
        .unwrap();
        assert_eq!(n.id, Key::text("x"));
        assert_eq!(n.timestamp, 1_700_000_000_000);
    }

    fn manager() -> (RealtimeManager, mpsc::Receiver<RealtimeEvent>) {
        let db = Database::open_in_memory().unwrap().into_shared();
        let session = Arc::new(SessionContext::new(db));
        session
            .save(
                &User {
                    id: UserId(1),
                    name: "Ada".into(),
                    email: String::new(),
                    avatar: String::new(),
                    status: Presence::Online,
                    spaces: vec![],
                    friends: vec![],
                    notifications: vec![],
                },
                "tok",
            )
            .unwrap();
        let (tx, rx) = mpsc::channel(16);
        // Nothing listens on port 9; connects fail and the tasks sit in
        // their reconnect delay.
        let base = Url::parse("ws://127.0.0.1:9").unwrap();
        (
            RealtimeManager::new(base, session, tx).with_reconnect_delay(Duration::from_secs(60)),
            rx,
        )
    }

    #[tokio::test]
    async fn at_most_one_chat_socket() {
        let (rt, _rx) = manager();
        let a = ChatId::Channel(ChannelId(1));
        let b = ChatId::direct(UserId(1), UserId(2));

        rt.open_chat(a).unwrap();
        assert_eq!(rt.active_chat(), Some(a));
        rt.open_chat(b).unwrap();
        assert_eq!(rt.active_chat(), Some(b));

        // A stale close for `a` must not touch `b`.
        rt.close_chat(a);
        assert_eq!(rt.active_chat(), Some(b));
        rt.close_chat(b);
        assert_eq!(rt.active_chat(), None);
    }

    #[tokio::test]
    async fn user_socket_opens_once_and_requires_session() {
        let (rt, _rx) = manager();
        rt.open_user().unwrap();
        rt.open_user().unwrap();
        assert!(rt.user_open());
        rt.close_all();
        assert!(!rt.user_open());

        rt.session.clear().unwrap();
        assert!(matches!(rt.open_user(), Err(RealtimeError::NoSession)));
    }
}
