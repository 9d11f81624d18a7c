//! HTTP implementation of [`Backend`].
//!
//! Every request carries the JSON content type and, when a session exists,
//! the bearer token and the `X-User-Id` header.  Status classification:
//!
//! * 401: the stored session is wiped and [`GatewayError::SessionExpired`]
//!   is returned.  Nothing is retried.
//! * 403: [`GatewayError::Forbidden`], left to the caller.
//! * any other non-2xx: [`GatewayError::Status`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use url::Url;

use spaces_shared::constants::USER_ID_HEADER;
use spaces_shared::types::NotificationId;
use spaces_shared::{
    CalendarEvent, ChannelId, ChatId, Message, NewUser, Notification, Space, SpaceId, User, UserId,
};

use crate::backend::{AuthSession, Backend, HealthStatus, Result};
use crate::error::GatewayError;
use crate::normalize::{normalize_object, normalize_sequence};
use crate::session::SessionContext;

pub struct RemoteGateway {
    base: String,
    http: reqwest::Client,
    session: Arc<SessionContext>,
}

impl RemoteGateway {
    /// Build the HTTP client.  Fails when the TLS backend cannot be set up.
    pub fn new(base: &Url, timeout: Duration, session: Arc<SessionContext>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("spaces-client/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base: base.as_str().trim_end_matches('/').to_string(),
            http,
            session,
        })
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Send a request and classify the response.
    ///
    /// Returns the parsed JSON body, or `None` when the body is empty or not
    /// JSON.  Callers normalize from there.
    async fn request<B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Option<Value>> {
        let mut req = self
            .http
            .request(method.clone(), self.url(path))
            .header(CONTENT_TYPE, "application/json");

        if let Some(session) = self.session.get() {
            req = req
                .header(AUTHORIZATION, format!("Bearer {}", session.token))
                .header(USER_ID_HEADER, session.user.id.to_string());
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();

        if status == StatusCode::UNAUTHORIZED {
            warn!(%method, path, "backend rejected session, wiping local state");
            self.session.invalidate();
            return Err(GatewayError::SessionExpired);
        }
        if status == StatusCode::FORBIDDEN {
            debug!(%method, path, "access denied");
            return Err(GatewayError::Forbidden);
        }
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }

        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Ok(None);
        }
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                debug!(%method, path, error = %e, "response body is not JSON");
                Ok(None)
            }
        }
    }

    async fn get(&self, path: &str) -> Result<Option<Value>> {
        self.request::<Value>(Method::GET, path, None).await
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Option<Value>> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// Shared tail of signup and login.
    fn accept_auth(&self, body: Option<Value>) -> Result<AuthSession> {
        let body = body.ok_or_else(|| GatewayError::Decode("empty auth response".into()))?;
        if let Some(msg) = body.get("error").and_then(Value::as_str) {
            return Err(GatewayError::AuthRejected(msg.to_string()));
        }
        let auth: AuthSession =
            serde_json::from_value(body).map_err(|e| GatewayError::Decode(e.to_string()))?;
        self.session.save(&auth.user, &auth.token)?;
        info!(user_id = %auth.user.id, "signed in");
        Ok(auth)
    }
}

fn segment(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}

#[async_trait]
impl Backend for RemoteGateway {
    async fn health(&self) -> Result<HealthStatus> {
        let body = self.get("/health").await?;
        normalize_object(body, "health")
            .ok_or_else(|| GatewayError::Decode("unexpected health payload".into()))
    }

    async fn fetch_users(&self) -> Result<Vec<User>> {
        Ok(normalize_sequence(self.get("/users/").await?, "users"))
    }

    async fn signup(&self, user: &NewUser) -> Result<AuthSession> {
        let body = self.post("/users/signup", user).await?;
        self.accept_auth(body)
    }

    async fn login(&self, email: &str, password: &str) -> Result<AuthSession> {
        let body = self
            .post("/users/login", &json!({ "email": email, "password": password }))
            .await?;
        self.accept_auth(body)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let body = self.get(&format!("/users/by-email/{}", segment(email))).await?;
        Ok(normalize_object(body, "user"))
    }

    async fn search_users(&self, query: &str) -> Result<Vec<User>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let body = self.get(&format!("/users/search/{}", segment(query))).await?;
        Ok(normalize_sequence(body, "users"))
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        self.request(Method::PUT, &format!("/users/{}", user.id), Some(user))
            .await?;
        Ok(())
    }

    async fn fetch_spaces(&self) -> Result<Vec<Space>> {
        Ok(normalize_sequence(self.get("/spaces/").await?, "spaces"))
    }

    async fn fetch_spaces_by_ids(&self, ids: &[SpaceId]) -> Result<Vec<Space>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let body = self.post("/spaces/by-ids", ids).await?;
        Ok(normalize_sequence(body, "spaces"))
    }

    async fn save_space(&self, space: &Space) -> Result<()> {
        self.post("/spaces/", space).await?;
        Ok(())
    }

    async fn delete_space(&self, id: SpaceId) -> Result<()> {
        self.request::<Value>(Method::DELETE, &format!("/spaces/{id}"), None)
            .await?;
        Ok(())
    }

    async fn fetch_messages(&self, chat: ChatId) -> Result<Vec<Message>> {
        let body = self.get(&format!("/messages/{chat}")).await?;
        Ok(normalize_sequence(body, "messages"))
    }

    async fn post_message(&self, chat: ChatId, message: &Message) -> Result<()> {
        self.post(&format!("/messages/{chat}"), message).await?;
        Ok(())
    }

    async fn patch_message(&self, chat: ChatId, message: &Message) -> Result<Option<Message>> {
        let path = format!("/messages/{chat}/{}", segment(&message.id.to_string()));
        let body = self.request(Method::PATCH, &path, Some(message)).await?;
        Ok(normalize_object(body, "message"))
    }

    async fn send_friend_request(&self, to: UserId, notification: &Notification) -> Result<()> {
        self.post(
            "/actions/send-friend-request",
            &json!({ "toUserId": to, "notification": notification }),
        )
        .await?;
        Ok(())
    }

    async fn accept_friend(
        &self,
        user: UserId,
        friend: UserId,
        notification: &NotificationId,
    ) -> Result<()> {
        self.post(
            "/actions/accept-friend",
            &json!({ "userId": user, "friendId": friend, "notificationId": notification }),
        )
        .await?;
        Ok(())
    }

    async fn reject_friend(&self, user: UserId, notification: &NotificationId) -> Result<()> {
        self.post(
            "/actions/reject-friend",
            &json!({ "userId": user, "notificationId": notification }),
        )
        .await?;
        Ok(())
    }

    async fn add_member(
        &self,
        user: UserId,
        space: SpaceId,
        channel: Option<ChannelId>,
    ) -> Result<()> {
        let mut body = json!({ "userIdToDetail": user, "spaceId": space });
        if let Some(channel) = channel {
            body["channelId"] = json!(channel);
        }
        self.post("/actions/add-member", &body).await?;
        Ok(())
    }

    async fn accept_invite(
        &self,
        user: UserId,
        notification: &NotificationId,
    ) -> Result<Option<Space>> {
        let body = self
            .post(
                "/actions/accept-invite",
                &json!({ "userId": user, "notificationId": notification }),
            )
            .await?;
        // Either the space itself or `{"space": {...}}`.
        let body = match body {
            Some(Value::Object(mut map)) if map.contains_key("space") => map.remove("space"),
            other => other,
        };
        Ok(normalize_object(body, "space"))
    }

    async fn reject_invite(&self, user: UserId, notification: &NotificationId) -> Result<()> {
        self.post(
            "/actions/reject-invite",
            &json!({ "userId": user, "notificationId": notification }),
        )
        .await?;
        Ok(())
    }

    async fn fetch_events(&self) -> Result<Vec<CalendarEvent>> {
        Ok(normalize_sequence(self.get("/events/").await?, "events"))
    }

    async fn save_event(&self, event: &CalendarEvent) -> Result<CalendarEvent> {
        let body = self.post("/events/", event).await?;
        let stored = body
            .and_then(|mut v| v.get_mut("event").map(Value::take))
            .and_then(|v| normalize_object(Some(v), "event"));
        Ok(stored.unwrap_or_else(|| event.clone()))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use spaces_shared::{Key, Presence};
    use spaces_store::Database;

    use super::*;

    fn user(id: i64) -> User {
        User {
            id: UserId(id),
            name: format!("user-{id}"),
            email: format!("u{id}@example.com"),
            avatar: "👤".into(),
            status: Presence::Online,
            spaces: vec![],
            friends: vec![],
            notifications: vec![],
        }
    }

    fn gateway_with_timeout(server: &MockServer, timeout: Duration) -> RemoteGateway {
        let db = Database::open_in_memory().unwrap().into_shared();
        let session = Arc::new(SessionContext::new(db));
        let base = Url::parse(&server.uri()).unwrap();
        RemoteGateway::new(&base, timeout, session).unwrap()
    }

    fn gateway(server: &MockServer) -> RemoteGateway {
        gateway_with_timeout(server, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn session_headers_are_attached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users/"))
            .and(header("authorization", "Bearer tok-1"))
            .and(header("x-user-id", "1"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1, "name": "Ada"}])))
            .expect(1)
            .mount(&server)
            .await;

        let gw = gateway(&server);
        gw.session().save(&user(1), "tok-1").unwrap();
        let users = gw.fetch_users().await.unwrap();
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn unauthorized_wipes_the_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/spaces/"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let gw = gateway(&server);
        gw.session().save(&user(1), "stale").unwrap();

        let err = gw.fetch_spaces().await.unwrap_err();
        assert!(err.is_session_fatal());
        assert!(!gw.session().is_active());
        assert!(gw.session().load().unwrap().is_none());
    }

    #[tokio::test]
    async fn forbidden_is_recoverable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/messages/7"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let gw = gateway(&server);
        gw.session().save(&user(1), "tok").unwrap();

        let err = gw.fetch_messages(ChatId::Channel(ChannelId(7))).await.unwrap_err();
        assert!(err.is_forbidden());
        assert!(gw.session().is_active());
    }

    #[tokio::test]
    async fn other_failures_are_generic() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = gateway(&server).fetch_events().await.unwrap_err();
        assert!(matches!(err, GatewayError::Status(503)));
    }

    #[tokio::test]
    async fn request_timeout_is_applied() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/events/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([]))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let gw = gateway_with_timeout(&server, Duration::from_millis(50));
        let err = gw.fetch_events().await.unwrap_err();
        assert!(matches!(&err, GatewayError::Transport(e) if e.is_timeout()));
    }

    #[tokio::test]
    async fn wrapped_and_malformed_bodies_normalize() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/messages/dm_1_2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "messages": [{"id": 1, "userId": 1, "text": "hi"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/users/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let gw = gateway(&server);
        let messages = gw
            .fetch_messages(ChatId::direct(UserId(2), UserId(1)))
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert!(gw.fetch_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn login_persists_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/login"))
            .and(body_json(json!({"email": "ada@example.com", "password": "pw"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user": {"id": 1, "name": "Ada", "email": "ada@example.com"},
                "token": "fresh"
            })))
            .mount(&server)
            .await;

        let gw = gateway(&server);
        let auth = gw.login("ada@example.com", "pw").await.unwrap();
        assert_eq!(auth.token, "fresh");
        assert_eq!(gw.session().token().as_deref(), Some("fresh"));
        assert_eq!(gw.session().load().unwrap().unwrap().user.id, UserId(1));
    }

    #[tokio::test]
    async fn auth_error_body_is_rejected_without_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/login"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"error": "Invalid credentials"})),
            )
            .mount(&server)
            .await;

        let gw = gateway(&server);
        match gw.login("ada@example.com", "nope").await {
            Err(GatewayError::AuthRejected(msg)) => assert_eq!(msg, "Invalid credentials"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(!gw.session().is_active());
    }

    #[tokio::test]
    async fn empty_id_list_skips_the_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/spaces/by-ids"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        assert!(gateway(&server).fetch_spaces_by_ids(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_member_sends_optional_channel() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/actions/add-member"))
            .and(body_json(json!({"userIdToDetail": 2, "spaceId": 10, "channelId": 3})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .expect(1)
            .mount(&server)
            .await;

        gateway(&server)
            .add_member(UserId(2), SpaceId(10), Some(ChannelId(3)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_notification_writes_user_back() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/users/1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let mut me = user(1);
        me.notifications.push(Notification::friend_request(UserId(2), "Bo"));
        let id = me.notifications[0].id.clone();

        let updated = gateway(&server).delete_notification(&me, &id).await.unwrap();
        assert!(updated.notifications.is_empty());
    }

    #[tokio::test]
    async fn save_event_prefers_server_copy() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/events/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "saved",
                "event": {"id": "evt-99", "title": "standup", "date": "2024-05-01", "time": "09:00"}
            })))
            .mount(&server)
            .await;

        let event: CalendarEvent = serde_json::from_value(json!({
            "id": "", "title": "standup", "date": "2024-05-01", "time": "09:00"
        }))
        .unwrap();
        let stored = gateway(&server).save_event(&event).await.unwrap();
        assert_eq!(stored.id, Key::text("evt-99"));
    }
}
