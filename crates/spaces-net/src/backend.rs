//! The seam between the sync engine and whatever answers its requests.
//!
//! [`RemoteGateway`](crate::gateway::RemoteGateway) implements it over HTTP;
//! tests drive the engine with an in-memory implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use spaces_shared::types::NotificationId;
use spaces_shared::{
    CalendarEvent, ChannelId, ChatId, Message, NewUser, Notification, Space, SpaceId, User, UserId,
};

use crate::error::GatewayError;

pub type Result<T> = std::result::Result<T, GatewayError>;

/// Signed-in identity returned by signup and login.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub service: Option<String>,
}

#[async_trait]
pub trait Backend: Send + Sync + 'static {
    async fn health(&self) -> Result<HealthStatus>;

    // -- users --------------------------------------------------------------

    async fn fetch_users(&self) -> Result<Vec<User>>;

    /// Create an account.  Implementations persist the returned session.
    async fn signup(&self, user: &NewUser) -> Result<AuthSession>;

    /// Implementations persist the returned session.
    async fn login(&self, email: &str, password: &str) -> Result<AuthSession>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn search_users(&self, query: &str) -> Result<Vec<User>>;

    async fn update_user(&self, user: &User) -> Result<()>;

    // -- spaces -------------------------------------------------------------

    async fn fetch_spaces(&self) -> Result<Vec<Space>>;

    async fn fetch_spaces_by_ids(&self, ids: &[SpaceId]) -> Result<Vec<Space>>;

    /// Create or replace a space record.
    async fn save_space(&self, space: &Space) -> Result<()>;

    async fn delete_space(&self, id: SpaceId) -> Result<()>;

    async fn rename_space(&self, space: &Space, name: &str) -> Result<Space> {
        let mut updated = space.clone();
        updated.name = name.to_string();
        self.save_space(&updated).await?;
        Ok(updated)
    }

    async fn rename_channel(&self, space: &Space, channel: ChannelId, name: &str) -> Result<Space> {
        let mut updated = space.clone();
        if let Some(c) = updated.channel_mut(channel) {
            c.name = name.to_string();
        }
        self.save_space(&updated).await?;
        Ok(updated)
    }

    async fn delete_channel(&self, space: &Space, channel: ChannelId) -> Result<Space> {
        let mut updated = space.clone();
        updated.channels.retain(|c| c.id != channel);
        self.save_space(&updated).await?;
        Ok(updated)
    }

    /// Remove a member from the space and from every channel in it.
    async fn remove_member(&self, space: &Space, member: UserId) -> Result<Space> {
        let mut updated = space.clone();
        updated.members.remove(&member);
        for channel in &mut updated.channels {
            channel.members.remove(&member);
        }
        self.save_space(&updated).await?;
        Ok(updated)
    }

    // -- messages -----------------------------------------------------------

    async fn fetch_messages(&self, chat: ChatId) -> Result<Vec<Message>>;

    async fn post_message(&self, chat: ChatId, message: &Message) -> Result<()>;

    /// Replace a message.  Returns the server's copy when it sends one back.
    async fn patch_message(&self, chat: ChatId, message: &Message) -> Result<Option<Message>>;

    // -- actions ------------------------------------------------------------

    async fn send_friend_request(&self, to: UserId, notification: &Notification) -> Result<()>;

    async fn accept_friend(
        &self,
        user: UserId,
        friend: UserId,
        notification: &NotificationId,
    ) -> Result<()>;

    async fn reject_friend(&self, user: UserId, notification: &NotificationId) -> Result<()>;

    /// Add `user` to a space, optionally scoped to one channel.
    async fn add_member(&self, user: UserId, space: SpaceId, channel: Option<ChannelId>)
        -> Result<()>;

    /// Returns the joined space when the backend echoes it.
    async fn accept_invite(
        &self,
        user: UserId,
        notification: &NotificationId,
    ) -> Result<Option<Space>>;

    async fn reject_invite(&self, user: UserId, notification: &NotificationId) -> Result<()>;

    /// Remove a notification from the user's record.  There is no dedicated
    /// endpoint, so the whole user record is written back without it.
    async fn delete_notification(&self, user: &User, id: &NotificationId) -> Result<User> {
        let mut updated = user.clone();
        updated.remove_notification(id);
        self.update_user(&updated).await?;
        Ok(updated)
    }

    // -- events -------------------------------------------------------------

    async fn fetch_events(&self) -> Result<Vec<CalendarEvent>>;

    /// Returns the stored event, which may carry a server-assigned id.
    async fn save_event(&self, event: &CalendarEvent) -> Result<CalendarEvent>;
}
