//! Friends and notifications.
//!
//! Accepting, rejecting or dismissing a notification also records its id in
//! the persisted dismissed set, so a backend that keeps resending it cannot
//! bring it back.

use tracing::{debug, info, warn};

use spaces_shared::search::Needle;
use spaces_shared::types::NotificationId;
use spaces_shared::{Notification, NotificationKind, Space, User, UserId};

use crate::error::{Result, SyncError};
use crate::events::{SyncEvent, Topic};
use crate::state::lock;
use crate::sync::merge::merge_active_space;
use crate::sync::SyncEngine;

impl SyncEngine {
    /// Push a friend request into `to`'s notification list.
    pub async fn send_friend_request(&self, to: UserId) -> Result<Notification> {
        let ctx = self.context();
        let me = self.current_user()?;
        if to == me.id {
            return Err(SyncError::SelfTarget);
        }
        let request = Notification::friend_request(me.id, &me.name);

        ctx.backend
            .send_friend_request(to, &request)
            .await
            .map_err(|e| ctx.check(e))?;
        info!(%to, id = %request.id, "friend request sent");
        Ok(request)
    }

    pub async fn accept_notification(&self, id: &NotificationId) -> Result<()> {
        let ctx = self.context();
        let me = ctx.me()?;
        let notification = self.notification(id)?;

        match notification.kind {
            NotificationKind::FriendRequest => {
                let friend = notification.from_id.ok_or(SyncError::NotFound("sender"))?;
                ctx.backend
                    .accept_friend(me, friend, id)
                    .await
                    .map_err(|e| ctx.check(e))?;
                if let Some(user) = lock(&ctx.state).user.as_mut() {
                    user.add_friend(friend);
                }
                info!(%friend, "friend request accepted");
            }
            NotificationKind::Invite => {
                let echoed = ctx
                    .backend
                    .accept_invite(me, id)
                    .await
                    .map_err(|e| ctx.check(e))?;
                self.settle(id)?;
                self.join_space(echoed, &notification).await;
                return Ok(());
            }
            NotificationKind::Info => {}
        }

        self.settle(id)
    }

    pub async fn reject_notification(&self, id: &NotificationId) -> Result<()> {
        let ctx = self.context();
        let me = ctx.me()?;
        let notification = self.notification(id)?;

        let result = match notification.kind {
            NotificationKind::FriendRequest => ctx.backend.reject_friend(me, id).await,
            NotificationKind::Invite => ctx.backend.reject_invite(me, id).await,
            NotificationKind::Info => Ok(()),
        };
        result.map_err(|e| ctx.check(e))?;
        debug!(%id, "notification rejected");
        self.settle(id)
    }

    /// Hide a notification for good.  The local dismissal always sticks; the
    /// backend copy is removed best-effort.
    pub async fn dismiss_notification(&self, id: &NotificationId) -> Result<()> {
        let ctx = self.context();
        self.settle(id)?;

        let user = self.current_user()?;
        match ctx.backend.delete_notification(&user, id).await {
            Ok(_) => debug!(%id, "notification deleted remotely"),
            Err(e) if e.is_session_fatal() => return Err(ctx.check(e)),
            Err(e) => warn!(%id, error = %e, "remote notification delete failed"),
        }
        Ok(())
    }

    /// Look up users to befriend.  Excludes the caller and existing friends.
    pub async fn search_users(&self, query: &str) -> Result<Vec<User>> {
        let ctx = self.context();
        let Some(needle) = Needle::new(query) else {
            return Ok(Vec::new());
        };
        let me = self.current_user()?;

        let found = ctx
            .backend
            .search_users(needle.as_str())
            .await
            .map_err(|e| ctx.check(e))?;
        Ok(found
            .into_iter()
            .filter(|u| u.id != me.id && !me.is_friend(u.id))
            .collect())
    }

    fn notification(&self, id: &NotificationId) -> Result<Notification> {
        lock(&self.context().state)
            .user
            .as_ref()
            .and_then(|u| u.notifications.iter().find(|n| &n.id == id).cloned())
            .ok_or(SyncError::NotFound("notification"))
    }

    /// Persist the dismissal and drop the notification from the snapshot.
    fn settle(&self, id: &NotificationId) -> Result<()> {
        let ctx = self.context();
        let me = ctx.me()?;
        ctx.db().dismiss_notification(me, id)?;

        let user = {
            let mut snap = lock(&ctx.state);
            snap.user.as_mut().map(|user| {
                user.remove_notification(id);
                user.clone()
            })
        };
        if let Some(user) = user {
            if let Err(e) = ctx.session.update_user(&user) {
                warn!(error = %e, "failed to persist user after notification change");
            }
        }
        ctx.emit(SyncEvent::StateChanged(Topic::Identity));
        Ok(())
    }

    /// Merge the joined space and navigate into it.
    async fn join_space(&self, echoed: Option<Space>, invite: &Notification) {
        let ctx = self.context();
        let space = match (echoed, invite.space_id) {
            (Some(space), _) => Some(space),
            (None, Some(id)) => match ctx.backend.fetch_spaces_by_ids(&[id]).await {
                Ok(spaces) => spaces.into_iter().find(|s| s.id == id),
                Err(e) => {
                    warn!(space = %id, error = %e, "could not load joined space");
                    None
                }
            },
            (None, None) => None,
        };
        let Some(space) = space else {
            return;
        };

        let space_id = space.id;
        let first_channel = space.channels.first().map(|c| c.id);
        {
            let mut snap = lock(&ctx.state);
            merge_active_space(&mut snap, space);
            if let Some(user) = snap.user.as_mut() {
                if !user.spaces.contains(&space_id) {
                    user.spaces.push(space_id);
                }
            }
        }
        ctx.emit(SyncEvent::StateChanged(Topic::Spaces));
        info!(space = %space_id, "joined space");

        if self.open_space(space_id).is_err() {
            return;
        }
        if let Some(channel) = first_channel {
            if let Err(e) = self.open_channel(space_id, channel).await {
                debug!(space = %space_id, %channel, error = %e, "could not enter first channel");
            }
        }
    }
}
