//! Space and channel management.
//!
//! Renames, deletions, channel creation and member removal are owner-only and
//! are refused locally before any request is made.

use std::collections::BTreeSet;

use tracing::info;

use spaces_shared::constants::DEFAULT_CHANNELS;
use spaces_shared::types::next_id;
use spaces_shared::{
    Channel, ChannelId, ChatId, IconKind, Notification, Space, SpaceId, UserId, ValidationError,
    Visibility,
};

use crate::error::{Result, SyncError};
use crate::events::{SyncEvent, Topic};
use crate::state::lock;
use crate::sync::SyncEngine;

fn required(value: &str, what: &'static str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty(what).into());
    }
    Ok(trimmed.to_string())
}

fn channel_name(raw: &str) -> Result<String> {
    let name = Channel::normalize_name(raw);
    if name.is_empty() {
        return Err(ValidationError::Empty("channel name").into());
    }
    Ok(name)
}

/// A fresh space owned by `owner` with the default public channels.
pub fn new_space(owner: UserId, name: &str, icon: IconKind) -> Space {
    let members = BTreeSet::from([owner]);
    let channels = DEFAULT_CHANNELS
        .iter()
        .map(|name| Channel {
            id: ChannelId(next_id()),
            name: name.to_string(),
            visibility: Visibility::Public,
            members: members.clone(),
        })
        .collect();

    Space {
        id: SpaceId(next_id()),
        name: name.to_string(),
        icon_type: icon,
        channels,
        invite_code: Space::generate_invite_code(name),
        owner_id: owner,
        members,
        created_by: Some(owner),
        expanded: true,
    }
}

impl SyncEngine {
    pub async fn create_space(&self, name: &str, icon: IconKind) -> Result<Space> {
        let ctx = self.context();
        let me = ctx.me()?;
        let name = required(name, "space name")?;
        let space = new_space(me, &name, icon);

        ctx.backend
            .save_space(&space)
            .await
            .map_err(|e| ctx.check(e))?;

        {
            let mut snap = lock(&ctx.state);
            snap.spaces.push(space.clone());
            if let Some(user) = snap.user.as_mut() {
                if !user.spaces.contains(&space.id) {
                    user.spaces.push(space.id);
                }
            }
        }
        info!(space = %space.id, name = %space.name, code = %space.invite_code, "space created");
        ctx.emit(SyncEvent::StateChanged(Topic::Spaces));
        Ok(space)
    }

    pub async fn rename_space(&self, id: SpaceId, name: &str) -> Result<Space> {
        let ctx = self.context();
        let space = self.owned_space(id)?;
        let name = required(name, "space name")?;

        let updated = ctx
            .backend
            .rename_space(&space, &name)
            .await
            .map_err(|e| ctx.check(e))?;
        self.store_space(updated.clone());
        ctx.emit(SyncEvent::StateChanged(Topic::Spaces));
        Ok(updated)
    }

    pub async fn delete_space(&self, id: SpaceId) -> Result<()> {
        let ctx = self.context();
        let space = self.owned_space(id)?;

        ctx.backend
            .delete_space(id)
            .await
            .map_err(|e| ctx.check(e))?;

        let was_open = {
            let mut snap = lock(&ctx.state);
            snap.spaces.retain(|s| s.id != id);
            if let Some(user) = snap.user.as_mut() {
                user.spaces.retain(|s| *s != id);
            }
            for channel in &space.channels {
                snap.messages.remove(&ChatId::Channel(channel.id));
                snap.unread.forget(ChatId::Channel(channel.id));
            }
            snap.view.active_space() == Some(id)
        };
        if was_open {
            self.go_home();
        }
        info!(space = %id, "space deleted");
        ctx.emit(SyncEvent::StateChanged(Topic::Spaces));
        Ok(())
    }

    /// Add a channel; the creator is its only member.
    pub async fn create_channel(&self, space_id: SpaceId, name: &str) -> Result<Channel> {
        let ctx = self.context();
        let me = ctx.me()?;
        let mut space = self.owned_space(space_id)?;
        let channel = Channel {
            id: ChannelId(next_id()),
            name: channel_name(name)?,
            visibility: Visibility::Public,
            members: BTreeSet::from([me]),
        };
        space.channels.push(channel.clone());

        ctx.backend
            .save_space(&space)
            .await
            .map_err(|e| ctx.check(e))?;

        self.store_space(space);
        lock(&ctx.state)
            .messages
            .entry(ChatId::Channel(channel.id))
            .or_default();
        info!(space = %space_id, channel = %channel.id, name = %channel.name, "channel created");
        ctx.emit(SyncEvent::StateChanged(Topic::Spaces));
        Ok(channel)
    }

    pub async fn rename_channel(
        &self,
        space_id: SpaceId,
        channel: ChannelId,
        name: &str,
    ) -> Result<Space> {
        let ctx = self.context();
        let space = self.owned_space(space_id)?;
        if space.channel(channel).is_none() {
            return Err(SyncError::NotFound("channel"));
        }
        let name = channel_name(name)?;

        let updated = ctx
            .backend
            .rename_channel(&space, channel, &name)
            .await
            .map_err(|e| ctx.check(e))?;
        self.store_space(updated.clone());
        ctx.emit(SyncEvent::StateChanged(Topic::Spaces));
        Ok(updated)
    }

    pub async fn delete_channel(&self, space_id: SpaceId, channel: ChannelId) -> Result<Space> {
        let ctx = self.context();
        let space = self.owned_space(space_id)?;
        if space.channel(channel).is_none() {
            return Err(SyncError::NotFound("channel"));
        }

        let updated = ctx
            .backend
            .delete_channel(&space, channel)
            .await
            .map_err(|e| ctx.check(e))?;

        let chat = ChatId::Channel(channel);
        if self.current_chat() == Some(chat) {
            self.close_chat();
        }
        self.store_space(updated.clone());
        {
            let mut snap = lock(&ctx.state);
            snap.messages.remove(&chat);
            snap.unread.forget(chat);
        }
        info!(space = %space_id, %channel, "channel deleted");
        ctx.emit(SyncEvent::StateChanged(Topic::Spaces));
        Ok(updated)
    }

    /// Add `user` directly to a space, or to one channel of it.
    pub async fn add_member(
        &self,
        space_id: SpaceId,
        user: UserId,
        channel: Option<ChannelId>,
    ) -> Result<()> {
        let ctx = self.context();
        let mut space = self.space_record(space_id)?;
        if let Some(channel) = channel {
            if space.channel(channel).is_none() {
                return Err(SyncError::NotFound("channel"));
            }
        }

        ctx.backend
            .add_member(user, space_id, channel)
            .await
            .map_err(|e| ctx.check(e))?;

        space.members.insert(user);
        if let Some(c) = channel.and_then(|id| space.channel_mut(id)) {
            c.members.insert(user);
        }
        self.store_space(space);
        info!(space = %space_id, %user, ?channel, "member added");
        ctx.emit(SyncEvent::StateChanged(Topic::Spaces));
        Ok(())
    }

    /// Send `user` an invite notification for a space.
    pub async fn invite_to_space(&self, space_id: SpaceId, user: UserId) -> Result<Notification> {
        let ctx = self.context();
        let me = self.current_user()?;
        let space = self.space_record(space_id)?;
        let invite = Notification::invite(me.id, &me.name, &space);

        ctx.backend
            .send_friend_request(user, &invite)
            .await
            .map_err(|e| ctx.check(e))?;
        info!(space = %space_id, to = %user, "invite sent");
        Ok(invite)
    }

    /// Remove a member from the space and every channel in it.
    pub async fn remove_member(&self, space_id: SpaceId, member: UserId) -> Result<Space> {
        let ctx = self.context();
        let space = self.owned_space(space_id)?;
        if space.is_owner(member) {
            return Err(SyncError::OwnerRemoval);
        }

        let updated = ctx
            .backend
            .remove_member(&space, member)
            .await
            .map_err(|e| ctx.check(e))?;
        self.store_space(updated.clone());
        info!(space = %space_id, %member, "member removed");
        ctx.emit(SyncEvent::StateChanged(Topic::Spaces));
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_space_defaults() {
        let space = new_space(UserId(4), "Design Team", IconKind::Briefcase);
        let names: Vec<_> = space.channels.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["general", "random"]);
        assert!(space
            .channels
            .iter()
            .all(|c| c.visibility == Visibility::Public && c.members.contains(&UserId(4))));
        assert_eq!(space.owner_id, UserId(4));
        assert_eq!(space.created_by, Some(UserId(4)));
        assert!(space.members.contains(&UserId(4)));
        assert!(space.invite_code.starts_with("DESI-"));
        assert_ne!(space.channels[0].id, space.channels[1].id);
    }

    #[test]
    fn channel_names_are_normalized() {
        assert_eq!(channel_name(" Road  Map ").unwrap(), "road-map");
        assert!(channel_name("   ").is_err());
    }
}
