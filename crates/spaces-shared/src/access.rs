//! Channel access gate.
//!
//! A user may open a channel if they are a member of it, or if they own the
//! parent space.  The owner override means channel membership is not required
//! to be a subset of space membership.

use crate::models::{Channel, Space};
use crate::types::{ChannelId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    #[error("you are not a member of this channel")]
    NotMember,

    #[error("channel not found in this space")]
    UnknownChannel,
}

pub fn can_access(user: UserId, space: &Space, channel: &Channel) -> bool {
    channel.members.contains(&user) || space.is_owner(user)
}

/// Resolve `channel_id` inside `space` for `user`, or say why not.
pub fn check_channel_access(
    user: UserId,
    space: &Space,
    channel_id: ChannelId,
) -> Result<&Channel, AccessDenied> {
    let channel = space.channel(channel_id).ok_or(AccessDenied::UnknownChannel)?;
    if can_access(user, space, channel) {
        Ok(channel)
    } else {
        Err(AccessDenied::NotMember)
    }
}

/// Channels of `space` that `user` may read, in display order.
pub fn visible_channels(user: UserId, space: &Space) -> impl Iterator<Item = &Channel> {
    space
        .channels
        .iter()
        .filter(move |channel| can_access(user, space, channel))
}
