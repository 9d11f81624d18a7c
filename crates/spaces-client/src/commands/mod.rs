//! User-initiated actions.
//!
//! Each sub-module adds an `impl SyncEngine` block for one domain.  Every
//! command calls the backend first and only touches the snapshot once the
//! call succeeded; nothing is rolled back because nothing is written early.
//! The next reconciliation tick confirms or overwrites the local change.

pub mod calendar;
pub mod calls;
pub mod messaging;
pub mod social;
pub mod spaces;

use spaces_shared::{Space, SpaceId, User};

use crate::error::{Result, SyncError};
use crate::state::lock;
use crate::sync::SyncEngine;

impl SyncEngine {
    /// The signed-in user's record: the reconciled copy when there is one,
    /// otherwise the one stored with the session.
    pub fn current_user(&self) -> Result<User> {
        let ctx = self.context();
        let cached = lock(&ctx.state).user.clone();
        cached
            .or_else(|| ctx.session.user())
            .ok_or(SyncError::NotSignedIn)
    }

    pub(crate) fn space_record(&self, id: SpaceId) -> Result<Space> {
        lock(&self.context().state)
            .space(id)
            .cloned()
            .ok_or(SyncError::UnknownSpace(id))
    }

    /// A space the caller owns, or `NotOwner`.
    pub(crate) fn owned_space(&self, id: SpaceId) -> Result<Space> {
        let me = self.context().me()?;
        let space = self.space_record(id)?;
        if !space.is_owner(me) {
            return Err(SyncError::NotOwner);
        }
        Ok(space)
    }

    /// Swap in a space returned by a management call, keeping the local
    /// sidebar flag.
    pub(crate) fn store_space(&self, mut updated: Space) {
        let mut snap = lock(&self.context().state);
        match snap.space_mut(updated.id) {
            Some(slot) => {
                updated.expanded = slot.expanded;
                *slot = updated;
            }
            None => snap.spaces.push(updated),
        }
    }
}
