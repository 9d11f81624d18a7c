//! Voice/video call records.
//!
//! Calls live only in the local store; the call poller picks up status
//! changes made here or by the other party's client sharing the store.

use tracing::info;

use spaces_shared::types::CallId;
use spaces_shared::{Call, CallStatus, UserId};

use crate::error::{Result, SyncError};
use crate::events::{SyncEvent, Topic};
use crate::state::lock;
use crate::sync::SyncEngine;

impl SyncEngine {
    /// Ring `callee` and enter the call view.
    pub fn start_call(&self, callee: UserId) -> Result<Call> {
        let ctx = self.context();
        let me = self.current_user()?;
        if callee == me.id {
            return Err(SyncError::SelfTarget);
        }
        let call = Call::ring(&me, callee);
        ctx.db().upsert_call(&call)?;

        lock(&ctx.state).active_call = Some(call.clone());
        info!(call = %call.id, %callee, "call started");
        ctx.emit(SyncEvent::StateChanged(Topic::View));
        Ok(call)
    }

    /// Answer the surfaced incoming call.
    pub fn accept_call(&self, id: &CallId) -> Result<Call> {
        let ctx = self.context();
        if !ctx.db().set_call_status(id, CallStatus::Accepted)? {
            return Err(SyncError::NotFound("call"));
        }
        let call = ctx.db().get_call(id)?.ok_or(SyncError::NotFound("call"))?;

        {
            let mut snap = lock(&ctx.state);
            if snap.incoming_call.as_ref().is_some_and(|c| &c.id == id) {
                snap.incoming_call = None;
            }
            snap.active_call = Some(call.clone());
        }
        info!(call = %id, "call accepted");
        ctx.emit(SyncEvent::StateChanged(Topic::View));
        Ok(call)
    }

    pub fn reject_call(&self, id: &CallId) -> Result<()> {
        let ctx = self.context();
        if !ctx.db().set_call_status(id, CallStatus::Rejected)? {
            return Err(SyncError::NotFound("call"));
        }
        {
            let mut snap = lock(&ctx.state);
            if snap.incoming_call.as_ref().is_some_and(|c| &c.id == id) {
                snap.incoming_call = None;
            }
        }
        info!(call = %id, "call rejected");
        ctx.emit(SyncEvent::CallCleared(id.clone()));
        Ok(())
    }

    /// Hang up the active call, if any.
    pub fn end_call(&self) -> Result<Option<CallId>> {
        let ctx = self.context();
        let Some(call) = lock(&ctx.state).active_call.take() else {
            return Ok(None);
        };
        ctx.db().set_call_status(&call.id, CallStatus::Ended)?;

        info!(call = %call.id, "call ended");
        ctx.emit(SyncEvent::CallEnded {
            id: call.id.clone(),
            status: CallStatus::Ended,
        });
        Ok(Some(call.id))
    }
}
