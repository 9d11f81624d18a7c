//! Periodic reconciliation tasks.
//!
//! Each task fetches, then takes the snapshot lock only to merge.  A failed
//! tick is logged and the next tick retries at the same cadence; a lost
//! session stops the task.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use spaces_net::{GatewayError, RealtimeEvent};
use spaces_shared::access::visible_channels;
use spaces_shared::ChatId;

use crate::error::Result;
use crate::events::{SyncEvent, Topic};
use crate::state::lock;
use crate::sync::merge::{
    clear_thread, merge_active_space, merge_chat_frame, merge_directory, merge_events,
    merge_identity, merge_push_notification, merge_spaces, merge_thread, observe_active_call,
    observe_incoming_calls, IncomingCallChange,
};
use crate::sync::SyncContext;

/// Run `tick` every `period` until the session is lost or the handle is
/// aborted.  The first tick fires immediately.
pub(crate) fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    ctx: Arc<SyncContext>,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn(Arc<SyncContext>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(task = name, ?period, "periodic task started");

        loop {
            interval.tick().await;
            if ctx.is_expired() {
                debug!(task = name, "session gone, stopping task");
                return;
            }
            match tick(ctx.clone()).await {
                Ok(()) => {}
                Err(e) if e.is_session_fatal() => {
                    warn!(task = name, "session lost, stopping task");
                    ctx.session_lost();
                    return;
                }
                Err(e) => warn!(task = name, error = %e, "tick failed"),
            }
        }
    })
}

/// (a) Refetch the signed-in user and merge on count change.  Reloads the
/// space list when the user's space count moved, and keeps retrying until a
/// reload succeeds.
pub(crate) async fn refresh_identity(ctx: Arc<SyncContext>) -> Result<()> {
    let me = ctx.me()?;
    let users = ctx.backend.fetch_users().await?;
    let Some(fresh) = users.iter().find(|u| u.id == me).cloned() else {
        warn!(user_id = %me, "signed-in user missing from directory");
        return Ok(());
    };
    let dismissed = ctx.dismissed(me)?;

    let (change, directory_changed, merged, reload) = {
        let mut snap = lock(&ctx.state);
        let change = merge_identity(&mut snap, fresh, &dismissed);
        let directory_changed = merge_directory(&mut snap, users);
        if change.spaces_changed {
            snap.spaces_stale = true;
        }
        let reload = snap.spaces_stale;
        (change, directory_changed, snap.user.clone(), reload)
    };
    let space_ids = merged.as_ref().map(|u| u.spaces.clone()).unwrap_or_default();

    if change.changed {
        if let Some(user) = &merged {
            if let Err(e) = ctx.session.update_user(user) {
                warn!(error = %e, "failed to persist refreshed user");
            }
        }
    }
    if change.changed || directory_changed {
        ctx.emit(SyncEvent::StateChanged(Topic::Identity));
    }

    if reload {
        let spaces = ctx.backend.fetch_spaces_by_ids(&space_ids).await?;
        let changed = {
            let mut snap = lock(&ctx.state);
            if ctx.is_expired() {
                return Ok(());
            }
            snap.spaces_stale = false;
            merge_spaces(&mut snap, spaces)
        };
        if changed {
            info!(count = space_ids.len(), "space list reloaded");
            ctx.emit(SyncEvent::StateChanged(Topic::Spaces));
        }
    }
    Ok(())
}

/// (b) Refetch the open space, if any.
pub(crate) async fn refresh_active_space(ctx: Arc<SyncContext>) -> Result<()> {
    let active = lock(&ctx.state).view.active_space();
    let Some(space_id) = active else {
        return Ok(());
    };

    let fresh = ctx.backend.fetch_spaces_by_ids(&[space_id]).await?;
    let Some(space) = fresh.into_iter().find(|s| s.id == space_id) else {
        debug!(space = %space_id, "open space not returned by backend");
        return Ok(());
    };

    let changed = {
        let mut snap = lock(&ctx.state);
        // The user may have navigated away while the fetch was in flight.
        snap.view.active_space() == Some(space_id) && merge_active_space(&mut snap, space)
    };
    if changed {
        debug!(space = %space_id, "open space changed");
        ctx.emit(SyncEvent::StateChanged(Topic::Spaces));
    }
    Ok(())
}

/// (c) Fetch message counts for every readable channel and flag growth.
pub(crate) async fn scan_unread(ctx: Arc<SyncContext>) -> Result<()> {
    let me = ctx.me()?;
    let chats: Vec<ChatId> = {
        let snap = lock(&ctx.state);
        snap.spaces
            .iter()
            .flat_map(|space| visible_channels(me, space).map(|c| ChatId::Channel(c.id)))
            .collect()
    };

    let mut newly_unread = 0usize;
    for chat in chats {
        let count = match ctx.backend.fetch_messages(chat).await {
            Ok(messages) => messages.len(),
            Err(GatewayError::Forbidden) => {
                debug!(%chat, "skipping unreadable channel");
                continue;
            }
            Err(e) if e.is_session_fatal() => return Err(e.into()),
            Err(e) => {
                debug!(%chat, error = %e, "unread count failed");
                continue;
            }
        };

        let marked = {
            let mut snap = lock(&ctx.state);
            let is_active = snap.view.active_chat() == Some(chat);
            snap.unread.observe(chat, count, is_active)
        };
        if marked {
            newly_unread += 1;
        }
    }

    if newly_unread > 0 {
        debug!(newly_unread, "unread channels flagged");
        ctx.emit(SyncEvent::StateChanged(Topic::Unread));
    }
    Ok(())
}

/// (d) Reload the open thread.  A 403 clears that thread's cache and raises
/// an access-denied signal.
pub(crate) async fn load_thread(ctx: Arc<SyncContext>, chat: ChatId) -> Result<()> {
    match ctx.backend.fetch_messages(chat).await {
        Ok(messages) => {
            let changed = {
                let mut snap = lock(&ctx.state);
                snap.view.active_chat() == Some(chat) && merge_thread(&mut snap, chat, messages)
            };
            if changed {
                ctx.emit(SyncEvent::StateChanged(Topic::Thread(chat)));
            }
            Ok(())
        }
        Err(GatewayError::Forbidden) => {
            thread_forbidden(&ctx, chat);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Clear a thread after a 403 and tell observers, once per revocation.
pub(crate) fn thread_forbidden(ctx: &SyncContext, chat: ChatId) {
    let reason = "You no longer have access to this conversation".to_string();
    let announce = {
        let mut snap = lock(&ctx.state);
        let cleared = clear_thread(&mut snap, chat);
        let announce = cleared || snap.notice.is_none();
        if announce {
            snap.notice = Some(reason.clone());
        }
        announce
    };
    if announce {
        warn!(%chat, "access to open thread revoked");
        ctx.emit(SyncEvent::AccessDenied {
            chat: Some(chat),
            reason,
        });
        ctx.emit(SyncEvent::StateChanged(Topic::Thread(chat)));
    }
}

/// (e) Calendar events.
///
/// While the backend is unreachable the cached list is kept and events saved
/// offline are added to it.  Once it answers again, offline events are posted
/// and removed from the local store as each post succeeds.
pub(crate) async fn refresh_events(ctx: Arc<SyncContext>) -> Result<()> {
    let pending = ctx.db().list_local_events()?;

    let events = match ctx.backend.fetch_events().await {
        Ok(mut events) => {
            for event in pending {
                if events.iter().any(|e| e.id == event.id) {
                    ctx.db().delete_local_event(&event.id)?;
                    continue;
                }
                match ctx.backend.save_event(&event).await {
                    Ok(stored) => {
                        ctx.db().delete_local_event(&event.id)?;
                        info!(id = %stored.id, "offline event uploaded");
                        events.push(stored);
                    }
                    Err(e) if e.is_session_fatal() => return Err(e.into()),
                    Err(e) => {
                        debug!(id = %event.id, error = %e, "offline event upload failed");
                        events.push(event);
                    }
                }
            }
            events
        }
        Err(e) if e.is_session_fatal() || e.is_forbidden() => return Err(e.into()),
        Err(e) => {
            debug!(error = %e, "events endpoint unavailable, keeping cached list");
            let mut events = lock(&ctx.state).events.clone();
            for event in pending {
                if !events.iter().any(|e| e.id == event.id) {
                    events.push(event);
                }
            }
            events
        }
    };
    if merge_events(&mut lock(&ctx.state), events) {
        ctx.emit(SyncEvent::StateChanged(Topic::Events));
    }
    Ok(())
}

/// (e) Incoming and active call status.
pub(crate) async fn poll_calls(ctx: Arc<SyncContext>) -> Result<()> {
    let me = ctx.me()?;
    let active_id = lock(&ctx.state).active_call.as_ref().map(|c| c.id.clone());

    let (ringing, active) = {
        let db = ctx.db();
        let ringing = db.ringing_calls_for(me)?;
        let active = match &active_id {
            Some(id) => db.get_call(id)?,
            None => None,
        };
        (ringing, active)
    };

    let (incoming, ended) = {
        let mut snap = lock(&ctx.state);
        let incoming = observe_incoming_calls(&mut snap, &ringing);
        let ended = observe_active_call(&mut snap, active.as_ref());
        (incoming, ended)
    };

    match incoming {
        Some(IncomingCallChange::Surfaced(call)) => {
            info!(call = %call.id, from = %call.caller_id, "incoming call");
            ctx.emit(SyncEvent::IncomingCall(call));
        }
        Some(IncomingCallChange::Cleared(id)) => {
            debug!(call = %id, "incoming call withdrawn");
            ctx.emit(SyncEvent::CallCleared(id));
        }
        None => {}
    }
    if let (Some(status), Some(id)) = (ended, active_id) {
        info!(call = %id, status = status.as_str(), "call finished");
        ctx.emit(SyncEvent::CallEnded { id, status });
    }
    Ok(())
}

/// Merge one frame from the realtime manager.
pub(crate) fn apply_realtime(ctx: &SyncContext, event: RealtimeEvent) {
    match event {
        RealtimeEvent::ChatMessage { chat, message } => {
            if merge_chat_frame(&mut lock(&ctx.state), chat, message) {
                ctx.emit(SyncEvent::StateChanged(Topic::Thread(chat)));
            }
        }
        RealtimeEvent::Notification(notification) => {
            let Ok(me) = ctx.me() else {
                return;
            };
            let dismissed = match ctx.dismissed(me) {
                Ok(set) => set,
                Err(e) => {
                    warn!(error = %e, "cannot read dismissed set, dropping push");
                    return;
                }
            };
            let merged = merge_push_notification(
                &mut lock(&ctx.state),
                notification.clone(),
                &dismissed,
            );
            if merged {
                debug!(id = %notification.id, "notification pushed");
                ctx.emit(SyncEvent::NotificationReceived(notification));
                ctx.emit(SyncEvent::StateChanged(Topic::Identity));
            }
        }
        RealtimeEvent::Connected { chat } => debug!(%chat, "realtime connected"),
        RealtimeEvent::Disconnected { chat } => debug!(%chat, "realtime disconnected"),
    }
}
