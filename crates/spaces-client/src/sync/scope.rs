//! Resources owned by the open chat.
//!
//! A [`ChatScope`] is created when a chat is entered and dropped on every
//! way out of it: navigating elsewhere, closing, signing out, or the engine
//! shutting down.  Dropping it aborts the thread poller and closes the chat
//! socket.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use spaces_net::RealtimeManager;
use spaces_shared::ChatId;

use crate::sync::tasks::{load_thread, spawn_periodic};
use crate::sync::SyncContext;

pub struct ChatScope {
    chat: ChatId,
    poller: Option<JoinHandle<()>>,
    realtime: Option<Arc<RealtimeManager>>,
}

impl ChatScope {
    /// Acquire the chat socket and, when `poll` is set, start the thread
    /// poller.
    pub(crate) fn open(ctx: &Arc<SyncContext>, chat: ChatId, poll: bool) -> Self {
        if let Some(realtime) = &ctx.realtime {
            if let Err(e) = realtime.open_chat(chat) {
                warn!(%chat, error = %e, "chat socket unavailable, relying on polling");
            }
        }

        let poller = poll.then(|| {
            spawn_periodic("thread", ctx.timings.thread, ctx.clone(), move |ctx| {
                load_thread(ctx, chat)
            })
        });

        debug!(%chat, polling = poll, "chat scope opened");
        Self {
            chat,
            poller,
            realtime: ctx.realtime.clone(),
        }
    }

    pub fn chat(&self) -> ChatId {
        self.chat
    }
}

impl Drop for ChatScope {
    fn drop(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.abort();
        }
        if let Some(realtime) = &self.realtime {
            realtime.close_chat(self.chat);
        }
        debug!(chat = %self.chat, "chat scope closed");
    }
}
