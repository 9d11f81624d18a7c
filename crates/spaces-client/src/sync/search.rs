//! Search fan-out.
//!
//! Two independent boxes: the space box scans visible spaces, their readable
//! channels and those channels' messages; the DM box scans friends and the
//! DM threads with them.  Both are debounced and both swallow 403s from
//! individual threads.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use spaces_net::GatewayError;
use spaces_shared::access::visible_channels;
use spaces_shared::search::{sort_hits, Needle, SearchHit};
use spaces_shared::{ChatId, Message, SpaceId};

use crate::error::Result;
use crate::events::{SyncEvent, Topic};
use crate::state::{lock, SearchState};
use crate::sync::SyncContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchBox {
    Spaces,
    Direct,
}

impl SearchBox {
    fn state(self, snap: &mut crate::state::Snapshot) -> &mut SearchState {
        match self {
            SearchBox::Spaces => &mut snap.space_search,
            SearchBox::Direct => &mut snap.dm_search,
        }
    }
}

/// Runs only the last scheduled job once its delay elapses without a newer
/// one arriving.
#[derive(Default)]
pub struct Debouncer {
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn schedule<F>(&self, delay: Duration, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            job.await;
        });
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn cancel(&self) {
        if let Some(pending) = self.pending.lock().unwrap_or_else(|e| e.into_inner()).take() {
            pending.abort();
        }
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Fetch a thread for search.  403 and transient failures yield `None`; only
/// a lost session propagates.
async fn searchable_thread(ctx: &SyncContext, chat: ChatId) -> Result<Option<Vec<Message>>> {
    match ctx.backend.fetch_messages(chat).await {
        Ok(messages) => Ok(Some(messages)),
        Err(GatewayError::Forbidden) => {
            debug!(%chat, "search skipping unreadable thread");
            Ok(None)
        }
        Err(e) if e.is_session_fatal() => Err(e.into()),
        Err(e) => {
            debug!(%chat, error = %e, "search skipping thread");
            Ok(None)
        }
    }
}

fn message_hits(
    hits: &mut Vec<SearchHit>,
    needle: &Needle,
    chat: ChatId,
    space: Option<SpaceId>,
    messages: &[Message],
) {
    hits.extend(
        messages
            .iter()
            .filter(|m| needle.matches(&m.text))
            .map(|m| SearchHit::message(chat, space, m)),
    );
}

/// Spaces → channels → messages.
pub async fn search_spaces(ctx: &SyncContext, needle: &Needle) -> Result<Vec<SearchHit>> {
    let me = ctx.me()?;
    let spaces = lock(&ctx.state).spaces.clone();

    let mut hits = Vec::new();
    for space in &spaces {
        if needle.matches(&space.name) {
            hits.push(SearchHit::Space {
                space_id: space.id,
                name: space.name.clone(),
            });
        }
        for channel in visible_channels(me, space) {
            if needle.matches(&channel.name) {
                hits.push(SearchHit::Channel {
                    space_id: space.id,
                    channel_id: channel.id,
                    name: channel.name.clone(),
                });
            }
            let chat = ChatId::Channel(channel.id);
            if let Some(messages) = searchable_thread(ctx, chat).await? {
                message_hits(&mut hits, needle, chat, Some(space.id), &messages);
            }
        }
    }

    sort_hits(&mut hits);
    Ok(hits)
}

/// Friends → DM threads.
pub async fn search_direct(ctx: &SyncContext, needle: &Needle) -> Result<Vec<SearchHit>> {
    let me = ctx.me()?;
    let friends: Vec<_> = {
        let snap = lock(&ctx.state);
        snap.friends()
            .into_iter()
            .map(|u| (u.id, u.name.clone()))
            .collect()
    };

    let mut hits = Vec::new();
    for (friend, name) in friends {
        if needle.matches(&name) {
            hits.push(SearchHit::User {
                user_id: friend,
                name,
            });
        }
        let chat = ChatId::direct(me, friend);
        if let Some(messages) = searchable_thread(ctx, chat).await? {
            message_hits(&mut hits, needle, chat, None, &messages);
        }
    }

    sort_hits(&mut hits);
    Ok(hits)
}

/// Record a query.  A blank query clears the box immediately and returns
/// `false`; otherwise the caller schedules [`run_search`].
pub(crate) fn record_query(ctx: &SyncContext, which: SearchBox, query: &str) -> bool {
    let blank = Needle::new(query).is_none();
    {
        let mut snap = lock(&ctx.state);
        let state = which.state(&mut snap);
        if blank {
            state.clear();
        } else {
            state.query = query.to_string();
        }
    }
    if blank {
        ctx.emit(SyncEvent::StateChanged(Topic::Search));
    }
    !blank
}

/// Execute a search and store the results unless the query moved on.
pub(crate) async fn run_search(ctx: Arc<SyncContext>, which: SearchBox, query: String) -> Result<()> {
    let Some(needle) = Needle::new(&query) else {
        return Ok(());
    };
    let hits = match which {
        SearchBox::Spaces => search_spaces(&ctx, &needle).await?,
        SearchBox::Direct => search_direct(&ctx, &needle).await?,
    };

    let stored = {
        let mut snap = lock(&ctx.state);
        let state = which.state(&mut snap);
        if state.query == query {
            debug!(query = %query, hits = hits.len(), "search results updated");
            state.results = hits;
            true
        } else {
            false
        }
    };
    if stored {
        ctx.emit(SyncEvent::StateChanged(Topic::Search));
    }
    Ok(())
}
