//! The sync engine.
//!
//! A set of independent periodic reconciliation tasks sharing one
//! [`Snapshot`].  Each task fetches through the [`Backend`], then takes the
//! snapshot lock just long enough to run a pure merge step from
//! [`merge`].  Push frames from the realtime manager go through the same
//! merge steps.
//!
//! The engine is passive until [`SyncEngine::start`]: navigation, search and
//! commands work without any background task, which is how the integration
//! tests drive it.

pub mod merge;
pub mod search;
mod scope;
pub(crate) mod tasks;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use spaces_net::{Backend, GatewayError, RealtimeEvent, RealtimeManager, SessionContext};
use spaces_shared::access::check_channel_access;
use spaces_shared::search::SearchHit;
use spaces_shared::types::NotificationId;
use spaces_shared::{ChannelId, ChatId, SpaceId, UserId};
use spaces_store::Database;

use crate::config::SyncTimings;
use crate::error::{Result, SyncError};
use crate::events::{emit_event, SyncEvent, Topic};
use crate::state::{lock, SharedState, Snapshot, View};

pub use scope::ChatScope;
pub use search::{Debouncer, SearchBox};

const EVENT_CAPACITY: usize = 256;

/// Everything an engine task needs, shared behind one `Arc`.
pub struct SyncContext {
    pub backend: Arc<dyn Backend>,
    pub session: Arc<SessionContext>,
    pub realtime: Option<Arc<RealtimeManager>>,
    pub state: SharedState,
    pub events: broadcast::Sender<SyncEvent>,
    pub timings: SyncTimings,
    expired: AtomicBool,
}

impl SyncContext {
    pub fn new(backend: Arc<dyn Backend>, session: Arc<SessionContext>, timings: SyncTimings) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            session,
            realtime: None,
            state: Arc::new(Mutex::new(Snapshot::default())),
            events,
            timings,
            expired: AtomicBool::new(false),
        }
    }

    pub fn with_realtime(mut self, realtime: Arc<RealtimeManager>) -> Self {
        self.realtime = Some(realtime);
        self
    }

    /// Id of the signed-in user.
    pub fn me(&self) -> Result<UserId> {
        self.session.user_id().ok_or(SyncError::NotSignedIn)
    }

    /// The persisted dismissed set, read fresh before every notification
    /// merge.
    pub fn dismissed(&self, user: UserId) -> Result<HashSet<NotificationId>> {
        Ok(self.db().dismissed_notifications(user)?)
    }

    pub fn db(&self) -> MutexGuard<'_, Database> {
        self.session
            .database()
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub fn emit(&self, event: SyncEvent) {
        emit_event(&self.events, event);
    }

    pub fn snapshot(&self) -> Snapshot {
        lock(&self.state).clone()
    }

    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }

    /// Tear down after a 401.  The gateway has already wiped the stored
    /// session; this drops the sockets and the in-memory snapshot.  Only the
    /// first caller announces it.
    pub fn session_lost(&self) {
        if self.expired.swap(true, Ordering::AcqRel) {
            return;
        }
        warn!("session expired, clearing local state");
        if let Some(realtime) = &self.realtime {
            realtime.close_all();
        }
        *lock(&self.state) = Snapshot::default();
        self.emit(SyncEvent::SessionExpired);
    }

    /// Route a gateway error from an interactive call: a 401 tears the
    /// session down, everything else is handed back to the caller.
    pub(crate) fn check(&self, err: GatewayError) -> SyncError {
        if err.is_session_fatal() {
            self.session_lost();
        }
        err.into()
    }
}

pub struct SyncEngine {
    ctx: Arc<SyncContext>,
    running: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    scope: Mutex<Option<ChatScope>>,
    space_search: Debouncer,
    dm_search: Debouncer,
}

impl SyncEngine {
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            running: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            scope: Mutex::new(None),
            space_search: Debouncer::default(),
            dm_search: Debouncer::default(),
        }
    }

    /// Spawn the periodic tasks, the realtime dispatch loop and the user
    /// socket.  Calling it twice is a no-op.
    pub fn start(&self, realtime_rx: Option<mpsc::Receiver<RealtimeEvent>>) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let ctx = &self.ctx;
        let t = &ctx.timings;
        let mut handles = vec![
            tasks::spawn_periodic("identity", t.identity, ctx.clone(), tasks::refresh_identity),
            tasks::spawn_periodic("space", t.space, ctx.clone(), tasks::refresh_active_space),
            tasks::spawn_periodic("unread", t.unread, ctx.clone(), tasks::scan_unread),
            tasks::spawn_periodic("events", t.events, ctx.clone(), tasks::refresh_events),
            tasks::spawn_periodic("calls", t.calls, ctx.clone(), tasks::poll_calls),
        ];

        if let Some(mut rx) = realtime_rx {
            let ctx = ctx.clone();
            handles.push(tokio::spawn(async move {
                debug!("realtime dispatch started");
                while let Some(event) = rx.recv().await {
                    tasks::apply_realtime(&ctx, event);
                }
                debug!("realtime dispatch ended");
            }));
        }

        if let Some(realtime) = &ctx.realtime {
            if let Err(e) = realtime.open_user() {
                warn!(error = %e, "user socket unavailable");
            }
        }

        // A chat opened before start gets its poller now.
        let reopen = self.current_chat();
        if let Some(chat) = reopen {
            self.set_scope(None);
            self.set_scope(Some(ChatScope::open(ctx, chat, true)));
        }

        *self.tasks.lock().unwrap_or_else(|e| e.into_inner()) = handles;
        info!("sync engine started");
    }

    /// Abort every task, drop the open chat and close the sockets.
    pub fn stop(&self) {
        let handles = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        for handle in &handles {
            handle.abort();
        }
        self.set_scope(None);
        self.space_search.cancel();
        self.dm_search.cancel();
        if let Some(realtime) = &self.ctx.realtime {
            realtime.close_all();
        }
        if self.running.swap(false, Ordering::AcqRel) {
            info!(tasks = handles.len(), "sync engine stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.ctx.events.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.ctx.snapshot()
    }

    pub fn context(&self) -> &Arc<SyncContext> {
        &self.ctx
    }

    // -- single ticks ---------------------------------------------------------

    pub async fn refresh_identity(&self) -> Result<()> {
        self.tick(tasks::refresh_identity(self.ctx.clone()).await)
    }

    pub async fn refresh_active_space(&self) -> Result<()> {
        self.tick(tasks::refresh_active_space(self.ctx.clone()).await)
    }

    pub async fn scan_unread(&self) -> Result<()> {
        self.tick(tasks::scan_unread(self.ctx.clone()).await)
    }

    /// Reload the open thread once, if a chat is open.
    pub async fn load_active_thread(&self) -> Result<()> {
        match self.current_chat() {
            Some(chat) => self.tick(tasks::load_thread(self.ctx.clone(), chat).await),
            None => Ok(()),
        }
    }

    pub async fn refresh_events(&self) -> Result<()> {
        self.tick(tasks::refresh_events(self.ctx.clone()).await)
    }

    pub async fn poll_calls(&self) -> Result<()> {
        self.tick(tasks::poll_calls(self.ctx.clone()).await)
    }

    pub fn handle_realtime(&self, event: RealtimeEvent) {
        tasks::apply_realtime(&self.ctx, event);
    }

    fn tick(&self, result: Result<()>) -> Result<()> {
        if let Err(e) = &result {
            if e.is_session_fatal() {
                self.ctx.session_lost();
            }
        }
        result
    }

    // -- navigation -----------------------------------------------------------

    pub fn open_space(&self, space: SpaceId) -> Result<()> {
        {
            let mut snap = lock(&self.ctx.state);
            if snap.space(space).is_none() {
                return Err(SyncError::UnknownSpace(space));
            }
            snap.view = View::Space(space);
        }
        self.set_scope(None);
        debug!(%space, "space opened");
        self.ctx.emit(SyncEvent::StateChanged(Topic::View));
        Ok(())
    }

    /// Enter a channel.  The access gate runs first; a denial is announced
    /// and leaves the snapshot untouched.
    pub async fn open_channel(&self, space: SpaceId, channel: ChannelId) -> Result<()> {
        let me = self.ctx.me()?;
        let gate = {
            let snap = lock(&self.ctx.state);
            let record = snap.space(space).ok_or(SyncError::UnknownSpace(space))?;
            check_channel_access(me, record, channel).map(|_| ())
        };
        if let Err(denied) = gate {
            info!(%space, %channel, reason = %denied, "channel access denied");
            self.ctx.emit(SyncEvent::AccessDenied {
                chat: Some(ChatId::Channel(channel)),
                reason: denied.to_string(),
            });
            return Err(denied.into());
        }

        self.enter_chat(View::Channel { space, channel }, ChatId::Channel(channel))
            .await
    }

    /// Enter the DM thread with `peer`.
    pub async fn open_dm(&self, peer: UserId) -> Result<()> {
        let me = self.ctx.me()?;
        let chat = ChatId::direct(me, peer);
        self.enter_chat(View::Direct { peer, chat }, chat).await
    }

    async fn enter_chat(&self, view: View, chat: ChatId) -> Result<()> {
        // Release the previous chat before acquiring the next one.
        self.set_scope(None);
        lock(&self.ctx.state).view = view;
        self.ctx.emit(SyncEvent::StateChanged(Topic::View));

        let scope = ChatScope::open(&self.ctx, chat, self.is_running());
        self.set_scope(Some(scope));

        match self.ctx.backend.fetch_messages(chat).await {
            Ok(messages) => {
                let changed = {
                    let mut snap = lock(&self.ctx.state);
                    if snap.view.active_chat() != Some(chat) {
                        return Ok(());
                    }
                    snap.unread.enter(chat, messages.len());
                    merge::merge_thread(&mut snap, chat, messages)
                };
                debug!(%chat, "chat opened");
                if changed {
                    self.ctx.emit(SyncEvent::StateChanged(Topic::Thread(chat)));
                }
                self.ctx.emit(SyncEvent::StateChanged(Topic::Unread));
                Ok(())
            }
            Err(GatewayError::Forbidden) => {
                tasks::thread_forbidden(&self.ctx, chat);
                Ok(())
            }
            Err(e) => Err(self.ctx.check(e)),
        }
    }

    /// Leave the open chat, returning to its space (or home for a DM).
    pub fn close_chat(&self) {
        self.set_scope(None);
        {
            let mut snap = lock(&self.ctx.state);
            snap.view = match snap.view {
                View::Channel { space, .. } => View::Space(space),
                _ => View::Home,
            };
        }
        self.ctx.emit(SyncEvent::StateChanged(Topic::View));
    }

    pub fn go_home(&self) {
        self.set_scope(None);
        lock(&self.ctx.state).view = View::Home;
        self.ctx.emit(SyncEvent::StateChanged(Topic::View));
    }

    pub fn dismiss_notice(&self) {
        let had = lock(&self.ctx.state).notice.take().is_some();
        if had {
            self.ctx.emit(SyncEvent::StateChanged(Topic::View));
        }
    }

    /// Flip a space's sidebar flag.  Returns the new value.
    pub fn toggle_expanded(&self, space: SpaceId) -> Result<bool> {
        let expanded = {
            let mut snap = lock(&self.ctx.state);
            let record = snap.space_mut(space).ok_or(SyncError::UnknownSpace(space))?;
            record.expanded = !record.expanded;
            record.expanded
        };
        self.ctx.emit(SyncEvent::StateChanged(Topic::Spaces));
        Ok(expanded)
    }

    pub fn current_chat(&self) -> Option<ChatId> {
        lock(&self.ctx.state).view.active_chat()
    }

    fn set_scope(&self, scope: Option<ChatScope>) {
        let previous = {
            let mut slot = self.scope.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::replace(&mut *slot, scope)
        };
        drop(previous);
    }

    // -- search ---------------------------------------------------------------

    /// Feed the space search box.  A blank query clears results at once.
    pub fn set_space_query(&self, query: &str) {
        self.schedule_search(SearchBox::Spaces, query);
    }

    /// Feed the DM search box.
    pub fn set_dm_query(&self, query: &str) {
        self.schedule_search(SearchBox::Direct, query);
    }

    fn schedule_search(&self, which: SearchBox, query: &str) {
        let debouncer = match which {
            SearchBox::Spaces => &self.space_search,
            SearchBox::Direct => &self.dm_search,
        };
        if !search::record_query(&self.ctx, which, query) {
            debouncer.cancel();
            return;
        }
        let ctx = self.ctx.clone();
        let query = query.to_string();
        debouncer.schedule(self.ctx.timings.search_debounce, async move {
            if let Err(e) = search::run_search(ctx.clone(), which, query).await {
                if e.is_session_fatal() {
                    ctx.session_lost();
                } else {
                    warn!(error = %e, "search failed");
                }
            }
        });
    }

    /// Run a space search now, skipping the debounce.
    pub async fn run_space_search(&self, query: &str) -> Result<()> {
        self.run_search_now(SearchBox::Spaces, query).await
    }

    /// Run a DM search now, skipping the debounce.
    pub async fn run_dm_search(&self, query: &str) -> Result<()> {
        self.run_search_now(SearchBox::Direct, query).await
    }

    async fn run_search_now(&self, which: SearchBox, query: &str) -> Result<()> {
        if !search::record_query(&self.ctx, which, query) {
            return Ok(());
        }
        let result = search::run_search(self.ctx.clone(), which, query.to_string()).await;
        self.tick(result)
    }

    /// Highlight one result; cleared with the results.
    pub fn pin_result(&self, which: SearchBox, hit: SearchHit) {
        {
            let mut snap = lock(&self.ctx.state);
            match which {
                SearchBox::Spaces => snap.space_search.pinned = Some(hit),
                SearchBox::Direct => snap.dm_search.pinned = Some(hit),
            }
        }
        self.ctx.emit(SyncEvent::StateChanged(Topic::Search));
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
