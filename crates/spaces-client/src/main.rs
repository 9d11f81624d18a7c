//! # spaces-client
//!
//! Headless Spaces client.  Restores the stored session (or logs in with
//! `SPACES_EMAIL` / `SPACES_PASSWORD`), runs the sync engine and logs every
//! event it emits until Ctrl+C or the session is lost.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use spaces_client::{auth, ClientConfig, SyncContext, SyncEngine, SyncEvent};
use spaces_net::{Backend, RealtimeManager, RemoteGateway, SessionContext};
use spaces_store::Database;

const REALTIME_QUEUE: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Tracing and configuration
    // -----------------------------------------------------------------------
    spaces_client::init_tracing();
    info!("Starting Spaces client v{}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::from_env();
    info!(
        api = %config.api_url,
        ws = %config.ws_url,
        data_dir = ?config.data_dir,
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 2. Local store and session
    // -----------------------------------------------------------------------
    let db = match &config.data_dir {
        Some(dir) => Database::open_in_dir(dir),
        None => Database::new(),
    }
    .context("failed to open local store")?;

    let session = Arc::new(SessionContext::new(db.into_shared()));
    if let Some(stored) = session.load()? {
        info!(user_id = %stored.user.id, "Restored session");
    }

    let gateway = Arc::new(
        RemoteGateway::new(&config.api_url, config.request_timeout, session.clone())
            .context("failed to build HTTP client")?,
    );

    match gateway.health().await {
        Ok(health) => info!(status = %health.status, service = ?health.service, "Backend reachable"),
        Err(e) => warn!(error = %e, "Health probe failed, continuing"),
    }

    // -----------------------------------------------------------------------
    // 3. Sign in if needed
    // -----------------------------------------------------------------------
    if !session.is_active() {
        let (Some(email), Some(password)) = (&config.email, &config.password) else {
            anyhow::bail!("no stored session; set SPACES_EMAIL and SPACES_PASSWORD to log in");
        };
        if let Err(e) = auth::login(&*gateway, email, password).await {
            anyhow::bail!("login failed: {}", auth::inline_error(&e));
        }
    }

    // -----------------------------------------------------------------------
    // 4. Sync engine
    // -----------------------------------------------------------------------
    let (realtime_tx, realtime_rx) = mpsc::channel(REALTIME_QUEUE);
    let realtime = Arc::new(RealtimeManager::new(
        config.ws_url.clone(),
        session.clone(),
        realtime_tx,
    ));

    let backend: Arc<dyn Backend> = gateway;
    let ctx = SyncContext::new(backend, session, config.timings.clone()).with_realtime(realtime);
    let engine = SyncEngine::new(ctx);
    let mut events = engine.subscribe();
    engine.start(Some(realtime_rx));

    // -----------------------------------------------------------------------
    // 5. Log events until shutdown
    // -----------------------------------------------------------------------
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(SyncEvent::SessionExpired) => {
                    warn!("Session expired, exiting");
                    break;
                }
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Event log lagging");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    engine.stop();
    Ok(())
}

fn log_event(event: &SyncEvent) {
    match event {
        SyncEvent::StateChanged(topic) => debug!(event = event.name(), ?topic),
        SyncEvent::AccessDenied { chat, reason } => {
            warn!(event = event.name(), chat = ?chat.map(|c| c.to_string()), %reason)
        }
        SyncEvent::NotificationReceived(n) => {
            info!(event = event.name(), id = %n.id, from = %n.from, kind = ?n.kind)
        }
        SyncEvent::IncomingCall(call) => {
            info!(event = event.name(), id = %call.id, from = %call.caller_name)
        }
        SyncEvent::CallCleared(id) => info!(event = event.name(), %id),
        SyncEvent::CallEnded { id, status } => {
            info!(event = event.name(), %id, status = status.as_str())
        }
        SyncEvent::SessionExpired => warn!(event = event.name()),
    }
}
