//! # spaces-client
//!
//! Headless client core for Spaces: configuration, the sync engine that
//! reconciles a local snapshot against the backend, user commands and
//! the auth flow.  Observers subscribe to [`SyncEvent`]s and read the
//! [`Snapshot`](state::Snapshot).

pub mod auth;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod state;
pub mod sync;

use tracing_subscriber::{fmt, EnvFilter};

pub use config::{ClientConfig, SyncTimings};
pub use error::{Result, SyncError};
pub use events::{SyncEvent, Topic};
pub use sync::{SyncContext, SyncEngine};

/// Install the global subscriber.  `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("spaces_client=debug,spaces_net=info,spaces_store=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
