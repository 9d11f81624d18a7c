//! # spaces-store
//!
//! Durable client-local state for Spaces, backed by SQLite.
//!
//! The remote backend is the source of truth for almost everything; this
//! crate only keeps what must survive a restart on this device:
//!
//! * the authenticated session (user record + bearer token),
//! * each user's set of dismissed notification ids,
//! * a fallback copy of calendar events and call records for when the
//!   backend cannot be reached.

pub mod calls;
pub mod database;
pub mod dismissed;
pub mod events;
pub mod migrations;
pub mod models;
pub mod session;

mod error;

pub use database::{Database, SharedDatabase};
pub use error::StoreError;
pub use models::*;
