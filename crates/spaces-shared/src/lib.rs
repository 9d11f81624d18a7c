//! # spaces-shared
//!
//! Data model and pure rules shared by every Spaces crate: identifiers, the
//! backend's JSON records, push-frame decoding, the channel access gate and
//! search ordering.  Nothing here performs I/O.

pub mod access;
pub mod constants;
pub mod error;
pub mod models;
pub mod protocol;
pub mod search;
pub mod types;

pub use error::ValidationError;
pub use models::*;
pub use types::{ChannelId, ChatId, Key, SpaceId, UserId};
