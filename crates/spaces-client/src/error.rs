use thiserror::Error;

use spaces_net::{GatewayError, RealtimeError};
use spaces_shared::access::AccessDenied;
use spaces_shared::{SpaceId, ValidationError};
use spaces_store::StoreError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Realtime(#[from] RealtimeError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Access(#[from] AccessDenied),

    #[error("not signed in")]
    NotSignedIn,

    #[error("only the space owner can do that")]
    NotOwner,

    #[error("the owner cannot be removed from their space")]
    OwnerRemoval,

    #[error("that action cannot target yourself")]
    SelfTarget,

    #[error("unknown space {0}")]
    UnknownSpace(SpaceId),

    #[error("unknown {0}")]
    NotFound(&'static str),
}

impl SyncError {
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, SyncError::Gateway(e) if e.is_session_fatal())
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, SyncError::Gateway(e) if e.is_forbidden())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
