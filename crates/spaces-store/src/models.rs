//! Records that only exist in the local store.

use serde::{Deserialize, Serialize};
use spaces_shared::User;

/// The authenticated identity persisted across restarts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredSession {
    pub user: User,
    pub token: String,
}
