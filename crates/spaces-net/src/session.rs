//! Session context injected into the gateway and the sync engine.
//!
//! Holds the in-memory copy of the signed-in identity and writes every change
//! through to the local store.  There is exactly one per running client.

use std::sync::RwLock;

use tracing::{info, warn};

use spaces_shared::{User, UserId};
use spaces_store::{SharedDatabase, StoreError, StoredSession};

pub struct SessionContext {
    db: SharedDatabase,
    current: RwLock<Option<StoredSession>>,
}

impl SessionContext {
    /// Create an empty context.  Call [`load`](Self::load) to restore a
    /// persisted session.
    pub fn new(db: SharedDatabase) -> Self {
        Self {
            db,
            current: RwLock::new(None),
        }
    }

    /// Restore the persisted session, if any.
    pub fn load(&self) -> Result<Option<StoredSession>, StoreError> {
        let stored = {
            let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
            db.load_session()?
        };
        if let Some(ref session) = stored {
            info!(user_id = %session.user.id, "restored stored session");
        }
        *self.write() = stored.clone();
        Ok(stored)
    }

    /// Persist and activate a new session.
    pub fn save(&self, user: &User, token: &str) -> Result<(), StoreError> {
        {
            let mut db = self.db.lock().unwrap_or_else(|e| e.into_inner());
            db.save_session(user, token)?;
        }
        *self.write() = Some(StoredSession {
            user: user.clone(),
            token: token.to_string(),
        });
        Ok(())
    }

    /// Drop the session from memory and disk.  Idempotent.
    pub fn clear(&self) -> Result<(), StoreError> {
        *self.write() = None;
        let db = self.db.lock().unwrap_or_else(|e| e.into_inner());
        db.clear_session()
    }

    /// Session-fatal reset after a 401.  Failures to wipe the disk copy are
    /// logged; the in-memory session is gone either way.
    pub fn invalidate(&self) {
        if let Err(e) = self.clear() {
            warn!(error = %e, "failed to wipe stored session");
        }
    }

    /// Refresh the cached user record without touching the token.
    pub fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let token = match self.token() {
            Some(token) => token,
            None => return Ok(()),
        };
        self.save(user, &token)
    }

    pub fn get(&self) -> Option<StoredSession> {
        self.read().clone()
    }

    pub fn is_active(&self) -> bool {
        self.read().is_some()
    }

    pub fn token(&self) -> Option<String> {
        self.read().as_ref().map(|s| s.token.clone())
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.read().as_ref().map(|s| s.user.id)
    }

    pub fn user(&self) -> Option<User> {
        self.read().as_ref().map(|s| s.user.clone())
    }

    pub fn database(&self) -> &SharedDatabase {
        &self.db
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<StoredSession>> {
        self.current.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<StoredSession>> {
        self.current.write().unwrap_or_else(|e| e.into_inner())
    }
}
