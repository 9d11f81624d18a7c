//! Sign-up, login and logout.
//!
//! Input is validated before any request is made.  Failures of the initial
//! auth submission are the one place an error is turned into a user-facing
//! string, see [`inline_error`].

use tracing::{info, warn};

use spaces_net::{AuthSession, Backend, GatewayError};
use spaces_shared::constants::DEFAULT_AVATAR;
use spaces_shared::types::next_id;
use spaces_shared::{NewUser, Presence, UserId, ValidationError};

use crate::error::{Result, SyncError};
use crate::state::{lock, Snapshot};
use crate::sync::SyncEngine;

#[derive(Debug, Clone, Default)]
pub struct SignupForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

pub fn validate_signup(form: &SignupForm) -> std::result::Result<(), ValidationError> {
    if form.name.trim().is_empty() || form.email.trim().is_empty() || form.password.is_empty() {
        return Err(ValidationError::MissingFields);
    }
    if form.password != form.confirm_password {
        return Err(ValidationError::PasswordMismatch);
    }
    Ok(())
}

/// Create an account.  The gateway persists the returned session.
pub async fn signup(backend: &dyn Backend, form: &SignupForm) -> Result<AuthSession> {
    validate_signup(form)?;
    let email = form.email.trim();

    if backend.find_user_by_email(email).await?.is_some() {
        return Err(ValidationError::EmailTaken.into());
    }

    let user = NewUser {
        id: UserId(next_id()),
        name: form.name.trim().to_string(),
        email: email.to_string(),
        password: form.password.clone(),
        avatar: DEFAULT_AVATAR.to_string(),
        status: Presence::Online,
        spaces: Vec::new(),
        friends: Vec::new(),
        notifications: Vec::new(),
    };
    let session = backend.signup(&user).await?;
    info!(user_id = %session.user.id, "account created");
    Ok(session)
}

pub async fn login(backend: &dyn Backend, email: &str, password: &str) -> Result<AuthSession> {
    let email = email.trim();
    if email.is_empty() || password.is_empty() {
        return Err(ValidationError::MissingFields.into());
    }
    let session = backend.login(email, password).await?;
    info!(user_id = %session.user.id, "logged in");
    Ok(session)
}

/// Text shown under the auth form.
pub fn inline_error(err: &SyncError) -> String {
    match err {
        SyncError::Validation(e) => e.to_string(),
        SyncError::Gateway(GatewayError::AuthRejected(msg)) => msg.clone(),
        SyncError::Gateway(GatewayError::SessionExpired) => "Invalid credentials".to_string(),
        SyncError::Gateway(GatewayError::Transport(_)) => "Could not reach the server".to_string(),
        _ => "Something went wrong, please try again".to_string(),
    }
}

impl SyncEngine {
    /// Stop syncing and forget the stored session.  The dismissed set stays.
    pub fn sign_out(&self) -> Result<()> {
        self.stop();
        let ctx = self.context();
        if let Err(e) = ctx.session.clear() {
            warn!(error = %e, "failed to clear stored session");
            return Err(e.into());
        }
        *lock(&ctx.state) = Snapshot::default();
        info!("signed out");
        Ok(())
    }
}
