//! Session lifecycle: token persistence, the bearer header, and the
//! identified user.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};

use murmur_net::ChatApi;
use murmur_shared::protocol::{Credentials, ProfileUpdate};
use murmur_shared::types::{AuthMode, Profile, UserId};
use murmur_store::{StoreError, TokenStore};

use crate::error::{AuthError, NetworkError};

/// The authenticated identity plus its bearer token.
///
/// A restored session has a token but no `user` until the token has been
/// checked with the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user: Option<Profile>,
    /// `exp` claim of the token, when it can be read. Informational only:
    /// the server decides validity.
    pub expiry: Option<DateTime<Utc>>,
}

impl Session {
    fn new(token: String, user: Option<Profile>) -> Self {
        let expiry = token_expiry(&token);
        Self {
            token,
            user,
            expiry,
        }
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.user.as_ref().map(|u| &u.id)
    }

    pub fn is_identified(&self) -> bool {
        self.user.is_some()
    }
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Read the `exp` claim from a JWT without verifying it.
fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    Utc.timestamp_opt(claims.exp?, 0).single()
}

pub struct SessionStore {
    api: Arc<dyn ChatApi>,
    tokens: Box<dyn TokenStore>,
    session: Option<Session>,
}

impl SessionStore {
    pub fn new(api: Arc<dyn ChatApi>, tokens: Box<dyn TokenStore>) -> Self {
        Self {
            api,
            tokens,
            session: None,
        }
    }

    /// Load the persisted token and attach it. The token is not validated.
    pub fn restore(&mut self) -> Result<Option<&Session>, StoreError> {
        let Some(token) = self.tokens.load()? else {
            debug!("No persisted session");
            return Ok(None);
        };
        self.attach_auth_header(Some(&token));
        let session = Session::new(token, None);
        if let Some(expiry) = session.expiry {
            debug!(%expiry, "Restored session token");
        }
        self.session = Some(session);
        Ok(self.session.as_ref())
    }

    /// Ask the server who the attached token belongs to.
    ///
    /// Returns `Ok(None)` when there is no session to check. A failed check
    /// keeps the token; the session simply stays unidentified.
    pub async fn check(&mut self) -> Result<Option<&Profile>, NetworkError> {
        if self.session.is_none() {
            return Ok(None);
        }
        let user = self.api.check_auth().await?;
        let Some(session) = self.session.as_mut() else {
            return Ok(None);
        };
        info!(user = %user.id, "Session identified");
        Ok(Some(&*session.user.insert(user)))
    }

    /// Log in or register. On success the token is persisted and attached,
    /// and the new session replaces any previous one.
    ///
    /// Returns the identified user and the server's success message, if it
    /// sent one.
    pub async fn establish(
        &mut self,
        mode: AuthMode,
        credentials: &Credentials,
    ) -> Result<(Profile, Option<String>), AuthError> {
        let grant = self.api.authenticate(mode, credentials).await?;

        if let Err(e) = self.tokens.save(&grant.token) {
            warn!(error = %e, "Failed to persist session token");
        }
        self.attach_auth_header(Some(&grant.token));

        info!(user = %grant.user.id, mode = mode.as_path(), "Session established");
        self.session = Some(Session::new(grant.token, Some(grant.user.clone())));
        Ok((grant.user, grant.message))
    }

    /// Replace the session holder's profile with the server's updated copy.
    pub async fn update_profile(&mut self, update: &ProfileUpdate) -> Result<&Profile, AuthError> {
        let Some(session) = self.session.as_mut() else {
            return Err(AuthError::NotAuthenticated);
        };
        let user = self.api.update_profile(update).await?;
        debug!(user = %user.id, "Profile updated");
        Ok(&*session.user.insert(user))
    }

    /// Forget the session: persisted token, identity and bearer header.
    pub fn clear(&mut self) -> Option<Session> {
        if let Err(e) = self.tokens.clear() {
            warn!(error = %e, "Failed to remove persisted session token");
        }
        self.attach_auth_header(None);
        self.session.take()
    }

    /// Set (or remove) the bearer token sent with every API call.
    pub fn attach_auth_header(&self, token: Option<&str>) {
        self.api.set_token(token);
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn user(&self) -> Option<&Profile> {
        self.session.as_ref().and_then(|s| s.user.as_ref())
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.session.as_ref().and_then(Session::user_id)
    }
}
