//! Session provider abstraction.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::credential::Credential;
use super::error::SessionError;

/// Source of truth for the user's session.
///
/// `refresh` may consume a one-time refresh artifact, so it must never run
/// concurrently with itself. Callers go through
/// [`super::RefreshCoordinator`], which guarantees that.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Credential of the current session, if one exists.
    async fn current_credential(&self) -> Result<Option<Credential>, SessionError>;

    /// Exchange the long-lived session material for a new credential.
    async fn refresh(&self) -> Result<Credential, SessionError>;

    /// Forget the session. Providers without persistent state need not
    /// override this.
    async fn sign_out(&self) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Session material persisted between runs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl StoredSession {
    pub fn credential(&self) -> Credential {
        Credential::new(self.access_token.clone(), self.expires_at)
    }
}

impl fmt::Debug for StoredSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user_id", &self.user_id)
            .finish()
    }
}
