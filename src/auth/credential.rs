//! Bearer credential value type.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bearer token plus the absolute instant it stops being accepted.
///
/// The token and its expiry are always installed together; see
/// [`super::CredentialStore`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    token: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Build a credential from its issue time and lifetime in seconds.
    ///
    /// Returns `None` if the resulting expiry is out of range.
    pub fn issued(
        token: impl Into<String>,
        issued_at: DateTime<Utc>,
        lifetime_secs: i64,
    ) -> Option<Self> {
        let expires_at = chrono::Duration::try_seconds(lifetime_secs)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))?;
        Some(Self::new(token, expires_at))
    }

    /// Build a credential from an absolute expiry in seconds since the epoch.
    ///
    /// Returns `None` if the timestamp is out of range.
    pub fn from_epoch_secs(token: impl Into<String>, expires_at_secs: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp(expires_at_secs, 0).map(|at| Self::new(token, at))
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Seconds since the epoch at which the credential expires.
    pub fn expires_at_secs(&self) -> i64 {
        self.expires_at.timestamp()
    }

    /// Signed seconds until expiry at `now`; negative once expired.
    pub fn ttl_secs_at(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds()
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs_at(Utc::now())
    }

    pub fn is_expired(&self) -> bool {
        self.ttl_secs() <= 0
    }

    /// Value for the `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
