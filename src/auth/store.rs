//! In-memory holder of the live credential.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};

use super::credential::Credential;
use crate::error::ClientError;

/// Holds the current credential for every in-flight call.
///
/// Reads never take a lock: the credential lives behind an atomically swapped
/// `Arc`, so a reader always sees a token together with the expiry it was
/// installed with.
#[derive(Debug, Default)]
pub struct CredentialStore {
    current: ArcSwapOption<Credential>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            current: ArcSwapOption::from_pointee(credential),
        }
    }

    /// Snapshot of the present credential.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotAuthenticated`] if no credential is installed.
    pub fn current(&self) -> Result<Arc<Credential>, ClientError> {
        self.current.load_full().ok_or_else(|| {
            ClientError::NotAuthenticated("no credential available".to_string())
        })
    }

    /// Snapshot, or `None` if no credential is installed.
    pub fn snapshot(&self) -> Option<Arc<Credential>> {
        self.current.load_full()
    }

    /// Signed seconds until expiry; `None` when unknown.
    ///
    /// Callers treat `None` exactly like an expired credential.
    pub fn time_to_live(&self) -> Option<i64> {
        self.time_to_live_at(Utc::now())
    }

    pub fn time_to_live_at(&self, now: DateTime<Utc>) -> Option<i64> {
        self.snapshot()
            .map(|credential| credential.ttl_secs_at(now))
    }

    /// Atomically install a new credential, returning the previous one.
    pub fn replace(&self, credential: impl Into<Arc<Credential>>) -> Option<Arc<Credential>> {
        self.current.swap(Some(credential.into()))
    }

    /// Drop the credential (sign-out).
    pub fn clear(&self) -> Option<Arc<Credential>> {
        self.current.swap(None)
    }
}
