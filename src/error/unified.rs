//! Error classification and user-facing recovery.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Machine-readable failure kind preserved on every failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    NotAuthenticated,
    AuthExpired,
    Timeout,
    NetworkError,
    ServerError,
    RateLimited,
    ApiError,
}

/// What the calling application should do with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    /// Prompt the user to sign in again.
    Reauthenticate,
    /// Transient; the caller may try again (with its own backoff).
    RetryLater,
    /// The request was rejected; retrying unchanged will not help.
    FixRequest,
}

impl RecoverySuggestion {
    pub fn for_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::NotAuthenticated | ErrorKind::AuthExpired => Self::Reauthenticate,
            ErrorKind::Timeout
            | ErrorKind::NetworkError
            | ErrorKind::ServerError
            | ErrorKind::RateLimited => Self::RetryLater,
            ErrorKind::ApiError => Self::FixRequest,
        }
    }
}
