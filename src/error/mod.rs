//! Error types for tryon-client.

pub mod unified;

pub use unified::{ErrorKind, RecoverySuggestion};

use thiserror::Error;

/// Failure outcome of a logical call.
///
/// The taxonomy is flat and exhaustive. Every failure path in the request
/// layer ends in exactly one of these variants and the kind is preserved to
/// the caller. The type is `Clone` so a single refresh failure can be handed
/// to every caller that joined the attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    #[error("Session expired: {0}")]
    AuthExpired(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("Rate limited: {message}")]
    RateLimited {
        retry_after_ms: Option<u64>,
        message: String,
    },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl ClientError {
    /// Create an API error for a rejected request.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create a server error (5xx).
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAuthenticated(_) => ErrorKind::NotAuthenticated,
            Self::AuthExpired(_) => ErrorKind::AuthExpired,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Network(_) => ErrorKind::NetworkError,
            Self::Server { .. } => ErrorKind::ServerError,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Api { .. } => ErrorKind::ApiError,
        }
    }

    /// HTTP status that produced this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } | Self::Api { status, .. } => Some(*status),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }

    /// Whether the caller may reasonably try the same request again.
    ///
    /// Nothing in this crate acts on this; backoff policy belongs to the caller.
    pub fn is_retryable(&self) -> bool {
        self.recovery_suggestion() == RecoverySuggestion::RetryLater
    }

    /// Whether the user has to sign in again.
    pub fn requires_reauthentication(&self) -> bool {
        self.recovery_suggestion() == RecoverySuggestion::Reauthenticate
    }

    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        RecoverySuggestion::for_kind(self.kind())
    }

    /// Short message suitable for showing to an end user.
    pub fn user_message(&self) -> String {
        match self.recovery_suggestion() {
            RecoverySuggestion::Reauthenticate => {
                "Your session has expired. Please sign in again.".to_string()
            }
            RecoverySuggestion::RetryLater => match self {
                Self::RateLimited {
                    retry_after_ms: Some(ms),
                    ..
                } => format!(
                    "Too many requests. Please try again in {} seconds.",
                    ms.div_ceil(1000)
                ),
                Self::Timeout(_) => "The request took too long. Please try again.".to_string(),
                _ => "Something went wrong. Please try again.".to_string(),
            },
            RecoverySuggestion::FixRequest => match self {
                Self::Api { message, .. } => format!("Request rejected: {message}"),
                other => format!("Request rejected: {other}"),
            },
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ClientError>;
