//! Convenience re-exports for common use.

pub use crate::auth::{
    Credential, CredentialStore, FileSessionStore, MemorySessionStore, RefreshCoordinator,
    RefreshTokenProvider, SessionProvider, SessionStore, StoredSession,
};
pub use crate::client::{ClientBuilder, ResilientClient};
pub use crate::config::ClientConfig;
pub use crate::error::{ClientError, ErrorKind, RecoverySuggestion, Result};
pub use crate::jobs::{JobClient, JobHandle, JobStatus, PollPolicy};
pub use crate::request::MethodKind;
