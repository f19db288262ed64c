//! Credentials, session providers and single-flight refresh.

pub mod credential;
pub mod error;
pub mod persist;
pub mod providers;
pub mod refresh;
pub mod session;
pub mod store;

pub use credential::Credential;
pub use error::SessionError;
pub use persist::{FileSessionStore, MemorySessionStore, SessionStore};
pub use providers::refresh_token::RefreshTokenProvider;
pub use refresh::{RefreshCoordinator, DEFAULT_REFRESH_THRESHOLD, DEFAULT_REFRESH_TIMEOUT};
pub use session::{SessionProvider, StoredSession};
pub use store::CredentialStore;
