//! Persistence for long-lived session material.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::SessionError;
use super::session::StoredSession;

const SESSION_FILE_VERSION: u32 = 1;

/// Storage abstraction for persisted sessions, keyed by profile.
pub trait SessionStore: Send + Sync {
    fn load(&self, profile: &str) -> Result<Option<StoredSession>, SessionError>;
    fn save(&self, profile: &str, session: &StoredSession) -> Result<(), SessionError>;
    fn clear(&self, profile: &str) -> Result<(), SessionError>;
}

/// File-backed session store using one TOML file per profile.
///
/// # Example
/// ```no_run
/// use tryon_client::auth::{FileSessionStore, SessionStore, StoredSession};
/// use chrono::Utc;
///
/// let store = FileSessionStore::new_default();
/// let session = StoredSession {
///     access_token: "access".to_string(),
///     refresh_token: "refresh".to_string(),
///     expires_at: Utc::now() + chrono::Duration::hours(1),
///     user_id: None,
/// };
/// store.save("default", &session)?;
/// # Ok::<(), tryon_client::auth::SessionError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    base_dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn new_default() -> Self {
        Self {
            base_dir: default_session_dir(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn session_path(&self, profile: &str) -> PathBuf {
        let profile = normalize_label(profile);
        let name = if profile == "default" {
            "session.toml".to_string()
        } else {
            format!("session.{profile}.toml")
        };
        self.base_dir.join(name)
    }

    fn ensure_parent(path: &Path) -> Result<(), SessionError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self, profile: &str) -> Result<Option<StoredSession>, SessionError> {
        let path = self.session_path(profile);
        let raw = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(SessionError::Io(err.to_string())),
        };
        let file: SessionFile = toml::from_str(&raw)?;
        if file.version != SESSION_FILE_VERSION {
            return Err(SessionError::Serialization(format!(
                "Unsupported session file version {} at {}",
                file.version,
                path.display()
            )));
        }
        Ok(Some(file.session))
    }

    fn save(&self, profile: &str, session: &StoredSession) -> Result<(), SessionError> {
        let path = self.session_path(profile);
        Self::ensure_parent(&path)?;
        let file = SessionFile {
            version: SESSION_FILE_VERSION,
            profile: profile.to_string(),
            session: session.clone(),
            saved_at: Utc::now(),
        };
        let serialized = toml::to_string(&file)?;
        fs::write(&path, serialized)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn clear(&self, profile: &str) -> Result<(), SessionError> {
        let path = self.session_path(profile);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SessionError::Io(err.to_string())),
        }
    }
}

/// In-process session store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, StoredSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(profile: &str, session: StoredSession) -> Self {
        let store = Self::new();
        if let Ok(mut guard) = store.sessions.lock() {
            guard.insert(profile.to_string(), session);
        }
        store
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, profile: &str) -> Result<Option<StoredSession>, SessionError> {
        let guard = self
            .sessions
            .lock()
            .map_err(|_| SessionError::Io("session store lock poisoned".to_string()))?;
        Ok(guard.get(profile).cloned())
    }

    fn save(&self, profile: &str, session: &StoredSession) -> Result<(), SessionError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|_| SessionError::Io("session store lock poisoned".to_string()))?;
        guard.insert(profile.to_string(), session.clone());
        Ok(())
    }

    fn clear(&self, profile: &str) -> Result<(), SessionError> {
        let mut guard = self
            .sessions
            .lock()
            .map_err(|_| SessionError::Io("session store lock poisoned".to_string()))?;
        guard.remove(profile);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    profile: String,
    session: StoredSession,
    saved_at: DateTime<Utc>,
}

/// `~/.tryon`, or `.tryon` when no home directory can be determined.
pub fn default_session_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".tryon"))
        .unwrap_or_else(|| PathBuf::from(".tryon"))
}

fn normalize_label(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "default".to_string();
    }
    let mut out = String::with_capacity(trimmed.len());
    for ch in trimmed.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() || lower == '-' {
            out.push(lower);
        } else {
            out.push('-');
        }
    }
    if out.trim_matches('-').is_empty() {
        "default".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_store() -> (TempDir, FileSessionStore) {
        let dir = TempDir::new().unwrap();
        let store = FileSessionStore::new(dir.path().to_path_buf());
        (dir, store)
    }

    fn session(refresh: &str) -> StoredSession {
        StoredSession {
            access_token: "access".to_string(),
            refresh_token: refresh.to_string(),
            expires_at: Utc::now() + chrono::Duration::hours(1),
            user_id: Some("user-1".to_string()),
        }
    }

    #[test]
    fn saved_session_loads_back() {
        let (_dir, store) = temp_store();
        store.save("default", &session("refresh-1")).unwrap();
        let loaded = store.load("default").unwrap().unwrap();
        assert_eq!(loaded.refresh_token, "refresh-1");
        assert_eq!(loaded.user_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn missing_file_is_none() {
        let (_dir, store) = temp_store();
        assert!(store.load("default").unwrap().is_none());
    }

    #[test]
    fn clear_removes_session_and_is_idempotent() {
        let (_dir, store) = temp_store();
        store.save("default", &session("refresh-1")).unwrap();
        store.clear("default").unwrap();
        assert!(store.load("default").unwrap().is_none());
        store.clear("default").unwrap();
    }

    #[test]
    fn profiles_are_stored_separately() {
        let (dir, store) = temp_store();
        store.save("default", &session("a")).unwrap();
        store.save("Work Account", &session("b")).unwrap();
        assert!(dir.path().join("session.toml").exists());
        assert!(dir.path().join("session.work-account.toml").exists());
        assert_eq!(store.load("default").unwrap().unwrap().refresh_token, "a");
        assert_eq!(
            store.load("Work Account").unwrap().unwrap().refresh_token,
            "b"
        );
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let (dir, store) = temp_store();
        store.save("default", &session("a")).unwrap();
        let path = dir.path().join("session.toml");
        let raw = fs::read_to_string(&path).unwrap();
        fs::write(&path, raw.replace("version = 1", "version = 7")).unwrap();
        assert!(matches!(
            store.load("default"),
            Err(SessionError::Serialization(message)) if message.contains("version 7")
        ));
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemorySessionStore::new();
        store.save("default", &session("m")).unwrap();
        assert_eq!(store.load("default").unwrap().unwrap().refresh_token, "m");
        store.clear("default").unwrap();
        assert!(store.load("default").unwrap().is_none());
    }

    #[test]
    fn normalize_label_falls_back_to_default() {
        assert_eq!(normalize_label("  "), "default");
        assert_eq!(normalize_label("__"), "default");
        assert_eq!(normalize_label("Team_A"), "team-a");
    }
}
