//! Tests for configuration system.

use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use tempfile::TempDir;
use tryon_client::config::{ClientConfig, ConfigError};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const CONFIG_ENV_VARS: [&str; 8] = [
    "TRYON_FUNCTIONS_URL",
    "TRYON_AUTH_URL",
    "TRYON_API_KEY",
    "TRYON_REFRESH_THRESHOLD_SECS",
    "TRYON_REQUEST_TIMEOUT_SECS",
    "TRYON_REFRESH_TIMEOUT_SECS",
    "TRYON_CONNECT_TIMEOUT_SECS",
    "TRYON_SESSION_DIR",
];

struct EnvGuard {
    saved: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn capture(keys: &[&str]) -> Self {
        let saved = keys
            .iter()
            .map(|key| ((*key).to_string(), std::env::var(key).ok()))
            .collect();
        Self { saved }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.saved {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

fn env_lock_guard() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn clear_env() -> EnvGuard {
    let guard = EnvGuard::capture(&CONFIG_ENV_VARS);
    for key in CONFIG_ENV_VARS {
        std::env::remove_var(key);
    }
    guard
}

#[test]
fn config_from_env_maps_every_variable() {
    let _env_lock = env_lock_guard();
    let _env_guard = clear_env();

    std::env::set_var("TRYON_FUNCTIONS_URL", "https://fn.test/functions/v1");
    std::env::set_var("TRYON_AUTH_URL", "https://fn.test/auth/v1");
    std::env::set_var("TRYON_API_KEY", "anon");
    std::env::set_var("TRYON_REFRESH_THRESHOLD_SECS", "120");
    std::env::set_var("TRYON_REQUEST_TIMEOUT_SECS", "90");
    std::env::set_var("TRYON_REFRESH_TIMEOUT_SECS", "15");
    std::env::set_var("TRYON_CONNECT_TIMEOUT_SECS", "3");
    std::env::set_var("TRYON_SESSION_DIR", "/tmp/tryon-test");

    let config = ClientConfig::from_env().unwrap();
    assert_eq!(config.functions_url, "https://fn.test/functions/v1");
    assert_eq!(config.auth_url.as_deref(), Some("https://fn.test/auth/v1"));
    assert_eq!(config.api_key.as_deref(), Some("anon"));
    assert_eq!(config.refresh_threshold, Duration::from_secs(120));
    assert_eq!(config.request_timeout, Duration::from_secs(90));
    assert_eq!(config.refresh_timeout, Duration::from_secs(15));
    assert_eq!(config.connect_timeout, Duration::from_secs(3));
    assert_eq!(config.session_dir.to_str(), Some("/tmp/tryon-test"));
}

#[test]
fn config_from_env_without_functions_url_fails() {
    let _env_lock = env_lock_guard();
    let _env_guard = clear_env();

    assert_eq!(
        ClientConfig::from_env().unwrap_err(),
        ConfigError::Missing("TRYON_FUNCTIONS_URL".to_string())
    );
}

#[test]
fn load_layers_env_over_file() {
    let _env_lock = env_lock_guard();
    let _env_guard = clear_env();

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tryon.toml");
    std::fs::write(
        &path,
        r#"
functions_url = "https://file.test"
auth_url = "https://file.test/auth/v1"
refresh_threshold_secs = 600
request_timeout_secs = 60
"#,
    )
    .unwrap();
    std::env::set_var("TRYON_REQUEST_TIMEOUT_SECS", "30");

    let config = ClientConfig::load(Some(&path)).unwrap();
    assert_eq!(config.functions_url, "https://file.test");
    assert_eq!(config.refresh_threshold, Duration::from_secs(600));
    assert_eq!(config.request_timeout, Duration::from_secs(30));
}

#[test]
fn load_without_any_functions_url_is_missing() {
    let _env_lock = env_lock_guard();
    let _env_guard = clear_env();

    assert!(matches!(
        ClientConfig::load(None),
        Err(ConfigError::Missing(_))
    ));
}

#[test]
fn missing_config_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = ClientConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn builders_override_defaults() {
    let config = ClientConfig::new("https://fn.test")
        .with_auth_url("https://fn.test/auth/v1")
        .with_api_key("anon")
        .with_refresh_timeout(Duration::from_secs(5))
        .with_connect_timeout(Duration::from_secs(2))
        .with_session_dir("/tmp/sessions");
    assert_eq!(config.refresh_timeout, Duration::from_secs(5));
    assert_eq!(config.connect_timeout, Duration::from_secs(2));
    assert_eq!(config.session_dir.to_str(), Some("/tmp/sessions"));
    assert!(config.require_https().is_ok());
}
