//! Configuration system (layered: defaults < TOML file < environment).

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::auth::persist::default_session_dir;
use crate::auth::{DEFAULT_REFRESH_THRESHOLD, DEFAULT_REFRESH_TIMEOUT};
use crate::request::executor::DEFAULT_REQUEST_TIMEOUT;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const ENV_FUNCTIONS_URL: &str = "TRYON_FUNCTIONS_URL";
const ENV_AUTH_URL: &str = "TRYON_AUTH_URL";
const ENV_API_KEY: &str = "TRYON_API_KEY";
const ENV_REFRESH_THRESHOLD: &str = "TRYON_REFRESH_THRESHOLD_SECS";
const ENV_REQUEST_TIMEOUT: &str = "TRYON_REQUEST_TIMEOUT_SECS";
const ENV_REFRESH_TIMEOUT: &str = "TRYON_REFRESH_TIMEOUT_SECS";
const ENV_CONNECT_TIMEOUT: &str = "TRYON_CONNECT_TIMEOUT_SECS";
const ENV_SESSION_DIR: &str = "TRYON_SESSION_DIR";

/// Configuration loading and validation failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    Missing(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Failed to read config file {path}: {message}")]
    Io { path: String, message: String },
    #[error("Failed to parse config file: {0}")]
    Parse(String),
}

/// Settings for a [`crate::client::ResilientClient`].
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the remote function endpoints; operations are appended.
    pub functions_url: String,
    /// Base URL of the hosted auth service, needed for refresh-token sessions.
    pub auth_url: Option<String>,
    /// Public key sent as the `apikey` header.
    pub api_key: Option<String>,
    pub refresh_threshold: Duration,
    pub request_timeout: Duration,
    pub refresh_timeout: Duration,
    pub connect_timeout: Duration,
    pub session_dir: PathBuf,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("functions_url", &self.functions_url)
            .field("auth_url", &self.auth_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_threshold", &self.refresh_threshold)
            .field("request_timeout", &self.request_timeout)
            .field("refresh_timeout", &self.refresh_timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("session_dir", &self.session_dir)
            .finish()
    }
}

/// On-disk shape. Every field is optional so a file can override a subset.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    functions_url: Option<String>,
    auth_url: Option<String>,
    api_key: Option<String>,
    refresh_threshold_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    refresh_timeout_secs: Option<u64>,
    connect_timeout_secs: Option<u64>,
    session_dir: Option<PathBuf>,
}

impl ClientConfig {
    /// Defaults for everything but the functions URL.
    pub fn new(functions_url: impl Into<String>) -> Self {
        Self {
            functions_url: functions_url.into(),
            auth_url: None,
            api_key: None,
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            session_dir: default_session_dir(),
        }
    }

    /// Load from environment variables (`TRYON_*`), after reading `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from a TOML file over the defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = read_config_file(path.as_ref())?;
        let functions_url = file
            .functions_url
            .clone()
            .ok_or_else(|| ConfigError::Missing("functions_url".to_string()))?;
        Self::new(functions_url).merge_file(file)
    }

    /// Full layering: defaults, then the file (if given), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let file = match path {
            Some(path) => read_config_file(path)?,
            None => ConfigFile::default(),
        };
        let base = Self::new(file.functions_url.clone().unwrap_or_default()).merge_file(file)?;
        let config = base.merge_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Build from an arbitrary key lookup instead of the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let functions_url = lookup(ENV_FUNCTIONS_URL)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing(ENV_FUNCTIONS_URL.to_string()))?;
        Self::new(functions_url).merge_lookup(lookup)
    }

    fn merge_file(mut self, file: ConfigFile) -> Result<Self, ConfigError> {
        if let Some(url) = file.functions_url {
            self.functions_url = url;
        }
        if file.auth_url.is_some() {
            self.auth_url = file.auth_url;
        }
        if file.api_key.is_some() {
            self.api_key = file.api_key;
        }
        if let Some(secs) = file.refresh_threshold_secs {
            self.refresh_threshold = Duration::from_secs(secs);
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.refresh_timeout_secs {
            self.refresh_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.connect_timeout_secs {
            self.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(dir) = file.session_dir {
            self.session_dir = dir;
        }
        Ok(self)
    }

    fn merge_lookup(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(url) = get(ENV_FUNCTIONS_URL) {
            self.functions_url = url;
        }
        if let Some(url) = get(ENV_AUTH_URL) {
            self.auth_url = Some(url);
        }
        if let Some(key) = get(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(value) = get(ENV_REFRESH_THRESHOLD) {
            self.refresh_threshold = parse_secs(ENV_REFRESH_THRESHOLD, &value)?;
        }
        if let Some(value) = get(ENV_REQUEST_TIMEOUT) {
            self.request_timeout = parse_secs(ENV_REQUEST_TIMEOUT, &value)?;
        }
        if let Some(value) = get(ENV_REFRESH_TIMEOUT) {
            self.refresh_timeout = parse_secs(ENV_REFRESH_TIMEOUT, &value)?;
        }
        if let Some(value) = get(ENV_CONNECT_TIMEOUT) {
            self.connect_timeout = parse_secs(ENV_CONNECT_TIMEOUT, &value)?;
        }
        if let Some(dir) = get(ENV_SESSION_DIR) {
            self.session_dir = PathBuf::from(dir);
        }
        Ok(self)
    }

    #[must_use]
    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_refresh_threshold(mut self, threshold: Duration) -> Self {
        self.refresh_threshold = threshold;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_session_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.session_dir = dir.into();
        self
    }

    /// Reject unusable URLs and zero durations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url("functions_url", &self.functions_url)?;
        if let Some(url) = &self.auth_url {
            validate_url("auth_url", url)?;
        }
        for (name, value) in [
            ("request_timeout", self.request_timeout),
            ("refresh_timeout", self.refresh_timeout),
            ("connect_timeout", self.connect_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
            }
        }
        Ok(())
    }

    /// Like [`ClientConfig::validate`], additionally requiring TLS on every URL.
    pub fn require_https(&self) -> Result<(), ConfigError> {
        self.validate()?;
        let urls = std::iter::once(("functions_url", self.functions_url.as_str()))
            .chain(self.auth_url.as_deref().map(|url| ("auth_url", url)));
        for (name, url) in urls {
            if !url.starts_with("https://") {
                return Err(ConfigError::Invalid(format!("{name} must use https: {url}")));
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
}

fn parse_secs(key: &str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|_| ConfigError::Invalid(format!("{key} must be a whole number of seconds")))
}

fn validate_url(name: &str, url: &str) -> Result<(), ConfigError> {
    if url.trim().is_empty() {
        return Err(ConfigError::Missing(name.to_string()));
    }
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be an http(s) URL: {url}"
        )));
    }
    Ok(())
}
