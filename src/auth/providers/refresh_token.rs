//! Session provider backed by the hosted auth service's refresh-token grant.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::credential::Credential;
use crate::auth::error::SessionError;
use crate::auth::persist::SessionStore;
use crate::auth::session::{SessionProvider, StoredSession};
use crate::request::{error_message, header_retry_after_ms};

const DEFAULT_PROFILE: &str = "default";

/// Refreshes sessions against `{auth_url}/token?grant_type=refresh_token`.
///
/// The refresh token rotates on every successful exchange; the rotated
/// session is persisted before the new credential is handed back, so a crash
/// between the two never strands the user with a consumed token.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use tryon_client::auth::{FileSessionStore, RefreshTokenProvider};
///
/// let store = Arc::new(FileSessionStore::new_default());
/// let provider = RefreshTokenProvider::new("https://example.supabase.co/auth/v1", store)
///     .with_api_key(Some("public-anon-key".to_string()));
/// ```
pub struct RefreshTokenProvider {
    client: reqwest::Client,
    token_url: String,
    api_key: Option<String>,
    store: Arc<dyn SessionStore>,
    profile: String,
}

impl RefreshTokenProvider {
    pub fn new(auth_url: impl AsRef<str>, store: Arc<dyn SessionStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url: format!("{}/token", auth_url.as_ref().trim_end_matches('/')),
            api_key: None,
            store,
            profile: DEFAULT_PROFILE.to_string(),
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    #[must_use]
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    /// Persist a session obtained from an interactive sign-in.
    pub fn sign_in(&self, session: &StoredSession) -> Result<(), SessionError> {
        self.store.save(&self.profile, session)
    }

    /// The persisted session, if any.
    pub fn session(&self) -> Result<Option<StoredSession>, SessionError> {
        self.store.load(&self.profile)
    }

    async fn exchange(&self, session: &StoredSession) -> Result<StoredSession, SessionError> {
        let mut request = self
            .client
            .post(&self.token_url)
            .query(&[("grant_type", "refresh_token")])
            .header("Accept", "application/json")
            .json(&serde_json::json!({ "refresh_token": session.refresh_token }));
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key);
        }

        let resp = request.send().await?;
        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SessionError::RateLimited {
                retry_after_ms: header_retry_after_ms(resp.headers()),
            });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::BAD_REQUEST {
            let body = match resp.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!(status = %status, error = %e, "Failed to read rejection body");
                    String::new()
                }
            };
            let message = error_message(&body)
                .or_else(|| description(&body))
                .unwrap_or_else(|| format!("status {status}"));
            warn!(status = %status, "Refresh token rejected");
            return Err(SessionError::InvalidGrant(message));
        }
        if !status.is_success() {
            return Err(SessionError::InvalidResponse(format!(
                "Token refresh failed with status {status}"
            )));
        }

        let payload: TokenResponse = resp.json().await?;
        if payload.access_token.is_empty() {
            return Err(SessionError::InvalidResponse(
                "Token response missing access_token".to_string(),
            ));
        }
        let expires_at = match (&payload.expires_at, payload.expires_in) {
            (Some(value), _) => parse_expires_at(value)?,
            (None, Some(expires_in)) => Duration::try_seconds(expires_in)
                .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                .ok_or_else(|| {
                    SessionError::InvalidResponse("Token expires_in out of range".to_string())
                })?,
            (None, None) => {
                return Err(SessionError::InvalidResponse(
                    "Token response missing expires_in".to_string(),
                ))
            }
        };

        Ok(StoredSession {
            access_token: payload.access_token,
            refresh_token: payload
                .refresh_token
                .filter(|token| !token.is_empty())
                .unwrap_or_else(|| session.refresh_token.clone()),
            expires_at,
            user_id: payload
                .user
                .and_then(|user| user.id)
                .or_else(|| session.user_id.clone()),
        })
    }
}

#[async_trait]
impl SessionProvider for RefreshTokenProvider {
    async fn current_credential(&self) -> Result<Option<Credential>, SessionError> {
        Ok(self.session()?.map(|session| session.credential()))
    }

    async fn refresh(&self) -> Result<Credential, SessionError> {
        let session = self.session()?.ok_or(SessionError::NotLoggedIn)?;
        debug!(profile = %self.profile, "Exchanging refresh token");
        let renewed = self.exchange(&session).await?;
        self.store.save(&self.profile, &renewed)?;
        Ok(renewed.credential())
    }

    async fn sign_out(&self) -> Result<(), SessionError> {
        self.store.clear(&self.profile)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<serde_json::Value>,
    user: Option<TokenUser>,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: Option<String>,
}

fn description(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error_description")
        .or_else(|| value.get("msg"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}

/// Accepts seconds or milliseconds since the epoch, as a number or a string.
fn parse_expires_at(value: &serde_json::Value) -> Result<DateTime<Utc>, SessionError> {
    let raw = if let Some(num) = value.as_i64() {
        num
    } else if let Some(text) = value.as_str() {
        text.trim()
            .parse::<i64>()
            .map_err(|_| SessionError::InvalidResponse("Token expires_at invalid".to_string()))?
    } else {
        return Err(SessionError::InvalidResponse(
            "Token expires_at invalid".to_string(),
        ));
    };
    let secs = if raw > 10_000_000_000 { raw / 1000 } else { raw };
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| SessionError::InvalidResponse("Token expires_at out of range".to_string()))
}
