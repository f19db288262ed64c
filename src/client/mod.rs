//! The public entry point: authenticated calls with proactive refresh and a
//! single auth-triggered retry.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::{
    Credential, CredentialStore, FileSessionStore, RefreshCoordinator, RefreshTokenProvider,
    SessionProvider, SessionStore,
};
use crate::config::{ClientConfig, ConfigError};
use crate::error::ClientError;
use crate::request::{build_http_client, MethodKind, RequestExecutor, SendError};

/// Authenticated client for remote function endpoints.
///
/// Every call runs `proactive refresh -> send -> (forced refresh -> retry)`:
/// at most two physical sends and two refresh attempts per logical call.
/// Cloning is cheap and clones share the credential and refresh state.
///
/// # Example
/// ```no_run
/// use serde_json::json;
/// use tryon_client::prelude::*;
///
/// # async fn example() -> std::result::Result<(), Box<dyn std::error::Error>> {
/// let config = ClientConfig::from_env()?;
/// let client = ResilientClient::builder(config)
///     .refresh_token_session()?
///     .build()?;
/// client.bootstrap().await?;
///
/// let wardrobe = client.post("list-wardrobe", Some(&json!({ "limit": 20 }))).await?;
/// println!("{wardrobe}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ResilientClient {
    coordinator: Arc<RefreshCoordinator>,
    executor: RequestExecutor,
    threshold: Duration,
}

impl ResilientClient {
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Assemble from already-built parts. The executor must read from the
    /// coordinator's store.
    pub fn from_parts(
        coordinator: Arc<RefreshCoordinator>,
        executor: RequestExecutor,
        threshold: Duration,
    ) -> Self {
        Self {
            coordinator,
            executor,
            threshold,
        }
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        self.coordinator.store()
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    pub fn refresh_threshold(&self) -> Duration {
        self.threshold
    }

    /// Physical refreshes started by this client's coordinator.
    pub fn refresh_count(&self) -> u64 {
        self.coordinator.refresh_count()
    }

    /// Seed the credential store from the session provider.
    ///
    /// Leaves an existing credential alone. Returns whatever the store holds
    /// afterwards.
    ///
    /// # Errors
    ///
    /// [`ClientError::AuthExpired`] if the provider cannot read its session.
    pub async fn bootstrap(&self) -> Result<Option<Arc<Credential>>, ClientError> {
        if let Some(existing) = self.store().snapshot() {
            return Ok(Some(existing));
        }
        match self.coordinator.provider().current_credential().await? {
            Some(credential) => {
                debug!(ttl_secs = credential.ttl_secs(), "Seeded credential from session");
                self.store().replace(credential);
            }
            None => debug!("No stored session to seed from"),
        }
        Ok(self.store().snapshot())
    }

    /// Install a credential obtained elsewhere, e.g. after an interactive sign-in.
    pub fn set_credential(&self, credential: Credential) {
        self.store().replace(credential);
    }

    /// Refresh now, regardless of remaining lifetime.
    pub async fn refresh_now(&self) -> Result<Arc<Credential>, ClientError> {
        self.coordinator.force_refresh(None).await
    }

    /// Forget the persisted session and the in-memory credential.
    ///
    /// The in-memory credential is cleared even if the provider fails.
    pub async fn sign_out(&self) -> Result<(), ClientError> {
        let result = self.coordinator.provider().sign_out().await;
        self.store().clear();
        result.map_err(ClientError::from)
    }

    pub async fn get(&self, operation: &str, query: Option<&Value>) -> Result<Value, ClientError> {
        self.call(operation, query, MethodKind::Get).await
    }

    pub async fn post(&self, operation: &str, payload: Option<&Value>) -> Result<Value, ClientError> {
        self.call(operation, payload, MethodKind::Post).await
    }

    /// [`ResilientClient::call`], decoding the result into `T`.
    ///
    /// A body that does not match `T` is reported as [`ClientError::Api`]
    /// with status 200.
    pub async fn call_typed<T: DeserializeOwned>(
        &self,
        operation: &str,
        payload: Option<&Value>,
        method: MethodKind,
    ) -> Result<T, ClientError> {
        let value = self.call(operation, payload, method).await?;
        serde_json::from_value(value)
            .map_err(|e| ClientError::api(200, format!("Unexpected response from {operation}: {e}")))
    }

    /// Call a remote operation.
    ///
    /// # Errors
    ///
    /// - [`ClientError::AuthExpired`] when the credential cannot be refreshed
    ///   or the retry is also rejected
    /// - Any other kind exactly as the executor classified it; timeouts,
    ///   network faults, server errors and rate limits are never retried
    pub async fn call(
        &self,
        operation: &str,
        payload: Option<&Value>,
        method: MethodKind,
    ) -> Result<Value, ClientError> {
        let call_id = Uuid::new_v4().to_string();

        debug!(%call_id, operation, %method, "Ensuring credential is fresh");
        let credential = self.coordinator.ensure_fresh(self.threshold).await?;

        debug!(%call_id, operation, attempt = 1, "Sending");
        let rejection = match self
            .executor
            .send_as(&credential, operation, payload, method, Some(&call_id))
            .await
        {
            Ok(value) => return Ok(value),
            Err(SendError::Failed(error)) => return Err(error),
            Err(SendError::Unauthenticated(message)) => message,
        };

        warn!(%call_id, operation, message = %rejection, "Credential rejected, forcing refresh");
        let refreshed = self.coordinator.force_refresh(Some(&credential)).await?;

        debug!(%call_id, operation, attempt = 2, "Retrying with refreshed credential");
        self.executor
            .send_as(&refreshed, operation, payload, method, Some(&call_id))
            .await
            .map_err(|error| {
                if let SendError::Unauthenticated(message) = &error {
                    warn!(%call_id, operation, %message, "Retry rejected, session expired");
                }
                error.into_client_error()
            })
    }
}

/// Builds a [`ResilientClient`] from a [`ClientConfig`].
pub struct ClientBuilder {
    config: ClientConfig,
    provider: Option<Arc<dyn SessionProvider>>,
    http: Option<reqwest::Client>,
    store: Option<Arc<CredentialStore>>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            provider: None,
            http: None,
            store: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn provider(mut self, provider: Arc<dyn SessionProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    #[must_use]
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Share a credential store with another component.
    #[must_use]
    pub fn credential_store(mut self, store: Arc<CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Use a [`RefreshTokenProvider`] persisting to the configured session
    /// directory.
    pub fn refresh_token_session(self) -> Result<Self, ConfigError> {
        let session_store: Arc<dyn SessionStore> =
            Arc::new(FileSessionStore::new(self.config.session_dir.clone()));
        self.refresh_token_session_with(session_store)
    }

    /// Use a [`RefreshTokenProvider`] persisting to `session_store`.
    pub fn refresh_token_session_with(
        mut self,
        session_store: Arc<dyn SessionStore>,
    ) -> Result<Self, ConfigError> {
        let auth_url = self
            .config
            .auth_url
            .clone()
            .ok_or_else(|| ConfigError::Missing("auth_url".to_string()))?;
        let http = self.http_client_or_build()?;
        let provider = RefreshTokenProvider::new(auth_url, session_store)
            .with_client(http)
            .with_api_key(self.config.api_key.clone());
        self.provider = Some(Arc::new(provider));
        Ok(self)
    }

    fn http_client_or_build(&mut self) -> Result<reqwest::Client, ConfigError> {
        match &self.http {
            Some(http) => Ok(http.clone()),
            None => {
                let http = build_http_client(self.config.connect_timeout)?;
                self.http = Some(http.clone());
                Ok(http)
            }
        }
    }

    pub fn build(mut self) -> Result<ResilientClient, ConfigError> {
        self.config.validate()?;
        let provider = self
            .provider
            .take()
            .ok_or_else(|| ConfigError::Missing("session provider".to_string()))?;
        let http = self.http_client_or_build()?;
        let store = self.store.take().unwrap_or_default();

        let coordinator = RefreshCoordinator::new(store.clone(), provider)
            .with_refresh_timeout(self.config.refresh_timeout);
        let executor = RequestExecutor::new(http, self.config.functions_url.clone(), store)
            .with_api_key(self.config.api_key.clone())
            .with_timeout(self.config.request_timeout);

        Ok(ResilientClient::from_parts(
            Arc::new(coordinator),
            executor,
            self.config.refresh_threshold,
        ))
    }
}
