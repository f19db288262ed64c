//! One physical call to a named remote operation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::debug;

use super::{
    bearer_headers, decode_body, header_retry_after_ms, query_pairs, status_to_error, MethodKind,
    SendError,
};
use crate::auth::{Credential, CredentialStore};
use crate::error::ClientError;
use crate::util::timeout::{duration_ms, with_timeout};

/// Default upper bound on one call, sized for long-running backend work.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Sends a single authenticated request and classifies the outcome.
///
/// Holds no state beyond its configuration; the credential is read from the
/// shared [`CredentialStore`] and never modified here.
#[derive(Clone)]
pub struct RequestExecutor {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    store: Arc<CredentialStore>,
}

impl std::fmt::Debug for RequestExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestExecutor")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RequestExecutor {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, store: Arc<CredentialStore>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            store,
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// URL of a named operation.
    pub fn endpoint(&self, operation: &str) -> String {
        format!("{}/{}", self.base_url, operation.trim_start_matches('/'))
    }

    /// Send using the credential currently in the store.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotAuthenticated`] if the store is empty, otherwise see
    /// [`RequestExecutor::send_as`].
    pub async fn send(
        &self,
        operation: &str,
        payload: Option<&Value>,
        method: MethodKind,
    ) -> Result<Value, SendError> {
        let credential = self.store.current()?;
        self.send_as(&credential, operation, payload, method, None)
            .await
    }

    /// Send with an explicit credential snapshot.
    ///
    /// # Errors
    ///
    /// - [`SendError::Unauthenticated`] on a 401
    /// - [`ClientError::Timeout`] when the call exceeds the configured bound
    /// - [`ClientError::Network`] on connectivity faults
    /// - [`ClientError::Server`], [`ClientError::RateLimited`] or
    ///   [`ClientError::Api`] for other non-2xx statuses
    pub async fn send_as(
        &self,
        credential: &Credential,
        operation: &str,
        payload: Option<&Value>,
        method: MethodKind,
        request_id: Option<&str>,
    ) -> Result<Value, SendError> {
        let url = self.endpoint(operation);
        let mut request = self
            .http
            .request(method.as_reqwest(), &url)
            .headers(bearer_headers(credential, self.api_key.as_deref()));
        if let Some(id) = request_id {
            request = request.header("x-request-id", id);
        }
        match (method.is_read(), payload) {
            (true, Some(payload)) => request = request.query(&query_pairs(payload)),
            (false, Some(payload)) => request = request.json(payload),
            (_, None) => {}
        }

        let started = Instant::now();
        let timeout_ms = duration_ms(self.timeout);
        let result = with_timeout(self.timeout, async {
            let response = request
                .send()
                .await
                .map_err(|e| transport_error(&e, timeout_ms))?;
            let status = response.status().as_u16();
            let retry_after_ms = header_retry_after_ms(response.headers());
            let body = response
                .text()
                .await
                .map_err(|e| transport_error(&e, timeout_ms))?;
            let outcome = if (200..300).contains(&status) {
                Ok(decode_body(&body))
            } else {
                Err(status_to_error(status, retry_after_ms, &body))
            };
            Ok::<_, SendError>((status, outcome))
        })
        .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok((status, Ok(value))) => {
                debug!(operation, %method, status, elapsed_ms, "Remote call succeeded");
                Ok(value)
            }
            Ok((status, Err(error))) => {
                debug!(operation, %method, status, elapsed_ms, error = %error, "Remote call failed");
                Err(error)
            }
            Err(error) => {
                debug!(operation, %method, elapsed_ms, error = %error, "Remote call did not complete");
                Err(error)
            }
        }
    }
}

/// Map a transport failure; reqwest's own timeouts keep the configured bound.
fn transport_error(error: &reqwest::Error, timeout_ms: u64) -> SendError {
    if error.is_timeout() {
        ClientError::Timeout(timeout_ms).into()
    } else {
        ClientError::Network(error.to_string()).into()
    }
}
