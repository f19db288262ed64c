//! Shared test helpers and a scripted session provider.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use tryon_client::auth::{
    Credential, CredentialStore, RefreshCoordinator, SessionError, SessionProvider,
};
use tryon_client::client::ResilientClient;
use tryon_client::request::RequestExecutor;

/// A session provider with scripted refresh results.
///
/// Unscripted refreshes succeed with `refreshed-{n}` tokens valid for an
/// hour. Tracks how many refreshes ran and how many overlapped.
pub struct FakeSessionProvider {
    current: Mutex<Option<Credential>>,
    script: Mutex<VecDeque<Result<Credential, SessionError>>>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    signed_out: AtomicBool,
}

impl FakeSessionProvider {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(None),
            script: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            signed_out: AtomicBool::new(false),
        }
    }

    /// Hold every refresh for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Credential reported by `current_credential`.
    pub fn with_current(self, credential: Credential) -> Self {
        *self.current.lock().unwrap() = Some(credential);
        self
    }

    /// Queue the result of the next unscripted refresh.
    pub fn push_result(&self, result: Result<Credential, SessionError>) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn signed_out(&self) -> bool {
        self.signed_out.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for FakeSessionProvider {
    async fn current_credential(&self) -> Result<Option<Credential>, SessionError> {
        Ok(self.current.lock().unwrap().clone())
    }

    async fn refresh(&self) -> Result<Credential, SessionError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let scripted = self.script.lock().unwrap().pop_front();
        let result = scripted.unwrap_or_else(|| Ok(credential(&format!("refreshed-{n}"), 3600)));
        if let Ok(credential) = &result {
            *self.current.lock().unwrap() = Some(credential.clone());
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn sign_out(&self) -> Result<(), SessionError> {
        self.signed_out.store(true, Ordering::SeqCst);
        *self.current.lock().unwrap() = None;
        Ok(())
    }
}

/// Credential expiring `ttl_secs` from now.
pub fn credential(token: &str, ttl_secs: i64) -> Credential {
    Credential::new(token, Utc::now() + chrono::Duration::seconds(ttl_secs))
}

/// Client against `base_url` with a 300s refresh threshold.
pub fn client(
    base_url: &str,
    provider: Arc<FakeSessionProvider>,
    initial: Option<Credential>,
    request_timeout: Duration,
) -> ResilientClient {
    let store = Arc::new(match initial {
        Some(credential) => CredentialStore::with_credential(credential),
        None => CredentialStore::new(),
    });
    let coordinator = RefreshCoordinator::new(store.clone(), provider)
        .with_refresh_timeout(Duration::from_secs(5));
    let executor = RequestExecutor::new(reqwest::Client::new(), base_url, store)
        .with_api_key(Some("anon-key".to_string()))
        .with_timeout(request_timeout);
    ResilientClient::from_parts(Arc::new(coordinator), executor, Duration::from_secs(300))
}
