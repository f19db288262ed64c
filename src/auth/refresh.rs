//! Single-flight credential refresh.
//!
//! At most one call to [`SessionProvider::refresh`] is in flight at any time.
//! The first caller that finds the credential stale installs a shared pending
//! attempt; every other caller that arrives while it is outstanding awaits
//! the same attempt and observes the same outcome.
//!
//! Each attempt runs on its own tokio task, so it completes and persists its
//! outcome even if every waiter is dropped. The pending handle is cleared by
//! a drop guard inside that task, so it goes away exactly when the attempt
//! resolves. The credential store is updated before the handle is cleared;
//! a caller that finds no pending attempt re-reads the store under the lock
//! before starting a new one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use super::credential::Credential;
use super::session::SessionProvider;
use super::store::CredentialStore;
use crate::error::ClientError;

/// Default proactive refresh threshold (5 minutes before expiry).
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(300);

/// Default bound on a refresh attempt, including time spent joining one.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

type RefreshResult = Result<Arc<Credential>, ClientError>;
type PendingRefresh = Shared<BoxFuture<'static, RefreshResult>>;
type PendingSlot = Mutex<Option<Pending>>;

struct Pending {
    id: u64,
    future: PendingRefresh,
}

/// Clears the pending slot when the attempt it belongs to finishes or is dropped.
struct PendingGuard {
    slot: Weak<PendingSlot>,
    id: u64,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.upgrade() {
            let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if guard.as_ref().is_some_and(|pending| pending.id == self.id) {
                *guard = None;
            }
        }
    }
}

/// Coordinates credential refreshes across concurrent callers.
pub struct RefreshCoordinator {
    store: Arc<CredentialStore>,
    provider: Arc<dyn SessionProvider>,
    pending: Arc<PendingSlot>,
    refresh_timeout: Duration,
    next_id: AtomicU64,
    refresh_count: Arc<AtomicU64>,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("store", &self.store)
            .field("refresh_timeout", &self.refresh_timeout)
            .field("refreshing", &self.is_refreshing())
            .field("refresh_count", &self.refresh_count())
            .finish()
    }
}

impl RefreshCoordinator {
    pub fn new(store: Arc<CredentialStore>, provider: Arc<dyn SessionProvider>) -> Self {
        Self {
            store,
            provider,
            pending: Arc::new(Mutex::new(None)),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            next_id: AtomicU64::new(0),
            refresh_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Bound every refresh attempt (and every wait on one) by `timeout`.
    #[must_use]
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<dyn SessionProvider> {
        &self.provider
    }

    /// Number of physical refresh invocations started so far.
    pub fn refresh_count(&self) -> u64 {
        self.refresh_count.load(Ordering::SeqCst)
    }

    /// Whether an attempt is currently outstanding.
    pub fn is_refreshing(&self) -> bool {
        self.lock_pending().is_some()
    }

    /// Make sure the credential has at least `threshold` of life left.
    ///
    /// Returns immediately when it does. Otherwise joins the outstanding
    /// attempt, or starts one if none is pending.
    ///
    /// # Errors
    ///
    /// [`ClientError::AuthExpired`] if the refresh fails, times out, or does
    /// not extend the expiry. Every caller that joined the attempt gets the
    /// same error.
    pub async fn ensure_fresh(&self, threshold: Duration) -> Result<Arc<Credential>, ClientError> {
        let threshold_secs = i64::try_from(threshold.as_secs()).unwrap_or(i64::MAX);

        if let Some(credential) = self.fresh_credential(threshold_secs) {
            return Ok(credential);
        }

        let attempt = {
            let mut slot = self.lock_pending();
            match joinable(&slot) {
                Some(future) => future,
                None => {
                    // Another caller may have finished a refresh between the
                    // fast-path read and taking the lock.
                    if let Some(credential) = self.fresh_credential(threshold_secs) {
                        return Ok(credential);
                    }
                    debug!(
                        ttl_secs = ?self.store.time_to_live(),
                        threshold_secs,
                        "Credential stale, starting proactive refresh"
                    );
                    self.start_attempt(&mut slot)
                }
            }
        };

        attempt.await
    }

    /// Refresh regardless of remaining lifetime.
    ///
    /// `rejected` is the credential the server just turned down. If the store
    /// already holds a different, unexpired credential, another caller has
    /// refreshed in the meantime and that credential is returned without a
    /// new physical refresh. A pending attempt is always joined.
    ///
    /// # Errors
    ///
    /// [`ClientError::AuthExpired`] if the refresh fails.
    pub async fn force_refresh(
        &self,
        rejected: Option<&Credential>,
    ) -> Result<Arc<Credential>, ClientError> {
        let attempt = {
            let mut slot = self.lock_pending();
            match joinable(&slot) {
                Some(future) => future,
                None => {
                    if let (Some(rejected), Some(current)) = (rejected, self.store.snapshot()) {
                        if current.token() != rejected.token() && !current.is_expired() {
                            debug!("Credential rotated since rejection, skipping forced refresh");
                            return Ok(current);
                        }
                    }
                    debug!("Starting forced refresh");
                    self.start_attempt(&mut slot)
                }
            }
        };

        attempt.await
    }

    fn fresh_credential(&self, threshold_secs: i64) -> Option<Arc<Credential>> {
        self.store
            .snapshot()
            .filter(|credential| credential.ttl_secs() >= threshold_secs)
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_attempt(&self, slot: &mut Option<Pending>) -> PendingRefresh {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let guard = PendingGuard {
            slot: Arc::downgrade(&self.pending),
            id,
        };
        let provider = self.provider.clone();
        let store = self.store.clone();
        let counter = self.refresh_count.clone();
        let timeout = self.refresh_timeout;

        // Detached: finishes and stores its outcome even with no waiter left.
        let task = tokio::spawn(async move {
            let _guard = guard;
            run_refresh(id, provider.as_ref(), &store, &counter, timeout).await
        });
        let future = task
            .map(move |joined| {
                joined.unwrap_or_else(|e| {
                    warn!(attempt = id, error = %e, "Token refresh task aborted");
                    Err(ClientError::AuthExpired(format!(
                        "Token refresh task aborted: {e}"
                    )))
                })
            })
            .boxed()
            .shared();

        *slot = Some(Pending {
            id,
            future: future.clone(),
        });
        future
    }
}

fn joinable(slot: &Option<Pending>) -> Option<PendingRefresh> {
    slot.as_ref().map(|pending| {
        debug!(attempt = pending.id, "Joining pending token refresh");
        pending.future.clone()
    })
}

async fn run_refresh(
    id: u64,
    provider: &dyn SessionProvider,
    store: &CredentialStore,
    counter: &AtomicU64,
    timeout: Duration,
) -> RefreshResult {
    counter.fetch_add(1, Ordering::SeqCst);
    let previous = store.snapshot();
    let started = Instant::now();

    let credential = match tokio::time::timeout(timeout, provider.refresh()).await {
        Ok(Ok(credential)) => credential,
        Ok(Err(e)) => {
            warn!(attempt = id, error = %e, "Token refresh failed");
            return Err(ClientError::AuthExpired(format!("Token refresh failed: {e}")));
        }
        Err(_) => {
            warn!(
                attempt = id,
                timeout_ms = timeout.as_millis() as u64,
                "Token refresh timed out"
            );
            return Err(ClientError::AuthExpired(format!(
                "Token refresh timed out after {}ms",
                timeout.as_millis()
            )));
        }
    };

    if credential.token().is_empty() {
        warn!(attempt = id, "Token refresh returned an empty token");
        return Err(ClientError::AuthExpired(
            "Token refresh returned no credential".to_string(),
        ));
    }

    if let Some(previous) = previous {
        if credential.expires_at() <= previous.expires_at() {
            warn!(
                attempt = id,
                previous_expires_at = %previous.expires_at(),
                expires_at = %credential.expires_at(),
                "Refreshed credential does not extend expiry"
            );
            return Err(ClientError::AuthExpired(
                "Token refresh did not extend the session".to_string(),
            ));
        }
    }

    let credential = Arc::new(credential);
    store.replace(credential.clone());
    info!(
        attempt = id,
        expires_in_secs = credential.ttl_secs(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Token refreshed"
    );
    Ok(credential)
}
