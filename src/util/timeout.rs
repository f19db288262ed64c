//! Timeout helper.

use std::future::Future;
use std::time::Duration;

use crate::error::ClientError;

/// Wrap a future with a timeout, cancelling it when the bound is exceeded.
///
/// The error carries the configured bound in milliseconds.
pub async fn with_timeout<T, E>(
    duration: Duration,
    future: impl Future<Output = Result<T, E>>,
) -> Result<T, E>
where
    E: From<ClientError>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(ClientError::Timeout(duration_ms(duration)).into()),
    }
}

/// Milliseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
