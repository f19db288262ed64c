//! Long-running remote jobs (try-on generation): start, poll, wait.

use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::debug;

use crate::client::ResilientClient;
use crate::error::ClientError;
use crate::request::MethodKind;
use crate::util::timeout::duration_ms;

/// Identifier of a started job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle {
    pub id: String,
}

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed(Value),
    Failed(String),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }

    /// Parse a `{ status, result?, error? }` body.
    pub fn from_response(body: &Value) -> Result<Self, ClientError> {
        let status = body
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::api(200, "Job status response missing status"))?;
        match status.to_ascii_lowercase().as_str() {
            "pending" | "queued" => Ok(Self::Pending),
            "running" | "processing" => Ok(Self::Running),
            "completed" | "succeeded" | "done" => Ok(Self::Completed(
                body.get("result").cloned().unwrap_or(Value::Null),
            )),
            "failed" | "error" => Ok(Self::Failed(
                body.get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("Job failed")
                    .to_string(),
            )),
            other => Err(ClientError::api(200, format!("Unknown job status: {other}"))),
        }
    }
}

/// How often and how long [`JobClient::wait`] polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_wait: Duration::from_secs(180),
        }
    }
}

/// Starts and tracks remote jobs through a [`ResilientClient`].
#[derive(Debug, Clone)]
pub struct JobClient {
    client: ResilientClient,
}

impl JobClient {
    pub fn new(client: ResilientClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ResilientClient {
        &self.client
    }

    /// Start a job. The response must carry `job_id` or `id`.
    pub async fn start(&self, operation: &str, payload: &Value) -> Result<JobHandle, ClientError> {
        let body = self
            .client
            .call(operation, Some(payload), MethodKind::Post)
            .await?;
        let id = body
            .get("job_id")
            .or_else(|| body.get("id"))
            .and_then(|id| match id {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .ok_or_else(|| ClientError::api(200, format!("{operation} returned no job id")))?;
        debug!(operation, job_id = %id, "Job started");
        Ok(JobHandle::new(id))
    }

    pub async fn poll(
        &self,
        status_operation: &str,
        handle: &JobHandle,
    ) -> Result<JobStatus, ClientError> {
        let query = json!({ "job_id": handle.id });
        let body = self
            .client
            .call(status_operation, Some(&query), MethodKind::Get)
            .await?;
        JobStatus::from_response(&body)
    }

    /// Poll until the job finishes or `policy.max_wait` elapses.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Timeout`] when the job is still running at the deadline
    /// - [`ClientError::Api`] carrying the job's message when it failed
    /// - Any poll error, returned immediately
    pub async fn wait(
        &self,
        status_operation: &str,
        handle: &JobHandle,
        policy: PollPolicy,
    ) -> Result<Value, ClientError> {
        let deadline = Instant::now() + policy.max_wait;
        loop {
            match self.poll(status_operation, handle).await? {
                JobStatus::Completed(result) => return Ok(result),
                JobStatus::Failed(message) => return Err(ClientError::api(200, message)),
                status => {
                    debug!(job_id = %handle, ?status, "Job not finished");
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ClientError::Timeout(duration_ms(policy.max_wait)));
            }
            tokio::time::sleep(policy.interval.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_known_statuses() {
        assert_eq!(
            JobStatus::from_response(&json!({"status": "pending"})).unwrap(),
            JobStatus::Pending
        );
        assert_eq!(
            JobStatus::from_response(&json!({"status": "RUNNING"})).unwrap(),
            JobStatus::Running
        );
        assert_eq!(
            JobStatus::from_response(&json!({"status": "completed", "result": {"url": "u"}}))
                .unwrap(),
            JobStatus::Completed(json!({"url": "u"}))
        );
        assert_eq!(
            JobStatus::from_response(&json!({"status": "failed", "error": "nsfw"})).unwrap(),
            JobStatus::Failed("nsfw".to_string())
        );
    }

    #[test]
    fn unknown_or_missing_status_is_api_error() {
        let err = JobStatus::from_response(&json!({"status": "paused"})).unwrap_err();
        assert!(matches!(err, ClientError::Api { .. }));
        assert!(JobStatus::from_response(&json!({})).is_err());
    }

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed(Value::Null).is_terminal());
        assert!(JobStatus::Failed(String::new()).is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }
}
