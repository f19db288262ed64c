//! Outbound calls to remote function endpoints: method kinds, headers and
//! response classification.

pub mod executor;

pub use executor::RequestExecutor;

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};
use thiserror::Error;

use crate::auth::Credential;
use crate::config::ConfigError;
use crate::error::ClientError;

/// HTTP-equivalent method of a remote operation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum MethodKind {
    Get,
    #[default]
    Post,
    Put,
    Patch,
    Delete,
}

impl MethodKind {
    /// Read methods never carry a request body.
    pub fn is_read(self) -> bool {
        matches!(self, Self::Get)
    }

    pub fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Failure of one physical send.
///
/// A 401 is kept apart from every other failure so the layer above can run
/// its single auth retry. The executor itself never retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
    #[error(transparent)]
    Failed(#[from] ClientError),
}

impl SendError {
    /// Collapse into the public taxonomy. A 401 that reaches the caller means
    /// the session is no longer valid.
    pub fn into_client_error(self) -> ClientError {
        match self {
            Self::Unauthenticated(message) => ClientError::AuthExpired(message),
            Self::Failed(error) => error,
        }
    }
}

/// Build the shared HTTP client. Request deadlines are enforced per call,
/// so only the connect phase is bounded here.
pub fn build_http_client(connect_timeout: Duration) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| ConfigError::Invalid(format!("Failed to build HTTP client: {e}")))
}

/// Default headers for an authenticated function call.
pub fn bearer_headers(credential: &Credential, api_key: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(&credential.bearer()) {
        headers.insert(AUTHORIZATION, val);
    }
    if let Some(key) = api_key {
        if let Ok(val) = HeaderValue::from_str(key) {
            headers.insert("apikey", val);
        }
    }
    headers
}

/// Classify a non-2xx response.
pub fn status_to_error(status: u16, retry_after_ms: Option<u64>, body: &str) -> SendError {
    let message = error_message(body);
    match status {
        401 => SendError::Unauthenticated(
            message.unwrap_or_else(|| "Authentication required".to_string()),
        ),
        429 => ClientError::RateLimited {
            retry_after_ms: retry_after_ms.or_else(|| body_retry_after_ms(body)),
            message: message.unwrap_or_else(|| "Too many requests".to_string()),
        }
        .into(),
        500..=599 => ClientError::server(
            status,
            message.unwrap_or_else(|| format!("Server returned status {status}")),
        )
        .into(),
        _ => ClientError::api(
            status,
            message.unwrap_or_else(|| format!("Request failed with status {status}")),
        )
        .into(),
    }
}

/// Server-supplied message from an error body.
///
/// Accepts `{ "error": "..." }`, `{ "error": { "message": "..." } }` and
/// `{ "message": "..." }`.
pub fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let message = match value.get("error") {
        Some(Value::String(text)) => Some(text.clone()),
        Some(Value::Object(obj)) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };
    message
        .or_else(|| {
            value
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .filter(|text| !text.trim().is_empty())
}

/// Decode a successful response body. Empty bodies decode to `null` and
/// non-JSON bodies to a JSON string.
pub fn decode_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

/// `Retry-After` header, in delta-seconds form, as milliseconds.
pub fn header_retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs.saturating_mul(1000))
}

fn body_retry_after_ms(body: &str) -> Option<u64> {
    let value: Value = serde_json::from_str(body).ok()?;
    let retry_after = value
        .get("retry_after")
        .or_else(|| value.get("error").and_then(|e| e.get("retry_after")))?
        .as_f64()?;
    (retry_after >= 0.0).then(|| (retry_after * 1000.0) as u64)
}

/// Query parameters for a read call built from a JSON object payload.
///
/// Nulls are skipped and nested values are sent as JSON text.
pub fn query_pairs(payload: &Value) -> Vec<(String, String)> {
    let Some(obj) = payload.as_object() else {
        return Vec::new();
    };
    obj.iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                Value::Bool(_) | Value::Number(_) => value.to_string(),
                other => other.to_string(),
            };
            Some((key.clone(), text))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn method_kind_parses_case_insensitively() {
        assert_eq!("get".parse::<MethodKind>().unwrap(), MethodKind::Get);
        assert_eq!("DELETE".parse::<MethodKind>().unwrap(), MethodKind::Delete);
        assert_eq!(MethodKind::Patch.to_string(), "PATCH");
        assert!(MethodKind::Get.is_read());
        assert!(!MethodKind::Post.is_read());
    }

    #[test]
    fn unauthorized_is_distinct_signal() {
        let err = status_to_error(401, None, r#"{"error":"JWT expired"}"#);
        assert_eq!(err, SendError::Unauthenticated("JWT expired".to_string()));
    }

    #[test]
    fn server_errors_are_classified() {
        let err = status_to_error(503, None, "");
        assert!(matches!(
            err,
            SendError::Failed(ClientError::Server { status: 503, .. })
        ));
    }

    #[test]
    fn rate_limit_prefers_header_then_body() {
        let err = status_to_error(429, Some(2000), r#"{"retry_after": 9}"#);
        assert!(matches!(
            err,
            SendError::Failed(ClientError::RateLimited {
                retry_after_ms: Some(2000),
                ..
            })
        ));
        let err = status_to_error(429, None, r#"{"error":"slow down","retry_after": 1.5}"#);
        assert_eq!(
            err,
            SendError::Failed(ClientError::RateLimited {
                retry_after_ms: Some(1500),
                message: "slow down".to_string(),
            })
        );
    }

    #[test]
    fn other_statuses_carry_server_message_or_generic() {
        assert_eq!(
            status_to_error(402, None, r#"{"error":"Not enough gems"}"#),
            SendError::Failed(ClientError::api(402, "Not enough gems"))
        );
        assert_eq!(
            status_to_error(404, None, "<html>nope</html>"),
            SendError::Failed(ClientError::api(404, "Request failed with status 404"))
        );
    }

    #[test]
    fn error_message_shapes() {
        assert_eq!(error_message(r#"{"error":"a"}"#).as_deref(), Some("a"));
        assert_eq!(
            error_message(r#"{"error":{"message":"b"}}"#).as_deref(),
            Some("b")
        );
        assert_eq!(error_message(r#"{"message":"c"}"#).as_deref(), Some("c"));
        assert_eq!(error_message(r#"{"error":""}"#), None);
        assert_eq!(error_message("not json"), None);
    }

    #[test]
    fn decode_body_handles_empty_and_text() {
        assert_eq!(decode_body(""), Value::Null);
        assert_eq!(decode_body(r#"{"ok":true}"#), json!({"ok": true}));
        assert_eq!(decode_body("plain"), json!("plain"));
    }

    #[test]
    fn query_pairs_flatten_object() {
        let pairs = query_pairs(&json!({"job_id": "j1", "n": 3, "skip": null}));
        assert_eq!(
            pairs,
            vec![
                ("job_id".to_string(), "j1".to_string()),
                ("n".to_string(), "3".to_string()),
            ]
        );
        assert!(query_pairs(&json!([1, 2])).is_empty());
    }

    #[test]
    fn unauthenticated_collapses_to_auth_expired() {
        let err = SendError::Unauthenticated("JWT expired".to_string()).into_client_error();
        assert_eq!(err, ClientError::AuthExpired("JWT expired".to_string()));
    }

    #[test]
    fn bearer_headers_include_api_key() {
        let credential = Credential::new("tok", chrono::Utc::now());
        let headers = bearer_headers(&credential, Some("anon"));
        assert_eq!(headers[AUTHORIZATION], "Bearer tok");
        assert_eq!(headers["apikey"], "anon");
    }
}
