//! Error handling for unillm
//!
//! Every failure surfaced by a provider is an [`LlmError`] carrying a classified
//! [`ErrorKind`], the provider tag, the operation name, the HTTP status (when one
//! was observed) and the original cause.

use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Classified error kinds shared by every provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No usable credential, or the service rejected it (401/403).
    Auth,
    /// Too many requests (429 or provider-specific code).
    RateLimit,
    /// Credit or quota exhausted for the credential.
    Quota,
    /// Options or schema malformed, or a 4xx not covered elsewhere.
    InvalidRequest,
    /// Unknown model or endpoint (404).
    NotFound,
    /// Transport failure or cancellation.
    Network,
    /// 5xx from the service.
    Server,
    /// The response body could not be parsed.
    InvalidResponse,
    /// The per-call deadline elapsed.
    Timeout,
    /// Local configuration problem (unknown factory tag, unresolved child, bad config).
    Configuration,
    /// Operation reserved in the interface but not implemented.
    Unsupported,
}

impl ErrorKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::Quota => "quota",
            Self::InvalidRequest => "invalid_request",
            Self::NotFound => "not_found",
            Self::Network => "network",
            Self::Server => "server",
            Self::InvalidResponse => "invalid_response",
            Self::Timeout => "timeout",
            Self::Configuration => "configuration",
            Self::Unsupported => "unsupported",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Cause = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Unified error value returned by every fallible operation in the crate.
#[derive(Debug, Clone, thiserror::Error)]
#[error("[{provider}] {operation}: {kind}{}: {message}", status_suffix(.status))]
pub struct LlmError {
    pub kind: ErrorKind,
    pub provider: String,
    pub operation: String,
    pub status: Option<u16>,
    pub message: String,
    #[source]
    source: Option<Cause>,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (http {s})")).unwrap_or_default()
}

impl LlmError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            provider: "unknown".to_string(),
            operation: "unknown".to_string(),
            status: None,
            message: message.into(),
            source: None,
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimit, message)
    }

    pub fn quota(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Quota, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Server, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidResponse, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported, message)
    }

    /// Error returned when a stream or request was cancelled by the caller.
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Network, "request cancelled")
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Arc::new(source));
        self
    }

    /// Fill in provider and operation only where they are still unknown.
    pub fn in_context(mut self, provider: &str, operation: &str) -> Self {
        if self.provider == "unknown" {
            self.provider = provider.to_string();
        }
        if self.operation == "unknown" {
            self.operation = operation.to_string();
        }
        self
    }

    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Whether this is the error produced by [`LlmError::cancelled`].
    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Network && self.message == "request cancelled"
    }

    pub const fn status_code(&self) -> Option<u16> {
        self.status
    }

    /// Errors the provider itself retries (transport-level only).
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Network | ErrorKind::Timeout)
    }

    /// Errors that make the credential manager move on to the next key or credential set.
    pub const fn triggers_credential_failover(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Auth | ErrorKind::Quota | ErrorKind::RateLimit
        )
    }

    /// Errors that let a fallback provider try its next child.
    pub const fn is_fallback_eligible(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Network
                | ErrorKind::Timeout
                | ErrorKind::RateLimit
                | ErrorKind::Quota
                | ErrorKind::Server
                | ErrorKind::Auth
        )
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(err: serde_json::Error) -> Self {
        Self::invalid_response(format!("failed to decode JSON: {err}")).with_source(err)
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else if err.is_decode() {
            ErrorKind::InvalidResponse
        } else {
            ErrorKind::Network
        };
        let mut out = Self::new(kind, err.to_string());
        if let Some(status) = err.status() {
            out.status = Some(status.as_u16());
        }
        out.with_source(err)
    }
}

/// Pull a human readable message out of a provider error envelope.
///
/// Handles `{"error": {"message": ...}}` (OpenAI, Anthropic, Gemini) and
/// `{"message": ...}`; falls back to a truncated body sample.
fn extract_error_message(body_text: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body_text) {
        let candidate = json
            .pointer("/error/message")
            .or_else(|| json.get("message"))
            .or_else(|| json.get("error").filter(|e| e.is_string()));
        if let Some(msg) = candidate.and_then(|v| v.as_str()) {
            return msg.to_string();
        }
    }
    let sample: String = body_text.chars().take(200).collect();
    if sample.trim().is_empty() {
        "empty response body".to_string()
    } else {
        sample
    }
}

/// Classify an HTTP failure into a typed [`LlmError`].
pub fn classify_http_error(
    provider: &str,
    operation: &str,
    status: u16,
    body_text: &str,
    headers: &HeaderMap,
) -> LlmError {
    let lower = body_text.to_lowercase();
    let message = extract_error_message(body_text);
    let quota_like = lower.contains("insufficient_quota")
        || lower.contains("quota")
        || lower.contains("exhausted")
        || lower.contains("credit balance");

    let err = match status {
        429 => {
            let retry_after = headers
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            if quota_like && !lower.contains("resource_exhausted") {
                LlmError::quota(message)
            } else if retry_after.is_empty() {
                LlmError::rate_limit(message)
            } else {
                LlmError::rate_limit(format!("{message} (retry-after {retry_after})"))
            }
        }
        401 => LlmError::auth(message),
        403 if quota_like => LlmError::quota(message),
        403 => LlmError::auth(message),
        402 => LlmError::quota(message),
        404 => LlmError::not_found(message),
        408 => LlmError::timeout(message),
        400..=499 => LlmError::invalid_request(message),
        500..=599 => LlmError::server(message),
        _ => LlmError::invalid_response(format!("unexpected status: {message}")),
    };
    err.with_provider(provider)
        .with_operation(operation)
        .with_status(status)
}
