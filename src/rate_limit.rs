//! Rate-limit feedback from response headers.
//!
//! Understands the OpenAI family (`x-ratelimit-{limit,remaining,reset}-{requests,tokens}`,
//! including Cerebras' `-day`/`-minute` suffixed variants), Anthropic's
//! `anthropic-ratelimit-*` headers and `retry-after` (seconds or HTTP date).

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;

/// Wait applied after a 429 that carried no `retry-after`.
const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(1);

/// Normalized rate-limit view for one model.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitInfo {
    pub requests_limit: Option<u64>,
    pub requests_remaining: Option<u64>,
    pub requests_reset: Option<DateTime<Utc>>,
    pub tokens_limit: Option<u64>,
    pub tokens_remaining: Option<u64>,
    pub tokens_reset: Option<DateTime<Utc>>,
    pub retry_after: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl RateLimitInfo {
    fn empty(now: DateTime<Utc>) -> Self {
        Self {
            requests_limit: None,
            requests_remaining: None,
            requests_reset: None,
            tokens_limit: None,
            tokens_remaining: None,
            tokens_reset: None,
            retry_after: None,
            updated_at: now,
        }
    }

    /// Parse rate-limit headers; `None` when the response carried none.
    pub fn from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Self> {
        let mut info = Self::empty(now);
        let mut found = false;

        for (name, value) in headers {
            let name = name.as_str();
            let Ok(value) = value.to_str() else { continue };
            let Some((metric, field)) = classify_header(name) else {
                continue;
            };
            found = true;
            match (metric, field) {
                (Metric::Requests, Field::Limit) => {
                    info.requests_limit = min_opt(info.requests_limit, parse_count(value))
                }
                (Metric::Requests, Field::Remaining) => {
                    info.requests_remaining = min_opt(info.requests_remaining, parse_count(value))
                }
                (Metric::Requests, Field::Reset) => {
                    info.requests_reset = max_opt(info.requests_reset, parse_reset(value, now))
                }
                (Metric::Tokens, Field::Limit) => {
                    info.tokens_limit = min_opt(info.tokens_limit, parse_count(value))
                }
                (Metric::Tokens, Field::Remaining) => {
                    info.tokens_remaining = min_opt(info.tokens_remaining, parse_count(value))
                }
                (Metric::Tokens, Field::Reset) => {
                    info.tokens_reset = max_opt(info.tokens_reset, parse_reset(value, now))
                }
            }
        }

        if let Some(at) = headers
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, now))
        {
            info.retry_after = Some(at);
            found = true;
        }

        found.then_some(info)
    }

    /// How long to wait before a request of `projected_tokens` is expected to pass.
    pub fn wait_for(&self, projected_tokens: u64, now: DateTime<Utc>) -> Option<Duration> {
        let mut until: Option<DateTime<Utc>> = None;
        if let Some(at) = self.retry_after.filter(|at| *at > now) {
            until = max_opt(until, Some(at));
        }
        if self.requests_remaining == Some(0)
            && let Some(reset) = self.requests_reset.filter(|r| *r > now)
        {
            until = max_opt(until, Some(reset));
        }
        if let Some(remaining) = self.tokens_remaining
            && remaining < projected_tokens
            && let Some(reset) = self.tokens_reset.filter(|r| *r > now)
        {
            until = max_opt(until, Some(reset));
        }
        until.and_then(|at| (at - now).to_std().ok())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Metric {
    Requests,
    Tokens,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Limit,
    Remaining,
    Reset,
}

fn classify_header(name: &str) -> Option<(Metric, Field)> {
    if let Some(rest) = name.strip_prefix("x-ratelimit-") {
        // x-ratelimit-<field>-<metric>[-<window>]
        let (field, metric) = rest.split_once('-')?;
        let field = match field {
            "limit" => Field::Limit,
            "remaining" => Field::Remaining,
            "reset" => Field::Reset,
            _ => return None,
        };
        let metric = if metric.starts_with("requests") {
            Metric::Requests
        } else if metric.starts_with("tokens") {
            Metric::Tokens
        } else {
            return None;
        };
        return Some((metric, field));
    }
    if let Some(rest) = name.strip_prefix("anthropic-ratelimit-") {
        // anthropic-ratelimit-[input-|output-]<metric>-<field>
        let (metric, field) = rest.rsplit_once('-')?;
        let field = match field {
            "limit" => Field::Limit,
            "remaining" => Field::Remaining,
            "reset" => Field::Reset,
            _ => return None,
        };
        let metric = if metric == "requests" {
            Metric::Requests
        } else if metric.ends_with("tokens") {
            Metric::Tokens
        } else {
            return None;
        };
        return Some((metric, field));
    }
    None
}

fn min_opt<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_opt<T: Ord>(a: Option<T>, b: Option<T>) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn parse_count(value: &str) -> Option<u64> {
    let value = value.trim();
    value
        .parse::<u64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().map(|v| v.max(0.0) as u64))
}

/// Parse Go-style durations such as `6m0s`, `1.5s`, `20ms` or `1h2m`.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(secs) = value.parse::<f64>() {
        return (secs >= 0.0).then(|| Duration::from_nanos((secs * 1e9).round() as u64));
    }
    let mut total_nanos = 0.0_f64;
    let mut number = String::new();
    let mut chars = value.chars().peekable();
    let mut any = false;
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
            continue;
        }
        let n: f64 = number.parse().ok()?;
        number.clear();
        let unit_nanos = match c {
            'h' => 3_600e9,
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                1e6
            }
            'm' => 60e9,
            's' => 1e9,
            _ => return None,
        };
        total_nanos += n * unit_nanos;
        any = true;
    }
    if !number.is_empty() || !any {
        return None;
    }
    Some(Duration::from_nanos(total_nanos.round() as u64))
}

/// Reset value: RFC 3339 timestamp, Unix epoch seconds or a relative duration.
fn parse_reset(value: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Some(at.with_timezone(&Utc));
    }
    if let Ok(secs) = value.parse::<f64>()
        && secs > 1_000_000_000.0
    {
        return DateTime::from_timestamp(secs as i64, 0);
    }
    let d = parse_duration(value)?;
    Some(now + chrono::Duration::from_std(d).ok()?)
}

fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<f64>() {
        return Some(now + chrono::Duration::milliseconds((secs.max(0.0) * 1000.0) as i64));
    }
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// Per-provider rate-limit view, keyed by model.
#[derive(Debug)]
pub struct RateLimitTracker {
    provider: String,
    max_wait: RwLock<Duration>,
    state: RwLock<HashMap<String, RateLimitInfo>>,
}

impl RateLimitTracker {
    pub fn new(provider: impl Into<String>, max_wait: Duration) -> Self {
        Self {
            provider: provider.into(),
            max_wait: RwLock::new(max_wait),
            state: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_max_wait(&self, max_wait: Duration) {
        *self.max_wait.write().unwrap_or_else(PoisonError::into_inner) = max_wait;
    }

    pub fn max_wait(&self) -> Duration {
        *self.max_wait.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merge rate-limit headers of a response for `model`.
    pub fn update_from_headers(&self, model: &str, headers: &HeaderMap) {
        let Some(info) = RateLimitInfo::from_headers(headers, Utc::now()) else {
            return;
        };
        tracing::trace!(
            provider = %self.provider,
            model,
            requests_remaining = ?info.requests_remaining,
            tokens_remaining = ?info.tokens_remaining,
            "rate limit headers"
        );
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(model.to_string(), info);
    }

    /// Note a 429 for `model`; the next request waits `retry_after` (default 1s).
    pub fn record_rate_limited(&self, model: &str, retry_after: Option<Duration>) {
        let now = Utc::now();
        let wait = retry_after.unwrap_or(DEFAULT_RATE_LIMIT_BACKOFF);
        let until = now + chrono::Duration::from_std(wait).unwrap_or_default();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let info = state
            .entry(model.to_string())
            .or_insert_with(|| RateLimitInfo::empty(now));
        info.retry_after = max_opt(info.retry_after, Some(until));
        info.updated_at = now;
    }

    pub fn info(&self, model: &str) -> Option<RateLimitInfo> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model)
            .cloned()
    }

    /// Predicted wait before a request of `projected_tokens` on `model`.
    pub fn suggested_wait(&self, model: &str, projected_tokens: u64) -> Option<Duration> {
        self.info(model)?.wait_for(projected_tokens, Utc::now())
    }

    /// Sleep until the local view predicts success, at most `max_wait`.
    pub async fn check_and_wait(
        &self,
        model: &str,
        projected_tokens: u64,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), LlmError> {
        let Some(wait) = self.suggested_wait(model, projected_tokens) else {
            return Ok(());
        };
        let wait = wait.min(self.max_wait());
        if wait.is_zero() {
            return Ok(());
        }
        tracing::info!(
            provider = %self.provider,
            model,
            wait_ms = wait.as_millis() as u64,
            "waiting for rate limit window"
        );
        match cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(LlmError::cancelled()
                    .with_provider(&self.provider)
                    .with_operation("generate")),
                _ = tokio::time::sleep(wait) => Ok(()),
            },
            None => {
                tokio::time::sleep(wait).await;
                Ok(())
            }
        }
    }
}
