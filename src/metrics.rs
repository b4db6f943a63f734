//! Per-provider request metrics.
//!
//! Counters are atomics; the last-seen timestamps and the per-error-kind map
//! live behind a read/write lock. [`ProviderMetrics`] is a snapshot copy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// Snapshot of a provider's metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderMetrics {
    pub request_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub last_request_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub total_latency_ms: u64,
    pub total_tokens: u64,
    pub errors_by_kind: HashMap<ErrorKind, u64>,
}

impl ProviderMetrics {
    pub fn average_latency(&self) -> Option<Duration> {
        if self.success_count == 0 {
            return None;
        }
        Some(Duration::from_millis(
            self.total_latency_ms / self.success_count,
        ))
    }
}

/// Outcome of one request, forwarded to an external sink.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricsEvent {
    Success {
        provider: String,
        model: String,
        latency: Duration,
    },
    Tokens {
        provider: String,
        model: String,
        tokens: u64,
    },
    Failure {
        provider: String,
        model: String,
        kind: ErrorKind,
    },
}

/// Shared metrics collector injected by the factory.
pub trait MetricsSink: Send + Sync {
    fn record(&self, event: &MetricsEvent);
}

#[derive(Default)]
struct Timestamps {
    last_request_at: Option<DateTime<Utc>>,
    last_success_at: Option<DateTime<Utc>>,
    errors_by_kind: HashMap<ErrorKind, u64>,
}

/// Live metrics owned by one provider.
#[derive(Default)]
pub struct MetricsRecorder {
    provider: String,
    request_count: AtomicU64,
    success_count: AtomicU64,
    error_count: AtomicU64,
    total_latency_ms: AtomicU64,
    total_tokens: AtomicU64,
    state: RwLock<Timestamps>,
    sink: RwLock<Option<Arc<dyn MetricsSink>>>,
}

impl MetricsRecorder {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Default::default()
        }
    }

    pub fn set_sink(&self, sink: Arc<dyn MetricsSink>) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    fn emit(&self, event: MetricsEvent) {
        let sink = self
            .sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(sink) = sink {
            sink.record(&event);
        }
    }

    pub fn record_request(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .last_request_at = Some(Utc::now());
    }

    pub fn record_success(&self, model: &str, latency: Duration) {
        self.success_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms
            .fetch_add(latency.as_millis() as u64, Ordering::Relaxed);
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .last_success_at = Some(Utc::now());
        self.emit(MetricsEvent::Success {
            provider: self.provider.clone(),
            model: model.to_string(),
            latency,
        });
    }

    pub fn record_tokens(&self, model: &str, tokens: u64) {
        if tokens == 0 {
            return;
        }
        self.total_tokens.fetch_add(tokens, Ordering::Relaxed);
        self.emit(MetricsEvent::Tokens {
            provider: self.provider.clone(),
            model: model.to_string(),
            tokens,
        });
    }

    pub fn record_error(&self, model: &str, kind: ErrorKind) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
        *self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .errors_by_kind
            .entry(kind)
            .or_default() += 1;
        self.emit(MetricsEvent::Failure {
            provider: self.provider.clone(),
            model: model.to_string(),
            kind,
        });
    }

    pub fn snapshot(&self) -> ProviderMetrics {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        ProviderMetrics {
            request_count: self.request_count.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            last_request_at: state.last_request_at,
            last_success_at: state.last_success_at,
            total_latency_ms: self.total_latency_ms.load(Ordering::Relaxed),
            total_tokens: self.total_tokens.load(Ordering::Relaxed),
            errors_by_kind: state.errors_by_kind.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingSink(Mutex<Vec<MetricsEvent>>);

    impl MetricsSink for CollectingSink {
        fn record(&self, event: &MetricsEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn snapshot_reflects_updates() {
        let m = MetricsRecorder::new("openai");
        m.record_request();
        m.record_success("gpt", Duration::from_millis(40));
        m.record_tokens("gpt", 15);
        m.record_request();
        m.record_error("gpt", ErrorKind::RateLimit);

        let snap = m.snapshot();
        assert_eq!(snap.request_count, 2);
        assert_eq!(snap.success_count, 1);
        assert_eq!(snap.error_count, 1);
        assert_eq!(snap.total_tokens, 15);
        assert_eq!(snap.errors_by_kind.get(&ErrorKind::RateLimit), Some(&1));
        assert_eq!(snap.average_latency(), Some(Duration::from_millis(40)));
        assert!(snap.last_request_at.is_some());
        assert!(snap.last_success_at.is_some());
    }

    #[test]
    fn sink_receives_events() {
        let sink = Arc::new(CollectingSink::default());
        let m = MetricsRecorder::new("gemini");
        m.set_sink(sink.clone());
        m.record_success("g", Duration::from_millis(1));
        m.record_error("g", ErrorKind::Server);
        let events = sink.0.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[1],
            MetricsEvent::Failure {
                kind: ErrorKind::Server,
                ..
            }
        ));
    }
}
