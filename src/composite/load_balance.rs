//! Load-balancing provider.
//!
//! Each request goes to one child picked by the configured strategy. A child
//! that answered with a rate-limit or quota error sits out a back-off window.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;

use super::{CompositeBase, parse_settings};
use crate::error::{ErrorKind, LlmError};
use crate::metrics::{MetricsSink, ProviderMetrics};
use crate::registry::ProviderRegistry;
use crate::streaming::ChunkStream;
use crate::traits::{Provider, VirtualProvider};
use crate::types::{AuthConfig, GenerateOptions, ModelInfo, ProviderConfig, ToolFormat};

const DEFAULT_BACKOFF_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceStrategy {
    #[default]
    #[serde(alias = "round-robin")]
    RoundRobin,
    Random,
    #[serde(alias = "least-loaded")]
    LeastLoaded,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LoadBalanceSettings {
    pub providers: Vec<String>,
    #[serde(default)]
    pub strategy: LoadBalanceStrategy,
    /// Seconds a rate-limited child is skipped
    #[serde(default)]
    pub backoff_secs: Option<u64>,
}

impl LoadBalanceSettings {
    fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_secs.unwrap_or(DEFAULT_BACKOFF_SECS))
    }
}

/// A child together with its dispatch state.
#[derive(Debug)]
struct Slot {
    child: Arc<dyn Provider>,
    in_flight: Arc<AtomicUsize>,
    backoff_until: Mutex<Option<Instant>>,
}

impl Slot {
    fn new(child: Arc<dyn Provider>) -> Self {
        Self {
            child,
            in_flight: Arc::default(),
            backoff_until: Mutex::new(None),
        }
    }

    fn available(&self, now: Instant) -> bool {
        self.backoff_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none_or(|until| until <= now)
    }

    fn back_off(&self, until: Instant) {
        *self
            .backoff_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(until);
    }
}

/// Decrements the child's in-flight counter when dropped.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn acquire(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
pub struct LoadBalanceProvider {
    base: CompositeBase,
    settings: RwLock<LoadBalanceSettings>,
    slots: RwLock<Vec<Arc<Slot>>>,
    cursor: AtomicUsize,
}

impl LoadBalanceProvider {
    pub fn from_config(config: ProviderConfig) -> Result<Self, LlmError> {
        let settings = parse_settings("loadbalance", &config)?;
        Ok(Self {
            base: CompositeBase::new("loadbalance", config)?,
            settings: RwLock::new(settings),
            slots: RwLock::new(Vec::new()),
            cursor: AtomicUsize::new(0),
        })
    }

    fn settings(&self) -> LoadBalanceSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Index of the child that serves the next request.
    fn pick(&self, slots: &[Arc<Slot>], strategy: LoadBalanceStrategy) -> Option<usize> {
        let now = Instant::now();
        let available: Vec<usize> = (0..slots.len())
            .filter(|&i| slots[i].available(now))
            .collect();
        if available.is_empty() {
            return None;
        }
        let index = match strategy {
            LoadBalanceStrategy::RoundRobin => {
                let n = slots.len();
                let start = self.cursor.fetch_add(1, Ordering::SeqCst) % n;
                (0..n)
                    .map(|offset| (start + offset) % n)
                    .find(|i| available.contains(i))?
            }
            LoadBalanceStrategy::Random => {
                available[rand::thread_rng().gen_range(0..available.len())]
            }
            LoadBalanceStrategy::LeastLoaded => *available
                .iter()
                .min_by_key(|&&i| slots[i].in_flight.load(Ordering::SeqCst))?,
        };
        Some(index)
    }

    async fn dispatch(&self, options: GenerateOptions) -> Result<ChunkStream, LlmError> {
        let slots = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if slots.is_empty() {
            return Err(LlmError::configuration(
                "child providers have not been resolved; call set_providers first",
            ));
        }
        let settings = self.settings();
        let index = self.pick(&slots, settings.strategy).ok_or_else(|| {
            LlmError::rate_limit("every child provider is backing off after a rate limit")
        })?;
        let slot = &slots[index];
        let child = &slot.child;

        let guard = InFlight::acquire(&slot.in_flight);
        match child.generate(options).await {
            Ok(stream) => Ok(ChunkStream::forward(None, stream, guard)),
            Err(e) => {
                if matches!(e.kind(), ErrorKind::RateLimit | ErrorKind::Quota) {
                    tracing::warn!(
                        provider = %child.name(),
                        backoff_secs = settings.backoff().as_secs(),
                        "child provider rate limited, backing off"
                    );
                    slot.back_off(Instant::now() + settings.backoff());
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Provider for LoadBalanceProvider {
    fn name(&self) -> String {
        self.base.name()
    }

    fn provider_type(&self) -> &str {
        self.base.tag()
    }

    fn description(&self) -> String {
        self.base.description("Load-balancing")
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        self.base.list_models().await
    }

    fn default_model(&self) -> String {
        self.base.default_model()
    }

    fn supports_streaming(&self) -> bool {
        self.base.supports_streaming()
    }

    fn supports_tool_calling(&self) -> bool {
        self.base.supports_tool_calling()
    }

    fn tool_format(&self) -> ToolFormat {
        self.base.tool_format()
    }

    async fn authenticate(&self, auth: AuthConfig) -> Result<(), LlmError> {
        self.base.authenticate(auth).await
    }

    fn is_authenticated(&self) -> bool {
        self.base.is_authenticated()
    }

    async fn logout(&self) -> Result<(), LlmError> {
        self.base.logout().await
    }

    fn configure(&self, config: ProviderConfig) -> Result<(), LlmError> {
        let config = self.base.check(config)?;
        let settings: LoadBalanceSettings = parse_settings("loadbalance", &config)?;
        if settings.providers != self.settings().providers {
            self.base.clear_children();
            self.slots
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .clear();
        }
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
        self.base.set_config(config);
        Ok(())
    }

    fn config(&self) -> ProviderConfig {
        self.base.config()
    }

    async fn generate(&self, options: GenerateOptions) -> Result<ChunkStream, LlmError> {
        let model = options.model.clone().unwrap_or_default();
        let started = Instant::now();
        self.base.metrics.record_request();
        let result = self.dispatch(options).await;
        self.base.record(&model, started, result)
    }

    async fn health_check(&self) -> Result<(), LlmError> {
        self.base.health_check().await
    }

    fn metrics(&self) -> ProviderMetrics {
        self.base.metrics()
    }

    fn set_metrics_sink(&self, sink: Arc<dyn MetricsSink>) -> bool {
        self.base.set_metrics_sink(sink);
        true
    }

    fn as_virtual(&self) -> Option<&dyn VirtualProvider> {
        Some(self)
    }
}

impl VirtualProvider for LoadBalanceProvider {
    fn child_names(&self) -> Vec<String> {
        self.settings().providers
    }

    fn set_providers(&self, registry: &ProviderRegistry) -> Result<(), LlmError> {
        let children = self.base.resolve(&self.child_names(), registry)?;
        *self.slots.write().unwrap_or_else(PoisonError::into_inner) = children
            .into_iter()
            .map(|child| Arc::new(Slot::new(child)))
            .collect();
        Ok(())
    }
}
