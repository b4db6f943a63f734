//! Virtual providers
//!
//! Fallback, load-balance and racing providers compose concrete providers
//! referenced by name. They are built by the factory like any other provider;
//! their children are bound afterwards through
//! [`VirtualProvider::set_providers`](crate::traits::VirtualProvider::set_providers).

pub mod fallback;
pub mod load_balance;
pub mod racing;

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use serde::de::DeserializeOwned;

use crate::error::LlmError;
use crate::metrics::{MetricsRecorder, MetricsSink, ProviderMetrics};
use crate::registry::ProviderRegistry;
use crate::streaming::ChunkStream;
use crate::traits::Provider;
use crate::types::{AuthConfig, ModelInfo, ProviderConfig, ToolFormat};

pub use fallback::{FallbackProvider, FallbackSettings};
pub use load_balance::{LoadBalanceProvider, LoadBalanceSettings, LoadBalanceStrategy};
pub use racing::{RaceStrategy, RacingProvider, RacingSettings, VirtualModel};

/// Typed settings read from the free-form `provider_config` map.
pub(crate) fn parse_settings<T: DeserializeOwned>(
    tag: &str,
    config: &ProviderConfig,
) -> Result<T, LlmError> {
    let map: serde_json::Map<String, serde_json::Value> = config
        .provider_config
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    serde_json::from_value(serde_json::Value::Object(map)).map_err(|e| {
        LlmError::configuration(format!("invalid {tag} settings: {e}"))
            .with_provider(tag)
            .with_operation("configure")
    })
}

/// State shared by the virtual providers: configuration, resolved children and metrics.
pub(crate) struct CompositeBase {
    tag: &'static str,
    config: RwLock<ProviderConfig>,
    children: RwLock<Vec<Arc<dyn Provider>>>,
    pub(crate) metrics: Arc<MetricsRecorder>,
}

impl std::fmt::Debug for CompositeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let children: Vec<String> = self.children_unchecked().iter().map(|c| c.name()).collect();
        f.debug_struct("CompositeBase")
            .field("tag", &self.tag)
            .field("children", &children)
            .finish()
    }
}

impl CompositeBase {
    pub fn new(tag: &'static str, config: ProviderConfig) -> Result<Self, LlmError> {
        let config = Self::validated(tag, config)?;
        Ok(Self {
            tag,
            metrics: Arc::new(MetricsRecorder::new(tag)),
            config: RwLock::new(config),
            children: RwLock::new(Vec::new()),
        })
    }

    fn validated(tag: &'static str, mut config: ProviderConfig) -> Result<ProviderConfig, LlmError> {
        if config.provider_type.is_empty() {
            config.provider_type = tag.to_string();
        }
        config
            .validate_for_use(false)
            .map_err(|e| e.in_context(tag, "configure"))?;
        Ok(config)
    }

    /// Validate a replacement configuration the way construction does.
    pub fn check(&self, config: ProviderConfig) -> Result<ProviderConfig, LlmError> {
        Self::validated(self.tag, config)
    }

    pub fn tag(&self) -> &'static str {
        self.tag
    }

    pub fn config(&self) -> ProviderConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_config(&self, config: ProviderConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
    }

    pub fn name(&self) -> String {
        let config = self.config.read().unwrap_or_else(PoisonError::into_inner);
        if config.name.is_empty() {
            self.tag.to_string()
        } else {
            config.name.clone()
        }
    }

    fn children_unchecked(&self) -> Vec<Arc<dyn Provider>> {
        self.children
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolved children, or a configuration error before `set_providers`.
    pub fn children(&self) -> Result<Vec<Arc<dyn Provider>>, LlmError> {
        let children = self.children_unchecked();
        if children.is_empty() {
            return Err(LlmError::configuration(
                "child providers have not been resolved; call set_providers first",
            )
            .with_provider(self.tag));
        }
        Ok(children)
    }

    /// Resolve `names` against `registry` and install the result.
    pub fn resolve(
        &self,
        names: &[String],
        registry: &ProviderRegistry,
    ) -> Result<Vec<Arc<dyn Provider>>, LlmError> {
        if names.is_empty() {
            return Err(LlmError::configuration("no child providers configured")
                .with_provider(self.tag)
                .with_operation("set_providers"));
        }
        let resolved = names
            .iter()
            .map(|name| {
                registry.require(name).map_err(|e| {
                    e.with_provider(self.tag).with_operation("set_providers")
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        *self.children.write().unwrap_or_else(PoisonError::into_inner) = resolved.clone();
        tracing::debug!(provider = self.tag, children = ?names, "resolved child providers");
        Ok(resolved)
    }

    pub fn clear_children(&self) {
        self.children
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn description(&self, kind: &str) -> String {
        let names: Vec<String> = self.children_unchecked().iter().map(|c| c.name()).collect();
        if names.is_empty() {
            format!("{kind} provider (unresolved)")
        } else {
            format!("{kind} provider over {}", names.join(", "))
        }
    }

    /// Union of the children's model lists, first occurrence wins.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        let mut seen = HashSet::new();
        let mut models = Vec::new();
        for child in self.children()? {
            for model in child.list_models().await? {
                if seen.insert((model.provider.clone(), model.id.clone())) {
                    models.push(model);
                }
            }
        }
        Ok(models)
    }

    pub fn default_model(&self) -> String {
        let configured = self
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .default_model
            .clone();
        if !configured.is_empty() {
            return configured;
        }
        self.children_unchecked()
            .first()
            .map(|c| c.default_model())
            .unwrap_or_default()
    }

    pub fn supports_streaming(&self) -> bool {
        let children = self.children_unchecked();
        !children.is_empty() && children.iter().all(|c| c.supports_streaming())
    }

    pub fn supports_tool_calling(&self) -> bool {
        let children = self.children_unchecked();
        !children.is_empty() && children.iter().all(|c| c.supports_tool_calling())
    }

    pub fn tool_format(&self) -> ToolFormat {
        self.children_unchecked()
            .first()
            .map(|c| c.tool_format())
            .unwrap_or(ToolFormat::OpenAi)
    }

    pub async fn authenticate(&self, auth: AuthConfig) -> Result<(), LlmError> {
        for child in self.children()? {
            child.authenticate(auth.clone()).await?;
        }
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.children_unchecked()
            .iter()
            .any(|c| c.is_authenticated())
    }

    pub async fn logout(&self) -> Result<(), LlmError> {
        for child in self.children()? {
            child.logout().await?;
        }
        Ok(())
    }

    /// Healthy when at least one child is.
    pub async fn health_check(&self) -> Result<(), LlmError> {
        let mut last = None;
        for child in self.children()? {
            match child.health_check().await {
                Ok(()) => return Ok(()),
                Err(e) => last = Some(e),
            }
        }
        Err(last
            .unwrap_or_else(|| LlmError::server("no child provider is healthy"))
            .in_context(self.tag, "health_check"))
    }

    pub fn metrics(&self) -> ProviderMetrics {
        self.metrics.snapshot()
    }

    pub fn set_metrics_sink(&self, sink: Arc<dyn MetricsSink>) {
        self.metrics.set_sink(sink);
    }

    /// Record the outcome of a dispatch that produced `result`.
    pub fn record(
        &self,
        model: &str,
        started: std::time::Instant,
        result: Result<ChunkStream, LlmError>,
    ) -> Result<ChunkStream, LlmError> {
        match result {
            Ok(stream) => {
                self.metrics.record_success(model, started.elapsed());
                Ok(stream)
            }
            Err(e) => {
                let e = e.in_context(self.tag, "generate");
                self.metrics.record_error(model, e.kind());
                Err(e)
            }
        }
    }
}

/// Peek the first item of `stream`; succeed only when it is a chunk.
///
/// The returned stream replays the peeked chunk before the rest.
pub(crate) async fn commit_on_first_chunk(mut stream: ChunkStream) -> Result<ChunkStream, LlmError> {
    match stream.next().await {
        Some(Ok(first)) => Ok(ChunkStream::with_first(Ok(first), stream)),
        Some(Err(e)) => {
            stream.close().await;
            Err(e)
        }
        None => {
            let cancelled = stream.cancel_token().is_cancelled();
            stream.close().await;
            Err(if cancelled {
                LlmError::cancelled()
            } else {
                LlmError::invalid_response("stream ended before the first chunk")
            })
        }
    }
}
