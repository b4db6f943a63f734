//! Fallback provider: try children in order until one produces a first chunk.
//!
//! Only errors that [`LlmError::is_fallback_eligible`] move on to the next
//! child. Once a child has produced its first chunk the stream is committed;
//! later errors surface on `next()`.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use serde::Deserialize;

use super::{CompositeBase, commit_on_first_chunk, parse_settings};
use crate::error::LlmError;
use crate::metrics::{MetricsSink, ProviderMetrics};
use crate::registry::ProviderRegistry;
use crate::streaming::ChunkStream;
use crate::traits::{Provider, VirtualProvider};
use crate::types::{AuthConfig, GenerateOptions, ModelInfo, ProviderConfig, ToolFormat};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FallbackSettings {
    /// Child provider names in priority order
    pub providers: Vec<String>,
    /// Children tried after the first; defaults to all of them
    #[serde(default)]
    pub max_retries: Option<usize>,
}

impl FallbackSettings {
    fn attempts(&self, children: usize) -> usize {
        self.max_retries
            .map_or(children, |retries| retries.saturating_add(1))
            .min(children)
    }
}

#[derive(Debug)]
pub struct FallbackProvider {
    base: CompositeBase,
    settings: RwLock<FallbackSettings>,
}

impl FallbackProvider {
    pub fn from_config(config: ProviderConfig) -> Result<Self, LlmError> {
        let settings = parse_settings("fallback", &config)?;
        Ok(Self {
            base: CompositeBase::new("fallback", config)?,
            settings: RwLock::new(settings),
        })
    }

    fn settings(&self) -> FallbackSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn dispatch(&self, options: GenerateOptions) -> Result<ChunkStream, LlmError> {
        let children = self.base.children()?;
        let attempts = self.settings().attempts(children.len());
        let cancelled = || options.cancel.as_ref().is_some_and(|c| c.is_cancelled());

        let mut last_error = None;
        for (index, child) in children.iter().take(attempts).enumerate() {
            let result = match child.generate(options.clone()).await {
                Ok(stream) => commit_on_first_chunk(stream).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(stream) => {
                    if index > 0 {
                        tracing::info!(
                            provider = %child.name(),
                            attempt = index + 1,
                            "fallback succeeded"
                        );
                    }
                    return Ok(stream);
                }
                Err(e) if e.is_fallback_eligible() && !cancelled() => {
                    tracing::warn!(
                        provider = %child.name(),
                        attempt = index + 1,
                        attempts,
                        error = %e,
                        "child provider failed, trying next"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| LlmError::server("no child provider attempted")))
    }
}

#[async_trait]
impl Provider for FallbackProvider {
    fn name(&self) -> String {
        self.base.name()
    }

    fn provider_type(&self) -> &str {
        self.base.tag()
    }

    fn description(&self) -> String {
        self.base.description("Fallback")
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
        let settings: FallbackSettings = parse_settings("fallback", &config)?;
        if settings.providers != self.settings().providers {
            self.base.clear_children();
        }
        *self
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = settings;
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

impl VirtualProvider for FallbackProvider {
    fn child_names(&self) -> Vec<String> {
        self.settings().providers
    }

    fn set_providers(&self, registry: &ProviderRegistry) -> Result<(), LlmError> {
        self.base.resolve(&self.child_names(), registry).map(|_| ())
    }
}
