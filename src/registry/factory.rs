//! Provider factory
//!
//! Maps provider-type tags to constructors. Re-registering a tag replaces the
//! previous constructor; a shared metrics sink set on the factory is attached
//! to every provider it builds.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use super::ProviderRegistry;
use crate::composite::{FallbackProvider, LoadBalanceProvider, RacingProvider};
use crate::error::LlmError;
use crate::metrics::MetricsSink;
use crate::providers;
use crate::traits::Provider;
use crate::types::ProviderConfig;

/// Builds one provider from its configuration.
pub type ProviderConstructor =
    Arc<dyn Fn(ProviderConfig) -> Result<Arc<dyn Provider>, LlmError> + Send + Sync>;

fn constructor<P, F>(build: F) -> ProviderConstructor
where
    P: Provider + 'static,
    F: Fn(ProviderConfig) -> Result<P, LlmError> + Send + Sync + 'static,
{
    Arc::new(move |config| Ok(Arc::new(build(config)?) as Arc<dyn Provider>))
}

/// Tag-to-constructor map.
#[derive(Default)]
pub struct ProviderFactory {
    constructors: RwLock<HashMap<String, ProviderConstructor>>,
    sink: RwLock<Option<Arc<dyn MetricsSink>>>,
}

impl std::fmt::Debug for ProviderFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderFactory")
            .field("tags", &self.registered_tags())
            .finish()
    }
}

impl ProviderFactory {
    /// Empty factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory with every built-in provider and virtual provider registered.
    pub fn with_builtin_providers() -> Self {
        let factory = Self::new();
        factory.register("openai", constructor(providers::openai));
        factory.register("anthropic", constructor(providers::anthropic));
        factory.register("gemini", constructor(providers::gemini));
        factory.register("cerebras", constructor(providers::cerebras));
        factory.register("qwen", constructor(providers::qwen));
        factory.register("openrouter", constructor(providers::openrouter));
        factory.register("lmstudio", constructor(providers::lmstudio));
        factory.register(
            "openai_compatible",
            constructor(|config| providers::local("openai_compatible", config)),
        );
        factory.register("local", constructor(|config| providers::local("local", config)));
        factory.register("fallback", constructor(FallbackProvider::from_config));
        factory.register("loadbalance", constructor(LoadBalanceProvider::from_config));
        factory.register("racing", constructor(RacingProvider::from_config));
        factory
    }

    /// Register `build` under `tag`, replacing any previous constructor.
    pub fn register(&self, tag: impl Into<String>, build: ProviderConstructor) {
        let tag = tag.into();
        let replaced = self
            .constructors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(tag.clone(), build)
            .is_some();
        tracing::debug!(tag = %tag, replaced, "registered provider constructor");
    }

    pub fn is_registered(&self, tag: &str) -> bool {
        self.constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(tag)
    }

    pub fn registered_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        tags.sort();
        tags
    }

    /// Shared sink attached to every provider created afterwards.
    pub fn set_metrics_sink(&self, sink: Arc<dyn MetricsSink>) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    /// Construct a provider for `tag`.
    pub fn create(&self, tag: &str, config: ProviderConfig) -> Result<Arc<dyn Provider>, LlmError> {
        let build = self
            .constructors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tag)
            .cloned()
            .ok_or_else(|| {
                LlmError::configuration(format!("provider type '{tag}' is not registered"))
                    .with_provider(tag)
                    .with_operation("create")
            })?;

        let mut config = config;
        if config.provider_type.is_empty() {
            config.provider_type = tag.to_string();
        }
        let provider = build(config).map_err(|e| e.in_context(tag, "create"))?;

        let sink = self.sink.read().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(sink) = sink
            && !provider.set_metrics_sink(sink)
        {
            tracing::debug!(tag, "provider does not accept a metrics sink");
        }
        Ok(provider)
    }

    /// Construct a provider from the config's own `provider_type`.
    pub fn create_from_config(&self, config: ProviderConfig) -> Result<Arc<dyn Provider>, LlmError> {
        let tag = config.provider_type.clone();
        self.create(&tag, config)
    }

    /// Build every config into a registry and resolve virtual providers' children.
    pub fn create_registry(
        &self,
        configs: impl IntoIterator<Item = ProviderConfig>,
    ) -> Result<ProviderRegistry, LlmError> {
        let mut registry = ProviderRegistry::new();
        for config in configs {
            registry.register(self.create_from_config(config)?);
        }
        registry.resolve_virtual_providers()?;
        Ok(registry)
    }
}

static GLOBAL: OnceLock<ProviderFactory> = OnceLock::new();

/// Process-wide factory preloaded with the built-in providers.
pub fn global_factory() -> &'static ProviderFactory {
    GLOBAL.get_or_init(ProviderFactory::with_builtin_providers)
}
