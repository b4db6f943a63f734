//! TTL-cached model discovery with static metadata enrichment.

use std::future::Future;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::error::LlmError;
use crate::types::{ModelCapabilities, ModelInfo, StaticModel};

struct Cached {
    models: Vec<ModelInfo>,
    fetched_at: Instant,
}

/// Memoized model list of one provider.
///
/// The fetch runs under the cache mutex, so concurrent callers on a cold or
/// expired cache share a single live request.
pub struct ModelCache {
    provider: String,
    table: &'static [StaticModel],
    ttl: RwLock<Duration>,
    cached: Mutex<Option<Cached>>,
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelCache")
            .field("provider", &self.provider)
            .field("ttl", &self.ttl())
            .field("static_models", &self.table.len())
            .finish()
    }
}

impl ModelCache {
    pub fn new(provider: impl Into<String>, ttl: Duration, table: &'static [StaticModel]) -> Self {
        Self {
            provider: provider.into(),
            table,
            ttl: RwLock::new(ttl),
            cached: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        *self.ttl.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_ttl(&self, ttl: Duration) {
        *self.ttl.write().unwrap_or_else(PoisonError::into_inner) = ttl;
    }

    /// The static table as model metadata.
    pub fn static_models(&self) -> Vec<ModelInfo> {
        self.table.iter().map(|m| m.to_info(&self.provider)).collect()
    }

    /// Cached list while fresh; otherwise run `fetch`, enrich and cache the result.
    ///
    /// A failed or empty fetch yields the static list and leaves the cache cold.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Vec<ModelInfo>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<ModelInfo>, LlmError>>,
    {
        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref()
            && entry.fetched_at.elapsed() < self.ttl()
        {
            return entry.models.clone();
        }

        match fetch().await {
            Ok(models) if !models.is_empty() => {
                let models = self.enrich(models);
                tracing::debug!(provider = %self.provider, count = models.len(), "model list refreshed");
                *cached = Some(Cached {
                    models: models.clone(),
                    fetched_at: Instant::now(),
                });
                models
            }
            Ok(_) => {
                tracing::debug!(provider = %self.provider, "empty model list, using static table");
                self.static_models()
            }
            Err(e) => {
                tracing::warn!(provider = %self.provider, error = %e, "model discovery failed, using static table");
                self.static_models()
            }
        }
    }

    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    /// Fill gaps in discovered models from the static table.
    pub fn enrich(&self, models: Vec<ModelInfo>) -> Vec<ModelInfo> {
        models
            .into_iter()
            .map(|mut model| {
                model.provider = self.provider.clone();
                match self.table.iter().find(|m| m.id == model.id) {
                    Some(known) => {
                        if model.name.is_empty() || model.name == model.id {
                            model.name = known.name.to_string();
                        }
                        if model.max_tokens == 0 {
                            model.max_tokens = known.max_tokens;
                        }
                        if model.description.is_empty() {
                            model.description = known.description.to_string();
                        }
                        if model.pricing.is_none() {
                            model.pricing = known.to_info(&self.provider).pricing;
                        }
                        model.capabilities = known.capabilities;
                    }
                    None => {
                        if model.name.is_empty() {
                            model.name = model.id.clone();
                        }
                        if model.capabilities == ModelCapabilities::default() {
                            model.capabilities = ModelCapabilities::chat();
                        }
                    }
                }
                model
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    static TABLE: &[StaticModel] = &[StaticModel {
        id: "m-large",
        name: "Model Large",
        max_tokens: 128_000,
        capabilities: ModelCapabilities::chat().with_vision(),
        description: "Flagship",
        pricing: Some((2.5, 10.0)),
    }];

    fn live() -> Vec<ModelInfo> {
        vec![ModelInfo::new("m-large", "x"), ModelInfo::new("m-new", "x")]
    }

    #[tokio::test]
    async fn enriches_known_models() {
        let cache = ModelCache::new("test", Duration::from_secs(60), TABLE);
        let models = cache.get_or_fetch(|| async { Ok(live()) }).await;
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "Model Large");
        assert_eq!(models[0].max_tokens, 128_000);
        assert!(models[0].capabilities.vision);
        assert_eq!(models[0].provider, "test");
        assert_eq!(models[1].name, "m-new");
        assert!(models[1].capabilities.streaming);
    }

    #[tokio::test]
    async fn fetches_once_within_ttl() {
        let cache = ModelCache::new("test", Duration::from_secs(60), TABLE);
        let calls = AtomicU32::new(0);
        for _ in 0..3 {
            cache
                .get_or_fetch(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(live())
                })
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.invalidate().await;
        cache.get_or_fetch(|| async { Ok(live()) }).await;
        cache.set_ttl(Duration::ZERO);
        cache
            .get_or_fetch(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(live())
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn falls_back_to_static_table() {
        let cache = ModelCache::new("test", Duration::from_secs(60), TABLE);
        let models = cache
            .get_or_fetch(|| async { Err(LlmError::network("offline")) })
            .await;
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id, "m-large");
        assert_eq!(models[0].pricing.unwrap().output_per_million, 10.0);
    }
}
