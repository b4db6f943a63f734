//! Racing provider.
//!
//! A request for a virtual model is sent to every provider/model pair that
//! model lists, concurrently. A child counts as answered once it produced its
//! first chunk. `first_wins` returns the earliest answer; `fastest_of_k` waits
//! for `k` answers and keeps the one whose reference has the lowest latency
//! recorded so far. Losing children are cancelled after the grace period.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::{CompositeBase, commit_on_first_chunk, parse_settings};
use crate::error::LlmError;
use crate::metrics::{MetricsSink, ProviderMetrics};
use crate::registry::ProviderRegistry;
use crate::streaming::ChunkStream;
use crate::traits::{Provider, VirtualProvider};
use crate::types::{AuthConfig, GenerateOptions, ModelInfo, ProviderConfig, ToolFormat};

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_GRACE_PERIOD_MS: u64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceStrategy {
    #[default]
    #[serde(alias = "first-wins")]
    FirstWins,
    #[serde(alias = "fastest-of-k")]
    FastestOfK,
}

/// One named model served by racing several concrete references.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct VirtualModel {
    /// `provider:model` references; a bare `provider` uses that provider's default model
    pub providers: Vec<String>,
    #[serde(default)]
    pub strategy: RaceStrategy,
    /// Answers collected under `fastest_of_k`; defaults to every reference
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub grace_period_ms: Option<u64>,
}

impl VirtualModel {
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms.unwrap_or(DEFAULT_GRACE_PERIOD_MS))
    }

    /// Answers needed before the race stops.
    fn wanted(&self) -> usize {
        let n = self.providers.len().max(1);
        match self.strategy {
            RaceStrategy::FirstWins => 1,
            RaceStrategy::FastestOfK => self.k.unwrap_or(n).clamp(1, n),
        }
    }

    /// `(provider, model)` pairs, split at the first `:`.
    fn references(&self) -> Vec<(String, Option<String>)> {
        self.providers
            .iter()
            .map(|reference| match reference.split_once(':') {
                Some((provider, model)) => (provider.to_string(), Some(model.to_string())),
                None => (reference.clone(), None),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RacingSettings {
    pub models: HashMap<String, VirtualModel>,
}

impl RacingSettings {
    fn validate(&self) -> Result<(), LlmError> {
        if self.models.is_empty() {
            return Err(LlmError::configuration("racing provider defines no virtual models"));
        }
        if let Some((name, _)) = self.models.iter().find(|(_, m)| m.providers.is_empty()) {
            return Err(LlmError::configuration(format!(
                "virtual model '{name}' lists no providers"
            )));
        }
        Ok(())
    }

    /// Distinct provider names across every virtual model, in first-seen order.
    fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<&String> = self.models.keys().collect();
        names.sort();
        let mut out: Vec<String> = Vec::new();
        for model in names.into_iter().filter_map(|n| self.models.get(n)) {
            for (provider, _) in model.references() {
                if !out.contains(&provider) {
                    out.push(provider);
                }
            }
        }
        out
    }
}

/// Running mean of time-to-first-chunk for one reference.
#[derive(Debug, Default, Clone, Copy)]
struct LatencyRecord {
    total: Duration,
    samples: u32,
}

impl LatencyRecord {
    fn observe(&mut self, latency: Duration) {
        self.total += latency;
        self.samples += 1;
    }

    fn mean(&self) -> Duration {
        if self.samples == 0 {
            Duration::ZERO
        } else {
            self.total / self.samples
        }
    }
}

/// A child that produced its first chunk.
struct Answer {
    index: usize,
    reference: String,
    latency: Duration,
    stream: ChunkStream,
}

type Outcome = (usize, String, Duration, Result<ChunkStream, LlmError>);

pub struct RacingProvider {
    base: CompositeBase,
    settings: RwLock<RacingSettings>,
    by_name: RwLock<HashMap<String, Arc<dyn Provider>>>,
    latencies: Mutex<HashMap<String, LatencyRecord>>,
}

impl std::fmt::Debug for RacingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut models: Vec<String> = self.settings().models.into_keys().collect();
        models.sort();
        f.debug_struct("RacingProvider")
            .field("base", &self.base)
            .field("models", &models)
            .finish()
    }
}

impl RacingProvider {
    pub fn from_config(config: ProviderConfig) -> Result<Self, LlmError> {
        let settings: RacingSettings = parse_settings("racing", &config)?;
        settings.validate().map_err(|e| e.in_context("racing", "configure"))?;
        Ok(Self {
            base: CompositeBase::new("racing", config)?,
            settings: RwLock::new(settings),
            by_name: RwLock::new(HashMap::new()),
            latencies: Mutex::new(HashMap::new()),
        })
    }

    fn settings(&self) -> RacingSettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Virtual model named by the request, else the configured default, else the only one.
    fn virtual_model(&self, requested: Option<&str>) -> Result<(String, VirtualModel), LlmError> {
        let settings = self.settings();
        let configured = self.base.config().default_model;
        let name = match requested.filter(|m| !m.is_empty()) {
            Some(name) => name.to_string(),
            None if !configured.is_empty() => configured,
            None if settings.models.len() == 1 => {
                settings.models.keys().next().cloned().unwrap_or_default()
            }
            None => {
                return Err(LlmError::invalid_request(
                    "racing provider needs a model naming one of its virtual models",
                ));
            }
        };
        match settings.models.get(&name) {
            Some(model) => Ok((name, model.clone())),
            None => Err(LlmError::not_found(format!("unknown virtual model '{name}'"))),
        }
    }

    fn lineup(
        &self,
        model: &VirtualModel,
    ) -> Result<Vec<(Arc<dyn Provider>, Option<String>, String)>, LlmError> {
        self.base.children()?;
        let by_name = self.by_name.read().unwrap_or_else(PoisonError::into_inner);
        model
            .references()
            .into_iter()
            .zip(model.providers.iter())
            .map(|((provider, child_model), reference)| {
                by_name
                    .get(&provider)
                    .cloned()
                    .map(|child| (child, child_model, reference.clone()))
                    .ok_or_else(|| {
                        LlmError::configuration(format!("provider '{provider}' is not resolved"))
                    })
            })
            .collect()
    }

    fn observe(&self, reference: &str, latency: Duration) -> Duration {
        let mut latencies = self.latencies.lock().unwrap_or_else(PoisonError::into_inner);
        let record = latencies.entry(reference.to_string()).or_default();
        record.observe(latency);
        record.mean()
    }

    async fn race(&self, model: VirtualModel, options: GenerateOptions) -> Result<ChunkStream, LlmError> {
        let lineup = self.lineup(&model)?;
        let race = options.stream_token();
        let mut tokens: Vec<CancellationToken> = Vec::with_capacity(lineup.len());
        let mut set: JoinSet<Outcome> = JoinSet::new();

        for (index, (child, child_model, reference)) in lineup.into_iter().enumerate() {
            let token = race.child_token();
            tokens.push(token.clone());
            let mut child_options = options.clone();
            child_options.model = child_model;
            child_options.cancel = Some(token);
            set.spawn(async move {
                let started = Instant::now();
                let result = match child.generate(child_options).await {
                    Ok(stream) => commit_on_first_chunk(stream).await,
                    Err(e) => Err(e),
                };
                (index, reference, started.elapsed(), result)
            });
        }

        let wanted = model.wanted();
        let deadline = tokio::time::sleep(model.timeout());
        tokio::pin!(deadline);
        let mut answers: Vec<Answer> = Vec::new();
        let mut last_error = None;

        while answers.len() < wanted {
            let joined = tokio::select! {
                biased;
                _ = race.cancelled() => {
                    Self::abandon(&tokens, set).await;
                    return Err(LlmError::cancelled());
                }
                _ = &mut deadline => break,
                joined = set.join_next() => joined,
            };
            match joined {
                None => break,
                Some(Ok((index, reference, latency, Ok(stream)))) => answers.push(Answer {
                    index,
                    reference,
                    latency,
                    stream,
                }),
                Some(Ok((_, reference, _, Err(e)))) => {
                    tracing::debug!(reference = %reference, error = %e, "racing child failed");
                    last_error = Some(e);
                }
                Some(Err(e)) => {
                    last_error = Some(LlmError::server(format!("racing child task failed: {e}")));
                }
            }
        }

        for answer in &answers {
            self.observe(&answer.reference, answer.latency);
        }
        let winner = match model.strategy {
            RaceStrategy::FirstWins => (!answers.is_empty()).then_some(0),
            RaceStrategy::FastestOfK => {
                let latencies = self.latencies.lock().unwrap_or_else(PoisonError::into_inner);
                answers
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, a)| {
                        latencies
                            .get(&a.reference)
                            .map_or(a.latency, LatencyRecord::mean)
                    })
                    .map(|(position, _)| position)
            }
        };

        let Some(position) = winner else {
            Self::abandon(&tokens, set).await;
            return Err(last_error.unwrap_or_else(|| {
                LlmError::timeout(format!(
                    "no racing child answered within {}s",
                    model.timeout().as_secs()
                ))
            }));
        };

        let winner = answers.swap_remove(position);
        tracing::debug!(
            reference = %winner.reference,
            latency_ms = winner.latency.as_millis() as u64,
            "racing child won"
        );
        for mut other in answers {
            other.stream.close().await;
        }
        let losers: Vec<CancellationToken> = tokens
            .into_iter()
            .enumerate()
            .filter(|(i, _)| *i != winner.index)
            .map(|(_, token)| token)
            .collect();
        let grace = model.grace_period();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            Self::abandon(&losers, set).await;
        });
        Ok(winner.stream)
    }

    /// Cancel every child and wait for their tasks to wind down.
    async fn abandon(tokens: &[CancellationToken], mut set: JoinSet<Outcome>) {
        for token in tokens {
            token.cancel();
        }
        set.shutdown().await;
    }
}

#[async_trait]
impl Provider for RacingProvider {
    fn name(&self) -> String {
        self.base.name()
    }

    fn provider_type(&self) -> &str {
        self.base.tag()
    }

    fn description(&self) -> String {
        self.base.description("Racing")
    }

    /// The virtual models this provider serves.
    async fn list_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        let settings = self.settings();
        let mut names: Vec<&String> = settings.models.keys().collect();
        names.sort();
        Ok(names
            .into_iter()
            .map(|name| {
                let mut info = ModelInfo::new(name.clone(), self.name());
                if let Some(model) = settings.models.get(name) {
                    info.description = format!("races {}", model.providers.join(", "));
                }
                info
            })
            .collect())
    }

    fn default_model(&self) -> String {
        let configured = self.base.config().default_model;
        if !configured.is_empty() {
            return configured;
        }
        let settings = self.settings();
        let mut names: Vec<&String> = settings.models.keys().collect();
        names.sort();
        names.first().map(|n| n.to_string()).unwrap_or_default()
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
        let settings: RacingSettings = parse_settings("racing", &config)?;
        settings.validate().map_err(|e| e.in_context("racing", "configure"))?;
        if settings.provider_names() != self.settings().provider_names() {
            self.base.clear_children();
            self.by_name
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
        let started = Instant::now();
        self.base.metrics.record_request();
        let requested = options.model.clone().unwrap_or_default();
        let (label, result) = match self.virtual_model(options.model.as_deref()) {
            Ok((name, model)) => (name, self.race(model, options).await),
            Err(e) => (requested, Err(e)),
        };
        self.base.record(&label, started, result)
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

impl VirtualProvider for RacingProvider {
    fn child_names(&self) -> Vec<String> {
        self.settings().provider_names()
    }

    fn set_providers(&self, registry: &ProviderRegistry) -> Result<(), LlmError> {
        let names = self.child_names();
        let children = self.base.resolve(&names, registry)?;
        *self.by_name.write().unwrap_or_else(PoisonError::into_inner) =
            names.into_iter().zip(children).collect();
        Ok(())
    }
}
