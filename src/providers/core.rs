//! State shared by every HTTP provider instance.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use reqwest::RequestBuilder;
use tokio_util::sync::CancellationToken;

use super::spec::SpecDefaults;
use crate::auth::{Credential, CredentialManager};
use crate::error::{ErrorKind, LlmError, classify_http_error};
use crate::metrics::MetricsRecorder;
use crate::model_catalog::ModelCache;
use crate::rate_limit::{RateLimitInfo, RateLimitTracker};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::types::ProviderConfig;

/// Configuration, credentials, rate-limit view, model cache and metrics of one provider.
pub struct ProviderCore {
    tag: &'static str,
    defaults: SpecDefaults,
    config: RwLock<ProviderConfig>,
    http: reqwest::Client,
    pub credentials: CredentialManager,
    pub rate_limits: RateLimitTracker,
    pub models: ModelCache,
    pub metrics: Arc<MetricsRecorder>,
}

impl std::fmt::Debug for ProviderCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCore")
            .field("tag", &self.tag)
            .field("config", &*self.config.read().unwrap_or_else(PoisonError::into_inner))
            .field("credentials", &self.credentials)
            .finish()
    }
}

/// Fill unset fields of `config` from the provider defaults and the environment.
fn apply_defaults(tag: &str, defaults: &SpecDefaults, mut config: ProviderConfig) -> ProviderConfig {
    if config.provider_type.is_empty() {
        config.provider_type = tag.to_string();
    }
    if config.base_url.is_empty() {
        config.base_url = defaults.base_url.to_string();
    }
    if config.default_model.is_empty() {
        config.default_model = defaults.default_model.to_string();
    }
    if !config.has_credentials()
        && let Some(key) = defaults
            .env_keys
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
    {
        tracing::debug!(provider = tag, "using API key from environment");
        config.api_key = key;
    }
    config
}

fn build_http_client() -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .user_agent(concat!("unillm/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| LlmError::configuration(format!("failed to build HTTP client: {e}")).with_source(e))
}

impl ProviderCore {
    pub fn new(
        tag: &'static str,
        defaults: SpecDefaults,
        config: ProviderConfig,
    ) -> Result<Self, LlmError> {
        let config = apply_defaults(tag, &defaults, config);
        config
            .validate_for_use(false)
            .map_err(|e| e.in_context(tag, "configure"))?;
        let http = build_http_client().map_err(|e| e.in_context(tag, "configure"))?;

        let mut credentials =
            CredentialManager::new(tag, &config, http.clone(), defaults.token_url);
        if defaults.credentials_optional {
            credentials = credentials.optional();
        }
        Ok(Self {
            tag,
            defaults,
            rate_limits: RateLimitTracker::new(tag, config.rate_limit_max_wait()),
            models: ModelCache::new(tag, config.model_cache_ttl(), defaults.models),
            metrics: Arc::new(MetricsRecorder::new(tag)),
            credentials,
            http,
            config: RwLock::new(config),
        })
    }

    pub fn tag(&self) -> &'static str {
        self.tag
    }

    pub fn defaults(&self) -> &SpecDefaults {
        &self.defaults
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> ProviderConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the configuration; credentials and cache settings follow it.
    pub fn reconfigure(&self, config: ProviderConfig) -> Result<(), LlmError> {
        let config = apply_defaults(self.tag, &self.defaults, config);
        config
            .validate_for_use(false)
            .map_err(|e| e.in_context(self.tag, "configure"))?;
        self.credentials.reconfigure(&config);
        self.rate_limits.set_max_wait(config.rate_limit_max_wait());
        self.models.set_ttl(config.model_cache_ttl());
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.defaults.credentials_optional || self.credentials.is_authenticated()
    }

    /// Send an authenticated request and return the successful response.
    ///
    /// `build` is called once per attempt with the selected credential. Network
    /// failures are retried up to the configured budget; auth, quota and
    /// rate-limit failures rotate to the next credential. Non-2xx statuses are
    /// classified into [`LlmError`]s and 429s feed the rate-limit tracker.
    pub async fn send<B>(
        &self,
        operation: &str,
        model: &str,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
        build: B,
    ) -> Result<reqwest::Response, LlmError>
    where
        B: Fn(&Credential) -> Result<RequestBuilder, LlmError> + Sync,
    {
        let mut retry = RetryExecutor::new(RetryPolicy::from_max_retries(self.config().max_retries()));
        if let Some(token) = cancel {
            retry = retry.with_cancellation(token.clone());
        }
        let retry = &retry;
        let build = &build;

        self.credentials
            .execute(cancel, move |credential| async move {
                let credential = &credential;
                retry
                    .execute(move || {
                        self.send_once(operation, model, timeout, cancel, build(credential))
                    })
                    .await
            })
            .await
            .map_err(|e| e.in_context(self.tag, operation))
    }

    async fn send_once(
        &self,
        operation: &str,
        model: &str,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
        request: Result<RequestBuilder, LlmError>,
    ) -> Result<reqwest::Response, LlmError> {
        let send = tokio::time::timeout(timeout, request?.send());
        let sent = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(LlmError::cancelled()),
                sent = send => sent,
            },
            None => send.await,
        };
        let response = sent
            .map_err(|_| LlmError::timeout(format!("no response within {}s", timeout.as_secs_f32())))?
            .map_err(LlmError::from)?;

        if !model.is_empty() {
            self.rate_limits.update_from_headers(model, response.headers());
        }
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        let err = classify_http_error(self.tag, operation, status.as_u16(), &body, &headers);
        if err.kind() == ErrorKind::RateLimit && !model.is_empty() {
            let now = Utc::now();
            let retry_after = RateLimitInfo::from_headers(&headers, now)
                .and_then(|info| info.retry_after)
                .and_then(|at| (at - now).to_std().ok());
            self.rate_limits.record_rate_limited(model, retry_after);
        }
        tracing::debug!(
            provider = self.tag,
            operation,
            status = status.as_u16(),
            kind = %err.kind(),
            "request failed"
        );
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolFormat;

    const DEFAULTS: SpecDefaults = SpecDefaults {
        base_url: "https://api.example.com/v1",
        default_model: "example-1",
        env_keys: &[],
        token_url: None,
        models: &[],
        credentials_optional: false,
        tool_format: ToolFormat::OpenAi,
    };

    #[test]
    fn defaults_fill_unset_fields() {
        let core = ProviderCore::new("example", DEFAULTS, ProviderConfig::default()).unwrap();
        let config = core.config();
        assert_eq!(config.provider_type, "example");
        assert_eq!(config.base_url, "https://api.example.com/v1");
        assert_eq!(config.default_model, "example-1");
        assert!(!core.is_authenticated());
    }

    #[test]
    fn reconfigure_replaces_credentials() {
        let core = ProviderCore::new("example", DEFAULTS, ProviderConfig::new("example")).unwrap();
        core.reconfigure(
            ProviderConfig::new("example")
                .with_api_keys(vec!["k1".into(), "k2".into()])
                .with_model_cache_ttl(Duration::from_millis(5500))
                .with_rate_limit_max_wait(Duration::from_millis(300))
                .with_timeout(Duration::from_secs(7)),
        )
        .unwrap();
        assert!(core.is_authenticated());
        assert_eq!(core.credentials.key_pool().len(), 2);
        assert_eq!(core.models.ttl(), Duration::from_millis(5500));
        assert_eq!(core.rate_limits.max_wait(), Duration::from_millis(300));
        assert_eq!(core.credentials.oauth().refresh_timeout(), Duration::from_secs(7));
        assert_eq!(core.config().base_url, "https://api.example.com/v1");
    }
}
