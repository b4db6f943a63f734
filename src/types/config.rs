//! Provider configuration and credential records.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::LlmError;

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MODEL_CACHE_TTL_MS: u64 = 24 * 60 * 60 * 1000;
pub const DEFAULT_RATE_LIMIT_MAX_WAIT_MS: u64 = 60 * 1000;
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Called after every successful OAuth refresh, before the new token is used.
///
/// Arguments: credential id, access token, refresh token, expiry.
pub type TokenRefreshCallback =
    Arc<dyn Fn(&str, &str, &str, DateTime<Utc>) -> Result<(), LlmError> + Send + Sync>;

/// Capability switches of a provider instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderFeatures {
    pub streaming: bool,
    pub tool_calling: bool,
    pub responses_api: bool,
}

impl Default for ProviderFeatures {
    fn default() -> Self {
        Self {
            streaming: true,
            tool_calling: true,
            responses_api: false,
        }
    }
}

/// One OAuth identity of a provider.
#[derive(Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OAuthCredentialSet {
    /// Unique within the provider, stable across refreshes
    pub id: String,
    pub client_id: String,
    pub client_secret: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Vec<String>,
    pub refresh_count: u32,
    pub last_refresh: Option<DateTime<Utc>>,
    /// Token endpoint override (defaults to the provider's endpoint)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_url: Option<String>,
    #[serde(skip)]
    pub on_token_refresh: Option<TokenRefreshCallback>,
}

impl OAuthCredentialSet {
    pub fn new(id: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            client_id: client_id.into(),
            ..Default::default()
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = secret.into();
        self
    }

    pub fn with_tokens(
        mut self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.access_token = access_token.into();
        self.refresh_token = refresh_token.into();
        self.expires_at = expires_at;
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = Some(url.into());
        self
    }

    pub fn with_refresh_callback(mut self, callback: TokenRefreshCallback) -> Self {
        self.on_token_refresh = Some(callback);
        self
    }

    /// True when the access token is missing or expires within `skew`.
    pub fn needs_refresh(&self, skew: Duration, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return true;
        }
        match self.expires_at {
            Some(expiry) => {
                let skew = chrono::Duration::from_std(skew).unwrap_or_default();
                expiry - skew <= now
            }
            None => false,
        }
    }

    pub fn is_usable(&self) -> bool {
        !self.access_token.is_empty() || !self.refresh_token.is_empty()
    }
}

impl fmt::Debug for OAuthCredentialSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthCredentialSet")
            .field("id", &self.id)
            .field("client_id", &self.client_id)
            .field("has_access_token", &!self.access_token.is_empty())
            .field("has_refresh_token", &!self.refresh_token.is_empty())
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .field("refresh_count", &self.refresh_count)
            .field("last_refresh", &self.last_refresh)
            .field("has_callback", &self.on_token_refresh.is_some())
            .finish()
    }
}

/// Declarative configuration of one provider instance.
#[derive(Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct ProviderConfig {
    /// Provider-type tag used by the factory (e.g. `openai`, `anthropic`, `fallback`)
    #[serde(rename = "type")]
    #[validate(length(min = 1, message = "provider type tag must not be empty"))]
    pub provider_type: String,
    /// Display name; also the key virtual providers use to reference this instance
    pub name: String,
    pub base_url: String,
    pub default_model: String,
    pub api_key: String,
    /// Additional keys rotated after `api_key`
    pub api_keys: Vec<String>,
    pub oauth_credentials: Vec<OAuthCredentialSet>,
    pub timeout_secs: Option<u64>,
    pub max_tokens: Option<u32>,
    pub features: ProviderFeatures,
    /// Free-form provider-specific settings (project id, site headers, child lists)
    pub provider_config: HashMap<String, serde_json::Value>,
    /// Transient network retry budget
    pub max_retries: Option<u32>,
    /// Model list cache lifetime in milliseconds
    pub model_cache_ttl_ms: Option<u64>,
    /// Longest pause, in milliseconds, taken before a rate-limited request
    pub rate_limit_max_wait_ms: Option<u64>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider_type", &self.provider_type)
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("has_api_key", &!self.api_key.is_empty())
            .field("extra_api_keys", &self.api_keys.len())
            .field("oauth_credentials", &self.oauth_credentials)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_tokens", &self.max_tokens)
            .field("features", &self.features)
            .field("provider_config", &self.provider_config)
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(provider_type: impl Into<String>) -> Self {
        Self {
            provider_type: provider_type.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = key.into();
        self
    }

    pub fn with_api_keys(mut self, keys: Vec<String>) -> Self {
        self.api_keys = keys;
        self
    }

    pub fn with_oauth_credential(mut self, credential: OAuthCredentialSet) -> Self {
        self.oauth_credentials.push(credential);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_features(mut self, features: ProviderFeatures) -> Self {
        self.features = features;
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.provider_config.insert(key.into(), value);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    pub fn with_model_cache_ttl(mut self, ttl: Duration) -> Self {
        self.model_cache_ttl_ms = Some(duration_ms(ttl));
        self
    }

    pub fn with_rate_limit_max_wait(mut self, wait: Duration) -> Self {
        self.rate_limit_max_wait_ms = Some(duration_ms(wait));
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn model_cache_ttl(&self) -> Duration {
        Duration::from_millis(
            self.model_cache_ttl_ms
                .unwrap_or(DEFAULT_MODEL_CACHE_TTL_MS),
        )
    }

    pub fn rate_limit_max_wait(&self) -> Duration {
        Duration::from_millis(
            self.rate_limit_max_wait_ms
                .unwrap_or(DEFAULT_RATE_LIMIT_MAX_WAIT_MS),
        )
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES)
    }

    /// Primary key followed by the additional keys, empty and duplicate entries removed.
    pub fn all_api_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for key in std::iter::once(&self.api_key).chain(self.api_keys.iter()) {
            let key = key.trim();
            if !key.is_empty() && !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
        keys
    }

    pub fn has_credentials(&self) -> bool {
        !self.all_api_keys().is_empty() || self.oauth_credentials.iter().any(|c| c.is_usable())
    }

    /// String setting from `provider_config`.
    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.provider_config
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Check the declarative invariants before a provider uses this config.
    pub fn validate_for_use(&self, requires_credentials: bool) -> Result<(), LlmError> {
        self.validate()
            .map_err(|e| LlmError::configuration(format!("invalid provider config: {e}")))?;
        if requires_credentials && !self.has_credentials() {
            return Err(LlmError::auth(format!(
                "provider '{}' has no API key or OAuth credential configured",
                self.provider_type
            )));
        }
        Ok(())
    }
}

/// Credentials handed to `Provider::authenticate`.
#[derive(Clone, Debug)]
pub enum AuthConfig {
    ApiKey(String),
    ApiKeys(Vec<String>),
    OAuth(Vec<OAuthCredentialSet>),
}

/// Tool/wire schema family spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFormat {
    OpenAi,
    Anthropic,
    Gemini,
}

impl ToolFormat {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
