//! Credential management.
//!
//! A provider owns one [`CredentialManager`], which composes an API-key pool
//! and a set of OAuth identities. Every authenticated request goes through
//! [`CredentialManager::execute`], which picks a credential, runs the request
//! and rotates to the next credential on auth, quota and rate-limit failures.

pub mod key_pool;
pub mod oauth;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;
use crate::types::{AuthConfig, ProviderConfig};

pub use key_pool::ApiKeyPool;
pub use oauth::{DEFAULT_REFRESH_SKEW, OAuthManager};

/// Credential selected for one request attempt.
#[derive(Clone)]
pub enum Credential {
    ApiKey(Arc<SecretString>),
    OAuth {
        id: String,
        token: Arc<SecretString>,
    },
    /// Local servers that accept unauthenticated requests
    None,
}

impl Credential {
    /// Raw secret for request headers; empty for [`Credential::None`].
    pub fn secret(&self) -> &str {
        match self {
            Self::ApiKey(key) => key.expose_secret(),
            Self::OAuth { token, .. } => token.expose_secret(),
            Self::None => "",
        }
    }

    pub fn is_oauth(&self) -> bool {
        matches!(self, Self::OAuth { .. })
    }

    /// Log-safe label.
    pub fn label(&self) -> String {
        match self {
            Self::ApiKey(key) => mask_secret(key.expose_secret()),
            Self::OAuth { id, .. } => format!("oauth:{id}"),
            Self::None => "none".to_string(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({})", self.label())
    }
}

/// Keep the first and last four characters of a secret.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

/// Per-provider owner of API keys and OAuth credential sets.
pub struct CredentialManager {
    provider: String,
    keys: ApiKeyPool,
    oauth: OAuthManager,
    optional: bool,
}

impl fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialManager")
            .field("provider", &self.provider)
            .field("keys", &self.keys.len())
            .field("oauth_sets", &self.oauth.len())
            .field("optional", &self.optional)
            .finish()
    }
}

impl CredentialManager {
    pub fn new(
        provider: impl Into<String>,
        config: &ProviderConfig,
        http: reqwest::Client,
        default_token_url: Option<&str>,
    ) -> Self {
        let provider = provider.into();
        let oauth = OAuthManager::new(
            provider.clone(),
            config.oauth_credentials.clone(),
            http,
            default_token_url.map(str::to_string),
        );
        oauth.set_refresh_timeout(config.timeout());
        Self {
            keys: ApiKeyPool::from_config(config),
            oauth,
            provider,
            optional: false,
        }
    }

    /// Allow requests without any credential (local servers).
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn key_pool(&self) -> &ApiKeyPool {
        &self.keys
    }

    pub fn oauth(&self) -> &OAuthManager {
        &self.oauth
    }

    /// Replace keys and credential sets from a new configuration.
    ///
    /// OAuth sets refreshed since `config` was captured keep their live tokens.
    pub fn reconfigure(&self, config: &ProviderConfig) {
        self.keys.set_keys(config.all_api_keys());
        self.oauth.set_credentials(config.oauth_credentials.clone());
        self.oauth.set_refresh_timeout(config.timeout());
    }

    pub fn apply(&self, auth: AuthConfig) {
        match auth {
            AuthConfig::ApiKey(key) => self.keys.set_keys(vec![key]),
            AuthConfig::ApiKeys(keys) => self.keys.set_keys(keys),
            AuthConfig::OAuth(sets) => self.oauth.set_credentials(sets),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !self.keys.is_empty() || !self.oauth.is_empty()
    }

    pub fn clear(&self) {
        self.keys.clear();
        self.oauth.clear();
    }

    /// Run `op` with a credential, rotating through the configured credentials
    /// on auth, quota and rate-limit errors.
    ///
    /// OAuth sets take precedence over API keys when both are configured.
    /// `cancel` also aborts a token refresh made on the way.
    pub async fn execute<F, Fut, T>(
        &self,
        cancel: Option<&CancellationToken>,
        mut op: F,
    ) -> Result<T, LlmError>
    where
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        if !self.oauth.is_empty() {
            return self.oauth.execute_with_failover(cancel, op).await;
        }
        if !self.keys.is_empty() {
            return self
                .keys
                .execute_with_failover(|key| op(Credential::ApiKey(key)))
                .await;
        }
        if self.optional {
            return op(Credential::None).await;
        }
        Err(LlmError::auth("no usable credential configured")
            .with_provider(&self.provider)
            .with_operation("authenticate"))
    }
}
