//! Provider specification
//!
//! A [`ProviderSpec`] concentrates what differs between HTTP providers: defaults,
//! authentication headers, routes, model-list parsing and the transformers of
//! its wire protocol. [`HttpProvider`](super::HttpProvider) does the rest.

use reqwest::header::HeaderMap;

use crate::auth::Credential;
use crate::error::LlmError;
use crate::transformers::{TransformerSet, transformers_for};
use crate::types::{ModelInfo, ProviderConfig, StaticModel, ToolFormat};

/// Static defaults of a provider type.
#[derive(Debug, Clone, Copy)]
pub struct SpecDefaults {
    pub base_url: &'static str,
    pub default_model: &'static str,
    /// Environment variables consulted when the config carries no credential
    pub env_keys: &'static [&'static str],
    /// OAuth token endpoint used when a credential set names none
    pub token_url: Option<&'static str>,
    pub models: &'static [StaticModel],
    /// Whether requests may go out without any credential
    pub credentials_optional: bool,
    pub tool_format: ToolFormat,
}

/// Header building, routing and transformer selection of one provider type.
pub trait ProviderSpec: Send + Sync + 'static {
    /// Provider-type tag (e.g. `openai`, `anthropic`)
    fn id(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn defaults(&self) -> SpecDefaults;

    /// Authentication plus provider-specific headers.
    fn build_headers(
        &self,
        config: &ProviderConfig,
        credential: &Credential,
    ) -> Result<HeaderMap, LlmError>;

    /// Chat route for `model`.
    fn chat_url(&self, stream: bool, model: &str, config: &ProviderConfig) -> String;

    /// Model-listing route, also used as the health probe.
    fn models_url(&self, config: &ProviderConfig) -> String {
        format!("{}/models", config.base_url.trim_end_matches('/'))
    }

    fn parse_models(&self, body: &serde_json::Value) -> Result<Vec<ModelInfo>, LlmError>;

    /// Transformers bundled with this provider type.
    fn chat_transformers(&self) -> TransformerSet;

    /// Transformers in effect: a registry entry for this tag overrides the bundled set.
    fn choose_chat_transformers(&self) -> TransformerSet {
        transformers_for(self.id()).unwrap_or_else(|| self.chat_transformers())
    }
}
