//! Provider spec shared by every OpenAI-compatible vendor.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderValue};

use super::adapter::CompatAdapter;
use super::{bearer_headers, compat_transformers, parse_model_list};
use crate::auth::Credential;
use crate::error::LlmError;
use crate::providers::spec::{ProviderSpec, SpecDefaults};
use crate::transformers::TransformerSet;
use crate::types::{ModelInfo, ProviderConfig};

/// Spec of a vendor speaking the chat-completions schema.
#[derive(Debug, Clone)]
pub struct CompatSpec {
    adapter: Arc<dyn CompatAdapter>,
    description: &'static str,
    defaults: SpecDefaults,
}

impl CompatSpec {
    pub fn new(
        adapter: Arc<dyn CompatAdapter>,
        description: &'static str,
        defaults: SpecDefaults,
    ) -> Self {
        Self {
            adapter,
            description,
            defaults,
        }
    }

    pub fn adapter(&self) -> &Arc<dyn CompatAdapter> {
        &self.adapter
    }
}

impl ProviderSpec for CompatSpec {
    fn id(&self) -> &'static str {
        self.adapter.provider_id()
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn defaults(&self) -> SpecDefaults {
        self.defaults
    }

    fn build_headers(
        &self,
        config: &ProviderConfig,
        credential: &Credential,
    ) -> Result<HeaderMap, LlmError> {
        let mut headers = bearer_headers(credential)?;
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.extend(self.adapter.custom_headers(config));
        Ok(headers)
    }

    fn chat_url(&self, _stream: bool, _model: &str, config: &ProviderConfig) -> String {
        format!("{}/chat/completions", config.base_url.trim_end_matches('/'))
    }

    fn parse_models(&self, body: &serde_json::Value) -> Result<Vec<ModelInfo>, LlmError> {
        parse_model_list(self.id(), body)
    }

    fn chat_transformers(&self) -> TransformerSet {
        compat_transformers(self.adapter.clone())
    }
}
