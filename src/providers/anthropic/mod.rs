//! Anthropic Messages API.
//!
//! API keys go in `x-api-key`; OAuth access tokens are sent as bearer tokens
//! together with the OAuth beta flag.

pub mod models;
pub mod streaming;
pub mod transformers;

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

use crate::auth::Credential;
use crate::error::LlmError;
use crate::providers::HttpProvider;
use crate::providers::spec::{ProviderSpec, SpecDefaults};
use crate::transformers::TransformerSet;
use crate::types::{ModelInfo, ProviderConfig, ToolFormat};

pub use models::ANTHROPIC_MODELS;
pub use streaming::AnthropicStreamDecoder;
pub use transformers::{
    AnthropicRequestTransformer, AnthropicResponseTransformer, AnthropicStreamTransformer,
};

pub const BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
pub const API_VERSION: &str = "2023-06-01";
pub const OAUTH_BETA: &str = "oauth-2025-04-20";
pub const TOKEN_URL: &str = "https://console.anthropic.com/v1/oauth/token";

pub type AnthropicProvider = HttpProvider<AnthropicSpec>;

pub fn anthropic_transformers() -> TransformerSet {
    TransformerSet {
        request: Arc::new(AnthropicRequestTransformer),
        response: Arc::new(AnthropicResponseTransformer),
        stream: Arc::new(AnthropicStreamTransformer),
    }
}

/// `base_url` with a single `/v1` suffix.
fn api_root(config: &ProviderConfig) -> String {
    let base = config.base_url.trim_end_matches('/');
    if base.ends_with("/v1") {
        base.to_string()
    } else {
        format!("{base}/v1")
    }
}

fn header(value: &str) -> Result<HeaderValue, LlmError> {
    HeaderValue::from_str(value)
        .map_err(|_| LlmError::configuration("credential contains invalid header characters"))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicSpec;

impl ProviderSpec for AnthropicSpec {
    fn id(&self) -> &'static str {
        "anthropic"
    }

    fn description(&self) -> &'static str {
        "Anthropic Claude models"
    }

    fn defaults(&self) -> SpecDefaults {
        SpecDefaults {
            base_url: BASE_URL,
            default_model: DEFAULT_MODEL,
            env_keys: &["ANTHROPIC_API_KEY"],
            token_url: Some(TOKEN_URL),
            models: ANTHROPIC_MODELS,
            credentials_optional: false,
            tool_format: ToolFormat::Anthropic,
        }
    }

    fn build_headers(
        &self,
        _config: &ProviderConfig,
        credential: &Credential,
    ) -> Result<HeaderMap, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(API_VERSION),
        );
        match credential {
            Credential::OAuth { .. } => {
                headers.insert(
                    AUTHORIZATION,
                    header(&format!("Bearer {}", credential.secret()))?,
                );
                headers.insert(
                    HeaderName::from_static("anthropic-beta"),
                    HeaderValue::from_static(OAUTH_BETA),
                );
            }
            Credential::ApiKey(_) => {
                headers.insert(HeaderName::from_static("x-api-key"), header(credential.secret())?);
            }
            Credential::None => {}
        }
        Ok(headers)
    }

    fn chat_url(&self, _stream: bool, _model: &str, config: &ProviderConfig) -> String {
        format!("{}/messages", api_root(config))
    }

    fn models_url(&self, config: &ProviderConfig) -> String {
        format!("{}/models", api_root(config))
    }

    fn parse_models(&self, body: &serde_json::Value) -> Result<Vec<ModelInfo>, LlmError> {
        let data = body
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| crate::transformers::response::missing_field("anthropic", "data"))?;
        Ok(data
            .iter()
            .filter_map(|entry| {
                let id = entry.get("id")?.as_str()?;
                let mut info = ModelInfo::new(id, "anthropic");
                if let Some(name) = entry.get("display_name").and_then(|n| n.as_str()) {
                    info.name = name.to_string();
                }
                Some(info)
            })
            .collect())
    }

    fn chat_transformers(&self) -> TransformerSet {
        anthropic_transformers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use serde_json::json;

    #[test]
    fn api_key_and_oauth_headers() {
        let config = ProviderConfig::new("anthropic");
        let key = Credential::ApiKey(Arc::new(SecretString::from("sk-ant-123".to_string())));
        let headers = AnthropicSpec.build_headers(&config, &key).unwrap();
        assert_eq!(headers["x-api-key"], "sk-ant-123");
        assert_eq!(headers["anthropic-version"], API_VERSION);
        assert!(headers.get(AUTHORIZATION).is_none());

        let oauth = Credential::OAuth {
            id: "acct".into(),
            token: Arc::new(SecretString::from("at-1".to_string())),
        };
        let headers = AnthropicSpec.build_headers(&config, &oauth).unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer at-1");
        assert_eq!(headers["anthropic-beta"], OAUTH_BETA);
        assert!(headers.get("x-api-key").is_none());
    }

    #[test]
    fn routes_add_single_v1() {
        let config = ProviderConfig::new("anthropic").with_base_url("http://localhost:9000/");
        assert_eq!(
            AnthropicSpec.chat_url(true, "m", &config),
            "http://localhost:9000/v1/messages"
        );
        let config = ProviderConfig::new("anthropic").with_base_url("http://proxy/v1");
        assert_eq!(AnthropicSpec.models_url(&config), "http://proxy/v1/models");
    }

    #[test]
    fn parses_model_listing() {
        let models = AnthropicSpec
            .parse_models(&json!({"data": [
                {"id": "claude-sonnet-4-20250514", "display_name": "Claude Sonnet 4", "type": "model"}
            ]}))
            .unwrap();
        assert_eq!(models[0].name, "Claude Sonnet 4");
        assert_eq!(models[0].provider, "anthropic");
    }
}
