//! Google Gemini `generateContent` API.

pub mod models;
pub mod streaming;
pub mod transformers;

use std::sync::Arc;

use reqwest::header::{
    AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue,
    InvalidHeaderValue,
};

use crate::auth::Credential;
use crate::error::LlmError;
use crate::providers::HttpProvider;
use crate::providers::spec::{ProviderSpec, SpecDefaults};
use crate::transformers::TransformerSet;
use crate::transformers::response::missing_field;
use crate::types::{ModelInfo, ProviderConfig, ToolFormat};

pub use models::GEMINI_MODELS;
pub use streaming::GeminiStreamDecoder;
pub use transformers::{
    GeminiRequestTransformer, GeminiResponseTransformer, GeminiStreamTransformer, bare_model_name,
};

pub const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

pub type GeminiProvider = HttpProvider<GeminiSpec>;

pub fn gemini_transformers() -> TransformerSet {
    TransformerSet {
        request: Arc::new(GeminiRequestTransformer),
        response: Arc::new(GeminiResponseTransformer),
        stream: Arc::new(GeminiStreamTransformer),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiSpec;

impl ProviderSpec for GeminiSpec {
    fn id(&self) -> &'static str {
        "gemini"
    }

    fn description(&self) -> &'static str {
        "Google Gemini models"
    }

    fn defaults(&self) -> SpecDefaults {
        SpecDefaults {
            base_url: BASE_URL,
            default_model: DEFAULT_MODEL,
            env_keys: &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            token_url: Some(TOKEN_URL),
            models: GEMINI_MODELS,
            credentials_optional: false,
            tool_format: ToolFormat::Gemini,
        }
    }

    fn build_headers(
        &self,
        _config: &ProviderConfig,
        credential: &Credential,
    ) -> Result<HeaderMap, LlmError> {
        let invalid = |_: InvalidHeaderValue| {
            LlmError::configuration("credential contains invalid header characters")
        };
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        match credential {
            Credential::OAuth { .. } => {
                let value = HeaderValue::from_str(&format!("Bearer {}", credential.secret()))
                    .map_err(invalid)?;
                headers.insert(AUTHORIZATION, value);
            }
            Credential::ApiKey(_) => {
                let value = HeaderValue::from_str(credential.secret()).map_err(invalid)?;
                headers.insert(HeaderName::from_static("x-goog-api-key"), value);
            }
            Credential::None => {}
        }
        Ok(headers)
    }

    fn chat_url(&self, stream: bool, model: &str, config: &ProviderConfig) -> String {
        let base = config.base_url.trim_end_matches('/');
        let model = bare_model_name(model);
        if stream {
            format!("{base}/models/{model}:streamGenerateContent?alt=sse")
        } else {
            format!("{base}/models/{model}:generateContent")
        }
    }

    fn parse_models(&self, body: &serde_json::Value) -> Result<Vec<ModelInfo>, LlmError> {
        let models = body
            .get("models")
            .and_then(|m| m.as_array())
            .ok_or_else(|| missing_field("gemini", "models"))?;
        Ok(models
            .iter()
            .filter(|entry| {
                entry
                    .get("supportedGenerationMethods")
                    .and_then(|m| m.as_array())
                    .is_none_or(|methods| methods.iter().any(|m| m == "generateContent"))
            })
            .filter_map(|entry| {
                let name = entry.get("name")?.as_str()?;
                let mut info = ModelInfo::new(bare_model_name(name), "gemini");
                if let Some(display) = entry.get("displayName").and_then(|d| d.as_str()) {
                    info.name = display.to_string();
                }
                if let Some(limit) = entry.get("inputTokenLimit").and_then(|l| l.as_u64()) {
                    info.max_tokens = u32::try_from(limit).unwrap_or(u32::MAX);
                }
                if let Some(description) = entry.get("description").and_then(|d| d.as_str()) {
                    info.description = description.to_string();
                }
                Some(info)
            })
            .collect())
    }

    fn chat_transformers(&self) -> TransformerSet {
        gemini_transformers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use serde_json::json;

    #[test]
    fn routes_by_stream_flag() {
        let config = ProviderConfig::new("gemini").with_base_url(BASE_URL);
        assert_eq!(
            GeminiSpec.chat_url(false, "models/gemini-2.0-flash", &config),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
        assert!(
            GeminiSpec
                .chat_url(true, "gemini-2.0-flash", &config)
                .ends_with("gemini-2.0-flash:streamGenerateContent?alt=sse")
        );
    }

    #[test]
    fn api_key_header() {
        let key = Credential::ApiKey(Arc::new(SecretString::from("g-key".to_string())));
        let headers = GeminiSpec
            .build_headers(&ProviderConfig::new("gemini"), &key)
            .unwrap();
        assert_eq!(headers["x-goog-api-key"], "g-key");
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn model_listing_strips_prefix_and_skips_embedders() {
        let models = GeminiSpec
            .parse_models(&json!({"models": [
                {"name": "models/gemini-2.0-flash", "displayName": "Gemini 2.0 Flash",
                 "inputTokenLimit": 1048576, "supportedGenerationMethods": ["generateContent", "countTokens"]},
                {"name": "models/text-embedding-004", "supportedGenerationMethods": ["embedContent"]}
            ]}))
            .unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id, "gemini-2.0-flash");
        assert_eq!(models[0].name, "Gemini 2.0 Flash");
        assert_eq!(models[0].max_tokens, 1_048_576);
    }
}
