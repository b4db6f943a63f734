//! OpenRouter (OpenAI-compatible model router).
//!
//! Attribution headers come from the `site_url` and `site_name` settings of
//! the provider config.

use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

use super::models::OPENROUTER_MODELS;
use crate::providers::openai_compatible::{CompatAdapter, CompatSpec};
use crate::providers::spec::SpecDefaults;
use crate::types::{ProviderConfig, ToolFormat};

pub const BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenRouterAdapter;

impl CompatAdapter for OpenRouterAdapter {
    fn provider_id(&self) -> &'static str {
        "openrouter"
    }

    fn supports_documents(&self) -> bool {
        true
    }

    fn custom_headers(&self, config: &ProviderConfig) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (setting, header) in [("site_url", "http-referer"), ("site_name", "x-title")] {
            let Some(value) = config.setting_str(setting) else {
                continue;
            };
            match HeaderValue::from_str(value) {
                Ok(value) => {
                    headers.insert(HeaderName::from_static(header), value);
                }
                Err(_) => tracing::warn!(setting, "ignoring setting with invalid header characters"),
            }
        }
        headers
    }
}

pub fn spec() -> CompatSpec {
    CompatSpec::new(
        Arc::new(OpenRouterAdapter),
        "OpenRouter unified model router",
        SpecDefaults {
            base_url: BASE_URL,
            default_model: DEFAULT_MODEL,
            env_keys: &["OPENROUTER_API_KEY"],
            token_url: None,
            models: OPENROUTER_MODELS,
            credentials_optional: false,
            tool_format: ToolFormat::OpenAi,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribution_headers_from_settings() {
        let config = ProviderConfig::new("openrouter")
            .with_setting("site_url", serde_json::json!("https://example.com"))
            .with_setting("site_name", serde_json::json!("Example App"));
        let headers = OpenRouterAdapter.custom_headers(&config);
        assert_eq!(headers["HTTP-Referer"], "https://example.com");
        assert_eq!(headers["X-Title"], "Example App");
        assert!(OpenRouterAdapter
            .custom_headers(&ProviderConfig::new("openrouter"))
            .is_empty());
    }
}
