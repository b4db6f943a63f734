//! OpenAI chat completions.
//!
//! OpenAI speaks the same schema as the compatible vendors; its adapter only
//! handles reasoning-model parameter differences and enables document parts.

pub mod models;

use std::sync::Arc;

use crate::error::LlmError;
use crate::providers::HttpProvider;
use crate::providers::openai_compatible::{CompatAdapter, CompatSpec, compat_transformers};
use crate::providers::spec::SpecDefaults;
use crate::transformers::TransformerSet;
use crate::types::ToolFormat;

pub use models::OPENAI_MODELS;

pub const BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub type OpenAiProvider = HttpProvider<CompatSpec>;

/// `o1`, `o3`, `o4` families and later reasoning models.
pub fn is_reasoning_model(model: &str) -> bool {
    let model = model.rsplit('/').next().unwrap_or(model);
    ["o1", "o3", "o4", "gpt-5"]
        .iter()
        .any(|prefix| model == *prefix || model.starts_with(&format!("{prefix}-")))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiAdapter;

impl CompatAdapter for OpenAiAdapter {
    fn provider_id(&self) -> &'static str {
        "openai"
    }

    fn transform_request_params(
        &self,
        params: &mut serde_json::Value,
        model: &str,
    ) -> Result<(), LlmError> {
        if !is_reasoning_model(model) {
            return Ok(());
        }
        let Some(body) = params.as_object_mut() else {
            return Ok(());
        };
        if let Some(max_tokens) = body.remove("max_tokens") {
            body.insert("max_completion_tokens".to_string(), max_tokens);
        }
        if body.remove("temperature").is_some() {
            tracing::debug!(model, "reasoning model: dropping temperature");
        }
        Ok(())
    }

    fn supports_documents(&self) -> bool {
        true
    }
}

pub fn openai_transformers() -> TransformerSet {
    compat_transformers(Arc::new(OpenAiAdapter))
}

pub fn spec() -> CompatSpec {
    CompatSpec::new(
        Arc::new(OpenAiAdapter),
        "OpenAI chat completions",
        SpecDefaults {
            base_url: BASE_URL,
            default_model: DEFAULT_MODEL,
            env_keys: &["OPENAI_API_KEY"],
            token_url: None,
            models: OPENAI_MODELS,
            credentials_optional: false,
            tool_format: ToolFormat::OpenAi,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reasoning_models_use_max_completion_tokens() {
        let mut body = json!({"model": "o3-mini", "max_tokens": 100, "temperature": 0.2});
        OpenAiAdapter
            .transform_request_params(&mut body, "o3-mini")
            .unwrap();
        assert_eq!(body["max_completion_tokens"], 100);
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("temperature").is_none());

        let mut body = json!({"max_tokens": 100, "temperature": 0.2});
        OpenAiAdapter
            .transform_request_params(&mut body, "gpt-4o")
            .unwrap();
        assert_eq!(body["max_tokens"], 100);
    }

    #[test]
    fn reasoning_model_detection() {
        assert!(is_reasoning_model("o1"));
        assert!(is_reasoning_model("o4-mini"));
        assert!(is_reasoning_model("openai/o3"));
        assert!(!is_reasoning_model("gpt-4o"));
        assert!(!is_reasoning_model("omni-moderation"));
    }

    #[test]
    fn documents_are_sent_as_files() {
        use crate::transformers::StandardRequest;
        use crate::types::{ChatMessage, ContentPart};

        let set = openai_transformers();
        let msg = ChatMessage::user("")
            .with_part(ContentPart::text("summarize"))
            .with_part(ContentPart::document_base64("application/pdf", "JVBERi0x"));
        let body = set
            .request
            .transform_chat(&StandardRequest {
                model: "gpt-4o".into(),
                messages: vec![msg],
                ..Default::default()
            })
            .unwrap();
        let file = &body["messages"][0]["content"][1];
        assert_eq!(file["type"], "file");
        assert_eq!(file["file"]["file_data"], "data:application/pdf;base64,JVBERi0x");
    }
}
