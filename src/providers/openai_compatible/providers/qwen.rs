//! Qwen through DashScope's OpenAI-compatible mode.
//!
//! Qwen accounts may also authenticate with OAuth credentials issued by
//! `chat.qwen.ai`; refresh goes to [`TOKEN_URL`].

use std::sync::Arc;

use super::models::QWEN_MODELS;
use crate::error::LlmError;
use crate::providers::openai_compatible::{CompatAdapter, CompatSpec};
use crate::providers::spec::SpecDefaults;
use crate::types::ToolFormat;

pub const BASE_URL: &str = "https://dashscope-intl.aliyuncs.com/compatible-mode/v1";
pub const DEFAULT_MODEL: &str = "qwen-plus";
pub const TOKEN_URL: &str = "https://chat.qwen.ai/api/v1/oauth2/token";

#[derive(Debug, Clone, Copy, Default)]
pub struct QwenAdapter;

impl CompatAdapter for QwenAdapter {
    fn provider_id(&self) -> &'static str {
        "qwen"
    }

    /// Qwen3 hybrid models reject thinking on non-streaming calls.
    fn transform_request_params(
        &self,
        params: &mut serde_json::Value,
        model: &str,
    ) -> Result<(), LlmError> {
        let streaming = params.get("stream").and_then(|s| s.as_bool()).unwrap_or(false);
        if model.starts_with("qwen3") && !streaming && params.get("enable_thinking").is_none() {
            params["enable_thinking"] = serde_json::json!(false);
        }
        Ok(())
    }
}

pub fn spec() -> CompatSpec {
    CompatSpec::new(
        Arc::new(QwenAdapter),
        "Alibaba Qwen models via DashScope",
        SpecDefaults {
            base_url: BASE_URL,
            default_model: DEFAULT_MODEL,
            env_keys: &["DASHSCOPE_API_KEY"],
            token_url: Some(TOKEN_URL),
            models: QWEN_MODELS,
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
    fn disables_thinking_for_blocking_qwen3_calls() {
        let mut body = json!({"model": "qwen3-32b"});
        QwenAdapter.transform_request_params(&mut body, "qwen3-32b").unwrap();
        assert_eq!(body["enable_thinking"], false);

        let mut body = json!({"model": "qwen3-32b", "stream": true});
        QwenAdapter.transform_request_params(&mut body, "qwen3-32b").unwrap();
        assert!(body.get("enable_thinking").is_none());

        let mut body = json!({"model": "qwen-plus"});
        QwenAdapter.transform_request_params(&mut body, "qwen-plus").unwrap();
        assert!(body.get("enable_thinking").is_none());
    }
}
