//! Cerebras inference (OpenAI-compatible).

use std::sync::Arc;

use super::models::CEREBRAS_MODELS;
use crate::error::LlmError;
use crate::providers::openai_compatible::{CompatAdapter, CompatSpec};
use crate::providers::spec::SpecDefaults;
use crate::types::ToolFormat;

pub const BASE_URL: &str = "https://api.cerebras.ai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.3-70b";
const MAX_TEMPERATURE: f64 = 1.5;

#[derive(Debug, Clone, Copy, Default)]
pub struct CerebrasAdapter;

impl CompatAdapter for CerebrasAdapter {
    fn provider_id(&self) -> &'static str {
        "cerebras"
    }

    fn transform_request_params(
        &self,
        params: &mut serde_json::Value,
        _model: &str,
    ) -> Result<(), LlmError> {
        if let Some(t) = params.get("temperature").and_then(|t| t.as_f64())
            && t > MAX_TEMPERATURE
        {
            tracing::debug!(requested = t, "clamping temperature to the Cerebras maximum");
            params["temperature"] = serde_json::json!(MAX_TEMPERATURE);
        }
        Ok(())
    }

    // Usage arrives on the last chunk without being asked for.
    fn supports_stream_usage(&self) -> bool {
        false
    }
}

pub fn spec() -> CompatSpec {
    CompatSpec::new(
        Arc::new(CerebrasAdapter),
        "Cerebras wafer-scale inference",
        SpecDefaults {
            base_url: BASE_URL,
            default_model: DEFAULT_MODEL,
            env_keys: &["CEREBRAS_API_KEY"],
            token_url: None,
            models: CEREBRAS_MODELS,
            credentials_optional: false,
            tool_format: ToolFormat::OpenAi,
        },
    )
}
