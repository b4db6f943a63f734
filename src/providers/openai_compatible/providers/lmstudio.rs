//! Local OpenAI-compatible servers (LM Studio, llama.cpp, vLLM).
//!
//! No credential is required; a configured key is still sent as a bearer token.

use std::sync::Arc;

use super::models::LOCAL_MODELS;
use crate::providers::openai_compatible::{CompatSpec, PassthroughAdapter};
use crate::providers::spec::SpecDefaults;
use crate::types::ToolFormat;

pub const BASE_URL: &str = "http://localhost:1234/v1";
pub const DEFAULT_MODEL: &str = "local-model";

/// Local server spec registered under `tag`.
pub fn spec_with_id(tag: &'static str) -> CompatSpec {
    CompatSpec::new(
        Arc::new(PassthroughAdapter::new(tag)),
        "Local OpenAI-compatible server",
        SpecDefaults {
            base_url: BASE_URL,
            default_model: DEFAULT_MODEL,
            env_keys: &[],
            token_url: None,
            models: LOCAL_MODELS,
            credentials_optional: true,
            tool_format: ToolFormat::OpenAi,
        },
    )
}

pub fn spec() -> CompatSpec {
    spec_with_id("lmstudio")
}
