//! OpenAI-compatible wire protocol.
//!
//! Shared by OpenAI itself and by the vendors exposing the same
//! chat-completions schema (Cerebras, Qwen, OpenRouter, local servers).

pub mod adapter;
pub mod providers;
pub mod spec;
pub mod streaming;
pub mod transformers;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

use crate::auth::Credential;
use crate::error::LlmError;
use crate::types::ModelInfo;

pub use adapter::{CompatAdapter, PassthroughAdapter};
pub use spec::CompatSpec;
pub use streaming::CompatStreamDecoder;
pub use transformers::{compat_transformers, convert_messages};

/// `Authorization: Bearer <secret>`; omitted for anonymous local servers.
pub fn bearer_headers(credential: &Credential) -> Result<HeaderMap, LlmError> {
    let mut headers = HeaderMap::new();
    let secret = credential.secret();
    if !secret.is_empty() {
        let value = HeaderValue::from_str(&format!("Bearer {secret}"))
            .map_err(|_| LlmError::configuration("credential contains invalid header characters"))?;
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

/// Parse a `GET /models` listing (`{"data": [{"id": ...}]}`).
pub fn parse_model_list(provider: &str, body: &serde_json::Value) -> Result<Vec<ModelInfo>, LlmError> {
    let data = body
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| crate::transformers::response::missing_field(provider, "data"))?;
    Ok(data
        .iter()
        .filter_map(|entry| {
            let id = entry.get("id")?.as_str()?;
            let mut info = ModelInfo::new(id, provider);
            if let Some(name) = entry.get("name").and_then(|n| n.as_str()) {
                info.name = name.to_string();
            }
            if let Some(context) = entry
                .get("context_length")
                .or_else(|| entry.get("max_context_length"))
                .and_then(|v| v.as_u64())
            {
                info.max_tokens = u32::try_from(context).unwrap_or(u32::MAX);
            }
            Some(info)
        })
        .collect())
}
