//! Response-side transformer trait and shared helpers.

use crate::error::LlmError;
use crate::types::Chunk;

/// Turns a provider's non-streaming response body into a terminal [`Chunk`].
pub trait ResponseTransformer: Send + Sync {
    fn provider_id(&self) -> &str;

    fn transform_chat_response(&self, raw: &serde_json::Value) -> Result<Chunk, LlmError>;
}

/// Assistant text, falling back to reasoning when the content is empty.
///
/// `reasoning_content` wins over `reasoning` when both are present.
pub fn content_or_reasoning(
    content: Option<&str>,
    reasoning_content: Option<&str>,
    reasoning: Option<&str>,
) -> (String, Option<String>) {
    let reasoning = reasoning_content
        .filter(|r| !r.is_empty())
        .or(reasoning.filter(|r| !r.is_empty()))
        .map(str::to_string);
    let content = match content.filter(|c| !c.is_empty()) {
        Some(c) => c.to_string(),
        None => reasoning.clone().unwrap_or_default(),
    };
    (content, reasoning)
}

/// Build an `invalid_response` error for a body missing an expected field.
pub fn missing_field(provider: &str, field: &str) -> LlmError {
    LlmError::invalid_response(format!("response is missing '{field}'"))
        .with_provider(provider)
        .with_operation("generate")
}
