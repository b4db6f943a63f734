//! Shared wiremock fixtures for the integration tests.

#![allow(dead_code)]

use serde_json::{Value, json};
use unillm::types::ProviderConfig;
use wiremock::{MockServer, ResponseTemplate};

/// OpenAI-style `data:` frames terminated by `[DONE]`.
pub fn sse_body(frames: &[Value]) -> String {
    let mut body = String::new();
    for frame in frames {
        body.push_str(&format!("data: {frame}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

/// Frames carrying an `event:` line, as Anthropic sends them.
pub fn typed_sse_body(frames: &[(&str, Value)]) -> String {
    frames
        .iter()
        .map(|(event, data)| format!("event: {event}\ndata: {data}\n\n"))
        .collect()
}

pub fn sse_response(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

/// Non-streaming chat completion with usage 10 + 5.
pub fn completion(model: &str, content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "created": 1_733_837_122,
        "model": model,
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 }
    })
}

pub fn completion_response(model: &str, content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(completion(model, content))
}

/// OpenAI config pointed at `server`, with retries disabled.
pub fn openai_config(server: &MockServer) -> ProviderConfig {
    ProviderConfig::new("openai")
        .with_base_url(server.uri())
        .with_api_key("test-key")
        .with_max_retries(0)
}
