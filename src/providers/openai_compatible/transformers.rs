//! Request/response/stream transformers for the OpenAI chat-completions schema.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};

use super::adapter::CompatAdapter;
use super::streaming::{CompatStreamDecoder, StreamUsage};
use crate::error::LlmError;
use crate::streaming::StreamDecoder;
use crate::transformers::request::{RequestTransformer, StandardRequest};
use crate::transformers::response::{ResponseTransformer, content_or_reasoning, missing_field};
use crate::transformers::stream::StreamChunkTransformer;
use crate::transformers::TransformerSet;
use crate::types::{
    ChatMessage, Chunk, ContentPart, FunctionCall, MediaSource, MessageRole, ToolCall, ToolChoice,
    resolve_mime_type,
};

/// Image or document as an OpenAI URL: remote URLs verbatim, base64 as a data URL.
fn media_url(source: &MediaSource, mime: &str) -> String {
    match source {
        MediaSource::Url(url) => url.clone(),
        MediaSource::Base64(data) => format!("data:{mime};base64,{data}"),
    }
}

fn convert_parts(
    message: &ChatMessage,
    provider: &str,
    supports_documents: bool,
) -> Vec<Value> {
    let mut out = Vec::new();
    for part in message.effective_parts() {
        match part {
            ContentPart::Text { text } => out.push(json!({ "type": "text", "text": text })),
            ContentPart::Image {
                source,
                mime_type,
                detail,
            } => {
                let mime = resolve_mime_type(&source, mime_type.as_deref(), "image/png");
                let mut image_url = json!({ "url": media_url(&source, &mime) });
                if let Some(detail) = detail {
                    image_url["detail"] = json!(detail);
                }
                out.push(json!({ "type": "image_url", "image_url": image_url }));
            }
            ContentPart::Document {
                source: MediaSource::Base64(data),
                mime_type,
                name,
            } if supports_documents => {
                let source = MediaSource::Base64(data);
                let mime = resolve_mime_type(&source, mime_type.as_deref(), "application/pdf");
                out.push(json!({
                    "type": "file",
                    "file": {
                        "filename": name.unwrap_or_else(|| "document".to_string()),
                        "file_data": media_url(&source, &mime),
                    }
                }));
            }
            ContentPart::Document { .. } => {
                tracing::debug!(provider, "dropping document part unsupported by provider");
            }
        }
    }
    out
}

/// Render canonical messages in the OpenAI chat schema.
pub fn convert_messages(
    messages: &[ChatMessage],
    provider: &str,
    supports_documents: bool,
) -> Vec<Value> {
    messages
        .iter()
        .map(|message| match message.role {
            MessageRole::System => json!({ "role": "system", "content": message.text() }),
            MessageRole::User => {
                if message.is_multimodal() {
                    json!({
                        "role": "user",
                        "content": convert_parts(message, provider, supports_documents),
                    })
                } else {
                    json!({ "role": "user", "content": message.text() })
                }
            }
            MessageRole::Assistant => {
                let text = message.text();
                let mut out = json!({ "role": "assistant" });
                out["content"] = if text.is_empty() && !message.tool_calls.is_empty() {
                    Value::Null
                } else {
                    json!(text)
                };
                if !message.tool_calls.is_empty() {
                    out["tool_calls"] = json!(message.tool_calls);
                }
                out
            }
            MessageRole::Tool => json!({
                "role": "tool",
                "tool_call_id": message.tool_call_id.clone().unwrap_or_default(),
                "content": message.text(),
            }),
        })
        .collect()
}

fn convert_tool_choice(choice: &ToolChoice) -> Option<Value> {
    match choice {
        ToolChoice::Auto => None,
        ToolChoice::Required => Some(json!("required")),
        ToolChoice::None => Some(json!("none")),
        ToolChoice::Specific { name } => Some(json!({
            "type": "function",
            "function": { "name": name },
        })),
    }
}

/// Request transformer for OpenAI-compatible endpoints.
#[derive(Debug, Clone)]
pub struct CompatRequestTransformer {
    pub adapter: Arc<dyn CompatAdapter>,
}

impl RequestTransformer for CompatRequestTransformer {
    fn provider_id(&self) -> &str {
        self.adapter.provider_id()
    }

    fn transform_chat(&self, req: &StandardRequest) -> Result<Value, LlmError> {
        let mut body = json!({
            "model": req.model,
            "messages": convert_messages(
                &req.messages,
                self.adapter.provider_id(),
                self.adapter.supports_documents(),
            ),
        });
        if let Some(temperature) = req.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = req.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if !req.stop.is_empty() {
            body["stop"] = json!(req.stop);
        }
        if !req.tools.is_empty() {
            body["tools"] = Value::Array(
                req.tools
                    .iter()
                    .map(|t| {
                        json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.input_schema,
                            }
                        })
                    })
                    .collect(),
            );
            if let Some(choice) = req.tool_choice.as_ref().and_then(convert_tool_choice) {
                body["tool_choice"] = choice;
            }
        }
        if let Some(format) = &req.response_format {
            body["response_format"] = format.to_openai();
        }
        if req.stream {
            body["stream"] = json!(true);
            if self.adapter.supports_stream_usage() {
                body["stream_options"] = json!({ "include_usage": true });
            }
        }
        self.adapter.transform_request_params(&mut body, &req.model)?;
        Ok(body)
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CompletionResponse {
    id: String,
    model: String,
    created: Option<i64>,
    choices: Vec<CompletionChoice>,
    usage: Option<StreamUsage>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CompletionMessage {
    content: Option<Value>,
    reasoning_content: Option<String>,
    reasoning: Option<String>,
    tool_calls: Vec<CompletionToolCall>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct CompletionToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: Option<String>,
    function: FunctionCall,
}

/// Message content as text; array content keeps its text parts.
fn content_text(content: Option<&Value>) -> Option<String> {
    match content? {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => Some(
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join(""),
        ),
        _ => None,
    }
}

/// Response transformer for OpenAI-compatible endpoints.
#[derive(Debug, Clone)]
pub struct CompatResponseTransformer {
    pub adapter: Arc<dyn CompatAdapter>,
}

impl ResponseTransformer for CompatResponseTransformer {
    fn provider_id(&self) -> &str {
        self.adapter.provider_id()
    }

    fn transform_chat_response(&self, raw: &Value) -> Result<Chunk, LlmError> {
        let provider = self.adapter.provider_id();
        if let Some(error) = raw.get("error").filter(|e| !e.is_null()) {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(LlmError::invalid_response(message)
                .with_provider(provider)
                .with_operation("generate"));
        }
        let parsed: CompletionResponse = serde_json::from_value(raw.clone())
            .map_err(|e| LlmError::from(e).in_context(provider, "generate"))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| missing_field(provider, "choices"))?;
        let message = choice.message.unwrap_or_default();

        let text = content_text(message.content.as_ref());
        let (content, reasoning) = content_or_reasoning(
            text.as_deref(),
            message.reasoning_content.as_deref(),
            message.reasoning.as_deref(),
        );
        let tool_calls: Vec<ToolCall> = message
            .tool_calls
            .into_iter()
            .map(|c| ToolCall {
                id: c.id,
                call_type: c.call_type.unwrap_or_else(|| "function".to_string()),
                function: c.function,
            })
            .collect();

        let mut assistant = ChatMessage::assistant(content).with_tool_calls(tool_calls);
        assistant.reasoning = reasoning;
        let mut chunk = Chunk::complete(
            parsed.id,
            parsed.model,
            assistant,
            choice.finish_reason,
            parsed.usage.map(Into::into),
        );
        if let Some(created) = parsed.created {
            chunk.created = created;
        }
        Ok(chunk)
    }
}

/// Stream transformer for OpenAI-compatible endpoints.
#[derive(Debug, Clone)]
pub struct CompatStreamTransformer {
    pub adapter: Arc<dyn CompatAdapter>,
}

impl StreamChunkTransformer for CompatStreamTransformer {
    fn provider_id(&self) -> &str {
        self.adapter.provider_id()
    }

    fn decoder(&self) -> Box<dyn StreamDecoder> {
        Box::new(CompatStreamDecoder)
    }
}

/// Transformer set speaking the OpenAI schema through `adapter`.
pub fn compat_transformers(adapter: Arc<dyn CompatAdapter>) -> TransformerSet {
    TransformerSet {
        request: Arc::new(CompatRequestTransformer {
            adapter: adapter.clone(),
        }),
        response: Arc::new(CompatResponseTransformer {
            adapter: adapter.clone(),
        }),
        stream: Arc::new(CompatStreamTransformer { adapter }),
    }
}
