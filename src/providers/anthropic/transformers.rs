//! Transformers for Anthropic Messages API
//!
//! System messages are lifted into `system`, tool calls become `tool_use`
//! blocks and tool results become `tool_result` blocks inside a user turn.
//! Consecutive turns of the same role are merged, as the API requires
//! alternating roles.

use serde::Deserialize;
use serde_json::{Value, json};

use super::streaming::AnthropicStreamDecoder;
use crate::error::LlmError;
use crate::streaming::StreamDecoder;
use crate::transformers::request::{RequestTransformer, StandardRequest};
use crate::transformers::response::{ResponseTransformer, content_or_reasoning, missing_field};
use crate::transformers::stream::StreamChunkTransformer;
use crate::types::{
    ChatMessage, Chunk, ContentPart, MediaSource, MessageRole, ToolCall, ToolChoice, Usage,
    resolve_mime_type,
};

pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic `stop_reason` to the canonical finish reason.
pub fn map_stop_reason(reason: &str) -> String {
    match reason {
        "end_turn" | "stop_sequence" => "stop",
        "max_tokens" => "length",
        "tool_use" => "tool_calls",
        "refusal" => "content_filter",
        other => other,
    }
    .to_string()
}

fn media_source(source: &MediaSource, mime: &str) -> Value {
    match source {
        MediaSource::Base64(data) => json!({
            "type": "base64",
            "media_type": mime,
            "data": data,
        }),
        MediaSource::Url(url) => json!({ "type": "url", "url": url }),
    }
}

fn content_blocks(message: &ChatMessage) -> Vec<Value> {
    message
        .effective_parts()
        .into_iter()
        .map(|part| match part {
            ContentPart::Text { text } => json!({ "type": "text", "text": text }),
            ContentPart::Image {
                source, mime_type, ..
            } => {
                let mime = resolve_mime_type(&source, mime_type.as_deref(), "image/png");
                json!({ "type": "image", "source": media_source(&source, &mime) })
            }
            ContentPart::Document {
                source,
                mime_type,
                name,
            } => {
                let mime = resolve_mime_type(&source, mime_type.as_deref(), "application/pdf");
                let mut block = json!({ "type": "document", "source": media_source(&source, &mime) });
                if let Some(name) = name {
                    block["title"] = json!(name);
                }
                block
            }
        })
        .filter(|block| block["type"] != "text" || block["text"] != "")
        .collect()
}

fn assistant_blocks(message: &ChatMessage) -> Result<Vec<Value>, LlmError> {
    let mut blocks = Vec::new();
    let text = message.text();
    if !text.is_empty() {
        blocks.push(json!({ "type": "text", "text": text }));
    }
    for call in &message.tool_calls {
        let input = call.parsed_arguments().map_err(|e| {
            LlmError::invalid_request(format!(
                "tool call '{}' has arguments that are not valid JSON: {e}",
                call.id
            ))
            .with_provider("anthropic")
            .with_operation("generate")
        })?;
        blocks.push(json!({
            "type": "tool_use",
            "id": call.id,
            "name": call.function.name,
            "input": input,
        }));
    }
    Ok(blocks)
}

/// Render canonical messages as Anthropic turns; system messages are skipped.
pub fn convert_messages(messages: &[ChatMessage]) -> Result<Vec<Value>, LlmError> {
    let mut turns: Vec<(&'static str, Vec<Value>)> = Vec::new();
    for message in messages {
        let (role, blocks) = match message.role {
            MessageRole::System => continue,
            MessageRole::User => ("user", content_blocks(message)),
            MessageRole::Assistant => ("assistant", assistant_blocks(message)?),
            MessageRole::Tool => (
                "user",
                vec![json!({
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id.clone().unwrap_or_default(),
                    "content": message.text(),
                })],
            ),
        };
        if blocks.is_empty() {
            continue;
        }
        match turns.last_mut() {
            Some((last_role, last_blocks)) if *last_role == role => last_blocks.extend(blocks),
            _ => turns.push((role, blocks)),
        }
    }
    Ok(turns
        .into_iter()
        .map(|(role, content)| json!({ "role": role, "content": content }))
        .collect())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicRequestTransformer;

impl RequestTransformer for AnthropicRequestTransformer {
    fn provider_id(&self) -> &str {
        "anthropic"
    }

    fn transform_chat(&self, req: &StandardRequest) -> Result<Value, LlmError> {
        let mut body = json!({
            "model": req.model,
            "messages": convert_messages(&req.messages)?,
            "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });
        if let Some(system) = req.system_text() {
            body["system"] = json!(system);
        }
        if let Some(t) = req.temperature {
            body["temperature"] = json!(t);
        }
        if !req.stop.is_empty() {
            body["stop_sequences"] = json!(req.stop);
        }
        if req.tools_enabled() {
            body["tools"] = Value::Array(
                req.tools
                    .iter()
                    .map(|t| {
                        json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.input_schema,
                        })
                    })
                    .collect(),
            );
            match &req.tool_choice {
                Some(ToolChoice::Required) => body["tool_choice"] = json!({ "type": "any" }),
                Some(ToolChoice::Specific { name }) => {
                    body["tool_choice"] = json!({ "type": "tool", "name": name })
                }
                _ => {}
            }
        }
        if req.response_format.is_some() {
            tracing::debug!(provider = "anthropic", "response_format is not supported, ignoring");
        }
        if let Some(user) = req.metadata.get("user_id").and_then(|u| u.as_str()) {
            body["metadata"] = json!({ "user_id": user });
        }
        if req.stream {
            body["stream"] = json!(true);
        }
        Ok(body)
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct AnthropicUsage {
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    content: Option<Vec<ContentBlock>>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicResponseTransformer;

impl ResponseTransformer for AnthropicResponseTransformer {
    fn provider_id(&self) -> &str {
        "anthropic"
    }

    fn transform_chat_response(&self, raw: &Value) -> Result<Chunk, LlmError> {
        if raw.get("type").and_then(|t| t.as_str()) == Some("error") {
            let message = raw
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            return Err(LlmError::invalid_response(message.to_string())
                .with_provider("anthropic")
                .with_operation("generate"));
        }
        let parsed: MessagesResponse = serde_json::from_value(raw.clone())
            .map_err(|e| LlmError::from(e).in_context("anthropic", "generate"))?;
        let blocks = parsed
            .content
            .ok_or_else(|| missing_field("anthropic", "content"))?;

        let mut text = String::new();
        let mut thinking = String::new();
        let mut tool_calls = Vec::new();
        for block in blocks {
            match block {
                ContentBlock::Text { text: t } => text.push_str(&t),
                ContentBlock::Thinking { thinking: t } => thinking.push_str(&t),
                ContentBlock::ToolUse { id, name, input } => {
                    let arguments = if input.is_null() {
                        "{}".to_string()
                    } else {
                        input.to_string()
                    };
                    tool_calls.push(ToolCall::new(id, name, arguments));
                }
                ContentBlock::Other => {}
            }
        }

        let (content, reasoning) = content_or_reasoning(Some(text.as_str()), Some(thinking.as_str()), None);
        let mut message = ChatMessage::assistant(content).with_tool_calls(tool_calls);
        message.reasoning = reasoning;
        let usage = parsed.usage.map(|u| {
            Usage::new(u.input_tokens.unwrap_or(0), u.output_tokens.unwrap_or(0))
        });
        Ok(Chunk::complete(
            parsed.id,
            parsed.model,
            message,
            parsed.stop_reason.as_deref().map(map_stop_reason),
            usage,
        ))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicStreamTransformer;

impl StreamChunkTransformer for AnthropicStreamTransformer {
    fn provider_id(&self) -> &str {
        "anthropic"
    }

    fn decoder(&self) -> Box<dyn StreamDecoder> {
        Box::new(AnthropicStreamDecoder::default())
    }
}
