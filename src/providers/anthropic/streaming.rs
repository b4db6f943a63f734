//! Anthropic typed-event stream decoding.
//!
//! `message_start` carries identity and input usage, content blocks stream as
//! `content_block_start`/`content_block_delta`, `message_delta` carries the
//! stop reason with output usage, and `message_stop` terminates the stream.

use std::collections::HashMap;

use eventsource_stream::Event;
use serde::Deserialize;

use super::transformers::{AnthropicUsage, map_stop_reason};
use crate::error::{ErrorKind, LlmError};
use crate::streaming::{StreamDecoder, StreamUpdate, ToolCallFragment};
use crate::types::Usage;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        message: StartMessage,
    },
    ContentBlockStart {
        index: u32,
        content_block: BlockStart,
    },
    ContentBlockDelta {
        index: u32,
        delta: BlockDelta,
    },
    ContentBlockStop {},
    MessageDelta {
        #[serde(default)]
        delta: MessageDeltaBody,
        #[serde(default)]
        usage: Option<AnthropicUsage>,
    },
    MessageStop {},
    Ping {},
    Error {
        error: StreamError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct StartMessage {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockStart {
    ToolUse {
        id: String,
        name: String,
    },
    Text {
        #[serde(default)]
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    ThinkingDelta { thinking: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize, Default)]
struct MessageDeltaBody {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

fn stream_error(error: StreamError) -> LlmError {
    let kind = match error.kind.as_str() {
        "overloaded_error" | "api_error" => ErrorKind::Server,
        "rate_limit_error" => ErrorKind::RateLimit,
        "authentication_error" | "permission_error" => ErrorKind::Auth,
        "invalid_request_error" => ErrorKind::InvalidRequest,
        "not_found_error" => ErrorKind::NotFound,
        _ => ErrorKind::InvalidResponse,
    };
    LlmError::new(kind, format!("{}: {}", error.kind, error.message))
}

/// Per-response decoder; remembers input usage and tool-call ids by block index.
#[derive(Debug, Default)]
pub struct AnthropicStreamDecoder {
    input_tokens: u32,
    tool_ids: HashMap<u32, String>,
}

impl StreamDecoder for AnthropicStreamDecoder {
    fn decode(&mut self, event: &Event) -> Result<Vec<StreamUpdate>, LlmError> {
        let parsed: StreamEvent = serde_json::from_str(&event.data)?;
        let updates = match parsed {
            StreamEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    self.input_tokens = usage.input_tokens.unwrap_or(0);
                }
                vec![StreamUpdate::Meta {
                    id: message.id,
                    model: message.model,
                }]
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                BlockStart::ToolUse { id, name } => {
                    self.tool_ids.insert(index, id.clone());
                    vec![StreamUpdate::ToolCall(
                        ToolCallFragment::opening(id, name).with_index(index),
                    )]
                }
                BlockStart::Text { text } if !text.is_empty() => vec![StreamUpdate::Content(text)],
                _ => Vec::new(),
            },
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } => vec![StreamUpdate::Content(text)],
                BlockDelta::ThinkingDelta { thinking } => vec![StreamUpdate::Reasoning(thinking)],
                BlockDelta::InputJsonDelta { partial_json } => {
                    let mut fragment = ToolCallFragment::arguments(partial_json).with_index(index);
                    fragment.id = self.tool_ids.get(&index).cloned();
                    vec![StreamUpdate::ToolCall(fragment)]
                }
                BlockDelta::Other => Vec::new(),
            },
            StreamEvent::MessageDelta { delta, usage } => {
                let mut updates = Vec::new();
                if let Some(usage) = usage {
                    let input = usage.input_tokens.unwrap_or(self.input_tokens);
                    updates.push(StreamUpdate::Usage(Usage::new(
                        input,
                        usage.output_tokens.unwrap_or(0),
                    )));
                }
                if let Some(reason) = delta.stop_reason {
                    updates.push(StreamUpdate::Finish(map_stop_reason(&reason)));
                }
                updates
            }
            StreamEvent::MessageStop {} => vec![StreamUpdate::End],
            StreamEvent::Error { error } => return Err(stream_error(error)),
            StreamEvent::ContentBlockStop {} | StreamEvent::Ping {} | StreamEvent::Unknown => {
                Vec::new()
            }
        };
        Ok(updates)
    }
}
