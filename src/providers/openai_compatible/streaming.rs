//! SSE decoder for OpenAI-style `chat.completion.chunk` events.

use eventsource_stream::Event;
use serde::Deserialize;

use crate::error::LlmError;
use crate::streaming::{StreamDecoder, StreamUpdate, ToolCallFragment};
use crate::types::Usage;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct StreamEvent {
    id: Option<String>,
    model: Option<String>,
    choices: Vec<StreamChoice>,
    usage: Option<StreamUsage>,
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct StreamDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
    reasoning: Option<String>,
    tool_calls: Vec<StreamToolCall>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct StreamToolCall {
    index: Option<u32>,
    id: Option<String>,
    #[serde(rename = "type")]
    call_type: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct StreamUsage {
    pub(crate) prompt_tokens: u32,
    pub(crate) completion_tokens: u32,
    pub(crate) total_tokens: Option<u32>,
}

impl From<StreamUsage> for Usage {
    fn from(u: StreamUsage) -> Self {
        Usage::with_total(u.prompt_tokens, u.completion_tokens, u.total_tokens)
    }
}

/// Decoder for one OpenAI-compatible stream.
#[derive(Debug, Default)]
pub struct CompatStreamDecoder;

impl StreamDecoder for CompatStreamDecoder {
    fn decode(&mut self, event: &Event) -> Result<Vec<StreamUpdate>, LlmError> {
        let parsed: StreamEvent = serde_json::from_str(&event.data)?;
        if let Some(error) = parsed.error {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Err(LlmError::server(format!("stream error: {message}")));
        }

        let mut out = vec![StreamUpdate::Meta {
            id: parsed.id,
            model: parsed.model,
        }];
        if let Some(choice) = parsed.choices.into_iter().next() {
            if let Some(delta) = choice.delta {
                if let Some(text) = delta.content.filter(|t| !t.is_empty()) {
                    out.push(StreamUpdate::Content(text));
                }
                if let Some(text) = delta
                    .reasoning_content
                    .filter(|t| !t.is_empty())
                    .or(delta.reasoning.filter(|t| !t.is_empty()))
                {
                    out.push(StreamUpdate::Reasoning(text));
                }
                for call in delta.tool_calls {
                    let function = call.function.unwrap_or_default();
                    out.push(StreamUpdate::ToolCall(ToolCallFragment {
                        index: call.index,
                        id: call.id,
                        call_type: call.call_type,
                        name: function.name,
                        arguments: function.arguments.unwrap_or_default(),
                    }));
                }
            }
            if let Some(reason) = choice.finish_reason.filter(|r| !r.is_empty()) {
                out.push(StreamUpdate::Finish(reason));
            }
        }
        if let Some(usage) = parsed.usage {
            out.push(StreamUpdate::Usage(usage.into()));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(data: &str) -> Event {
        crate::streaming::sse::tests::sse_event("message", data)
    }

    #[test]
    fn decodes_content_and_finish() {
        let mut d = CompatStreamDecoder;
        let updates = d
            .decode(&event(
                r#"{"id":"c1","model":"gpt","choices":[{"index":0,"delta":{"content":"!"},"finish_reason":"stop"}]}"#,
            ))
            .unwrap();
        assert_eq!(
            updates,
            vec![
                StreamUpdate::Meta {
                    id: Some("c1".into()),
                    model: Some("gpt".into())
                },
                StreamUpdate::Content("!".into()),
                StreamUpdate::Finish("stop".into()),
            ]
        );
    }

    #[test]
    fn decodes_tool_fragments_and_usage() {
        let mut d = CompatStreamDecoder;
        let updates = d
            .decode(&event(
                r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"x","type":"function","function":{"name":"get_weather","arguments":""}}]}}]}"#,
            ))
            .unwrap();
        assert!(matches!(
            &updates[1],
            StreamUpdate::ToolCall(f) if f.id.as_deref() == Some("x") && f.name.as_deref() == Some("get_weather")
        ));

        let updates = d
            .decode(&event(
                r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#,
            ))
            .unwrap();
        assert_eq!(updates.last(), Some(&StreamUpdate::Usage(Usage::new(10, 5))));
    }

    #[test]
    fn reasoning_prefers_reasoning_content() {
        let mut d = CompatStreamDecoder;
        let updates = d
            .decode(&event(
                r#"{"choices":[{"delta":{"reasoning_content":"a","reasoning":"b"}}]}"#,
            ))
            .unwrap();
        assert_eq!(updates[1], StreamUpdate::Reasoning("a".into()));
    }

    #[test]
    fn error_payload_is_surfaced() {
        let mut d = CompatStreamDecoder;
        let err = d
            .decode(&event(r#"{"error":{"message":"overloaded"}}"#))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Server);
        assert!(err.message.contains("overloaded"));
    }
}
