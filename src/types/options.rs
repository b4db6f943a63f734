//! Options accepted by `Provider::generate`.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::chat::ChatMessage;
use super::tools::{Tool, ToolChoice};

/// Requested response format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseFormat {
    /// Free-form format name, e.g. `"json_object"` or `"text"`
    Named(String),
    /// JSON-schema descriptor (`{"name": ..., "schema": {...}, "strict": ...}`)
    JsonSchema(serde_json::Value),
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self::Named("json_object".to_string())
    }

    pub fn json_schema(descriptor: serde_json::Value) -> Self {
        Self::JsonSchema(descriptor)
    }

    /// OpenAI-shaped `response_format` value.
    pub fn to_openai(&self) -> serde_json::Value {
        match self {
            Self::Named(name) => serde_json::json!({ "type": name }),
            Self::JsonSchema(schema) => serde_json::json!({
                "type": "json_schema",
                "json_schema": schema,
            }),
        }
    }

    /// Whether the caller asked for JSON output of any shape.
    pub fn wants_json(&self) -> bool {
        match self {
            Self::Named(name) => name == "json_object" || name == "json",
            Self::JsonSchema(_) => true,
        }
    }

    /// The bare schema of a descriptor (`schema` field, or the descriptor itself).
    pub fn schema(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Named(_) => None,
            Self::JsonSchema(desc) => Some(desc.get("schema").unwrap_or(desc)),
        }
    }
}

/// Options for a single chat completion.
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Target model; `None` uses the provider's default model
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    /// Convenience prompt appended as a final user message
    pub prompt: Option<String>,
    /// `None` or `Some(0)` means provider default
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub stream: bool,
    pub stop: Vec<String>,
    pub tools: Vec<Tool>,
    pub tool_choice: Option<ToolChoice>,
    pub response_format: Option<ResponseFormat>,
    pub metadata: HashMap<String, serde_json::Value>,
    /// Per-call timeout overriding the provider's configured timeout
    pub timeout: Option<Duration>,
    /// Caller cancellation handle; cancelling it aborts in-flight I/O and closes the stream
    pub cancel: Option<CancellationToken>,
}

impl GenerateOptions {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Token for the stream of this call: a child of the caller's handle when present.
    pub fn stream_token(&self) -> CancellationToken {
        self.cancel
            .as_ref()
            .map(CancellationToken::child_token)
            .unwrap_or_default()
    }

    /// Rough token projection used by the rate-limit tracker (four characters per token).
    pub fn projected_tokens(&self) -> u64 {
        let chars: usize = self
            .messages
            .iter()
            .map(|m| m.text().len())
            .sum::<usize>()
            + self.prompt.as_deref().map_or(0, str::len);
        (chars as u64).div_ceil(4) + u64::from(self.max_tokens.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_format_mapping() {
        assert_eq!(
            ResponseFormat::json_object().to_openai(),
            json!({"type": "json_object"})
        );
        let schema = json!({"name": "person", "schema": {"type": "object"}});
        let rf = ResponseFormat::json_schema(schema.clone());
        assert_eq!(
            rf.to_openai(),
            json!({"type": "json_schema", "json_schema": schema})
        );
        assert_eq!(rf.schema(), Some(&json!({"type": "object"})));
        assert!(rf.wants_json());
        assert!(!ResponseFormat::Named("text".into()).wants_json());
    }

    #[test]
    fn response_format_deserializes_untagged() {
        let rf: ResponseFormat = serde_json::from_value(json!("json_object")).unwrap();
        assert_eq!(rf, ResponseFormat::json_object());
        let rf: ResponseFormat = serde_json::from_value(json!({"name": "x"})).unwrap();
        assert!(matches!(rf, ResponseFormat::JsonSchema(_)));
    }

    #[test]
    fn stream_token_follows_caller() {
        let parent = CancellationToken::new();
        let opts = GenerateOptions::from_prompt("hi").with_cancel(parent.clone());
        let child = opts.stream_token();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn projected_tokens_counts_prompt_and_budget() {
        let opts = GenerateOptions::new(vec![ChatMessage::user("abcdefgh")])
            .with_max_tokens(10);
        assert_eq!(opts.projected_tokens(), 12);
    }
}
