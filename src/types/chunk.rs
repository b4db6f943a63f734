//! Response chunks delivered to callers.

use serde::{Deserialize, Serialize};

use super::chat::{ChatMessage, MessageRole};
use super::tools::ToolCall;

/// Token accounting for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Use the provider's total when it reported one, otherwise sum the parts.
    pub fn with_total(prompt_tokens: u32, completion_tokens: u32, total: Option<u32>) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: total.unwrap_or(prompt_tokens + completion_tokens),
        }
    }
}

/// Incremental update in a streaming response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChoiceDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<MessageRole>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
}

/// One choice: a full message for collapsed responses or a delta while streaming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Choice {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<ChoiceDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// One unit of response.
///
/// Non-terminal streaming chunks carry the text delta in `content`; the terminal
/// chunk (`done == true`) carries the aggregate text, the assembled tool calls and usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Chunk {
    pub id: String,
    pub model: String,
    /// Unix seconds
    pub created: i64,
    pub content: String,
    pub done: bool,
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl Chunk {
    /// Collapsed non-streaming response holding the full assistant message.
    pub fn complete(
        id: impl Into<String>,
        model: impl Into<String>,
        message: ChatMessage,
        finish_reason: Option<String>,
        usage: Option<Usage>,
    ) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            created: chrono::Utc::now().timestamp(),
            content: message.content.clone(),
            done: true,
            choices: vec![Choice {
                index: 0,
                message: Some(message),
                delta: None,
                finish_reason,
            }],
            usage,
        }
    }

    /// Streaming chunk carrying one delta.
    pub fn delta(id: impl Into<String>, model: impl Into<String>, delta: ChoiceDelta) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            created: chrono::Utc::now().timestamp(),
            content: delta.content.clone(),
            done: false,
            choices: vec![Choice {
                index: 0,
                message: None,
                delta: Some(delta),
                finish_reason: None,
            }],
            usage: None,
        }
    }

    /// Tool calls from the first choice, whether collapsed or streamed.
    pub fn tool_calls(&self) -> &[ToolCall] {
        match self.choices.first() {
            Some(Choice {
                message: Some(m), ..
            }) => &m.tool_calls,
            Some(Choice { delta: Some(d), .. }) => &d.tool_calls,
            _ => &[],
        }
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first().and_then(|c| c.finish_reason.as_deref())
    }

    /// Reasoning text of the first choice.
    pub fn reasoning(&self) -> Option<&str> {
        match self.choices.first() {
            Some(Choice {
                message: Some(m), ..
            }) => m.reasoning.as_deref(),
            Some(Choice { delta: Some(d), .. }) => d.reasoning.as_deref(),
            _ => None,
        }
    }

    /// The assistant message (collapsed responses), synthesized for terminal stream chunks.
    pub fn to_message(&self) -> ChatMessage {
        if let Some(Choice {
            message: Some(m), ..
        }) = self.choices.first()
        {
            return m.clone();
        }
        let mut msg = ChatMessage::assistant(self.content.clone());
        msg.tool_calls = self.tool_calls().to_vec();
        msg.reasoning = self.reasoning().map(str::to_string);
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_chunk_exposes_message_fields() {
        let msg = ChatMessage::assistant("pong").with_tool_calls(vec![ToolCall::new(
            "c1",
            "f",
            "{}",
        )]);
        let chunk = Chunk::complete("id", "m", msg, Some("stop".into()), Some(Usage::new(10, 5)));
        assert!(chunk.done);
        assert_eq!(chunk.content, "pong");
        assert_eq!(chunk.tool_calls().len(), 1);
        assert_eq!(chunk.finish_reason(), Some("stop"));
        assert_eq!(chunk.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn delta_chunk_is_not_done() {
        let chunk = Chunk::delta(
            "id",
            "m",
            ChoiceDelta {
                content: "Hel".into(),
                ..Default::default()
            },
        );
        assert!(!chunk.done);
        assert_eq!(chunk.content, "Hel");
        assert!(chunk.tool_calls().is_empty());
        assert_eq!(chunk.to_message().content, "Hel");
    }
}
