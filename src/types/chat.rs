//! Canonical chat message types.

use base64::Engine;
use serde::{Deserialize, Serialize};

use super::tools::ToolCall;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    #[default]
    User,
    Assistant,
    Tool,
}

impl MessageRole {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// Where binary media lives: inline base64 or a remote URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MediaSource {
    Base64(String),
    Url(String),
}

/// One part of a multimodal message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        source: MediaSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        /// OpenAI image detail hint (`low`, `high`, `auto`)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    Document {
        source: MediaSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        Self::Image {
            source: MediaSource::Url(url.into()),
            mime_type: None,
            detail: None,
        }
    }

    pub fn image_base64(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Image {
            source: MediaSource::Base64(data.into()),
            mime_type: Some(mime_type.into()),
            detail: None,
        }
    }

    /// Attach raw image bytes; the MIME type is sniffed from the bytes.
    pub fn image_bytes(bytes: &[u8]) -> Self {
        let mime_type = infer::get(bytes).map(|t| t.mime_type().to_string());
        Self::Image {
            source: MediaSource::Base64(base64::engine::general_purpose::STANDARD.encode(bytes)),
            mime_type,
            detail: None,
        }
    }

    pub fn document_base64(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::Document {
            source: MediaSource::Base64(data.into()),
            mime_type: Some(mime_type.into()),
            name: None,
        }
    }

    pub fn document_url(url: impl Into<String>) -> Self {
        Self::Document {
            source: MediaSource::Url(url.into()),
            mime_type: None,
            name: None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Canonical chat message.
///
/// A message carries either plain `content` or ordered `parts`; when both are
/// populated the parts win for protocols that accept multimodal input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ChatMessage {
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parts: Vec<ContentPart>,
    /// Reasoning trace returned by thinking models
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn with_role(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::Assistant, content)
    }

    /// Tool result message answering the tool call `tool_call_id`.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role(MessageRole::Tool, content)
        }
    }

    pub fn with_part(mut self, part: ContentPart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn with_parts(mut self, parts: Vec<ContentPart>) -> Self {
        self.parts.extend(parts);
        self
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    pub fn has_parts(&self) -> bool {
        !self.parts.is_empty()
    }

    /// Whether the message carries anything besides plain text.
    pub fn is_multimodal(&self) -> bool {
        self.parts
            .iter()
            .any(|p| !matches!(p, ContentPart::Text { .. }))
    }

    /// Plain-text view: `content`, or the concatenated text parts when content is empty.
    pub fn text(&self) -> String {
        if !self.content.is_empty() || self.parts.is_empty() {
            return self.content.clone();
        }
        self.parts
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Parts to emit on the wire: explicit parts, or one text part built from `content`.
    pub fn effective_parts(&self) -> Vec<ContentPart> {
        if self.parts.is_empty() {
            if self.content.is_empty() {
                Vec::new()
            } else {
                vec![ContentPart::text(self.content.clone())]
            }
        } else {
            self.parts.clone()
        }
    }
}

/// Resolve the MIME type of an image or document part.
///
/// Explicit values win; base64 payloads are sniffed with `infer`, URLs are
/// guessed from their extension.
pub fn resolve_mime_type(source: &MediaSource, explicit: Option<&str>, fallback: &str) -> String {
    if let Some(mime) = explicit.filter(|m| !m.is_empty()) {
        return mime.to_string();
    }
    match source {
        MediaSource::Base64(data) => {
            let prefix: Vec<u8> = data.bytes().take(64).collect();
            let usable = prefix.len() - prefix.len() % 4;
            base64::engine::general_purpose::STANDARD
                .decode(&prefix[..usable])
                .ok()
                .and_then(|bytes| infer::get(&bytes).map(|t| t.mime_type().to_string()))
                .unwrap_or_else(|| fallback.to_string())
        }
        MediaSource::Url(url) => {
            let path = url.split(['?', '#']).next().unwrap_or(url);
            mime_guess::from_path(path)
                .first()
                .map(|m| m.essence_str().to_string())
                .unwrap_or_else(|| fallback.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_1X1: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    #[test]
    fn text_prefers_content_then_parts() {
        let m = ChatMessage::user("hello");
        assert_eq!(m.text(), "hello");

        let m = ChatMessage::user("")
            .with_part(ContentPart::text("a"))
            .with_part(ContentPart::image_url("https://x/y.png"))
            .with_part(ContentPart::text("b"));
        assert_eq!(m.text(), "a\nb");
        assert!(m.is_multimodal());
    }

    #[test]
    fn effective_parts_lifts_plain_content() {
        let m = ChatMessage::user("hi");
        assert_eq!(m.effective_parts(), vec![ContentPart::text("hi")]);
        assert!(ChatMessage::assistant("").effective_parts().is_empty());
    }

    #[test]
    fn explicit_parts_take_precedence_over_content() {
        let m = ChatMessage::user("ignored").with_part(ContentPart::image_url("https://x/y.png"));
        assert_eq!(
            m.effective_parts(),
            vec![ContentPart::image_url("https://x/y.png")]
        );
    }

    #[test]
    fn tool_result_carries_id() {
        let m = ChatMessage::tool_result("call_1", "42");
        assert_eq!(m.role, MessageRole::Tool);
        assert_eq!(m.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn mime_type_resolution() {
        let png = MediaSource::Base64(PNG_1X1.to_string());
        assert_eq!(resolve_mime_type(&png, None, "image/jpeg"), "image/png");
        assert_eq!(
            resolve_mime_type(&png, Some("image/webp"), "image/jpeg"),
            "image/webp"
        );
        let url = MediaSource::Url("https://example.com/cat.jpg?size=2".to_string());
        assert_eq!(resolve_mime_type(&url, None, "image/png"), "image/jpeg");
        let unknown = MediaSource::Url("https://example.com/blob".to_string());
        assert_eq!(
            resolve_mime_type(&unknown, None, "application/octet-stream"),
            "application/octet-stream"
        );
    }

    #[test]
    fn image_bytes_sniffs_mime() {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(PNG_1X1)
            .unwrap();
        match ContentPart::image_bytes(&bytes) {
            ContentPart::Image { mime_type, .. } => {
                assert_eq!(mime_type.as_deref(), Some("image/png"))
            }
            other => panic!("unexpected part: {other:?}"),
        }
    }
}
