//! Transformers for the Gemini `generateContent` API
//!
//! System messages become `systemInstruction`, assistant turns use the `model`
//! role, tool calls become `functionCall` parts and tool results become
//! `functionResponse` parts. Gemini does not return tool-call ids, so fresh
//! ids are minted on the way back.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{Value, json};

use super::streaming::GeminiStreamDecoder;
use crate::error::LlmError;
use crate::streaming::StreamDecoder;
use crate::transformers::request::{RequestTransformer, StandardRequest};
use crate::transformers::response::{ResponseTransformer, content_or_reasoning, missing_field};
use crate::transformers::stream::StreamChunkTransformer;
use crate::types::{
    ChatMessage, Chunk, ContentPart, MediaSource, MessageRole, ToolCall, ToolChoice, Usage,
    resolve_mime_type,
};

/// Gemini `finishReason` to the canonical finish reason.
pub fn map_finish_reason(reason: &str, has_tool_calls: bool) -> String {
    match reason {
        "STOP" if has_tool_calls => "tool_calls",
        "STOP" => "stop",
        "MAX_TOKENS" => "length",
        "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
            "content_filter"
        }
        other => return other.to_ascii_lowercase(),
    }
    .to_string()
}

/// Strip the `models/` resource prefix from a model name.
pub fn bare_model_name(name: &str) -> &str {
    name.strip_prefix("models/").unwrap_or(name)
}

pub(crate) fn new_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

fn media_part(source: &MediaSource, mime: &str) -> Value {
    match source {
        MediaSource::Base64(data) => json!({
            "inlineData": { "mimeType": mime, "data": data }
        }),
        MediaSource::Url(url) => json!({
            "fileData": { "mimeType": mime, "fileUri": url }
        }),
    }
}

fn user_parts(message: &ChatMessage) -> Vec<Value> {
    message
        .effective_parts()
        .into_iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } if text.is_empty() => None,
            ContentPart::Text { text } => Some(json!({ "text": text })),
            ContentPart::Image {
                source, mime_type, ..
            } => {
                let mime = resolve_mime_type(&source, mime_type.as_deref(), "image/png");
                Some(media_part(&source, &mime))
            }
            ContentPart::Document {
                source, mime_type, ..
            } => {
                let mime = resolve_mime_type(&source, mime_type.as_deref(), "application/pdf");
                Some(media_part(&source, &mime))
            }
        })
        .collect()
}

fn model_parts(message: &ChatMessage) -> Result<Vec<Value>, LlmError> {
    let mut parts = Vec::new();
    let text = message.text();
    if !text.is_empty() {
        parts.push(json!({ "text": text }));
    }
    for call in &message.tool_calls {
        let args = call.parsed_arguments().map_err(|e| {
            LlmError::invalid_request(format!(
                "tool call '{}' has arguments that are not valid JSON: {e}",
                call.id
            ))
            .with_provider("gemini")
            .with_operation("generate")
        })?;
        parts.push(json!({
            "functionCall": { "name": call.function.name, "args": args }
        }));
    }
    Ok(parts)
}

/// `functionResponse.response` must be an object.
fn function_response(content: &str) -> Value {
    match serde_json::from_str::<Value>(content) {
        Ok(value @ Value::Object(_)) => value,
        Ok(value) => json!({ "result": value }),
        Err(_) => json!({ "result": content }),
    }
}

/// Render canonical messages as Gemini `contents`; system messages are skipped.
pub fn convert_messages(messages: &[ChatMessage]) -> Result<Vec<Value>, LlmError> {
    let mut call_names: HashMap<&str, &str> = HashMap::new();
    let mut turns: Vec<(&'static str, Vec<Value>)> = Vec::new();
    for message in messages {
        let (role, parts) = match message.role {
            MessageRole::System => continue,
            MessageRole::User => ("user", user_parts(message)),
            MessageRole::Assistant => {
                for call in &message.tool_calls {
                    call_names.insert(call.id.as_str(), call.function.name.as_str());
                }
                ("model", model_parts(message)?)
            }
            MessageRole::Tool => {
                let id = message.tool_call_id.as_deref().unwrap_or_default();
                let Some(name) = call_names.get(id) else {
                    return Err(LlmError::invalid_request(format!(
                        "tool result '{id}' does not match any earlier tool call"
                    ))
                    .with_provider("gemini")
                    .with_operation("generate"));
                };
                (
                    "user",
                    vec![json!({
                        "functionResponse": {
                            "name": name,
                            "response": function_response(&message.text()),
                        }
                    })],
                )
            }
        };
        if parts.is_empty() {
            continue;
        }
        match turns.last_mut() {
            Some((last_role, last_parts)) if *last_role == role => last_parts.extend(parts),
            _ => turns.push((role, parts)),
        }
    }
    Ok(turns
        .into_iter()
        .map(|(role, parts)| json!({ "role": role, "parts": parts }))
        .collect())
}

fn tool_config(choice: &ToolChoice) -> Value {
    let config = match choice {
        ToolChoice::Auto => json!({ "mode": "AUTO" }),
        ToolChoice::Required => json!({ "mode": "ANY" }),
        ToolChoice::None => json!({ "mode": "NONE" }),
        ToolChoice::Specific { name } => json!({
            "mode": "ANY",
            "allowedFunctionNames": [name],
        }),
    };
    json!({ "functionCallingConfig": config })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiRequestTransformer;

impl RequestTransformer for GeminiRequestTransformer {
    fn provider_id(&self) -> &str {
        "gemini"
    }

    fn transform_chat(&self, req: &StandardRequest) -> Result<Value, LlmError> {
        let mut body = json!({ "contents": convert_messages(&req.messages)? });
        if let Some(system) = req.system_text() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        let mut generation = serde_json::Map::new();
        if let Some(t) = req.temperature {
            generation.insert("temperature".into(), json!(t));
        }
        if let Some(n) = req.max_tokens {
            generation.insert("maxOutputTokens".into(), json!(n));
        }
        if !req.stop.is_empty() {
            generation.insert("stopSequences".into(), json!(req.stop));
        }
        if let Some(format) = req.response_format.as_ref().filter(|f| f.wants_json()) {
            generation.insert("responseMimeType".into(), json!("application/json"));
            if let Some(schema) = format.schema() {
                generation.insert("responseSchema".into(), schema.clone());
            }
        }
        if !generation.is_empty() {
            body["generationConfig"] = Value::Object(generation);
        }

        if !req.tools.is_empty() {
            let declarations: Vec<Value> = req
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    })
                })
                .collect();
            body["tools"] = json!([{ "functionDeclarations": declarations }]);
            if let Some(choice) = &req.tool_choice {
                body["toolConfig"] = tool_config(choice);
            }
        }
        Ok(body)
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct UsageMetadata {
    pub prompt_token_count: Option<u32>,
    pub candidates_token_count: Option<u32>,
    pub thoughts_token_count: Option<u32>,
    pub total_token_count: Option<u32>,
}

impl UsageMetadata {
    pub fn to_usage(&self) -> Usage {
        let completion =
            self.candidates_token_count.unwrap_or(0) + self.thoughts_token_count.unwrap_or(0);
        Usage::with_total(
            self.prompt_token_count.unwrap_or(0),
            completion,
            self.total_token_count,
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FunctionCallPart {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct Part {
    pub text: Option<String>,
    pub thought: bool,
    pub function_call: Option<FunctionCallPart>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub(crate) struct Content {
    pub parts: Vec<Part>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct Candidate {
    pub content: Content,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct GenerateContentResponse {
    pub candidates: Option<Vec<Candidate>>,
    pub usage_metadata: Option<UsageMetadata>,
    pub model_version: Option<String>,
    pub response_id: Option<String>,
}

impl FunctionCallPart {
    pub fn arguments(&self) -> String {
        if self.args.is_null() {
            "{}".to_string()
        } else {
            self.args.to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiResponseTransformer;

impl ResponseTransformer for GeminiResponseTransformer {
    fn provider_id(&self) -> &str {
        "gemini"
    }

    fn transform_chat_response(&self, raw: &Value) -> Result<Chunk, LlmError> {
        if let Some(message) = raw.pointer("/error/message").and_then(|m| m.as_str()) {
            return Err(LlmError::invalid_response(message.to_string())
                .with_provider("gemini")
                .with_operation("generate"));
        }
        let parsed: GenerateContentResponse = serde_json::from_value(raw.clone())
            .map_err(|e| LlmError::from(e).in_context("gemini", "generate"))?;
        let candidate = parsed
            .candidates
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| missing_field("gemini", "candidates"))?;

        let mut text = String::new();
        let mut thinking = String::new();
        let mut tool_calls = Vec::new();
        for part in candidate.content.parts {
            if let Some(call) = &part.function_call {
                tool_calls.push(ToolCall::new(new_call_id(), &call.name, call.arguments()));
            }
            match part.text {
                Some(t) if part.thought => thinking.push_str(&t),
                Some(t) => text.push_str(&t),
                None => {}
            }
        }

        let finish = candidate
            .finish_reason
            .as_deref()
            .map(|r| map_finish_reason(r, !tool_calls.is_empty()));
        let (content, reasoning) =
            content_or_reasoning(Some(text.as_str()), Some(thinking.as_str()), None);
        let mut message = ChatMessage::assistant(content).with_tool_calls(tool_calls);
        message.reasoning = reasoning;
        Ok(Chunk::complete(
            parsed.response_id.unwrap_or_default(),
            parsed.model_version.unwrap_or_default(),
            message,
            finish,
            parsed.usage_metadata.as_ref().map(UsageMetadata::to_usage),
        ))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GeminiStreamTransformer;

impl StreamChunkTransformer for GeminiStreamTransformer {
    fn provider_id(&self) -> &str {
        "gemini"
    }

    fn decoder(&self) -> Box<dyn StreamDecoder> {
        Box::new(GeminiStreamDecoder::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ResponseFormat, Tool};

    fn request(messages: Vec<ChatMessage>) -> StandardRequest {
        StandardRequest {
            model: "gemini-2.5-flash".into(),
            messages,
            ..Default::default()
        }
    }

    #[test]
    fn system_instruction_and_model_role() {
        let body = GeminiRequestTransformer
            .transform_chat(&request(vec![
                ChatMessage::system("be terse"),
                ChatMessage::user("ping"),
                ChatMessage::assistant("pong"),
            ]))
            .unwrap();
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be terse");
        assert_eq!(
            body["contents"],
            json!([
                {"role": "user", "parts": [{"text": "ping"}]},
                {"role": "model", "parts": [{"text": "pong"}]}
            ])
        );
        assert!(body.get("generationConfig").is_none());
    }

    #[test]
    fn tool_history_uses_function_parts() {
        let call = ToolCall::new("call_1", "get_weather", r#"{"city":"Paris"}"#);
        let body = GeminiRequestTransformer
            .transform_chat(&request(vec![
                ChatMessage::user("weather?"),
                ChatMessage::assistant("").with_tool_calls(vec![call]),
                ChatMessage::tool_result("call_1", r#"{"temp":21}"#),
            ]))
            .unwrap();
        let contents = body["contents"].as_array().unwrap();
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(
            contents[1]["parts"][0]["functionCall"],
            json!({"name": "get_weather", "args": {"city": "Paris"}})
        );
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"],
            json!({"name": "get_weather", "response": {"temp": 21}})
        );
    }

    #[test]
    fn unmatched_tool_result_is_rejected() {
        let err = GeminiRequestTransformer
            .transform_chat(&request(vec![ChatMessage::tool_result("nope", "42")]))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidRequest);
    }

    #[test]
    fn media_tools_and_json_schema() {
        let mut req = request(vec![
            ChatMessage::user("")
                .with_part(ContentPart::text("describe"))
                .with_part(ContentPart::image_base64("image/jpeg", "AAAA"))
                .with_part(ContentPart::document_url("gs://bucket/report.pdf")),
        ]);
        req.tools = vec![Tool::function(
            "lookup",
            "Look something up",
            json!({"type": "object"}),
        )];
        req.tool_choice = Some(ToolChoice::specific("lookup"));
        req.response_format = Some(ResponseFormat::json_schema(json!({
            "name": "answer",
            "schema": {"type": "object", "properties": {"a": {"type": "string"}}}
        })));
        req.max_tokens = Some(64);

        let body = GeminiRequestTransformer.transform_chat(&req).unwrap();
        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts[0]["text"], "describe");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(parts[2]["fileData"]["fileUri"], "gs://bucket/report.pdf");
        assert_eq!(body["tools"][0]["functionDeclarations"][0]["name"], "lookup");
        assert_eq!(
            body["toolConfig"]["functionCallingConfig"],
            json!({"mode": "ANY", "allowedFunctionNames": ["lookup"]})
        );
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 64);
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "object");
    }

    #[test]
    fn parses_candidate_with_function_call() {
        let chunk = GeminiResponseTransformer
            .transform_chat_response(&json!({
                "candidates": [{
                    "content": {"role": "model", "parts": [
                        {"text": "thinking...", "thought": true},
                        {"functionCall": {"name": "get_weather", "args": {"city": "Paris"}}}
                    ]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 7, "candidatesTokenCount": 5, "totalTokenCount": 12},
                "modelVersion": "gemini-2.5-flash"
            }))
            .unwrap();
        assert!(chunk.done);
        assert_eq!(chunk.finish_reason(), Some("tool_calls"));
        assert_eq!(chunk.tool_calls()[0].function.name, "get_weather");
        assert!(chunk.tool_calls()[0].id.starts_with("call_"));
        assert_eq!(chunk.reasoning(), Some("thinking..."));
        assert_eq!(chunk.usage, Some(Usage::new(7, 5)));
        assert_eq!(chunk.model, "gemini-2.5-flash");
    }

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(map_finish_reason("STOP", false), "stop");
        assert_eq!(map_finish_reason("MAX_TOKENS", false), "length");
        assert_eq!(map_finish_reason("SAFETY", false), "content_filter");
        assert_eq!(map_finish_reason("OTHER", false), "other");
        assert_eq!(bare_model_name("models/gemini-2.0-flash"), "gemini-2.0-flash");
    }
}
