//! Canonical request and the request-side transformer trait.
//!
//! [`StandardRequestBuilder`] turns caller options plus provider configuration
//! into a validated [`StandardRequest`]; a [`RequestTransformer`] then renders
//! that request as a provider-specific JSON body.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::LlmError;
use crate::types::{
    ChatMessage, GenerateOptions, MessageRole, ProviderConfig, ResponseFormat, Tool, ToolChoice,
};

/// Provider-neutral chat-completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct StandardRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// `None` means the provider default
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub stream: bool,
    pub stop: Vec<String>,
    pub tools: Vec<Tool>,
    pub tool_choice: Option<ToolChoice>,
    pub response_format: Option<ResponseFormat>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StandardRequest {
    /// System messages joined with blank lines, for schemas with a dedicated system field.
    pub fn system_text(&self) -> Option<String> {
        let parts: Vec<String> = self
            .messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .map(ChatMessage::text)
            .filter(|t| !t.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }

    /// Whether tools should be sent at all (`none` may drop them).
    pub fn tools_enabled(&self) -> bool {
        !self.tools.is_empty() && self.tool_choice != Some(ToolChoice::None)
    }
}

/// Renders a [`StandardRequest`] as a provider request body.
pub trait RequestTransformer: Send + Sync {
    /// Provider identifier (e.g. `openai`, `anthropic`, `gemini`)
    fn provider_id(&self) -> &str;

    fn transform_chat(&self, req: &StandardRequest) -> Result<serde_json::Value, LlmError>;
}

/// Builds validated [`StandardRequest`]s.
#[derive(Debug, Clone)]
pub struct StandardRequestBuilder<'a> {
    config: &'a ProviderConfig,
    streaming_supported: bool,
}

impl<'a> StandardRequestBuilder<'a> {
    pub fn new(config: &'a ProviderConfig) -> Self {
        Self {
            config,
            streaming_supported: config.features.streaming,
        }
    }

    pub fn streaming_supported(mut self, supported: bool) -> Self {
        self.streaming_supported = supported;
        self
    }

    fn invalid(&self, message: impl Into<String>) -> LlmError {
        LlmError::invalid_request(message)
            .with_provider(&self.config.provider_type)
            .with_operation("generate")
    }

    pub fn build(&self, options: &GenerateOptions) -> Result<StandardRequest, LlmError> {
        let mut messages = options.messages.clone();
        if let Some(prompt) = options.prompt.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            messages.push(ChatMessage::user(prompt));
        }
        if messages.is_empty() {
            return Err(self.invalid("at least one message or a non-empty prompt is required"));
        }
        self.validate_messages(&messages)?;

        let model = options
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.config.default_model.clone());
        if model.trim().is_empty() {
            return Err(self.invalid("no model specified and no default model configured"));
        }

        let max_tokens = options
            .max_tokens
            .filter(|n| *n > 0)
            .or(self.config.max_tokens.filter(|n| *n > 0));
        let temperature = options.temperature.or_else(|| {
            self.config
                .provider_config
                .get("temperature")
                .and_then(|v| v.as_f64())
                .map(|t| t as f32)
        });

        if !options.tools.is_empty() && !self.config.features.tool_calling {
            return Err(LlmError::unsupported("tool calling is disabled for this provider")
                .with_provider(&self.config.provider_type)
                .with_operation("generate"));
        }
        let tools = options
            .tools
            .iter()
            .map(|t| self.validate_tool(t))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(name) = options.tool_choice.as_ref().and_then(ToolChoice::tool_name)
            && !tools.iter().any(|t| t.name == name)
        {
            return Err(self.invalid(format!("tool_choice names unknown tool '{name}'")));
        }
        if let Some(ResponseFormat::JsonSchema(desc)) = &options.response_format {
            let schema = desc.get("schema").unwrap_or(desc);
            if !schema.is_object() || !jsonschema::meta::is_valid(schema) {
                return Err(self.invalid("response_format carries an invalid JSON schema"));
            }
        }

        let stop = options
            .stop
            .iter()
            .filter(|s| !s.is_empty())
            .cloned()
            .collect();

        Ok(StandardRequest {
            model,
            messages,
            max_tokens,
            temperature,
            stream: options.stream && self.streaming_supported,
            stop,
            tools,
            tool_choice: options.tool_choice.clone(),
            response_format: options.response_format.clone(),
            metadata: options.metadata.clone(),
        })
    }

    fn validate_messages(&self, messages: &[ChatMessage]) -> Result<(), LlmError> {
        let mut known_calls: HashSet<&str> = HashSet::new();
        for (i, message) in messages.iter().enumerate() {
            match message.role {
                MessageRole::Assistant => {
                    for call in &message.tool_calls {
                        if call.id.is_empty() {
                            return Err(self.invalid(format!("message {i}: tool call without id")));
                        }
                        known_calls.insert(call.id.as_str());
                    }
                }
                MessageRole::Tool => {
                    let id = message.tool_call_id.as_deref().unwrap_or_default();
                    if id.is_empty() {
                        return Err(self.invalid(format!(
                            "message {i}: tool result without tool_call_id"
                        )));
                    }
                    if !known_calls.contains(id) {
                        return Err(self.invalid(format!(
                            "message {i}: tool result '{id}' does not answer an earlier tool call"
                        )));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn validate_tool(&self, tool: &Tool) -> Result<Tool, LlmError> {
        if tool.name.trim().is_empty() {
            return Err(self.invalid("tool name must not be empty"));
        }
        let mut tool = tool.clone();
        if tool.input_schema.is_null() {
            tool.input_schema = serde_json::json!({ "type": "object", "properties": {} });
        }
        if !tool.input_schema.is_object() || !jsonschema::meta::is_valid(&tool.input_schema) {
            return Err(self.invalid(format!(
                "tool '{}' has an invalid input schema",
                tool.name
            )));
        }
        Ok(tool)
    }
}
