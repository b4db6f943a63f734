//! Model metadata.

use serde::{Deserialize, Serialize};

/// Capability flags of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ModelCapabilities {
    pub streaming: bool,
    pub tool_calling: bool,
    pub vision: bool,
    pub reasoning: bool,
    pub structured_output: bool,
}

impl ModelCapabilities {
    /// Streaming + tool calling, the baseline of current chat models.
    pub const fn chat() -> Self {
        Self {
            streaming: true,
            tool_calling: true,
            vision: false,
            reasoning: false,
            structured_output: false,
        }
    }

    pub const fn with_vision(mut self) -> Self {
        self.vision = true;
        self
    }

    pub const fn with_reasoning(mut self) -> Self {
        self.reasoning = true;
        self
    }

    pub const fn with_structured_output(mut self) -> Self {
        self.structured_output = true;
        self
    }
}

/// Price per million tokens in USD.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

/// Metadata describing one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub max_tokens: u32,
    pub capabilities: ModelCapabilities,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<ModelPricing>,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>, provider: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            provider: provider.into(),
            ..Default::default()
        }
    }
}

/// Row of a provider's static metadata table.
#[derive(Debug, Clone, Copy)]
pub struct StaticModel {
    pub id: &'static str,
    pub name: &'static str,
    pub max_tokens: u32,
    pub capabilities: ModelCapabilities,
    pub description: &'static str,
    pub pricing: Option<(f64, f64)>,
}

impl StaticModel {
    pub fn to_info(&self, provider: &str) -> ModelInfo {
        ModelInfo {
            id: self.id.to_string(),
            name: self.name.to_string(),
            provider: provider.to_string(),
            max_tokens: self.max_tokens,
            capabilities: self.capabilities,
            description: self.description.to_string(),
            pricing: self.pricing.map(|(input, output)| ModelPricing {
                input_per_million: input,
                output_per_million: output,
            }),
        }
    }
}
