//! Gemini model metadata.

use crate::types::{ModelCapabilities, StaticModel};

const GEMINI: ModelCapabilities = ModelCapabilities::chat()
    .with_vision()
    .with_structured_output();

pub const GEMINI_MODELS: &[StaticModel] = &[
    StaticModel {
        id: "gemini-2.5-pro",
        name: "Gemini 2.5 Pro",
        max_tokens: 1_048_576,
        capabilities: GEMINI.with_reasoning(),
        description: "Most capable Gemini model with thinking",
        pricing: Some((1.25, 10.00)),
    },
    StaticModel {
        id: "gemini-2.5-flash",
        name: "Gemini 2.5 Flash",
        max_tokens: 1_048_576,
        capabilities: GEMINI.with_reasoning(),
        description: "Fast Gemini model with thinking",
        pricing: Some((0.30, 2.50)),
    },
    StaticModel {
        id: "gemini-2.0-flash",
        name: "Gemini 2.0 Flash",
        max_tokens: 1_048_576,
        capabilities: GEMINI,
        description: "Low-latency multimodal model",
        pricing: Some((0.10, 0.40)),
    },
];
