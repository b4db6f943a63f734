//! OpenAI model metadata.

use crate::types::{ModelCapabilities, StaticModel};

const CHAT: ModelCapabilities = ModelCapabilities::chat();

pub const OPENAI_MODELS: &[StaticModel] = &[
    StaticModel {
        id: "gpt-4o",
        name: "GPT-4o",
        max_tokens: 128_000,
        capabilities: CHAT.with_vision().with_structured_output(),
        description: "Flagship multimodal GPT-4 class model",
        pricing: Some((2.50, 10.00)),
    },
    StaticModel {
        id: "gpt-4o-mini",
        name: "GPT-4o mini",
        max_tokens: 128_000,
        capabilities: CHAT.with_vision().with_structured_output(),
        description: "Small, affordable multimodal model",
        pricing: Some((0.15, 0.60)),
    },
    StaticModel {
        id: "gpt-4.1",
        name: "GPT-4.1",
        max_tokens: 1_047_576,
        capabilities: CHAT.with_vision().with_structured_output(),
        description: "Long-context GPT-4.1",
        pricing: Some((2.00, 8.00)),
    },
    StaticModel {
        id: "gpt-4.1-mini",
        name: "GPT-4.1 mini",
        max_tokens: 1_047_576,
        capabilities: CHAT.with_vision().with_structured_output(),
        description: "Fast long-context GPT-4.1 variant",
        pricing: Some((0.40, 1.60)),
    },
    StaticModel {
        id: "o3",
        name: "o3",
        max_tokens: 200_000,
        capabilities: CHAT.with_vision().with_reasoning().with_structured_output(),
        description: "Reasoning model for complex tasks",
        pricing: Some((2.00, 8.00)),
    },
    StaticModel {
        id: "o4-mini",
        name: "o4-mini",
        max_tokens: 200_000,
        capabilities: CHAT.with_vision().with_reasoning().with_structured_output(),
        description: "Fast, cost-efficient reasoning model",
        pricing: Some((1.10, 4.40)),
    },
];
