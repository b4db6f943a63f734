//! Claude model metadata.

use crate::types::{ModelCapabilities, StaticModel};

const CLAUDE: ModelCapabilities = ModelCapabilities::chat().with_vision();

pub const ANTHROPIC_MODELS: &[StaticModel] = &[
    StaticModel {
        id: "claude-opus-4-1-20250805",
        name: "Claude Opus 4.1",
        max_tokens: 200_000,
        capabilities: CLAUDE.with_reasoning(),
        description: "Most capable Claude model",
        pricing: Some((15.00, 75.00)),
    },
    StaticModel {
        id: "claude-sonnet-4-20250514",
        name: "Claude Sonnet 4",
        max_tokens: 200_000,
        capabilities: CLAUDE.with_reasoning(),
        description: "High-performance Claude model with extended thinking",
        pricing: Some((3.00, 15.00)),
    },
    StaticModel {
        id: "claude-3-7-sonnet-20250219",
        name: "Claude Sonnet 3.7",
        max_tokens: 200_000,
        capabilities: CLAUDE.with_reasoning(),
        description: "Claude 3.7 Sonnet with extended thinking",
        pricing: Some((3.00, 15.00)),
    },
    StaticModel {
        id: "claude-3-5-haiku-20241022",
        name: "Claude Haiku 3.5",
        max_tokens: 200_000,
        capabilities: CLAUDE,
        description: "Fastest Claude model",
        pricing: Some((0.80, 4.00)),
    },
];
