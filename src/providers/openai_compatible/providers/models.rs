//! Static model tables of the OpenAI-compatible vendors.

use crate::types::{ModelCapabilities, StaticModel};

const CHAT: ModelCapabilities = ModelCapabilities::chat();

pub const CEREBRAS_MODELS: &[StaticModel] = &[
    StaticModel {
        id: "llama-3.3-70b",
        name: "Llama 3.3 70B",
        max_tokens: 128_000,
        capabilities: CHAT,
        description: "Meta Llama 3.3 70B on Cerebras wafer-scale inference",
        pricing: Some((0.85, 1.20)),
    },
    StaticModel {
        id: "llama3.1-8b",
        name: "Llama 3.1 8B",
        max_tokens: 128_000,
        capabilities: CHAT,
        description: "Small, fast Llama 3.1 model",
        pricing: Some((0.10, 0.10)),
    },
    StaticModel {
        id: "qwen-3-32b",
        name: "Qwen 3 32B",
        max_tokens: 64_000,
        capabilities: CHAT.with_reasoning(),
        description: "Qwen 3 32B hybrid reasoning model",
        pricing: Some((0.40, 0.80)),
    },
    StaticModel {
        id: "gpt-oss-120b",
        name: "GPT OSS 120B",
        max_tokens: 128_000,
        capabilities: CHAT.with_reasoning(),
        description: "OpenAI open-weight reasoning model",
        pricing: Some((0.25, 0.69)),
    },
];

pub const QWEN_MODELS: &[StaticModel] = &[
    StaticModel {
        id: "qwen-plus",
        name: "Qwen Plus",
        max_tokens: 131_072,
        capabilities: CHAT.with_structured_output(),
        description: "Balanced Qwen model for general chat",
        pricing: Some((0.40, 1.20)),
    },
    StaticModel {
        id: "qwen-max",
        name: "Qwen Max",
        max_tokens: 32_768,
        capabilities: CHAT.with_structured_output(),
        description: "Most capable Qwen model",
        pricing: Some((1.60, 6.40)),
    },
    StaticModel {
        id: "qwen-turbo",
        name: "Qwen Turbo",
        max_tokens: 1_000_000,
        capabilities: CHAT,
        description: "Fast, low-cost Qwen model with a long context window",
        pricing: Some((0.05, 0.20)),
    },
    StaticModel {
        id: "qwen3-coder-plus",
        name: "Qwen3 Coder Plus",
        max_tokens: 1_000_000,
        capabilities: CHAT,
        description: "Qwen3 coding model",
        pricing: Some((1.00, 5.00)),
    },
    StaticModel {
        id: "qwen-vl-max",
        name: "Qwen VL Max",
        max_tokens: 131_072,
        capabilities: CHAT.with_vision(),
        description: "Qwen vision-language model",
        pricing: Some((0.80, 3.20)),
    },
];

pub const OPENROUTER_MODELS: &[StaticModel] = &[
    StaticModel {
        id: "openai/gpt-4o-mini",
        name: "OpenAI: GPT-4o mini",
        max_tokens: 128_000,
        capabilities: CHAT.with_vision().with_structured_output(),
        description: "GPT-4o mini routed through OpenRouter",
        pricing: Some((0.15, 0.60)),
    },
    StaticModel {
        id: "anthropic/claude-sonnet-4",
        name: "Anthropic: Claude Sonnet 4",
        max_tokens: 200_000,
        capabilities: CHAT.with_vision().with_reasoning(),
        description: "Claude Sonnet 4 routed through OpenRouter",
        pricing: Some((3.00, 15.00)),
    },
    StaticModel {
        id: "google/gemini-2.5-flash",
        name: "Google: Gemini 2.5 Flash",
        max_tokens: 1_048_576,
        capabilities: CHAT.with_vision().with_reasoning(),
        description: "Gemini 2.5 Flash routed through OpenRouter",
        pricing: Some((0.30, 2.50)),
    },
    StaticModel {
        id: "meta-llama/llama-3.3-70b-instruct",
        name: "Meta: Llama 3.3 70B Instruct",
        max_tokens: 131_072,
        capabilities: CHAT,
        description: "Llama 3.3 70B routed through OpenRouter",
        pricing: Some((0.13, 0.40)),
    },
];

pub const LOCAL_MODELS: &[StaticModel] = &[StaticModel {
    id: "local-model",
    name: "Local model",
    max_tokens: 8_192,
    capabilities: CHAT,
    description: "Whatever model the local server has loaded",
    pricing: None,
}];
