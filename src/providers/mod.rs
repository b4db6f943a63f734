//! Concrete providers.
//!
//! Every vendor is a [`ProviderSpec`] (URLs, headers, model parsing and wire
//! transformers) driven by the shared [`HttpProvider`]. The functions below
//! build each one from a [`ProviderConfig`].

pub mod anthropic;
pub mod core;
pub mod gemini;
pub mod http;
pub mod openai;
pub mod openai_compatible;
pub mod spec;

pub use self::core::ProviderCore;
pub use http::HttpProvider;
pub use spec::{ProviderSpec, SpecDefaults};

pub use anthropic::{AnthropicProvider, AnthropicSpec};
pub use gemini::{GeminiProvider, GeminiSpec};
pub use openai::OpenAiProvider;
pub use openai_compatible::CompatSpec;

use openai_compatible::providers::{cerebras, lmstudio, openrouter, qwen};

use crate::error::LlmError;
use crate::types::ProviderConfig;

/// Provider for an OpenAI-compatible service.
pub type CompatProvider = HttpProvider<CompatSpec>;

pub fn openai(config: ProviderConfig) -> Result<OpenAiProvider, LlmError> {
    HttpProvider::new(openai::spec(), config)
}

pub fn anthropic(config: ProviderConfig) -> Result<AnthropicProvider, LlmError> {
    HttpProvider::new(AnthropicSpec, config)
}

pub fn gemini(config: ProviderConfig) -> Result<GeminiProvider, LlmError> {
    HttpProvider::new(GeminiSpec, config)
}

pub fn cerebras(config: ProviderConfig) -> Result<CompatProvider, LlmError> {
    HttpProvider::new(cerebras::spec(), config)
}

pub fn qwen(config: ProviderConfig) -> Result<CompatProvider, LlmError> {
    HttpProvider::new(qwen::spec(), config)
}

pub fn openrouter(config: ProviderConfig) -> Result<CompatProvider, LlmError> {
    HttpProvider::new(openrouter::spec(), config)
}

/// LM Studio or any other local OpenAI-compatible server.
pub fn lmstudio(config: ProviderConfig) -> Result<CompatProvider, LlmError> {
    HttpProvider::new(lmstudio::spec(), config)
}

/// Local server registered under a different tag (`local`, `openai_compatible`).
pub fn local(tag: &'static str, config: ProviderConfig) -> Result<CompatProvider, LlmError> {
    HttpProvider::new(lmstudio::spec_with_id(tag), config)
}
