//! # unillm
//!
//! One client interface over heterogeneous LLM HTTP services.
//!
//! Every backend implements [`Provider`](traits::Provider): OpenAI, Anthropic,
//! Gemini, Cerebras, Qwen, OpenRouter and any local OpenAI-compatible server.
//! Requests are expressed once as [`GenerateOptions`](types::GenerateOptions)
//! and answered as a [`ChunkStream`](streaming::ChunkStream), whether or not
//! the call streams. Credentials rotate across API keys and OAuth sets, and
//! virtual providers compose concrete ones for fallback, load balancing and
//! racing.
//!
//! ```rust,ignore
//! use unillm::prelude::*;
//!
//! let provider = global_factory().create(
//!     "openai",
//!     ProviderConfig::new("openai").with_api_key("sk-..."),
//! )?;
//! let reply = provider
//!     .generate(GenerateOptions::from_prompt("Hello"))
//!     .await?
//!     .collect_response()
//!     .await?;
//! println!("{}", reply.content);
//! ```
#![deny(unsafe_code)]

pub mod auth;
pub mod composite;
pub mod error;
pub mod executors;
pub mod metrics;
pub mod model_catalog;
pub mod observability;
pub mod providers;
pub mod rate_limit;
pub mod registry;
pub mod retry;
pub mod streaming;
pub mod traits;
pub mod transformers;
pub mod types;

pub use error::{ErrorKind, LlmError};

/// Commonly used items.
pub mod prelude {
    pub use crate::auth::{Credential, CredentialManager};
    pub use crate::composite::{FallbackProvider, LoadBalanceProvider, RacingProvider};
    pub use crate::error::{ErrorKind, LlmError};
    pub use crate::metrics::{MetricsEvent, MetricsSink, ProviderMetrics};
    pub use crate::registry::{ProviderFactory, ProviderRegistry, global_factory};
    pub use crate::streaming::ChunkStream;
    pub use crate::traits::{Provider, VirtualProvider};
    pub use crate::transformers::{StandardRequest, StandardRequestBuilder};
    pub use crate::types::{
        AuthConfig, ChatMessage, Chunk, ContentPart, GenerateOptions, MessageRole, ModelInfo,
        ProviderConfig, ResponseFormat, Tool, ToolCall, ToolChoice, Usage,
    };
}

static_assertions::assert_impl_all!(LlmError: Send, Sync, Clone);
static_assertions::assert_impl_all!(streaming::ChunkStream: Send);
static_assertions::assert_impl_all!(registry::ProviderRegistry: Send, Sync);
static_assertions::assert_obj_safe!(traits::Provider);
